use paninsight_core::analysis::{MedicalReport, Statistics};
use paninsight_core::export::{layout_document, render_html, Branding, HtmlOptions, PDF_FILE_NAME};
use paninsight_core::{
    AnalysisResult, FileReportStore, PdfExporter, ReportHolder, ReportSource, RiskLevel,
};

fn result_with(findings: usize) -> AnalysisResult {
    AnalysisResult {
        scan_type: "CT".into(),
        analysis_date: "2024-06-12".into(),
        confidence: 79.9,
        risk_level: RiskLevel::High,
        findings: (1..=findings).map(|n| format!("Finding number {n}")).collect(),
        recommendations: vec!["Consult a hepatologist".into()],
        next_steps: Vec::new(),
        follow_up_timeline: "Follow up within 3 months.".into(),
        overlay_image: None,
        statistics: Some(Statistics {
            liver_volume_ml: Some(1200.0),
            ..Statistics::default()
        }),
        medical_report: Some(MedicalReport {
            impression: Some("Enlarged liver.".into()),
            ..MedicalReport::default()
        }),
        segmentation_file: None,
        mask_download_url: None,
    }
}

#[test]
fn persisted_result_renders_identically() {
    let temp = tempfile::tempdir().unwrap();
    let holder = ReportHolder::new(FileReportStore::new(temp.path()));
    let original = result_with(3);

    let first = holder.resolve(Some(original.clone())).unwrap();
    assert!(matches!(first, ReportSource::Navigation(_)));
    let reopened = holder.resolve(None).unwrap();
    assert_eq!(reopened, ReportSource::Persisted(original.clone()));

    let options = HtmlOptions::default();
    assert_eq!(
        render_html(&original, &options).unwrap(),
        render_html(reopened.result().unwrap(), &options).unwrap()
    );
    assert_eq!(
        layout_document(&original, &Branding::default(), false),
        layout_document(reopened.result().unwrap(), &Branding::default(), false)
    );
}

#[test]
fn long_finding_lists_span_pages_with_repeated_headers() {
    let layout = layout_document(&result_with(120), &Branding::default(), false);
    assert!(layout.pages.len() >= 3);
    let headers: Vec<usize> = layout
        .texts()
        .into_iter()
        .filter(|(_, text)| *text == "Finding")
        .map(|(page, _)| page)
        .collect();
    assert!(headers.len() >= 2);
    assert!(headers.windows(2).all(|pair| pair[0] < pair[1]));
    assert_eq!(layout.page_of("Finding number 120"), headers.last().copied());
}

#[tokio::test]
async fn pdf_lands_in_downloads_directory() {
    let temp = tempfile::tempdir().unwrap();
    let exporter = PdfExporter::new(temp.path().join("Downloads"));
    let path = exporter
        .export(Some(&result_with(5)), None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(path, temp.path().join("Downloads").join(PDF_FILE_NAME));
    assert!(std::fs::read(path).unwrap().starts_with(b"%PDF"));
}
