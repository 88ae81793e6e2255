use std::fmt::Write;

use serde::Serialize;

use crate::analysis::{AnalysisResult, ConfidenceBand, RiskLevel, Statistics, Tone};
use crate::export::sections::{ReportSections, StatLine};
use crate::format::{group_thousands, two_decimals};

/// Format styles supported by the on-screen summary renderer.
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    Human,
    Json,
}

/// Produce the report page summary from an `AnalysisResult` in the desired format.
pub fn render_report(result: &AnalysisResult, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Human => render_human(result),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&SummaryView::from(result))?),
    }
}

/// Paragraph shown under the overview cards.
pub fn summary_paragraph(result: &AnalysisResult) -> String {
    format!(
        "Our advanced AI algorithms have analyzed your medical scan for early detection indicators. \
         The analysis shows a {risk} risk level with {confidence}% confidence. \
         Based on the findings, we've provided specific recommendations and next steps for your healthcare provider.",
        risk = result.risk_level.as_str().to_lowercase(),
        confidence = result.confidence,
    )
}

fn render_human(result: &AnalysisResult) -> anyhow::Result<String> {
    let sections = ReportSections::from_result(result);
    let mut out = String::new();
    writeln!(out, "AI Analysis Report")?;
    writeln!(out, "Scan Type: {}", result.scan_type)?;
    writeln!(out, "Analysis Date: {}", result.analysis_date)?;
    writeln!(
        out,
        "Confidence: {}% ({:?})",
        result.confidence,
        result.confidence_band()
    )?;
    writeln!(out, "Risk Level: {} Risk", result.risk_level)?;
    writeln!(out)?;
    writeln!(out, "Summary:")?;
    writeln!(out, "  {}", summary_paragraph(result))?;

    if result.overlay_image.is_some() {
        writeln!(out)?;
        writeln!(out, "Segmentation Overlay: available")?;
    }

    if let Some(stats) = result.present_statistics() {
        writeln!(out)?;
        writeln!(out, "Segmentation Statistics:")?;
        for line in screen_statistics(stats) {
            writeln!(out, "  {}: {}", line.label, line.value)?;
        }
    }

    if let Some(url) = &result.mask_download_url {
        writeln!(out)?;
        writeln!(out, "Segmentation Mask: {url}")?;
    }

    for table in &sections.tables {
        writeln!(out)?;
        writeln!(out, "{}:", table.title)?;
        if table.rows.is_empty() {
            writeln!(out, "  (none)")?;
        }
        for (idx, row) in table.rows.iter().enumerate() {
            writeln!(out, "  {}. {}", idx + 1, row)?;
        }
    }

    writeln!(out)?;
    writeln!(out, "Follow-up Timeline:")?;
    writeln!(out, "  {}", sections.follow_up)?;

    if let Some(medical) = &sections.medical {
        writeln!(out)?;
        writeln!(out, "Detailed Medical Report:")?;
        if let Some(impression) = &medical.impression {
            writeln!(out, "  Impression: {impression}")?;
        }
        if let Some(morphology) = &medical.morphology {
            writeln!(
                out,
                "  Connected Components: {}",
                morphology.connected_components
            )?;
            writeln!(out, "  Fragmentation Level: {}", morphology.fragmentation)?;
        }
        for note in medical.quality_notes {
            writeln!(out, "  - {note}")?;
        }
    }

    writeln!(out)?;
    writeln!(out, "{}", sections.disclaimer)?;
    Ok(out)
}

/// On screen every statistic of a present block is shown, with `N/A` for gaps.
fn screen_statistics(stats: &Statistics) -> Vec<StatLine> {
    let or_na = |value: Option<String>| value.unwrap_or_else(|| "N/A".to_string());
    vec![
        StatLine {
            label: "Liver Volume",
            value: format!("{} ml", or_na(stats.liver_volume_ml.map(two_decimals))),
        },
        StatLine {
            label: "Liver Percentage",
            value: format!("{}%", or_na(stats.liver_percentage.map(two_decimals))),
        },
        StatLine {
            label: "Liver Voxels",
            value: or_na(stats.liver_voxels.map(group_thousands)),
        },
    ]
}

#[derive(Debug, Serialize)]
struct SummaryView<'a> {
    scan_type: &'a str,
    analysis_date: &'a str,
    confidence: f64,
    confidence_band: ConfidenceBand,
    confidence_tone: Tone,
    risk_level: RiskLevel,
    risk_tone: Tone,
    summary: String,
    overlay_image: Option<&'a str>,
    statistics: Option<&'a Statistics>,
    mask_download_url: Option<&'a str>,
    findings: &'a [String],
    recommendations: &'a [String],
    next_steps: &'a [String],
    follow_up_timeline: &'a str,
}

impl<'a> From<&'a AnalysisResult> for SummaryView<'a> {
    fn from(result: &'a AnalysisResult) -> Self {
        let band = result.confidence_band();
        Self {
            scan_type: &result.scan_type,
            analysis_date: &result.analysis_date,
            confidence: result.confidence,
            confidence_band: band,
            confidence_tone: band.tone(),
            risk_level: result.risk_level,
            risk_tone: result.risk_level.tone(),
            summary: summary_paragraph(result),
            overlay_image: result.overlay_image.as_deref(),
            statistics: result.present_statistics(),
            mask_download_url: result.mask_download_url.as_deref(),
            findings: &result.findings,
            recommendations: &result.recommendations,
            next_steps: &result.next_steps,
            follow_up_timeline: &result.follow_up_timeline,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::fixtures::{full_result, minimal_result};

    #[test]
    fn human_report_contains_overview() {
        let output = render_report(&full_result(), OutputFormat::Human).unwrap();
        assert!(output.contains("Scan Type: MRI"));
        assert!(output.contains("Confidence: 92% (High)"));
        assert!(output.contains("Risk Level: Low Risk"));
        assert!(output.contains("Liver Volume: 1534.20 ml"));
        assert!(output.contains("Liver Voxels: 1,234,567"));
        assert!(output.contains("Segmentation Mask: https://example.org/mask.nii.gz"));
    }

    #[test]
    fn detailed_report_lists_quality_notes() {
        let output = render_report(&full_result(), OutputFormat::Human).unwrap();
        assert!(output.contains("Detailed Medical Report:"));
        assert!(output.contains("  - Good contrast"));
    }

    #[test]
    fn partial_statistics_show_placeholders() {
        let mut result = minimal_result();
        result.statistics = Some(Statistics {
            liver_volume_ml: Some(900.0),
            ..Statistics::default()
        });
        let output = render_report(&result, OutputFormat::Human).unwrap();
        assert!(output.contains("Liver Percentage: N/A%"));
        assert!(output.contains("Liver Voxels: N/A"));
    }

    #[test]
    fn minimal_report_snapshot() {
        let output = render_report(&minimal_result(), OutputFormat::Human).unwrap();
        insta::assert_snapshot!(output, @r###"
        AI Analysis Report
        Scan Type: MRI
        Analysis Date: 2024-05-01
        Confidence: 92% (High)
        Risk Level: Low Risk

        Summary:
          Our advanced AI algorithms have analyzed your medical scan for early detection indicators. The analysis shows a low risk level with 92% confidence. Based on the findings, we've provided specific recommendations and next steps for your healthcare provider.

        Findings:
          (none)

        Recommendations:
          (none)

        Next Steps:
          (none)

        Follow-up Timeline:
          Repeat imaging in 12 months.

        This report is generated automatically and should be reviewed by a qualified healthcare professional.
        "###);
    }

    #[test]
    fn json_summary_carries_color_buckets() {
        let mut result = full_result();
        result.confidence = 79.9;
        let output = render_report(&result, OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["confidence_band"], "moderate");
        assert_eq!(value["risk_level"], "Low");
        assert_eq!(value["risk_tone"], "info");
        assert!(value["findings"].is_array());
    }

    #[test]
    fn json_summary_omits_empty_statistics() {
        let mut result = minimal_result();
        result.statistics = Some(Statistics::default());
        let output = render_report(&result, OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert!(value["statistics"].is_null());
    }
}
