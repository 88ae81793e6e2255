use crate::analysis::{AnalysisResult, MeasureValue, Statistics};
use crate::format::{group_thousands, two_decimals};

pub const DEFAULT_DISCLAIMER: &str = "This report is generated automatically and should be reviewed by a qualified healthcare professional.";

/// 8-bit RGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const BLACK: Rgb = Rgb(0, 0, 0);
    pub const WHITE: Rgb = Rgb(255, 255, 255);
    pub const MUTED: Rgb = Rgb(100, 100, 100);

    pub fn css(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }
}

/// Fixed product branding printed at the top of every export.
#[derive(Debug, Clone)]
pub struct Branding {
    pub title: String,
    pub intro: Vec<String>,
    pub credit: String,
    pub footer: String,
}

impl Default for Branding {
    fn default() -> Self {
        Self {
            title: "LiverProfile AI Analysis Report".into(),
            intro: vec![
                "LiverProfile AI is an advanced AI-powered platform for liver segmentation and morphological analysis from 3D MRI volumes.".into(),
                "This report provides actionable insights and recommendations based on your medical scan.".into(),
            ],
            credit: "AI Model Creator: Debesh Jha".into(),
            footer: "Generated by LiverProfile AI".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatLine {
    pub label: &'static str,
    pub value: String,
}

/// One numbered list rendered as a `#` / label table.
#[derive(Debug, Clone)]
pub struct ListTable<'a> {
    pub title: &'static str,
    pub column: &'static str,
    pub rows: &'a [String],
    pub header_fill: Rgb,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MorphologyLines {
    pub connected_components: String,
    pub fragmentation: String,
}

#[derive(Debug, Clone)]
pub struct MedicalSection<'a> {
    pub impression: Option<&'a str>,
    pub morphology: Option<MorphologyLines>,
    pub quality_notes: &'a [String],
}

/// Section content in export order with the conditional-field policy already applied.
///
/// Both exporters and the on-screen renderer read from this, so a field that is
/// omitted in one output is omitted in all of them.
#[derive(Debug, Clone)]
pub struct ReportSections<'a> {
    pub overview: Vec<StatLine>,
    /// Empty when no statistic is present; the section is then skipped.
    pub statistics: Vec<StatLine>,
    pub tables: Vec<ListTable<'a>>,
    pub follow_up: &'a str,
    pub medical: Option<MedicalSection<'a>>,
    pub disclaimer: &'a str,
}

impl<'a> ReportSections<'a> {
    pub fn from_result(result: &'a AnalysisResult) -> Self {
        let overview = vec![
            StatLine {
                label: "Scan Type",
                value: result.scan_type.clone(),
            },
            StatLine {
                label: "Analysis Date",
                value: result.analysis_date.clone(),
            },
            StatLine {
                label: "Confidence",
                value: format!("{}%", result.confidence),
            },
            StatLine {
                label: "Risk Level",
                value: result.risk_level.to_string(),
            },
        ];

        let statistics = result
            .present_statistics()
            .map(export_statistics)
            .unwrap_or_default();

        let tables = vec![
            ListTable {
                title: "Findings",
                column: "Finding",
                rows: &result.findings,
                header_fill: Rgb(41, 128, 185),
            },
            ListTable {
                title: "Recommendations",
                column: "Recommendation",
                rows: &result.recommendations,
                header_fill: Rgb(142, 68, 173),
            },
            ListTable {
                title: "Next Steps",
                column: "Next Step",
                rows: &result.next_steps,
                header_fill: Rgb(39, 174, 96),
            },
        ];

        let medical = result.medical_report.as_ref().map(|report| MedicalSection {
            impression: report
                .impression
                .as_deref()
                .filter(|text| !text.trim().is_empty()),
            morphology: report.morphology().map(|morphology| MorphologyLines {
                connected_components: or_na(morphology.connected_components.as_ref()),
                fragmentation: or_na(morphology.fragmentation.as_ref()),
            }),
            quality_notes: report.quality_notes(),
        });

        let disclaimer = result
            .medical_report
            .as_ref()
            .and_then(|report| report.disclaimer.as_deref())
            .filter(|text| !text.trim().is_empty())
            .unwrap_or(DEFAULT_DISCLAIMER);

        Self {
            overview,
            statistics,
            tables,
            follow_up: &result.follow_up_timeline,
            medical,
            disclaimer,
        }
    }
}

/// Export lines for every statistic that is present and non-zero.
///
/// Modality is only listed next to at least one measurement.
fn export_statistics(stats: &Statistics) -> Vec<StatLine> {
    let present = |value: Option<f64>| value.filter(|v| *v != 0.0 && !v.is_nan());
    let mut lines = Vec::new();
    if let Some(volume) = present(stats.liver_volume_ml) {
        lines.push(StatLine {
            label: "Liver Volume",
            value: format!("{} ml", two_decimals(volume)),
        });
    }
    if let Some(percentage) = present(stats.liver_percentage) {
        lines.push(StatLine {
            label: "Liver Percentage",
            value: format!("{}%", two_decimals(percentage)),
        });
    }
    if let Some(voxels) = present(stats.liver_voxels) {
        lines.push(StatLine {
            label: "Liver Voxels",
            value: group_thousands(voxels),
        });
    }
    if let Some(voxels) = present(stats.total_voxels) {
        lines.push(StatLine {
            label: "Total Voxels",
            value: group_thousands(voxels),
        });
    }
    if lines.is_empty() {
        return lines;
    }
    if let Some(modality) = stats.modality.as_deref().filter(|m| !m.trim().is_empty()) {
        lines.push(StatLine {
            label: "Modality",
            value: modality.to_string(),
        });
    }
    lines
}

fn or_na(value: Option<&MeasureValue>) -> String {
    value
        .filter(|value| !value.is_blank())
        .map(ToString::to_string)
        .unwrap_or_else(|| "N/A".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::fixtures::{full_result, minimal_result};
    use crate::analysis::{MedicalReport, Statistics};

    #[test]
    fn statistics_follow_fixed_order_and_formatting() {
        let result = full_result();
        let sections = ReportSections::from_result(&result);
        let labels: Vec<_> = sections.statistics.iter().map(|l| l.label).collect();
        assert_eq!(
            labels,
            vec![
                "Liver Volume",
                "Liver Percentage",
                "Liver Voxels",
                "Total Voxels",
                "Modality"
            ]
        );
        assert_eq!(sections.statistics[0].value, "1534.20 ml");
        assert_eq!(sections.statistics[1].value, "3.10%");
        assert_eq!(sections.statistics[3].value, "39,845,760");
    }

    #[test]
    fn modality_alone_does_not_make_a_statistics_section() {
        let mut result = minimal_result();
        result.statistics = Some(Statistics {
            modality: Some("MRI".into()),
            ..Statistics::default()
        });
        assert!(result.present_statistics().is_none());
        assert!(ReportSections::from_result(&result).statistics.is_empty());

        result.statistics = Some(Statistics {
            total_voxels: Some(0.0),
            modality: Some("MRI".into()),
            ..Statistics::default()
        });
        assert!(ReportSections::from_result(&result).statistics.is_empty());
    }

    #[test]
    fn zero_statistics_count_as_absent() {
        let mut result = minimal_result();
        result.statistics = Some(Statistics {
            liver_volume_ml: Some(0.0),
            ..Statistics::default()
        });
        assert!(ReportSections::from_result(&result).statistics.is_empty());
    }

    #[test]
    fn medical_disclaimer_overrides_default() {
        let mut result = minimal_result();
        assert_eq!(
            ReportSections::from_result(&result).disclaimer,
            DEFAULT_DISCLAIMER
        );
        result.medical_report = Some(MedicalReport {
            disclaimer: Some("For research use only.".into()),
            ..MedicalReport::default()
        });
        let sections = ReportSections::from_result(&result);
        assert_eq!(sections.disclaimer, "For research use only.");
        let medical = sections.medical.unwrap();
        assert!(medical.impression.is_none());
        assert!(medical.morphology.is_none());
        assert!(medical.quality_notes.is_empty());
    }

    #[test]
    fn morphology_gaps_render_as_na() {
        let result = full_result();
        let sections = ReportSections::from_result(&result);
        let morphology = sections.medical.unwrap().morphology.unwrap();
        assert_eq!(morphology.connected_components, "1");
        assert_eq!(morphology.fragmentation, "low");
    }

    #[test]
    fn css_colour_is_hex() {
        assert_eq!(Rgb(41, 128, 185).css(), "#2980b9");
    }
}
