use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Persistence and resolution of the result shown on the report page.
pub mod store;

/// Qualitative risk assigned by the analysis service. Drives colour coding only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Visual treatment for a risk level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Info,
    Alert,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }

    /// Low and medium share the informational palette; only high is flagged.
    pub fn tone(&self) -> Tone {
        match self {
            Self::Low | Self::Medium => Tone::Info,
            Self::High => Tone::Alert,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lower bounds of the confidence colour buckets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceThresholds {
    pub moderate: f64,
    pub high: f64,
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self {
            moderate: 60.0,
            high: 80.0,
        }
    }
}

/// Colour bucket for the confidence indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceBand {
    Low,
    Moderate,
    High,
}

impl ConfidenceBand {
    /// Map a confidence percentage into its bucket (`>= 80`, `60..80`, below).
    pub fn from_confidence(confidence: f64) -> Self {
        Self::from_confidence_with_thresholds(confidence, &ConfidenceThresholds::default())
    }

    pub fn from_confidence_with_thresholds(
        confidence: f64,
        thresholds: &ConfidenceThresholds,
    ) -> Self {
        if confidence >= thresholds.high {
            Self::High
        } else if confidence >= thresholds.moderate {
            Self::Moderate
        } else {
            Self::Low
        }
    }

    pub fn tone(&self) -> Tone {
        match self {
            Self::High | Self::Moderate => Tone::Info,
            Self::Low => Tone::Alert,
        }
    }
}

/// Result of one completed scan analysis as produced by the upstream service.
///
/// The value is never mutated once received; the report page only re-serializes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub scan_type: String,
    pub analysis_date: String,
    /// Percentage, expected within 0..=100 but not enforced.
    pub confidence: f64,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub findings: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub next_steps: Vec<String>,
    #[serde(default)]
    pub follow_up_timeline: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlay_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<Statistics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medical_report: Option<MedicalReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segmentation_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask_download_url: Option<String>,
}

impl AnalysisResult {
    /// Statistics worth showing: `None` when absent or when every measurement is missing.
    pub fn present_statistics(&self) -> Option<&Statistics> {
        self.statistics.as_ref().filter(|stats| !stats.is_empty())
    }

    pub fn confidence_band(&self) -> ConfidenceBand {
        ConfidenceBand::from_confidence(self.confidence)
    }
}

/// Segmentation statistics; every field is optional and rendered only when present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liver_volume_ml: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liver_percentage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liver_voxels: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_voxels: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modality: Option<String>,
}

impl Statistics {
    /// True when no numeric measurement is present. `modality` alone does not
    /// make a block worth showing.
    pub fn is_empty(&self) -> bool {
        self.liver_volume_ml.is_none()
            && self.liver_percentage.is_none()
            && self.liver_voxels.is_none()
            && self.total_voxels.is_none()
    }
}

/// Narrative report attached to a segmentation. Every level may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MedicalReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurements: Option<Measurements>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_assessment: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disclaimer: Option<String>,
}

impl MedicalReport {
    pub fn morphology(&self) -> Option<&Morphology> {
        self.measurements.as_ref()?.morphology.as_ref()
    }

    pub fn quality_notes(&self) -> &[String] {
        self.quality_assessment.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Measurements {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub morphology: Option<Morphology>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Morphology {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected_components: Option<MeasureValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fragmentation: Option<MeasureValue>,
}

/// Measurement values arrive either as numbers or as labels such as `"low"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MeasureValue {
    Number(f64),
    Text(String),
}

impl MeasureValue {
    /// Zero and blank values carry no information and are shown as `N/A`.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Number(value) => *value == 0.0 || value.is_nan(),
            Self::Text(text) => text.trim().is_empty(),
        }
    }
}

impl fmt::Display for MeasureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(value) => write!(f, "{value}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

/// Raw response of the segmentation endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct SegmentationResponse {
    pub success: bool,
    #[serde(default)]
    pub overlay_image: Option<String>,
    #[serde(default)]
    pub mask_download_url: Option<String>,
    #[serde(default)]
    pub statistics: Option<Statistics>,
    #[serde(default)]
    pub medical_report: Option<MedicalReport>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_type: Option<String>,
}

/// Payload parts of a successful segmentation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentationOutput {
    pub overlay_image: Option<String>,
    pub mask_download_url: Option<String>,
    pub statistics: Option<Statistics>,
    pub medical_report: Option<MedicalReport>,
}

/// Failure reported by the segmentation service itself.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("segmentation failed ({kind}): {message}")]
pub struct SegmentationError {
    pub kind: String,
    pub message: String,
}

impl SegmentationResponse {
    pub fn into_outcome(self) -> Result<SegmentationOutput, SegmentationError> {
        if !self.success {
            return Err(SegmentationError {
                kind: self.error_type.unwrap_or_else(|| "unknown".to_string()),
                message: self
                    .error
                    .unwrap_or_else(|| "no error message supplied".to_string()),
            });
        }
        Ok(SegmentationOutput {
            overlay_image: self.overlay_image,
            mask_download_url: self.mask_download_url,
            statistics: self.statistics,
            medical_report: self.medical_report,
        })
    }
}

impl AnalysisResult {
    /// Attach the artefacts of a successful segmentation to this result.
    pub fn with_segmentation(mut self, output: SegmentationOutput) -> Self {
        self.overlay_image = output.overlay_image.or(self.overlay_image);
        self.mask_download_url = output.mask_download_url.or(self.mask_download_url);
        self.statistics = output.statistics.or(self.statistics);
        self.medical_report = output.medical_report.or(self.medical_report);
        self
    }
}
