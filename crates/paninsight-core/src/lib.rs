pub mod analysis;
pub mod api;
pub mod chat;
pub mod export;
pub mod format;
pub mod report;
pub mod session;
pub mod settings;

pub use analysis::{
    store::{FileReportStore, ReportHolder, ReportSource, ReportStore},
    AnalysisResult, ConfidenceBand, MedicalReport, RiskLevel, SegmentationResponse, Statistics,
    Tone,
};
pub use api::{ApiClient, ApiEndpoints};
pub use chat::{ChatBackend, ChatConfig, ChatError, ChatMessage, ChatWidget};
pub use export::{HtmlOptions, PdfExporter, PrintSurface};
pub use report::{render_report, OutputFormat};
pub use session::{AuthBackend, AuthGate, FileSessionStore, Session, SessionStore, UserProfile};
pub use settings::{AuthMode, ChatMode, Settings};
