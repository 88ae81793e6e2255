//! Report export: a paginated PDF document and a printable HTML page.
//!
//! Both serializers read from [`sections::ReportSections`] so they share the
//! same section order and conditional-field policy.

pub mod html;
pub mod layout;
pub mod logo;
pub mod pdf;
pub mod print;
pub mod sections;

pub use html::{render_html, HtmlOptions};
pub use layout::{layout_document, DocumentLayout, DrawOp};
pub use logo::{fetch_logo, source_for, FileLogoSource, HttpLogoSource, Logo, LogoSource};
pub use pdf::{encode_pdf, PdfExporter, PDF_FILE_NAME};
pub use print::{print_report, FilePrintSurface, PrintSurface, Rendered, PRINT_FILE_NAME};
pub use sections::{Branding, ReportSections, DEFAULT_DISCLAIMER};
