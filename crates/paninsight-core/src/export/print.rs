use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument};

use super::html::{render_html, HtmlOptions};
use crate::analysis::AnalysisResult;

pub const PRINT_FILE_NAME: &str = "LiverProfile-Report.html";

/// Proof that a surface has finished laying down a document.
///
/// Returned by `PrintSurface::load` once the content is rendered and consumed
/// by `print`.
#[derive(Debug)]
pub struct Rendered {
    location: String,
}

impl Rendered {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }
}

/// A target that can display an HTML document and print it.
#[async_trait]
pub trait PrintSurface: Send + Sync {
    /// Resolve once the document is fully rendered.
    async fn load(&self, html: &str) -> Result<Rendered>;

    async fn print(&self, rendered: Rendered) -> Result<()>;
}

/// Writes the document to disk and optionally hands it to a print command.
pub struct FilePrintSurface {
    path: PathBuf,
    command: Option<String>,
}

impl FilePrintSurface {
    pub fn new(path: impl Into<PathBuf>, command: Option<String>) -> Self {
        Self {
            path: path.into(),
            command: command.filter(|c| !c.trim().is_empty()),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

#[async_trait]
impl PrintSurface for FilePrintSurface {
    async fn load(&self, html: &str) -> Result<Rendered> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut file = tokio::fs::File::create(&self.path)
            .await
            .with_context(|| format!("failed to create {}", self.path.display()))?;
        file.write_all(html.as_bytes())
            .await
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        file.sync_all()
            .await
            .with_context(|| format!("failed to flush {}", self.path.display()))?;
        Ok(Rendered::new(self.path.display().to_string()))
    }

    async fn print(&self, rendered: Rendered) -> Result<()> {
        let Some(command) = &self.command else {
            info!(path = rendered.location(), "print document ready");
            return Ok(());
        };
        let mut parts = command.split_whitespace();
        let Some(program) = parts.next() else {
            bail!("print command is empty");
        };
        let status = tokio::process::Command::new(program)
            .args(parts)
            .arg(rendered.location())
            .status()
            .await
            .with_context(|| format!("failed to launch print command `{command}`"))?;
        if !status.success() {
            bail!("print command `{command}` exited with {status}");
        }
        info!(path = rendered.location(), command = %command, "report sent to printer");
        Ok(())
    }
}

/// Render `result` as HTML, wait for the surface to finish loading it, then print.
#[instrument(skip_all)]
pub async fn print_report(
    result: &AnalysisResult,
    options: &HtmlOptions,
    surface: &dyn PrintSurface,
) -> Result<()> {
    let html = render_html(result, options)?;
    let rendered = surface.load(&html).await?;
    surface.print(rendered).await
}
