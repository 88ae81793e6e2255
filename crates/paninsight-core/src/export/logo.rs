use std::{path::PathBuf, time::Duration};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

/// Raw branding image bytes (PNG or any format the encoder can decode).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Logo {
    pub bytes: Vec<u8>,
}

/// Somewhere a branding image can be loaded from.
#[async_trait]
pub trait LogoSource: Send + Sync {
    async fn fetch(&self) -> Result<Logo>;

    /// Human readable origin used in log lines.
    fn describe(&self) -> String;
}

pub struct HttpLogoSource {
    http: Client,
    url: String,
}

impl HttpLogoSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("paninsight/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("failed to build logo HTTP client")?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }
}

#[async_trait]
impl LogoSource for HttpLogoSource {
    async fn fetch(&self) -> Result<Logo> {
        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("failed to fetch logo from {}", self.url))?;
        if !response.status().is_success() {
            bail!("logo request failed with status {}", response.status());
        }
        let bytes = response
            .bytes()
            .await
            .context("failed to read logo body")?;
        Ok(Logo {
            bytes: bytes.to_vec(),
        })
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

pub struct FileLogoSource {
    path: PathBuf,
}

impl FileLogoSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl LogoSource for FileLogoSource {
    async fn fetch(&self) -> Result<Logo> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("failed to read logo at {}", self.path.display()))?;
        Ok(Logo { bytes })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Pick an HTTP or file source from a configured location.
pub fn source_for(location: &str, timeout: Duration) -> Result<Box<dyn LogoSource>> {
    if location.starts_with("http://") || location.starts_with("https://") {
        Ok(Box::new(HttpLogoSource::new(location, timeout)?))
    } else {
        Ok(Box::new(FileLogoSource::new(location)))
    }
}

/// Load the branding image without ever failing the export.
pub async fn fetch_logo(source: Option<&dyn LogoSource>) -> Option<Logo> {
    let source = source?;
    match source.fetch().await {
        Ok(logo) if logo.bytes.is_empty() => {
            warn!(source = %source.describe(), "logo is empty, continuing without it");
            None
        }
        Ok(logo) => {
            debug!(source = %source.describe(), bytes = logo.bytes.len(), "logo loaded");
            Some(logo)
        }
        Err(err) => {
            warn!(source = %source.describe(), error = %err, "logo unavailable, continuing without it");
            None
        }
    }
}
