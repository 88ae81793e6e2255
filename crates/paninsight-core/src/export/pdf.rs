use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use printpdf::path::PaintMode;
use printpdf::{
    BuiltinFont, Color, ImageTransform, IndirectFontRef, Line, Mm, PdfDocument, PdfLayerReference,
    Point, Rect,
};
use tracing::{info, instrument, warn};

use super::layout::{layout_document, DocumentLayout, DrawOp, FontWeight, PAGE_HEIGHT_MM, PAGE_WIDTH_MM};
use super::logo::{fetch_logo, Logo, LogoSource};
use super::sections::{Branding, Rgb};
use crate::analysis::AnalysisResult;

/// Fixed name of the downloaded report.
pub const PDF_FILE_NAME: &str = "LiverProfile-Report.pdf";

/// Image resolution assumed when sizing the logo.
const LOGO_DPI: f32 = 300.0;

/// Builds the paginated PDF report and saves it to the downloads directory.
pub struct PdfExporter {
    branding: Branding,
    downloads_dir: PathBuf,
}

impl PdfExporter {
    pub fn new(downloads_dir: impl Into<PathBuf>) -> Self {
        Self {
            branding: Branding::default(),
            downloads_dir: downloads_dir.into(),
        }
    }

    pub fn with_branding(mut self, branding: Branding) -> Self {
        self.branding = branding;
        self
    }

    pub fn output_path(&self) -> PathBuf {
        self.downloads_dir.join(PDF_FILE_NAME)
    }

    /// Export `result` to `<downloads>/LiverProfile-Report.pdf`.
    ///
    /// Without a result nothing is written and `Ok(None)` is returned.
    #[instrument(name = "export_pdf", skip_all)]
    pub async fn export(
        &self,
        result: Option<&AnalysisResult>,
        logo_source: Option<&dyn LogoSource>,
    ) -> Result<Option<PathBuf>> {
        let Some(result) = result else {
            warn!("no analysis result to export");
            return Ok(None);
        };
        let logo = fetch_logo(logo_source).await;
        let layout = layout_document(result, &self.branding, logo.is_some());
        let bytes = encode_pdf(&layout, &self.branding.title, logo.as_ref())?;

        let path = self.output_path();
        write_atomically(&path, &bytes).await?;
        info!(path = %path.display(), pages = layout.pages.len(), "report saved");
        Ok(Some(path))
    }
}

/// Write to a sibling temp file and rename, so a failed export never leaves a partial file.
async fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let partial = path.with_extension("pdf.partial");
    tokio::fs::write(&partial, bytes)
        .await
        .with_context(|| format!("failed to write {}", partial.display()))?;
    tokio::fs::rename(&partial, path)
        .await
        .with_context(|| format!("failed to move report into {}", path.display()))?;
    Ok(())
}

/// Encode a laid-out document as PDF bytes.
pub fn encode_pdf(layout: &DocumentLayout, title: &str, logo: Option<&Logo>) -> Result<Vec<u8>> {
    let (doc, first_page, first_layer) =
        PdfDocument::new(title, mm(PAGE_WIDTH_MM), mm(PAGE_HEIGHT_MM), "Layer 1");
    let regular = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| anyhow!("PDF font error: {e}"))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| anyhow!("PDF font error: {e}"))?;

    for (idx, page) in layout.pages.iter().enumerate() {
        let (page_idx, layer_idx) = if idx == 0 {
            (first_page, first_layer)
        } else {
            doc.add_page(mm(PAGE_WIDTH_MM), mm(PAGE_HEIGHT_MM), "Layer 1")
        };
        let layer = doc.get_page(page_idx).get_layer(layer_idx);
        for op in &page.ops {
            draw(&layer, op, &regular, &bold, logo);
        }
    }

    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf)
        .map_err(|e| anyhow!("PDF save error: {e}"))?;
    buf.into_inner()
        .map_err(|e| anyhow!("PDF buffer error: {e}"))
}

fn draw(
    layer: &PdfLayerReference,
    op: &DrawOp,
    regular: &IndirectFontRef,
    bold: &IndirectFontRef,
    logo: Option<&Logo>,
) {
    match op {
        DrawOp::Text {
            x,
            y,
            size,
            weight,
            color,
            text,
        } => {
            let font = match weight {
                FontWeight::Regular => regular,
                FontWeight::Bold => bold,
            };
            layer.set_fill_color(rgb(*color));
            layer.use_text(text.as_str(), (*size).into(), mm(*x), flip(*y), font);
        }
        DrawOp::Rule { x1, x2, y, thickness } => {
            layer.set_outline_color(rgb(Rgb::BLACK));
            layer.set_outline_thickness((*thickness).into());
            layer.add_line(Line {
                points: vec![
                    (Point::new(mm(*x1), flip(*y)), false),
                    (Point::new(mm(*x2), flip(*y)), false),
                ],
                is_closed: false,
            });
        }
        DrawOp::Fill {
            x,
            y,
            width,
            height,
            color,
        } => {
            layer.set_fill_color(rgb(*color));
            layer.add_rect(
                Rect::new(mm(*x), flip(*y + *height), mm(*x + *width), flip(*y))
                    .with_mode(PaintMode::Fill),
            );
        }
        DrawOp::Logo {
            x,
            y,
            width,
            height,
        } => {
            if let Some(logo) = logo {
                place_logo(layer, logo, *x, *y, *width, *height);
            }
        }
    }
}

/// Decode and place the logo; an undecodable image is skipped.
fn place_logo(layer: &PdfLayerReference, logo: &Logo, x: f32, y: f32, width: f32, height: f32) {
    let decoded = match printpdf::image_crate::load_from_memory(&logo.bytes) {
        Ok(decoded) => decoded,
        Err(err) => {
            warn!(error = %err, "logo could not be decoded, continuing without it");
            return;
        }
    };
    let natural_width = decoded.width() as f32 / LOGO_DPI * 25.4;
    let natural_height = decoded.height() as f32 / LOGO_DPI * 25.4;
    if natural_width <= 0.0 || natural_height <= 0.0 {
        return;
    }
    let image = printpdf::Image::from_dynamic_image(&decoded);
    image.add_to_layer(
        layer.clone(),
        ImageTransform {
            translate_x: Some(mm(x)),
            translate_y: Some(flip(y + height)),
            scale_x: Some((width / natural_width).into()),
            scale_y: Some((height / natural_height).into()),
            dpi: Some(LOGO_DPI.into()),
            ..Default::default()
        },
    );
}

fn mm(value: f32) -> Mm {
    Mm(value.into())
}

/// Layout measures from the top edge, PDF from the bottom.
fn flip(y: f32) -> Mm {
    mm(PAGE_HEIGHT_MM - y)
}

fn rgb(color: Rgb) -> Color {
    Color::Rgb(printpdf::Rgb::new(
        (f32::from(color.0) / 255.0).into(),
        (f32::from(color.1) / 255.0).into(),
        (f32::from(color.2) / 255.0).into(),
        None,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::fixtures::{full_result, minimal_result};
    use crate::export::logo::Logo;
    use async_trait::async_trait;

    struct UnreachableLogo;

    #[async_trait]
    impl LogoSource for UnreachableLogo {
        async fn fetch(&self) -> Result<Logo> {
            anyhow::bail!("network unreachable")
        }

        fn describe(&self) -> String {
            "unreachable".into()
        }
    }

    #[test]
    fn encodes_multi_page_document() {
        let mut result = full_result();
        result.findings = (1..=80).map(|n| format!("Finding {n}")).collect();
        let layout = layout_document(&result, &Branding::default(), false);
        assert!(layout.pages.len() > 1);
        let bytes = encode_pdf(&layout, "test", None).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn undecodable_logo_is_skipped() {
        let layout = layout_document(&minimal_result(), &Branding::default(), true);
        let logo = Logo {
            bytes: b"not an image".to_vec(),
        };
        let bytes = encode_pdf(&layout, "test", Some(&logo)).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn export_without_result_writes_nothing() {
        let temp = tempfile::tempdir().unwrap();
        let exporter = PdfExporter::new(temp.path());
        let saved = exporter.export(None, None).await.unwrap();
        assert!(saved.is_none());
        assert!(!exporter.output_path().exists());
    }

    #[tokio::test]
    async fn export_survives_logo_failure_and_uses_fixed_name() {
        let temp = tempfile::tempdir().unwrap();
        let exporter = PdfExporter::new(temp.path());
        let result = full_result();
        let saved = exporter
            .export(Some(&result), Some(&UnreachableLogo))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(saved.file_name().unwrap(), PDF_FILE_NAME);
        let bytes = std::fs::read(saved).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        assert!(!temp.path().join("LiverProfile-Report.pdf.partial").exists());
    }
}
