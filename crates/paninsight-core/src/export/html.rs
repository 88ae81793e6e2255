use std::fmt::Write;

use super::sections::{Branding, ListTable, MedicalSection, ReportSections, StatLine};
use crate::analysis::AnalysisResult;

const PRINT_CSS: &str = "\
body { font-family: Arial, sans-serif; margin: 40px; color: #222; }
.logo { width: 60px; height: 60px; margin-bottom: 10px; }
.header { display: flex; align-items: center; gap: 16px; }
.title { font-size: 2rem; font-weight: bold; margin-bottom: 0; }
.intro { font-size: 1rem; margin-bottom: 10px; }
.credit { font-size: 0.95rem; color: #666; }
.section { margin-top: 24px; }
.section-title { font-size: 1.2rem; font-weight: bold; margin-bottom: 8px; }
.block { margin-top: 16px; }
table { border-collapse: collapse; width: 100%; margin-bottom: 16px; }
th, td { border: 1px solid #bbb; padding: 8px; text-align: left; }
th { background: #e3e8f0; }
.footer { margin-top: 32px; font-size: 0.95rem; color: #555; }
@media print { .section { page-break-inside: avoid; } }";

/// Options for the printable page.
#[derive(Debug, Clone, Default)]
pub struct HtmlOptions {
    pub branding: Branding,
    /// `src` of the header logo; omitted when `None`.
    pub logo_src: Option<String>,
}

/// Build a standalone, print-ready HTML document for `result`.
///
/// All upstream text is escaped before interpolation.
pub fn render_html(result: &AnalysisResult, options: &HtmlOptions) -> anyhow::Result<String> {
    let sections = ReportSections::from_result(result);
    let branding = &options.branding;
    let mut out = String::new();

    writeln!(out, "<!DOCTYPE html>")?;
    writeln!(out, "<html>")?;
    writeln!(out, "<head>")?;
    writeln!(out, "<meta charset=\"utf-8\" />")?;
    writeln!(out, "<title>{}</title>", html_escape(&branding.title))?;
    writeln!(out, "<style>\n{PRINT_CSS}\n</style>")?;
    writeln!(out, "</head>")?;
    writeln!(out, "<body>")?;

    writeln!(out, "<div class=\"header\">")?;
    if let Some(src) = &options.logo_src {
        writeln!(
            out,
            "<img src=\"{}\" class=\"logo\" alt=\"LiverProfile AI Logo\" />",
            html_escape(src)
        )?;
    }
    writeln!(out, "<div>")?;
    writeln!(out, "<div class=\"title\">{}</div>", html_escape(&branding.title))?;
    let intro: Vec<String> = branding.intro.iter().map(|line| html_escape(line)).collect();
    writeln!(out, "<div class=\"intro\">{}</div>", intro.join("<br/>"))?;
    writeln!(out, "<div class=\"credit\">{}</div>", html_escape(&branding.credit))?;
    writeln!(out, "</div>")?;
    writeln!(out, "</div>")?;
    writeln!(out, "<hr/>")?;

    write_fields(&mut out, "Overview", &sections.overview)?;
    if !sections.statistics.is_empty() {
        write_fields(&mut out, "Segmentation Statistics", &sections.statistics)?;
    }
    for table in &sections.tables {
        write_table(&mut out, table)?;
    }

    writeln!(out, "<div class=\"section\">")?;
    writeln!(out, "<div class=\"section-title\">Follow-up Timeline</div>")?;
    writeln!(out, "<div>{}</div>", escape_lines(sections.follow_up))?;
    writeln!(out, "</div>")?;

    if let Some(medical) = &sections.medical {
        write_medical(&mut out, medical)?;
    }

    writeln!(out, "<div class=\"footer\">")?;
    writeln!(
        out,
        "{}<br/>\n{} | {}",
        html_escape(sections.disclaimer),
        html_escape(&branding.footer),
        html_escape(&branding.credit)
    )?;
    writeln!(out, "</div>")?;
    writeln!(out, "</body>")?;
    writeln!(out, "</html>")?;
    Ok(out)
}

fn write_fields(out: &mut String, title: &str, lines: &[StatLine]) -> std::fmt::Result {
    writeln!(out, "<div class=\"section\">")?;
    writeln!(out, "<div class=\"section-title\">{title}</div>")?;
    for line in lines {
        writeln!(
            out,
            "<div>{}: <b>{}</b></div>",
            line.label,
            html_escape(&line.value)
        )?;
    }
    writeln!(out, "</div>")
}

fn write_table(out: &mut String, table: &ListTable<'_>) -> std::fmt::Result {
    writeln!(out, "<div class=\"section\">")?;
    writeln!(out, "<div class=\"section-title\">{}</div>", table.title)?;
    writeln!(
        out,
        "<table><thead><tr><th style=\"background: {}; color: #fff;\">#</th><th style=\"background: {}; color: #fff;\">{}</th></tr></thead><tbody>",
        table.header_fill.css(),
        table.header_fill.css(),
        table.column
    )?;
    for (idx, row) in table.rows.iter().enumerate() {
        writeln!(out, "<tr><td>{}</td><td>{}</td></tr>", idx + 1, html_escape(row))?;
    }
    writeln!(out, "</tbody></table>")?;
    writeln!(out, "</div>")
}

fn write_medical(out: &mut String, medical: &MedicalSection<'_>) -> std::fmt::Result {
    writeln!(out, "<div class=\"section\">")?;
    writeln!(out, "<div class=\"section-title\">Detailed Medical Report</div>")?;
    if let Some(impression) = medical.impression {
        writeln!(
            out,
            "<div><strong>Impression:</strong><br/>{}</div>",
            html_escape(impression)
        )?;
    }
    if let Some(morphology) = &medical.morphology {
        writeln!(out, "<div class=\"block\">")?;
        writeln!(out, "<strong>Quantitative Measurements:</strong><br/>")?;
        writeln!(
            out,
            "Connected Components: {}<br/>",
            html_escape(&morphology.connected_components)
        )?;
        writeln!(
            out,
            "Fragmentation Level: {}",
            html_escape(&morphology.fragmentation)
        )?;
        writeln!(out, "</div>")?;
    }
    if !medical.quality_notes.is_empty() {
        let notes: Vec<String> = medical
            .quality_notes
            .iter()
            .map(|note| format!("• {}", html_escape(note)))
            .collect();
        writeln!(out, "<div class=\"block\">")?;
        writeln!(out, "<strong>Quality Assessment:</strong><br/>")?;
        writeln!(out, "{}", notes.join("<br/>"))?;
        writeln!(out, "</div>")?;
    }
    writeln!(out, "</div>")
}

/// Escape `s` and keep its explicit line breaks, as the PDF wrapper does.
fn escape_lines(s: &str) -> String {
    s.split('\n').map(html_escape).collect::<Vec<_>>().join("<br/>")
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
