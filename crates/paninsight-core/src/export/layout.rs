use tracing::{debug, instrument};

use super::sections::{Branding, ListTable, MedicalSection, ReportSections, Rgb, StatLine};
use crate::analysis::AnalysisResult;
use crate::format::{chars_per_line, wrap_text};

// A4 in millimetres; y grows downwards from the top edge.
pub const PAGE_WIDTH_MM: f32 = 210.0;
pub const PAGE_HEIGHT_MM: f32 = 297.0;
pub const MARGIN_X_MM: f32 = 10.0;
pub const CONTENT_WIDTH_MM: f32 = 180.0;
/// Lowest baseline content may occupy before a page break is forced.
pub const PAGE_BOTTOM_MM: f32 = 280.0;
/// Cursor position at the top of every continuation page.
pub const CONTINUATION_TOP_MM: f32 = 20.0;

const TITLE_PT: f32 = 18.0;
const INTRO_PT: f32 = 11.0;
const HEADING_PT: f32 = 13.0;
const SUBHEADING_PT: f32 = 11.0;
const BODY_PT: f32 = 10.0;
const DISCLAIMER_PT: f32 = 9.0;

const LINE_MM: f32 = 5.0;
const FIELD_MM: f32 = 6.0;
const HEADING_GAP_MM: f32 = 7.0;
const DISCLAIMER_LINE_MM: f32 = 4.0;

const TABLE_WIDTH_MM: f32 = 190.0;
const TABLE_INDEX_COL_MM: f32 = 14.0;
const TABLE_PAD_MM: f32 = 1.5;
const TABLE_LINE_MM: f32 = 4.5;
const TABLE_STRIPE: Rgb = Rgb(245, 245, 245);

const LOGO_SIZE_MM: f32 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontWeight {
    Regular,
    Bold,
}

/// A single drawing instruction. Coordinates are millimetres from the top-left corner.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    /// `y` is the text baseline.
    Text {
        x: f32,
        y: f32,
        size: f32,
        weight: FontWeight,
        color: Rgb,
        text: String,
    },
    Rule {
        x1: f32,
        x2: f32,
        y: f32,
        thickness: f32,
    },
    /// `y` is the top edge.
    Fill {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        color: Rgb,
    },
    /// Placement of the branding image; `y` is the top edge.
    Logo {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub ops: Vec<DrawOp>,
}

/// Paginated, encoder-independent form of the PDF report.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentLayout {
    pub pages: Vec<Page>,
}

impl DocumentLayout {
    /// Every text fragment with the index of the page it lands on.
    pub fn texts(&self) -> Vec<(usize, &str)> {
        self.pages
            .iter()
            .enumerate()
            .flat_map(|(idx, page)| {
                page.ops.iter().filter_map(move |op| match op {
                    DrawOp::Text { text, .. } => Some((idx, text.as_str())),
                    _ => None,
                })
            })
            .collect()
    }

    /// Page index of the first text fragment equal to `text`.
    pub fn page_of(&self, text: &str) -> Option<usize> {
        self.texts()
            .into_iter()
            .find(|(_, fragment)| *fragment == text)
            .map(|(idx, _)| idx)
    }
}

/// Lay the report out on A4 pages in fixed section order.
///
/// `with_logo` reserves the branding slot; the image itself is supplied to the encoder.
#[instrument(name = "layout_document", skip(result, branding))]
pub fn layout_document(
    result: &AnalysisResult,
    branding: &Branding,
    with_logo: bool,
) -> DocumentLayout {
    let sections = ReportSections::from_result(result);
    let mut layouter = Layouter::new();

    layouter.header(branding, with_logo);
    layouter.field_block("Overview", &sections.overview, 4.0);
    if !sections.statistics.is_empty() {
        layouter.field_block("Segmentation Statistics", &sections.statistics, 3.0);
    }
    for table in &sections.tables {
        layouter.table(table);
    }
    layouter.follow_up(sections.follow_up);
    if let Some(medical) = &sections.medical {
        layouter.medical(medical);
    }
    layouter.disclaimer(sections.disclaimer);

    let layout = layouter.finish();
    debug!(pages = layout.pages.len(), "document laid out");
    layout
}

struct Layouter {
    pages: Vec<Page>,
    cursor: f32,
}

impl Layouter {
    fn new() -> Self {
        Self {
            pages: vec![Page::default()],
            cursor: CONTINUATION_TOP_MM,
        }
    }

    fn finish(self) -> DocumentLayout {
        DocumentLayout { pages: self.pages }
    }

    fn push(&mut self, op: DrawOp) {
        if let Some(page) = self.pages.last_mut() {
            page.ops.push(op);
        }
    }

    fn new_page(&mut self) {
        self.pages.push(Page::default());
        self.cursor = CONTINUATION_TOP_MM;
    }

    /// Break before a block whose last baseline would fall below the page bottom.
    fn ensure_room(&mut self, height: f32) {
        if self.cursor > CONTINUATION_TOP_MM && self.cursor + height > PAGE_BOTTOM_MM {
            self.new_page();
        }
    }

    /// Keep `height` together when it fits on a page, otherwise only `minimum`.
    fn keep_together(&mut self, height: f32, minimum: f32) {
        let usable = PAGE_BOTTOM_MM - CONTINUATION_TOP_MM;
        self.ensure_room(if height <= usable { height } else { minimum });
    }

    fn text(&mut self, x: f32, y: f32, size: f32, weight: FontWeight, color: Rgb, text: &str) {
        self.push(DrawOp::Text {
            x,
            y,
            size,
            weight,
            color,
            text: text.to_string(),
        });
    }

    fn heading(&mut self, title: &str, size: f32) {
        let y = self.cursor;
        self.text(MARGIN_X_MM, y, size, FontWeight::Bold, Rgb::BLACK, title);
    }

    /// Lines at the cursor, spilling onto a new page line by line if needed.
    fn paragraph(&mut self, lines: &[String], size: f32, step: f32, color: Rgb) {
        for line in lines {
            if self.cursor > PAGE_BOTTOM_MM {
                self.new_page();
            }
            let y = self.cursor;
            self.text(MARGIN_X_MM, y, size, FontWeight::Regular, color, line);
            self.cursor += step;
        }
    }

    fn header(&mut self, branding: &Branding, with_logo: bool) {
        if with_logo {
            self.push(DrawOp::Logo {
                x: MARGIN_X_MM,
                y: 10.0,
                width: LOGO_SIZE_MM,
                height: LOGO_SIZE_MM,
            });
        }
        self.text(35.0, 20.0, TITLE_PT, FontWeight::Bold, Rgb::BLACK, &branding.title);

        self.cursor = 35.0;
        let width = chars_per_line(CONTENT_WIDTH_MM, INTRO_PT);
        let intro: Vec<String> = branding
            .intro
            .iter()
            .flat_map(|line| wrap_text(line, width))
            .collect();
        self.paragraph(&intro, INTRO_PT, LINE_MM, Rgb::BLACK);

        self.cursor += 2.0;
        self.text(
            MARGIN_X_MM,
            self.cursor,
            BODY_PT,
            FontWeight::Regular,
            Rgb::BLACK,
            &branding.credit,
        );
        self.cursor += 3.0;
        self.push(DrawOp::Rule {
            x1: MARGIN_X_MM,
            x2: PAGE_WIDTH_MM - MARGIN_X_MM,
            y: self.cursor,
            thickness: 0.5,
        });
        self.cursor += 8.0;
    }

    fn field_block(&mut self, title: &str, lines: &[StatLine], trailing_gap: f32) {
        self.ensure_room(HEADING_GAP_MM + FIELD_MM * lines.len() as f32);
        self.heading(title, HEADING_PT);
        self.cursor += HEADING_GAP_MM;
        for line in lines {
            let text = format!("{}: {}", line.label, line.value);
            let y = self.cursor;
            self.text(MARGIN_X_MM, y, BODY_PT, FontWeight::Regular, Rgb::BLACK, &text);
            self.cursor += FIELD_MM;
        }
        self.cursor += trailing_gap;
    }

    fn table(&mut self, table: &ListTable<'_>) {
        let text_width = TABLE_WIDTH_MM - TABLE_INDEX_COL_MM - 2.0 * TABLE_PAD_MM;
        let width = chars_per_line(text_width, BODY_PT);
        let rows: Vec<Vec<String>> = table.rows.iter().map(|row| wrap_text(row, width)).collect();
        let header_height = row_height(1);
        let first_row = rows.first().map(|lines| row_height(lines.len())).unwrap_or(0.0);

        self.keep_together(3.0 + header_height + first_row, 3.0 + header_height + row_height(1));
        self.heading(table.title, HEADING_PT);
        self.cursor += 3.0;
        self.table_header(table, header_height);

        for (idx, lines) in rows.iter().enumerate() {
            let mut remaining = lines.as_slice();
            let mut first_chunk = true;
            let mut fresh_page = false;
            while !remaining.is_empty() {
                let fits = ((PAGE_BOTTOM_MM - self.cursor - 2.0 * TABLE_PAD_MM) / TABLE_LINE_MM)
                    .floor()
                    .max(0.0) as usize;
                // Rows move whole to the next page; only rows taller than a page are split.
                if fits < remaining.len() && !fresh_page && (first_chunk || fits == 0) {
                    self.new_page();
                    self.table_header(table, header_height);
                    fresh_page = true;
                    continue;
                }
                let take = fits.min(remaining.len()).max(1);
                let (chunk, rest) = remaining.split_at(take);
                self.table_row(idx, chunk, first_chunk);
                remaining = rest;
                first_chunk = false;
                fresh_page = false;
            }
        }
        self.cursor += 6.0;
    }

    fn table_header(&mut self, table: &ListTable<'_>, height: f32) {
        let top = self.cursor;
        self.push(DrawOp::Fill {
            x: MARGIN_X_MM,
            y: top,
            width: TABLE_WIDTH_MM,
            height,
            color: table.header_fill,
        });
        let baseline = top + TABLE_PAD_MM + TABLE_LINE_MM - 1.0;
        self.text(
            MARGIN_X_MM + TABLE_PAD_MM,
            baseline,
            BODY_PT,
            FontWeight::Bold,
            Rgb::WHITE,
            "#",
        );
        self.text(
            MARGIN_X_MM + TABLE_INDEX_COL_MM + TABLE_PAD_MM,
            baseline,
            BODY_PT,
            FontWeight::Bold,
            Rgb::WHITE,
            table.column,
        );
        self.cursor += height;
    }

    fn table_row(&mut self, idx: usize, lines: &[String], with_index: bool) {
        let top = self.cursor;
        let height = row_height(lines.len());
        if idx % 2 == 1 {
            self.push(DrawOp::Fill {
                x: MARGIN_X_MM,
                y: top,
                width: TABLE_WIDTH_MM,
                height,
                color: TABLE_STRIPE,
            });
        }
        let baseline = top + TABLE_PAD_MM + TABLE_LINE_MM - 1.0;
        if with_index {
            self.text(
                MARGIN_X_MM + TABLE_PAD_MM,
                baseline,
                BODY_PT,
                FontWeight::Regular,
                Rgb::BLACK,
                &(idx + 1).to_string(),
            );
        }
        for (line_idx, line) in lines.iter().enumerate() {
            self.text(
                MARGIN_X_MM + TABLE_INDEX_COL_MM + TABLE_PAD_MM,
                baseline + TABLE_LINE_MM * line_idx as f32,
                BODY_PT,
                FontWeight::Regular,
                Rgb::BLACK,
                line,
            );
        }
        self.cursor += height;
    }

    fn follow_up(&mut self, text: &str) {
        let lines = wrap_text(text, chars_per_line(CONTENT_WIDTH_MM, BODY_PT));
        let height = HEADING_GAP_MM + LINE_MM * lines.len() as f32;
        self.keep_together(height, HEADING_GAP_MM + LINE_MM);
        self.heading("Follow-up Timeline", HEADING_PT);
        self.cursor += HEADING_GAP_MM;
        self.paragraph(&lines, BODY_PT, LINE_MM, Rgb::BLACK);
        self.cursor += 3.0;
    }

    fn medical(&mut self, medical: &MedicalSection<'_>) {
        let width = chars_per_line(CONTENT_WIDTH_MM, BODY_PT);
        let impression = medical.impression.map(|text| wrap_text(text, width));
        let notes: Vec<Vec<String>> = medical
            .quality_notes
            .iter()
            .map(|note| wrap_text(&format!("• {note}"), width))
            .collect();

        let impression_height = impression
            .as_ref()
            .map(|lines| FIELD_MM + LINE_MM * lines.len() as f32);
        let morphology_height = medical.morphology.as_ref().map(|_| FIELD_MM * 3.0);
        let notes_height = notes
            .first()
            .map(|lines| FIELD_MM + LINE_MM * lines.len() as f32);
        let first_block = impression_height
            .or(morphology_height)
            .or(notes_height)
            .unwrap_or(0.0);
        self.keep_together(HEADING_GAP_MM + first_block, HEADING_GAP_MM + FIELD_MM + LINE_MM);
        self.heading("Detailed Medical Report", HEADING_PT);
        self.cursor += HEADING_GAP_MM;

        if let (Some(lines), Some(height)) = (impression, impression_height) {
            self.keep_together(height, FIELD_MM + LINE_MM);
            self.heading("Impression:", SUBHEADING_PT);
            self.cursor += FIELD_MM;
            self.paragraph(&lines, BODY_PT, LINE_MM, Rgb::BLACK);
            self.cursor += 5.0;
        }

        if let Some(morphology) = &medical.morphology {
            self.ensure_room(FIELD_MM * 3.0);
            self.heading("Quantitative Measurements:", SUBHEADING_PT);
            self.cursor += FIELD_MM;
            for text in [
                format!("Connected Components: {}", morphology.connected_components),
                format!("Fragmentation Level: {}", morphology.fragmentation),
            ] {
                let y = self.cursor;
                self.text(MARGIN_X_MM, y, BODY_PT, FontWeight::Regular, Rgb::BLACK, &text);
                self.cursor += FIELD_MM;
            }
            self.cursor += 3.0;
        }

        if let Some(height) = notes_height {
            self.keep_together(height, FIELD_MM + LINE_MM);
            self.heading("Quality Assessment:", SUBHEADING_PT);
            self.cursor += FIELD_MM;
            for lines in &notes {
                self.paragraph(lines, BODY_PT, LINE_MM, Rgb::BLACK);
            }
            self.cursor += 3.0;
        }
    }

    fn disclaimer(&mut self, text: &str) {
        let lines = wrap_text(text, chars_per_line(CONTENT_WIDTH_MM, DISCLAIMER_PT));
        self.keep_together(DISCLAIMER_LINE_MM * lines.len() as f32, DISCLAIMER_LINE_MM);
        self.paragraph(&lines, DISCLAIMER_PT, DISCLAIMER_LINE_MM, Rgb::MUTED);
    }
}

fn row_height(lines: usize) -> f32 {
    2.0 * TABLE_PAD_MM + TABLE_LINE_MM * lines.max(1) as f32
}
