//! PDF rendering via `printpdf`. A4 portrait, builtin Helvetica, one text
//! line per table row with continuation pages.

use std::io::BufWriter;

use printpdf::*;

use super::{Document, DocumentSink, ReportError, Table};

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 15.0;
const ROW_HEIGHT: f32 = 6.0;
const BODY_SIZE: f32 = 8.0;
// Rough Helvetica advance at BODY_SIZE, in mm per character.
const CHAR_WIDTH: f32 = 1.55;
const MAX_COLUMN_CHARS: usize = 28;

const COLOR_HEADER: (u8, u8, u8) = (0, 119, 182);
const COLOR_BLACK: (u8, u8, u8) = (0, 0, 0);
const COLOR_GRID: (u8, u8, u8) = (160, 160, 160);

#[derive(Debug, Clone, Copy, Default)]
pub struct PdfSink;

impl DocumentSink for PdfSink {
    fn content_type(&self) -> &'static str {
        "application/pdf"
    }

    fn extension(&self) -> &'static str {
        "pdf"
    }

    fn render(&self, title: &str, details: &[String], table: &Table) -> Result<Document, ReportError> {
        let bytes = render_pdf(title, details, table)?;
        Ok(Document { content_type: self.content_type(), bytes })
    }
}

fn rgb(color: (u8, u8, u8)) -> Color {
    Color::Rgb(Rgb::new(
        color.0 as f32 / 255.0,
        color.1 as f32 / 255.0,
        color.2 as f32 / 255.0,
        None,
    ))
}

fn add_text(
    layer: &PdfLayerReference,
    font: &IndirectFontRef,
    text: &str,
    x: f32,
    y: f32,
    size: f32,
    color: (u8, u8, u8),
) {
    layer.set_fill_color(rgb(color));
    layer.use_text(text, size, Mm(x), Mm(y), font);
}

fn add_rule(layer: &PdfLayerReference, y: f32) {
    layer.set_outline_color(rgb(COLOR_GRID));
    layer.set_outline_thickness(0.5);
    layer.add_line(Line {
        points: vec![
            (Point::new(Mm(MARGIN), Mm(y)), false),
            (Point::new(Mm(PAGE_WIDTH - MARGIN), Mm(y)), false),
        ],
        is_closed: false,
    });
}

/// Column widths in mm, proportional to the widest cell of each column.
fn column_widths(table: &Table) -> Vec<f32> {
    let weights: Vec<usize> = (0..table.header.len())
        .map(|col| {
            table
                .rows
                .iter()
                .map(|row| row[col].chars().count())
                .chain(std::iter::once(table.header[col].chars().count()))
                .max()
                .unwrap_or(1)
                .clamp(3, MAX_COLUMN_CHARS)
        })
        .collect();
    let total: usize = weights.iter().sum::<usize>().max(1);
    let usable = PAGE_WIDTH - 2.0 * MARGIN;
    weights
        .iter()
        .map(|&w| usable * w as f32 / total as f32)
        .collect()
}

fn fit(cell: &str, width: f32) -> String {
    let max_chars = ((width / CHAR_WIDTH) as usize).max(2);
    if cell.chars().count() <= max_chars {
        cell.to_string()
    } else {
        let mut cut: String = cell.chars().take(max_chars - 2).collect();
        cut.push_str("..");
        cut
    }
}

fn draw_row(
    layer: &PdfLayerReference,
    font: &IndirectFontRef,
    cells: &[String],
    widths: &[f32],
    y: f32,
    color: (u8, u8, u8),
) {
    let mut x = MARGIN;
    for (cell, width) in cells.iter().zip(widths) {
        add_text(layer, font, &fit(cell, *width), x + 1.0, y, BODY_SIZE, color);
        x += width;
    }
}

fn render_pdf(title: &str, details: &[String], table: &Table) -> Result<Vec<u8>, ReportError> {
    let (doc, page1, layer1) = PdfDocument::new(title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| ReportError::Pdf(format!("font error: {e}")))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| ReportError::Pdf(format!("font error: {e}")))?;

    let widths = column_widths(table);
    let mut layer = doc.get_page(page1).get_layer(layer1);
    let mut y = PAGE_HEIGHT - 20.0;

    add_text(&layer, &bold, title, MARGIN, y, 16.0, COLOR_HEADER);
    y -= 12.0;

    for line in details {
        add_text(&layer, &font, line, MARGIN, y, 10.0, COLOR_BLACK);
        y -= 5.0;
    }
    if !details.is_empty() {
        y -= 4.0;
    }

    draw_row(&layer, &bold, &table.header, &widths, y, COLOR_HEADER);
    add_rule(&layer, y - 2.0);
    y -= ROW_HEIGHT;

    for row in &table.rows {
        if y < MARGIN {
            let (page, page_layer) = doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
            layer = doc.get_page(page).get_layer(page_layer);
            y = PAGE_HEIGHT - 20.0;
            draw_row(&layer, &bold, &table.header, &widths, y, COLOR_HEADER);
            add_rule(&layer, y - 2.0);
            y -= ROW_HEIGHT;
        }
        draw_row(&layer, &font, row, &widths, y, COLOR_BLACK);
        add_rule(&layer, y - 2.0);
        y -= ROW_HEIGHT;
    }

    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf)
        .map_err(|e| ReportError::Pdf(format!("save error: {e}")))?;
    buf.into_inner()
        .map_err(|e| ReportError::Pdf(format!("buffer error: {e}")))
}
