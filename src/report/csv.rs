use super::{Document, DocumentSink, ReportError, Table};

/// Comma-separated text, one line per row, header first. The title is not
/// part of the output.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvSink;

impl CsvSink {
    pub fn to_csv(table: &Table) -> String {
        std::iter::once(&table.header)
            .chain(table.rows.iter())
            .map(|row| row.iter().map(|cell| escape(cell)).collect::<Vec<_>>().join(","))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl DocumentSink for CsvSink {
    fn content_type(&self) -> &'static str {
        "text/csv"
    }

    fn extension(&self) -> &'static str {
        "csv"
    }

    fn render(&self, _title: &str, _details: &[String], table: &Table) -> Result<Document, ReportError> {
        Ok(Document {
            content_type: self.content_type(),
            bytes: CsvSink::to_csv(table).into_bytes(),
        })
    }
}

fn escape(cell: &str) -> String {
    if cell.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}
