//! Delimited (CSV) output of page rows.

use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{ExtractionError, PdfRegionError, Result};
use crate::extract::OutputRow;

/// Shape of the delimited output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputLayout {
    /// Header `key,value`; one `[label, value]` line per row.
    KeyValue,
    /// Header is the labels; one line of values per row.
    Columns,
}

impl OutputLayout {
    /// `KeyValue` for a single region, `Columns` otherwise.
    pub fn for_columns(count: usize) -> Self {
        if count == 1 {
            Self::KeyValue
        } else {
            Self::Columns
        }
    }
}

/// Header line for `layout`.
pub fn header_for(layout: OutputLayout, columns: &[String]) -> Vec<String> {
    match layout {
        OutputLayout::KeyValue => vec!["key".to_string(), "value".to_string()],
        OutputLayout::Columns => columns.to_vec(),
    }
}

/// Writes one header line, then one line per row, in input order.
///
/// Fields containing the delimiter, a quote or a line break are quoted,
/// with embedded quotes doubled. Output is UTF-8.
pub struct TabularWriter<W: Write> {
    writer: csv::Writer<W>,
    layout: OutputLayout,
    columns: Vec<String>,
    header_written: bool,
}

impl<W: Write> TabularWriter<W> {
    /// Create a writer for `columns`, choosing the layout from their count.
    pub fn new(inner: W, columns: Vec<String>) -> Self {
        let layout = OutputLayout::for_columns(columns.len());
        Self::with_layout(inner, columns, layout)
    }

    pub fn with_layout(inner: W, columns: Vec<String>, layout: OutputLayout) -> Self {
        Self {
            writer: csv::WriterBuilder::new()
                .quote_style(csv::QuoteStyle::Necessary)
                .from_writer(inner),
            layout,
            columns,
            header_written: false,
        }
    }

    pub fn layout(&self) -> OutputLayout {
        self.layout
    }

    /// Write the header line; later calls do nothing.
    pub fn write_header(&mut self) -> Result<()> {
        if !self.header_written {
            self.writer.write_record(header_for(self.layout, &self.columns))?;
            self.header_written = true;
        }
        Ok(())
    }

    /// Write one row, preceded by the header if it is still pending.
    pub fn write_row(&mut self, row: &OutputRow) -> Result<()> {
        let labels_match = row.cells.len() == self.columns.len()
            && row.cells.iter().zip(&self.columns).all(|((l, _), c)| l == c);
        if !labels_match {
            return Err(PdfRegionError::Config(format!(
                "row for page {} does not match columns {:?}",
                row.page_index, self.columns
            )));
        }

        self.write_header()?;
        match self.layout {
            OutputLayout::KeyValue => {
                for (label, value) in &row.cells {
                    self.writer.write_record([label, value])?;
                }
            }
            OutputLayout::Columns => self.writer.write_record(row.values())?,
        }
        Ok(())
    }

    /// Write the header and every row; returns the number of rows written.
    pub fn write<'a, I>(&mut self, rows: I) -> Result<usize>
    where
        I: IntoIterator<Item = &'a OutputRow>,
    {
        self.write_header()?;
        let mut count = 0;
        for row in rows {
            self.write_row(row)?;
            count += 1;
        }
        Ok(count)
    }

    /// Flush and return the underlying writer.
    pub fn into_inner(mut self) -> Result<W> {
        self.write_header()?;
        self.writer
            .into_inner()
            .map_err(|e| PdfRegionError::Io(e.into_error()))
    }
}

/// Serialize `rows` under `columns` to bytes.
pub fn to_bytes(rows: &[OutputRow], columns: &[String]) -> Result<Vec<u8>> {
    let mut writer = TabularWriter::new(Vec::new(), columns.to_vec());
    writer.write(rows)?;
    writer.into_inner()
}

/// Write into a temporary file next to `path`, then move it into place.
///
/// When `fill` fails the temporary file is removed and `path` is untouched.
pub fn persist_atomic<F>(path: &Path, fill: F) -> Result<()>
where
    F: FnOnce(&mut NamedTempFile) -> Result<()>,
{
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut file = NamedTempFile::new_in(dir)?;
    fill(&mut file)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| PdfRegionError::Io(e.error))?;
    debug!("Wrote {}", path.display());
    Ok(())
}

/// Write rows from a record stream to `path` as CSV.
///
/// The file appears only when every row was produced and written; the first
/// error aborts the write and is returned. Returns the number of rows.
pub fn write_atomic<I>(path: &Path, columns: &[String], rows: I) -> Result<usize>
where
    I: IntoIterator<Item = std::result::Result<OutputRow, ExtractionError>>,
{
    let mut count = 0;
    persist_atomic(path, |file| {
        let mut writer = TabularWriter::new(file, columns.to_vec());
        writer.write_header()?;
        for row in rows {
            writer.write_row(&row?)?;
            count += 1;
        }
        writer.into_inner()?;
        Ok(())
    })?;
    Ok(count)
}

/// Write rows to `path` as pretty JSON, atomically.
pub fn write_json_atomic(path: &Path, rows: &[OutputRow]) -> Result<()> {
    persist_atomic(path, |file| {
        serde_json::to_writer_pretty(&mut *file, rows)
            .map_err(|e| PdfRegionError::Io(e.into()))?;
        file.write_all(b"\n")?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn row(page: usize, cells: &[(&str, &str)]) -> OutputRow {
        OutputRow {
            page_index: page,
            cells: cells
                .iter()
                .map(|(l, v)| (l.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn labels(l: &[&str]) -> Vec<String> {
        l.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_single_region_uses_key_value_layout() {
        let rows = vec![row(0, &[("소재지", "Seoul")]), row(1, &[("소재지", "")])];
        let bytes = to_bytes(&rows, &labels(&["소재지"])).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "key,value\n소재지,Seoul\n소재지,\n"
        );
    }

    #[test]
    fn test_columns_layout() {
        let rows = vec![row(0, &[("a", "1"), ("b", "2")]), row(1, &[("a", ""), ("b", "")])];
        let bytes = to_bytes(&rows, &labels(&["a", "b"])).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "a,b\n1,2\n,\n");
    }

    #[test]
    fn test_quoting() {
        let rows = vec![row(0, &[("a", "x,y"), ("b", "say \"hi\"\nthere")])];
        let bytes = to_bytes(&rows, &labels(&["a", "b"])).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "a,b\n\"x,y\",\"say \"\"hi\"\"\nthere\"\n"
        );
    }

    #[test]
    fn test_reader_recovers_values() {
        let rows = vec![
            row(0, &[("주소, 전체", "서울 \"중구\""), ("b", "line1\r\nline2")]),
            row(1, &[("주소, 전체", ""), ("b", ",")]),
        ];
        let columns = labels(&["주소, 전체", "b"]);
        let bytes = to_bytes(&rows, &columns).unwrap();

        let mut reader = csv::Reader::from_reader(bytes.as_slice());
        let header: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(header, columns);

        let parsed: Vec<Vec<String>> = reader
            .records()
            .map(|r| r.unwrap().iter().map(String::from).collect())
            .collect();
        let expected: Vec<Vec<String>> = rows
            .iter()
            .map(|r| r.values().map(String::from).collect())
            .collect();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_header_written_once_even_without_rows() {
        let mut writer = TabularWriter::new(Vec::new(), labels(&["a", "b"]));
        writer.write_header().unwrap();
        writer.write_header().unwrap();
        assert_eq!(writer.into_inner().unwrap(), b"a,b\n");
    }

    #[test]
    fn test_mismatched_row_rejected() {
        let mut writer = TabularWriter::new(Vec::new(), labels(&["a", "b"]));
        assert!(writer.write_row(&row(0, &[("b", "1"), ("a", "2")])).is_err());
    }

    #[test]
    fn test_atomic_write_success() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let rows = vec![Ok(row(0, &[("a", "1")])), Ok(row(1, &[("a", "2")]))];

        let count = write_atomic(&path, &labels(&["a"]), rows).unwrap();
        assert_eq!(count, 2);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "key,value\na,1\na,2\n");
    }

    #[test]
    fn test_atomic_write_leaves_nothing_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let rows = vec![
            Ok(row(0, &[("a", "1")])),
            Err(ExtractionError::invalid_region("a", "outside page bounds")),
        ];

        assert!(write_atomic(&path, &labels(&["a"]), rows).is_err());
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_json_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        write_json_atomic(&path, &[row(0, &[("a", "1")])]).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value[0]["cells"]["a"], "1");
    }
}
