//! A small header-plus-rows table for CSV/TSV result files.
//!
//! Search result files and plate maps are plain delimited text; this
//! container keeps them addressable by column without pulling in a
//! dataframe dependency.

use std::collections::HashMap;
use std::path::Path;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>) -> Self {
        Table {
            headers,
            rows: Vec::new(),
        }
    }

    /// Parses delimited text. Rows with a column count differing from
    /// the header are skipped, matching lenient CSV ingestion elsewhere
    /// in the pipeline.
    pub fn from_delimited(text: &str, delimiter: u8) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .from_reader(text.as_bytes());
        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.to_string())
            .collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            if record.len() != headers.len() {
                continue;
            }
            rows.push(record.iter().map(|f| f.to_string()).collect());
        }
        Ok(Table { headers, rows })
    }

    pub fn from_csv(text: &str) -> Result<Self> {
        Self::from_delimited(text, b',')
    }

    pub fn from_tsv(text: &str) -> Result<Self> {
        Self::from_delimited(text, b'\t')
    }

    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_csv(&text)
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push_row(&mut self, row: Vec<String>) -> Result<()> {
        if row.len() != self.headers.len() {
            return Err(Error::InvalidInput(format!(
                "row has {} fields, table has {} columns",
                row.len(),
                self.headers.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// All values of one column, in row order.
    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let index = self.headers.iter().position(|h| h == name)?;
        Some(self.rows.iter().map(|row| row[index].as_str()).collect())
    }

    /// One row as a header-to-value map.
    pub fn record(&self, index: usize) -> Option<HashMap<&str, &str>> {
        let row = self.rows.get(index)?;
        Some(
            self.headers
                .iter()
                .map(String::as_str)
                .zip(row.iter().map(String::as_str))
                .collect(),
        )
    }

    pub fn get(&self, index: usize, column: &str) -> Option<&str> {
        let col = self.headers.iter().position(|h| h == column)?;
        self.rows.get(index).map(|row| row[col].as_str())
    }

    pub fn to_delimited(&self, delimiter: u8) -> Result<String> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_writer(Vec::new());
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| Error::InvalidInput(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| Error::InvalidInput(e.to_string()))
    }

    pub fn to_csv(&self) -> Result<String> {
        self.to_delimited(b',')
    }

    pub fn to_tsv(&self) -> Result<String> {
        self.to_delimited(b'\t')
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_csv()?)?;
        Ok(())
    }
}

/// Downloads a signed result-file URL and parses it as a TSV table.
pub async fn fetch_table(client: &reqwest::Client, url: &str) -> Result<Table> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(Error::server(status, response.text().await.unwrap_or_default()));
    }
    let text = response.text().await?;
    Table::from_tsv(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_reads_columns() {
        let table = Table::from_tsv("a\tb\n1\t2\n3\t4\n").unwrap();
        assert_eq!(table.headers(), &["a", "b"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.column("b").unwrap(), vec!["2", "4"]);
        assert_eq!(table.get(1, "a"), Some("3"));
        assert!(table.column("c").is_none());
    }

    #[test]
    fn skips_ragged_rows() {
        let table = Table::from_csv("a,b\n1,2\nonly-one\n3,4\n").unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn round_trips_csv() {
        let table = Table::from_csv("a,b\n1,2\n").unwrap();
        let text = table.to_csv().unwrap();
        assert_eq!(Table::from_csv(&text).unwrap(), table);
    }

    #[test]
    fn records_map_headers_to_values() {
        let table = Table::from_csv("Sample ID,Sample name\nS1,First\n").unwrap();
        let record = table.record(0).unwrap();
        assert_eq!(record["Sample ID"], "S1");
        assert_eq!(record["Sample name"], "First");
        assert!(table.record(1).is_none());
    }
}
