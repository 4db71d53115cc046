//! CSV-backed relation store
//!
//! ## Layout
//! - `<data_dir>/<name>.<ext>`: header line, then one comma-delimited record per row
//! - `<data_dir>/<name>.hll`: bincode [`HyperLogLog`] over the relation's rows (optional)
//!
//! Fields containing `,`, `"` or line breaks are double-quoted, with `""`
//! escaping a quote. Every loaded value is text; the query engine coerces
//! numbers at comparison time.

use super::{sketch_rows, Storage, StorageResult};
use crate::config::EngineConfig;
use crate::error::StorageError;
use crate::sketch::{CardinalitySketch, HyperLogLog};
use crate::types::{Relation, Row, Value};
use async_trait::async_trait;
use dashmap::DashMap;
use indexmap::IndexSet;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info};

pub struct CsvStorage {
    config: EngineConfig,
    /// Sketch cache, dropped for a relation whenever it is persisted
    sketches: DashMap<String, HyperLogLog>,
}

impl CsvStorage {
    pub fn new(config: EngineConfig) -> StorageResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            sketches: DashMap::new(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    async fn read_sketch_file(&self, name: &str) -> StorageResult<Option<HyperLogLog>> {
        match tokio::fs::read(self.config.sketch_path(name)).await {
            Ok(bytes) => Ok(Some(HyperLogLog::from_bytes(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Relation names map straight to file names
fn check_name(name: &str) -> StorageResult<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidConfig(format!("invalid relation name '{}'", name)))
    }
}

#[async_trait]
impl Storage for CsvStorage {
    async fn load_relation(&self, name: &str) -> StorageResult<Relation> {
        check_name(name)?;
        let path = self.config.relation_path(name);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let rows = decode_relation(&text)?;
        debug!(relation = name, rows = rows.len(), path = %path.display(), "loaded relation");
        Ok(rows)
    }

    async fn load_cardinality_sketch(&self, name: &str) -> StorageResult<Box<dyn CardinalitySketch>> {
        check_name(name)?;
        if let Some(cached) = self.sketches.get(name) {
            return Ok(Box::new(cached.clone()));
        }

        let sketch = match self.read_sketch_file(name).await? {
            Some(sketch) => sketch,
            None => {
                let rows = self.load_relation(name).await?;
                sketch_rows(&rows, self.config.sketch_precision)?
            }
        };
        self.sketches.insert(name.to_string(), sketch.clone());
        Ok(Box::new(sketch))
    }

    async fn persist_relation(&self, name: &str, rows: &[Row]) -> StorageResult<()> {
        check_name(name)?;
        self.sketches.remove(name);
        tokio::fs::create_dir_all(&self.config.data_dir).await?;

        let path = self.config.relation_path(name);
        write_atomic(&path, encode_relation(rows).as_bytes()).await?;

        let sketch_path = self.config.sketch_path(name);
        if self.config.persist_sketches {
            let sketch = sketch_rows(rows, self.config.sketch_precision)?;
            write_atomic(&sketch_path, &sketch.to_bytes()?).await?;
        } else {
            // A stale sketch would outlive the rows it describes
            match tokio::fs::remove_file(&sketch_path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        info!(relation = name, rows = rows.len(), path = %path.display(), "persisted relation");
        Ok(())
    }

    fn sketch_precision(&self) -> u8 {
        self.config.sketch_precision
    }
}

/// Write to a sibling temp file, then rename over the target
async fn write_atomic(path: &Path, data: &[u8]) -> StorageResult<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    tokio::fs::write(&tmp, data).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Decode CSV text: first record is the header
pub fn decode_relation(text: &str) -> StorageResult<Relation> {
    let mut records = parse_records(text)?.into_iter();
    let header = match records.next() {
        Some(header) => header,
        None => return Ok(Vec::new()),
    };

    records
        .enumerate()
        .map(|(i, record)| {
            if record.len() != header.len() {
                return Err(StorageError::Corruption(format!(
                    "record {} has {} fields, header has {}",
                    i + 1,
                    record.len(),
                    header.len()
                )));
            }
            Ok(header
                .iter()
                .cloned()
                .zip(record.into_iter().map(Value::Text))
                .collect::<Row>())
        })
        .collect()
}

/// Encode rows as CSV. The header is the union of all row keys in
/// first-seen order; a missing key or null writes an empty field.
pub fn encode_relation(rows: &[Row]) -> String {
    let header: IndexSet<&str> = rows
        .iter()
        .flat_map(|row| row.keys().map(String::as_str))
        .collect();

    let mut out = String::new();
    write_record(&mut out, header.iter().copied());
    for row in rows {
        let fields: Vec<String> = header
            .iter()
            .map(|key| match row.get(*key) {
                None | Some(Value::Null) => String::new(),
                Some(value) => value.to_string(),
            })
            .collect();
        write_record(&mut out, fields.iter().map(String::as_str));
    }
    out
}

fn write_record<'a>(out: &mut String, fields: impl Iterator<Item = &'a str>) {
    for (i, field) in fields.enumerate() {
        if i > 0 {
            out.push(',');
        }
        if field.contains(&[',', '"', '\n', '\r'][..]) {
            out.push('"');
            out.push_str(&field.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(field);
        }
    }
    out.push('\n');
}

/// Split CSV text into records. Blank lines are skipped.
fn parse_records(text: &str) -> StorageResult<Vec<Vec<String>>> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    // Distinguishes an empty line from a record holding one empty field
    let mut dirty = false;
    let mut line = 1usize;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' if field.is_empty() => {
                in_quotes = true;
                dirty = true;
            }
            ',' => {
                record.push(std::mem::take(&mut field));
                dirty = true;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                line += 1;
                if dirty || !field.is_empty() {
                    record.push(std::mem::take(&mut field));
                    records.push(std::mem::take(&mut record));
                }
                dirty = false;
            }
            _ => {
                field.push(c);
                dirty = true;
            }
        }
    }

    if in_quotes {
        return Err(StorageError::Corruption(format!(
            "unterminated quoted field at line {}",
            line
        )));
    }
    if dirty || !field.is_empty() {
        record.push(field);
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::row_from_pairs;
    use tempfile::TempDir;

    fn storage(dir: &TempDir, persist_sketches: bool) -> CsvStorage {
        let mut config = EngineConfig::for_testing(dir.path());
        config.persist_sketches = persist_sketches;
        CsvStorage::new(config).unwrap()
    }

    #[test]
    fn test_decode_quoted_fields() {
        let text = "id,name,note\r\n1,\"Smith, J\",\"say \"\"hi\"\"\"\n2,Ann,\n\n";
        let rows = decode_relation(text).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], Value::from("Smith, J"));
        assert_eq!(rows[0]["note"], Value::from("say \"hi\""));
        assert_eq!(rows[1]["note"], Value::from(""));
    }

    #[test]
    fn test_decode_multiline_field() {
        let rows = decode_relation("id,text\n1,\"two\nlines\"\n").unwrap();
        assert_eq!(rows[0]["text"], Value::from("two\nlines"));
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(
            decode_relation("id,name\n1,\"open\n"),
            Err(StorageError::Corruption(_))
        ));
        assert!(matches!(
            decode_relation("id,name\n1,a,extra\n"),
            Err(StorageError::Corruption(_))
        ));
        assert!(decode_relation("").unwrap().is_empty());
    }

    #[test]
    fn test_encode_union_header() {
        let rows = vec![
            row_from_pairs([("id", Value::from(1)), ("name", Value::from("a,b"))]),
            row_from_pairs([("id", Value::from(2)), ("extra", Value::Null)]),
        ];
        assert_eq!(encode_relation(&rows), "id,name,extra\n1,\"a,b\",\n2,,\n");
    }

    #[tokio::test]
    async fn test_persist_then_load() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir, false);
        let rows = vec![
            row_from_pairs([("cust", "a"), ("SUM(amt)", "15")]),
            row_from_pairs([("cust", "b"), ("SUM(amt)", "7")]),
        ];

        storage.persist_relation("totals", &rows).await.unwrap();
        let loaded = storage.load_relation("totals").await.unwrap();
        assert_eq!(loaded, rows);
        assert!(!storage.config().sketch_path("totals").exists());
    }

    #[tokio::test]
    async fn test_missing_relation_is_not_found() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir, false);
        let err = storage.load_relation("ghost").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_rejects_path_like_names() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir, false);
        assert!(storage.load_relation("../etc/passwd").await.is_err());
    }

    #[tokio::test]
    async fn test_sketch_file_persisted_and_reused() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir, true);
        let rows: Relation = (0..500).map(|i| row_from_pairs([("id", i)])).collect();
        storage.persist_relation("ids", &rows).await.unwrap();
        assert!(storage.config().sketch_path("ids").exists());

        // A fresh store reads the sketch file instead of the CSV
        let reopened = CsvStorage::new(storage.config().clone()).unwrap();
        std::fs::remove_file(reopened.config().relation_path("ids")).unwrap();
        let estimate = reopened.load_cardinality_sketch("ids").await.unwrap().estimate() as f64;
        assert!((estimate - 500.0).abs() / 500.0 < 0.15, "estimate {}", estimate);
    }

    #[test]
    fn test_sketch_precision_follows_config() {
        let dir = TempDir::new().unwrap();
        assert_eq!(storage(&dir, false).sketch_precision(), 10);
    }

    #[tokio::test]
    async fn test_sketch_from_csv_when_no_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("people.csv"), "id,name\n1,a\n2,b\n3,c\n").unwrap();
        let storage = storage(&dir, false);

        let estimate = storage.load_cardinality_sketch("people").await.unwrap().estimate();
        assert_eq!(estimate, 3);
    }
}
