//! JSON Lines and JSON persistence for run outputs and configs.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "config.json";
pub const OUTPUTS_FILE_NAME: &str = "outputs.jsonl";
pub const JUDGEMENTS_FILE_NAME: &str = "judgements.jsonl";

#[derive(Debug, thiserror::Error)]
pub enum ResultsError {
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{} line {line}: {source}", .path.display())]
    JsonLine {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> ResultsError + '_ {
    move |source| ResultsError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn json_err(path: &Path) -> impl FnOnce(serde_json::Error) -> ResultsError + '_ {
    move |source| ResultsError::Json {
        path: path.to_path_buf(),
        source,
    }
}

/// Write one JSON object per line.
pub fn write_jsonl<T: Serialize>(path: impl AsRef<Path>, records: &[T]) -> Result<(), ResultsError> {
    let path = path.as_ref();
    let file = File::create(path).map_err(io_err(path))?;
    let mut writer = BufWriter::new(file);
    for record in records {
        let line = serde_json::to_string(record).map_err(json_err(path))?;
        writeln!(writer, "{line}").map_err(io_err(path))?;
    }
    writer.flush().map_err(io_err(path))?;
    Ok(())
}

/// Read one JSON value per non-blank line.
pub fn read_jsonl<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<Vec<T>, ResultsError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(io_err(path))?;
    let mut records = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(io_err(path))?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|source| ResultsError::JsonLine {
            path: path.to_path_buf(),
            line: idx + 1,
            source,
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Write a pretty-printed JSON document.
pub fn save_json<T: Serialize>(path: impl AsRef<Path>, value: &T) -> Result<(), ResultsError> {
    let path = path.as_ref();
    let raw = serde_json::to_string_pretty(value).map_err(json_err(path))?;
    std::fs::write(path, raw + "\n").map_err(io_err(path))
}

pub fn load_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, ResultsError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(io_err(path))?;
    serde_json::from_str(&raw).map_err(json_err(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Row {
        id: usize,
        text: String,
    }

    #[test]
    fn test_jsonl_writes_one_line_per_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rows.jsonl");
        let rows = vec![
            Row {
                id: 1,
                text: "line\nbreak".into(),
            },
            Row {
                id: 2,
                text: "plain".into(),
            },
        ];

        write_jsonl(&path, &rows).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw.lines().count(), 2);

        let back: Vec<Row> = read_jsonl(&path).unwrap();
        assert_eq!(back, rows);
    }

    #[test]
    fn test_read_jsonl_reports_bad_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.jsonl");
        std::fs::write(&path, "{\"id\": 1, \"text\": \"a\"}\n\n{oops\n").unwrap();

        let err = read_jsonl::<Row>(&path).unwrap_err();
        assert!(matches!(err, ResultsError::JsonLine { line: 3, .. }));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let err = load_json::<Row>(dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, ResultsError::Io { .. }));
    }
}
