//! Bilingual pair rows and their on-disk CSV form.
//!
//! Batch files are UTF-8 CSV with a byte-order mark and a
//! `yoruba_text,english_text` header. Extra columns written by upstream
//! exporters (document ids and the like) are ignored when reading.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fsio;

const BOM: char = '\u{feff}';

/// One sentence pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairRow {
    #[serde(default)]
    pub yoruba_text: String,
    #[serde(default)]
    pub english_text: String,
}

impl PairRow {
    pub fn new(yoruba_text: impl Into<String>, english_text: impl Into<String>) -> Self {
        Self {
            yoruba_text: yoruba_text.into(),
            english_text: english_text.into(),
        }
    }

    pub fn get(&self, column: PairColumn) -> &str {
        match column {
            PairColumn::YorubaText => &self.yoruba_text,
            PairColumn::EnglishText => &self.english_text,
        }
    }

    pub fn set(&mut self, column: PairColumn, value: impl Into<String>) {
        match column {
            PairColumn::YorubaText => self.yoruba_text = value.into(),
            PairColumn::EnglishText => self.english_text = value.into(),
        }
    }
}

/// An editable column of a batch file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairColumn {
    YorubaText,
    EnglishText,
}

impl PairColumn {
    pub const ALL: [PairColumn; 2] = [PairColumn::YorubaText, PairColumn::EnglishText];

    pub fn name(&self) -> &'static str {
        match self {
            PairColumn::YorubaText => "yoruba_text",
            PairColumn::EnglishText => "english_text",
        }
    }
}

impl fmt::Display for PairColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PairColumn {
    type Err = PairsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "yoruba_text" => Ok(PairColumn::YorubaText),
            "english_text" => Ok(PairColumn::EnglishText),
            other => Err(PairsError::UnknownColumn(other.to_string())),
        }
    }
}

/// Errors reading or writing batch files.
#[derive(Debug, Error)]
pub enum PairsError {
    #[error("Failed to access batch file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed batch file {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Batch file {path} has no {column} column")]
    MissingColumn { path: PathBuf, column: PairColumn },

    #[error("Unknown column: {0}")]
    UnknownColumn(String),
}

/// Reads all rows of a batch file.
pub fn read_pairs(path: &Path) -> Result<Vec<PairRow>, PairsError> {
    let content = std::fs::read_to_string(path).map_err(|source| PairsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_pairs(&content, path)
}

fn parse_pairs(content: &str, path: &Path) -> Result<Vec<PairRow>, PairsError> {
    let csv_error = |source: csv::Error| PairsError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let content = content.strip_prefix(BOM).unwrap_or(content);
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers = reader.headers().map_err(csv_error)?.clone();
    for column in PairColumn::ALL {
        if !headers.iter().any(|h| h == column.name()) {
            return Err(PairsError::MissingColumn {
                path: path.to_path_buf(),
                column,
            });
        }
    }

    reader
        .deserialize()
        .collect::<Result<Vec<PairRow>, _>>()
        .map_err(csv_error)
}

/// Serializes rows into the batch file format.
pub fn encode_pairs(rows: &[PairRow]) -> Result<Vec<u8>, csv::Error> {
    let mut out = Vec::new();
    let mut bom = [0u8; 3];
    out.extend_from_slice(BOM.encode_utf8(&mut bom).as_bytes());

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(out);
    writer.write_record(PairColumn::ALL.iter().map(|c| c.name()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

/// Atomically writes rows to a batch file, replacing any previous content.
pub fn write_pairs(path: &Path, rows: &[PairRow]) -> Result<(), PairsError> {
    let bytes = encode_pairs(rows).map_err(|source| PairsError::Csv {
        path: path.to_path_buf(),
        source,
    })?;
    fsio::write_atomic(path, &bytes).map_err(|source| PairsError::Io {
        path: path.to_path_buf(),
        source,
    })
}
