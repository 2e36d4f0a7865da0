use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("File too large: {size} bytes exceeds the {limit} byte limit")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("Failed to decode bytes at offset {offset} as UTF-8: {source}")]
    Decode {
        offset: u64,
        #[source]
        source: std::str::Utf8Error,
    },

    #[error("No columns selected for export")]
    EmptySelection,

    #[error("Column index {index} is out of range (header has {columns} columns)")]
    ColumnOutOfRange { index: usize, columns: usize },

    #[error("An export is already running for this session")]
    ExportInProgress,

    #[error("Input has no header row")]
    NoHeader,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Output sink error: {0}")]
    SinkError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Preset not found: {0}")]
    PresetNotFound(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid preset name: {0:?}")]
    InvalidPresetName(String),
}

/// Coarse classification handed to callers alongside the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Admission,
    Decode,
    Selection,
    Export,
    Storage,
    NotFound,
}

impl TranscodeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TranscodeError::FileTooLarge { .. } => ErrorKind::Admission,
            TranscodeError::Decode { .. } => ErrorKind::Decode,
            TranscodeError::EmptySelection
            | TranscodeError::ColumnOutOfRange { .. }
            | TranscodeError::ExportInProgress
            | TranscodeError::NoHeader
            | TranscodeError::InvalidPresetName(_) => ErrorKind::Selection,
            TranscodeError::IoError(_) | TranscodeError::SinkError(_) => ErrorKind::Export,
            TranscodeError::ConfigError(_)
            | TranscodeError::DatabaseError(_)
            | TranscodeError::SerializationError(_) => ErrorKind::Storage,
            TranscodeError::PresetNotFound(_)
            | TranscodeError::SessionNotFound(_)
            | TranscodeError::FileNotFound(_) => ErrorKind::NotFound,
        }
    }
}

pub type Result<T> = std::result::Result<T, TranscodeError>;

/// Non-fatal conditions found while parsing. Processing continues and the
/// affected rows are padded or flagged instead of dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StructuralWarning {
    ColumnCountMismatch {
        row: usize,
        expected: usize,
        found: usize,
    },
    SplitLine {
        offset: u64,
        residue_bytes: usize,
    },
    UnterminatedQuote {
        offset: u64,
    },
    FieldTruncated {
        count: usize,
    },
    HeaderExtended {
        row: usize,
        added: usize,
    },
}

impl std::fmt::Display for StructuralWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StructuralWarning::ColumnCountMismatch {
                row,
                expected,
                found,
            } => write!(
                f,
                "row {row} has {found} fields, header has {expected} columns"
            ),
            StructuralWarning::SplitLine {
                offset,
                residue_bytes,
            } => write!(
                f,
                "no safe row boundary within {residue_bytes} bytes before byte {offset}; a line may be split"
            ),
            StructuralWarning::UnterminatedQuote { offset } => {
                write!(f, "quoted field still open at end of input (byte {offset})")
            }
            StructuralWarning::FieldTruncated { count } => {
                write!(f, "{count} oversized field(s) truncated")
            }
            StructuralWarning::HeaderExtended { row, added } => {
                write!(f, "row {row} exceeds the header; added {added} extra column(s)")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let err = TranscodeError::FileTooLarge {
            size: 800,
            limit: 700,
        };
        assert_eq!(err.kind(), ErrorKind::Admission);
        assert!(err.to_string().contains("800"));

        assert_eq!(TranscodeError::EmptySelection.kind(), ErrorKind::Selection);
        assert_eq!(
            TranscodeError::SinkError("disk full".into()).kind(),
            ErrorKind::Export
        );
    }

    #[test]
    fn test_decode_error_carries_cause() {
        let bad = [0x66u8, 0xff, 0x66];
        let source = std::str::from_utf8(&bad).unwrap_err();
        let err = TranscodeError::Decode { offset: 42, source };
        let msg = err.to_string();
        assert!(msg.contains("42"));
        assert!(msg.contains("invalid utf-8"));
        assert_eq!(err.kind(), ErrorKind::Decode);
    }
}
