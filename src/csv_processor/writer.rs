use crate::utils::{Result, TranscodeError};
use serde::{Deserialize, Serialize};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// What a finished export hands back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ExportArtifact {
    Blob(String),
    File(PathBuf),
}

impl ExportArtifact {
    pub fn as_blob(&self) -> Option<&str> {
        match self {
            Self::Blob(s) => Some(s),
            Self::File(_) => None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::File(p) => Some(p),
            Self::Blob(_) => None,
        }
    }
}

/// Destination for encoded CSV chunks. Nothing becomes visible to the caller
/// until `finish` succeeds; `discard` throws away whatever was written.
pub trait CsvSink {
    fn write_chunk(&mut self, chunk: &str) -> Result<()>;

    fn finish(self) -> Result<ExportArtifact>
    where
        Self: Sized;

    fn discard(self)
    where
        Self: Sized,
    {
    }

    fn bytes_written(&self) -> u64;
}

#[derive(Debug, Default)]
pub struct MemorySink {
    buffer: String,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CsvSink for MemorySink {
    fn write_chunk(&mut self, chunk: &str) -> Result<()> {
        self.buffer.push_str(chunk);
        Ok(())
    }

    fn finish(self) -> Result<ExportArtifact> {
        Ok(ExportArtifact::Blob(self.buffer))
    }

    fn bytes_written(&self) -> u64 {
        self.buffer.len() as u64
    }
}

/// Writes into a temp file next to the destination and renames it into place
/// on `finish`. Dropping or discarding the sink deletes the temp file.
pub struct AtomicFileSink {
    writer: BufWriter<NamedTempFile>,
    final_path: PathBuf,
    bytes_written: u64,
}

impl AtomicFileSink {
    pub fn create(final_path: impl AsRef<Path>) -> Result<Self> {
        let final_path = final_path.as_ref().to_path_buf();
        let parent = match final_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let temp = NamedTempFile::new_in(&parent).map_err(|e| {
            TranscodeError::SinkError(format!(
                "Failed to create temporary file in {}: {}",
                parent.display(),
                e
            ))
        })?;

        tracing::debug!(target = %final_path.display(), temp = %temp.path().display(), "Opened atomic file sink");

        Ok(Self {
            writer: BufWriter::new(temp),
            final_path,
            bytes_written: 0,
        })
    }

    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    pub fn temp_path(&self) -> &Path {
        self.writer.get_ref().path()
    }
}

impl CsvSink for AtomicFileSink {
    fn write_chunk(&mut self, chunk: &str) -> Result<()> {
        self.writer.write_all(chunk.as_bytes())?;
        self.bytes_written += chunk.len() as u64;
        Ok(())
    }

    fn finish(self) -> Result<ExportArtifact> {
        let temp = self.writer.into_inner().map_err(|e| {
            TranscodeError::SinkError(format!("Failed to flush buffer: {}", e.error()))
        })?;

        temp.persist(&self.final_path).map_err(|e| {
            TranscodeError::SinkError(format!(
                "Failed to persist file to {}: {}",
                self.final_path.display(),
                e.error
            ))
        })?;

        Ok(ExportArtifact::File(self.final_path))
    }

    fn discard(self) {
        tracing::debug!(target = %self.final_path.display(), "Discarding partial export");
    }

    fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_memory_sink_concatenates() {
        let mut sink = MemorySink::new();
        sink.write_chunk("a,b\n").expect("write");
        sink.write_chunk("1,2\n").expect("write");
        assert_eq!(sink.bytes_written(), 8);
        let artifact = sink.finish().expect("finish");
        assert_eq!(artifact.as_blob(), Some("a,b\n1,2\n"));
        assert!(artifact.path().is_none());
    }

    #[test]
    fn test_atomic_sink_persists() {
        let dir = TempDir::new().expect("temp dir");
        let target = dir.path().join("out.csv");

        let mut sink = AtomicFileSink::create(&target).expect("sink");
        sink.write_chunk("name\n").expect("write");
        sink.write_chunk("Alice\n").expect("write");
        assert!(!target.exists());

        let artifact = sink.finish().expect("finish");
        assert_eq!(artifact.path(), Some(target.as_path()));
        assert_eq!(fs::read_to_string(&target).expect("read"), "name\nAlice\n");
    }

    #[test]
    fn test_atomic_sink_discard_leaves_nothing() {
        let dir = TempDir::new().expect("temp dir");
        let target = dir.path().join("out.csv");

        let mut sink = AtomicFileSink::create(&target).expect("sink");
        sink.write_chunk("partial").expect("write");
        let temp = sink.temp_path().to_path_buf();
        assert!(temp.exists());

        sink.discard();
        assert!(!temp.exists());
        assert!(!target.exists());
        assert_eq!(fs::read_dir(dir.path()).expect("read dir").count(), 0);
    }

    #[test]
    fn test_atomic_sink_replaces_existing_file() {
        let dir = TempDir::new().expect("temp dir");
        let target = dir.path().join("out.csv");
        fs::write(&target, "old").expect("seed");

        let mut sink = AtomicFileSink::create(&target).expect("sink");
        sink.write_chunk("new\n").expect("write");
        sink.finish().expect("finish");
        assert_eq!(fs::read_to_string(&target).expect("read"), "new\n");
    }

    #[test]
    fn test_artifact_serializes_tagged() {
        let json = serde_json::to_value(ExportArtifact::Blob("x".into())).expect("json");
        assert_eq!(json["kind"], "blob");
        assert_eq!(json["value"], "x");
    }
}
