use crate::utils::{Result, TranscodeOptions, TranscodeError};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Randomly sliceable input of known length.
pub trait ByteSource {
    fn len(&self) -> u64;

    /// Reads `[offset, offset + len)`, clamped to the end of the source.
    fn read_range(&mut self, offset: u64, len: usize) -> Result<Vec<u8>>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: ByteSource + ?Sized> ByteSource for &mut T {
    fn len(&self) -> u64 {
        (**self).len()
    }

    fn read_range(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        (**self).read_range(offset, len)
    }
}

/// In-memory source, mostly for previews of uploaded blobs and tests.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    bytes: Vec<u8>,
}

impl MemorySource {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }
}

impl ByteSource for MemorySource {
    fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn read_range(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let start = usize::try_from(offset)
            .unwrap_or(usize::MAX)
            .min(self.bytes.len());
        let end = start.saturating_add(len).min(self.bytes.len());
        Ok(self.bytes[start..end].to_vec())
    }
}

pub struct FileSource {
    path: PathBuf,
    file: File,
    len: u64,
}

impl FileSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(TranscodeError::FileNotFound(path.display().to_string()));
        }
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            file,
            len,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_range(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let available = self.len.saturating_sub(offset);
        let len = len.min(usize::try_from(available).unwrap_or(usize::MAX));
        let mut buf = vec![0u8; len];
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }
}

/// Rejects inputs above the configured ceiling before anything is read.
pub fn check_admission(size: u64, options: &TranscodeOptions) -> Result<()> {
    if size > options.max_file_bytes {
        tracing::warn!(size, limit = options.max_file_bytes, "Input rejected: too large");
        return Err(TranscodeError::FileTooLarge {
            size,
            limit: options.max_file_bytes,
        });
    }
    Ok(())
}
