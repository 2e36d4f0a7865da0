use serde::{Deserialize, Serialize};

/// Plans the fixed-size byte windows an export reads from its source.
pub struct WindowChunker {
    chunk_size: usize,
}

impl WindowChunker {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    /// Windows covering `[0, total_bytes)` in order. An empty source still
    /// gets one zero-length final window so the pipeline runs to completion.
    pub fn calculate_chunks(&self, total_bytes: u64) -> Vec<ChunkRange> {
        let mut chunks = Vec::new();
        let mut offset = 0u64;
        let mut index = 0;

        loop {
            let len = (total_bytes - offset).min(self.chunk_size as u64) as usize;
            let end = offset + len as u64;
            let is_last = end >= total_bytes;

            chunks.push(ChunkRange {
                index,
                offset,
                len,
                is_first: index == 0,
                is_last,
            });

            if is_last {
                break;
            }
            offset = end;
            index += 1;
        }

        chunks
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRange {
    pub index: usize,
    pub offset: u64,
    pub len: usize,
    pub is_first: bool,
    pub is_last: bool,
}

impl ChunkRange {
    pub fn end(&self) -> u64 {
        self.offset + self.len as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_windows_cover_source() {
        let chunks = WindowChunker::new(4).calculate_chunks(10);
        assert_eq!(chunks.len(), 3);
        assert_eq!(
            chunks.iter().map(|c| (c.offset, c.len)).collect::<Vec<_>>(),
            vec![(0, 4), (4, 4), (8, 2)]
        );
        assert!(chunks[0].is_first);
        assert!(chunks[2].is_last);
        assert!(!chunks[1].is_first && !chunks[1].is_last);
        assert_eq!(chunks[2].end(), 10);
    }

    #[test]
    fn test_exact_multiple() {
        let chunks = WindowChunker::new(5).calculate_chunks(10);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[1].is_last);
        assert_eq!(chunks[1].len, 5);
    }

    #[test]
    fn test_empty_source_has_one_window() {
        let chunks = WindowChunker::new(1024).calculate_chunks(0);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_first && chunks[0].is_last);
        assert_eq!(chunks[0].len, 0);
    }

    #[test]
    fn test_zero_chunk_size_clamped() {
        let chunker = WindowChunker::new(0);
        assert_eq!(chunker.chunk_size(), 1);
        assert_eq!(chunker.calculate_chunks(3).len(), 3);
    }
}
