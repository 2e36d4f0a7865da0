pub mod analyzer;
pub mod boundary;
pub mod chunker;
pub mod delimiter;
pub mod encoder;
pub mod reader;
pub mod reconciler;
pub mod selection;
pub mod tokenizer;
pub mod writer;

pub use analyzer::{preview_source, preview_text, PreviewReport};
pub use boundary::{find_safe_cut, ChunkBoundaryManager, WindowOutput};
pub use chunker::{ChunkRange, WindowChunker};
pub use delimiter::{detect_delimiter, Delimiter};
pub use encoder::{encode_field, encode_line, needs_quoting, write_line};
pub use reader::{check_admission, ByteSource, FileSource, MemorySource};
pub use reconciler::{Column, ColumnReconciler, HeaderRow, Reconciliation};
pub use selection::ColumnSelection;
pub use tokenizer::{PartialRow, Tokenized, Tokenizer, TokenizerOptions};
pub use writer::{AtomicFileSink, CsvSink, ExportArtifact, MemorySink};
