pub mod csv_processor;
pub mod export;
pub mod server;
pub mod state;
pub mod utils;

pub use csv_processor::{
    ByteSource, ColumnSelection, CsvSink, Delimiter, FileSource, HeaderRow, MemorySink,
    MemorySource, PreviewReport,
};
pub use export::{run_export, ExportReport, ExportRun};
pub use server::DsvTranscoderServer;
pub use state::{AppState, ColumnPreset, PresetStore, SessionState, SessionStatus, TranscodeSession};
pub use utils::{AppConfig, ErrorKind, Result, StructuralWarning, TranscodeError, TranscodeOptions};
