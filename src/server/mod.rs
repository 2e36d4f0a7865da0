pub mod tools;

pub use tools::{
    mcp_error, resolve_output_path, ApplyPresetParams, DeletePresetParams, DsvTranscoderServer,
    ExportColumnsParams, ExportResponse, GetProgressParams, PreviewFileParams, PreviewResponse,
    SavePresetParams,
};
