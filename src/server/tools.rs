use crate::csv_processor::{AtomicFileSink, Delimiter, FileSource};
use crate::export::{run_export, ExportReport};
use crate::state::{AppState, ColumnPreset, SessionSnapshot, TranscodeSession};
use crate::utils::{ErrorKind, StructuralWarning, TranscodeError, CSV_CONTENT_TYPE};
use rmcp::{
    handler::server::{tool::ToolRouter, wrapper::Parameters},
    model::*,
    tool, tool_handler, tool_router,
    ErrorData as McpError,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[schemars(description = "Parameters for previewing a delimited file")]
pub struct PreviewFileParams {
    #[schemars(description = "Path to the CSV/TSV/pipe/semicolon file to preview")]
    pub file_path: String,
    #[schemars(description = "Number of sample rows to return (default: 10)")]
    pub preview_rows: Option<usize>,
}

#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
#[schemars(description = "Parameters for exporting a subset of columns to CSV")]
pub struct ExportColumnsParams {
    #[schemars(description = "Session ID returned by preview_file")]
    pub session_id: String,
    #[schemars(description = "Header names to keep; every column with a matching name is selected")]
    pub columns: Option<Vec<String>>,
    #[schemars(description = "Zero-based column indices to keep (takes priority over columns)")]
    pub column_indices: Option<Vec<usize>>,
    #[schemars(description = "Name of a saved preset to apply (takes priority over both)")]
    pub preset: Option<String>,
    #[schemars(description = "Output file name; the extension is forced to .csv. Defaults to <input>_converted.csv next to the input")]
    pub output_file: Option<String>,
    #[schemars(description = "Wait for the export to finish instead of running it in the background")]
    pub wait: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[schemars(description = "Parameters for saving a column preset")]
pub struct SavePresetParams {
    #[schemars(description = "Preset name")]
    pub name: String,
    #[schemars(description = "Header names to store; if omitted the session's current selection is used")]
    pub columns: Option<Vec<String>>,
    #[schemars(description = "Session whose selection should be saved")]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[schemars(description = "Parameters for applying a preset to a session")]
pub struct ApplyPresetParams {
    #[schemars(description = "Session ID")]
    pub session_id: String,
    #[schemars(description = "Preset name")]
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[schemars(description = "Parameters for deleting a preset")]
pub struct DeletePresetParams {
    #[schemars(description = "Preset name")]
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[schemars(description = "Parameters to get export progress")]
pub struct GetProgressParams {
    #[schemars(description = "Session ID to get progress for")]
    pub session_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub index: usize,
    pub name: String,
    pub extra: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PreviewResponse {
    pub session_id: String,
    pub file_size_bytes: u64,
    pub delimiter: Delimiter,
    pub columns: Vec<ColumnInfo>,
    pub sample_rows: Vec<Vec<String>>,
    pub warnings: Vec<StructuralWarning>,
    pub truncated: bool,
}

impl PreviewResponse {
    fn from_session(session: &TranscodeSession) -> Self {
        let preview = session.preview();
        Self {
            session_id: session.id().to_string(),
            file_size_bytes: preview.file_size_bytes,
            delimiter: preview.delimiter,
            columns: preview
                .header
                .columns()
                .iter()
                .enumerate()
                .map(|(index, c)| ColumnInfo {
                    index,
                    name: c.name.clone(),
                    extra: c.extra,
                })
                .collect(),
            sample_rows: preview.sample_rows.clone(),
            warnings: preview.warnings.clone(),
            truncated: preview.truncated,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExportResponse {
    pub session_id: String,
    pub status: String,
    pub output_file: String,
    pub content_type: String,
    pub columns: Vec<String>,
    pub report: Option<ExportReport>,
}

/// `<dir of input>/<output name>` unless the output name is already absolute.
pub fn resolve_output_path(source: &Path, output_name: &str) -> PathBuf {
    let name = Path::new(output_name);
    if name.is_absolute() {
        return name.to_path_buf();
    }
    match source.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(name),
        _ => name.to_path_buf(),
    }
}

pub fn mcp_error(e: TranscodeError) -> McpError {
    match e.kind() {
        ErrorKind::Admission | ErrorKind::Selection | ErrorKind::NotFound => {
            McpError::invalid_params(e.to_string(), None)
        }
        ErrorKind::Decode | ErrorKind::Export | ErrorKind::Storage => {
            McpError::internal_error(e.to_string(), None)
        }
    }
}

fn json_result<T: Serialize>(value: &T) -> std::result::Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

#[derive(Clone)]
pub struct DsvTranscoderServer {
    state: AppState,
    tool_router: ToolRouter<Self>,
}

/// Operations shared by the MCP tools and the HTTP routes.
impl DsvTranscoderServer {
    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub async fn preview_file(&self, params: PreviewFileParams) -> crate::utils::Result<PreviewResponse> {
        let mut options = self.state.options.clone();
        if let Some(rows) = params.preview_rows {
            options.preview_rows = rows;
        }

        let mut source = FileSource::open(&params.file_path)?;
        let session = TranscodeSession::open(params.file_path.clone(), &mut source, options)?;
        let response = PreviewResponse::from_session(&session);
        self.state.insert_session(session).await;
        Ok(response)
    }

    pub async fn export_columns(&self, params: ExportColumnsParams) -> crate::utils::Result<ExportResponse> {
        let session_id = params.session_id.clone();
        let mut session = self.state.session(&session_id).await?;

        if let Some(name) = &params.preset {
            let preset = self.state.presets.get(name)?;
            session.apply_preset(&preset)?;
        } else if let Some(indices) = &params.column_indices {
            session.select_columns(indices.iter().copied())?;
        } else if let Some(names) = &params.columns {
            session.select_by_names(names.as_slice())?;
        }

        let source_path = PathBuf::from(session.source_name());
        let output_name = session.output_file_name(params.output_file.as_deref());
        let output_path = resolve_output_path(&source_path, &output_name);
        let output_file = output_path.display().to_string();

        let source = FileSource::open(&source_path)?;
        let run = session.start_export(source)?;
        let columns = run.columns().to_vec();
        let sink = AtomicFileSink::create(&output_path)?;

        let progress = self
            .state
            .update(&session_id, |s| {
                s.session = session.clone();
                s.begin_export(Some(output_file.clone()));
                Ok(Arc::clone(&s.progress))
            })
            .await?;

        let state = self.state.clone();
        let id = session_id.clone();
        let task = async move {
            let result = run_export(run, sink, |p| progress.store(p, Ordering::Release)).await;
            let recorded = state
                .update(&id, |s| {
                    match &result {
                        Ok(report) => {
                            s.session.absorb_header(&report.header);
                            s.complete(report.rows_written);
                        }
                        Err(e) => s.fail(e),
                    }
                    Ok(())
                })
                .await;
            if let Err(e) = recorded {
                tracing::warn!(session_id = %id, error = %e, "Could not record export outcome");
            }
            result
        };

        if params.wait.unwrap_or(false) {
            let report = task.await?;
            return Ok(ExportResponse {
                session_id,
                status: "completed".to_string(),
                output_file,
                content_type: CSV_CONTENT_TYPE.to_string(),
                columns,
                report: Some(report),
            });
        }

        tokio::spawn(async move {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Background export failed");
            }
        });

        Ok(ExportResponse {
            session_id,
            status: "exporting".to_string(),
            output_file,
            content_type: CSV_CONTENT_TYPE.to_string(),
            columns,
            report: None,
        })
    }

    pub async fn save_preset(&self, params: SavePresetParams) -> crate::utils::Result<ColumnPreset> {
        let headers = match (params.columns, &params.session_id) {
            (Some(columns), _) => columns,
            (None, Some(id)) => self.state.session(id).await?.to_preset(&params.name)?.headers,
            (None, None) => return Err(TranscodeError::EmptySelection),
        };
        self.state.presets.save(&params.name, &headers)
    }

    pub async fn apply_preset(&self, params: ApplyPresetParams) -> crate::utils::Result<Vec<String>> {
        let preset = self.state.presets.get(&params.name)?;
        self.state
            .update(&params.session_id, |s| {
                let indices = s.session.apply_preset(&preset)?.indices().to_vec();
                let header = s.session.header();
                Ok(indices
                    .into_iter()
                    .filter_map(|i| header.name(i).map(str::to_string))
                    .collect::<Vec<_>>())
            })
            .await
    }

    pub async fn progress(&self, session_id: &str) -> crate::utils::Result<SessionSnapshot> {
        self.state.snapshot(session_id).await
    }
}

#[tool_router]
impl DsvTranscoderServer {
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        name = "preview_file",
        description = "Preview a delimited file without loading it into memory. Detects the delimiter (comma, tab, pipe, semicolon), reads the header and a few sample rows, reports structural warnings, and opens a session for export."
    )]
    async fn preview_file_tool(
        &self,
        params: Parameters<PreviewFileParams>,
    ) -> std::result::Result<CallToolResult, McpError> {
        let response = self.preview_file(params.0).await.map_err(mcp_error)?;
        json_result(&response)
    }

    #[tool(
        name = "export_columns",
        description = "Stream the previewed file to a comma-delimited CSV containing only the selected columns. Select by preset, column indices or header names. Runs in the background unless wait is true; poll get_export_progress."
    )]
    async fn export_columns_tool(
        &self,
        params: Parameters<ExportColumnsParams>,
    ) -> std::result::Result<CallToolResult, McpError> {
        let response = self.export_columns(params.0).await.map_err(mcp_error)?;
        json_result(&response)
    }

    #[tool(
        name = "save_preset",
        description = "Save a named list of header names, either given explicitly or taken from a session's current selection."
    )]
    async fn save_preset_tool(
        &self,
        params: Parameters<SavePresetParams>,
    ) -> std::result::Result<CallToolResult, McpError> {
        let preset = self.save_preset(params.0).await.map_err(mcp_error)?;
        json_result(&preset)
    }

    #[tool(name = "list_presets", description = "List all saved column presets.")]
    async fn list_presets_tool(&self) -> std::result::Result<CallToolResult, McpError> {
        let presets = self.state.presets.list().map_err(mcp_error)?;
        json_result(&presets)
    }

    #[tool(
        name = "apply_preset",
        description = "Select a session's columns from a saved preset by header-name equality. Names missing from the file are skipped."
    )]
    async fn apply_preset_tool(
        &self,
        params: Parameters<ApplyPresetParams>,
    ) -> std::result::Result<CallToolResult, McpError> {
        let session_id = params.0.session_id.clone();
        let selected = self.apply_preset(params.0).await.map_err(mcp_error)?;
        json_result(&serde_json::json!({
            "session_id": session_id,
            "selected_columns": selected,
        }))
    }

    #[tool(name = "delete_preset", description = "Delete a saved column preset.")]
    async fn delete_preset_tool(
        &self,
        params: Parameters<DeletePresetParams>,
    ) -> std::result::Result<CallToolResult, McpError> {
        let name = params.0.name;
        let deleted = self.state.presets.delete(&name).map_err(mcp_error)?;
        if !deleted {
            return Err(mcp_error(TranscodeError::PresetNotFound(name)));
        }
        json_result(&serde_json::json!({ "deleted": name }))
    }

    #[tool(
        name = "get_export_progress",
        description = "Get the status and progress percentage of a session's export."
    )]
    async fn get_export_progress_tool(
        &self,
        params: Parameters<GetProgressParams>,
    ) -> std::result::Result<CallToolResult, McpError> {
        let snapshot = self.progress(&params.0.session_id).await.map_err(mcp_error)?;
        json_result(&snapshot)
    }

    pub fn router(&self) -> &ToolRouter<Self> {
        &self.tool_router
    }
}

#[tool_handler]
impl rmcp::handler::server::ServerHandler for DsvTranscoderServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                r#"DSV Transcoder MCP Server

Converts large CSV/TSV/pipe/semicolon files into clean comma-delimited CSV
containing only the columns you choose, streaming in bounded memory.

Workflow:
1. preview_file - Detect delimiter, header and sample rows (use absolute path)
2. export_columns - Pick columns by name, index or preset and start the export
3. get_export_progress - Poll until status is completed
Presets: save_preset, list_presets, apply_preset, delete_preset"#
                    .to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_input(dir: &TempDir, name: &str, content: &str) -> String {
        let path = dir.path().join(name);
        fs::write(&path, content).expect("write input");
        path.display().to_string()
    }

    #[test]
    fn test_resolve_output_path() {
        assert_eq!(
            resolve_output_path(Path::new("/data/in.tsv"), "in_converted.csv"),
            PathBuf::from("/data/in_converted.csv")
        );
        assert_eq!(
            resolve_output_path(Path::new("/data/in.tsv"), "/tmp/out.csv"),
            PathBuf::from("/tmp/out.csv")
        );
        assert_eq!(
            resolve_output_path(Path::new("in.tsv"), "out.csv"),
            PathBuf::from("out.csv")
        );
    }

    #[test]
    fn test_error_mapping() {
        let err = mcp_error(TranscodeError::EmptySelection);
        assert_eq!(err.code, ErrorCode::INVALID_PARAMS);
        let err = mcp_error(TranscodeError::SinkError("x".into()));
        assert_eq!(err.code, ErrorCode::INTERNAL_ERROR);
    }

    #[tokio::test]
    async fn test_preview_then_export_and_wait() {
        let dir = TempDir::new().expect("temp dir");
        let input = write_input(&dir, "people.tsv", "id\tname\tcity\n1\tAnn\tOslo\n2\t5\" TV\tRome\n");
        let server = DsvTranscoderServer::new(AppState::default());

        let preview = server
            .preview_file(PreviewFileParams {
                file_path: input,
                preview_rows: None,
            })
            .await
            .expect("preview");
        assert_eq!(preview.delimiter, Delimiter::Tab);
        assert_eq!(preview.columns.len(), 3);

        let response = server
            .export_columns(ExportColumnsParams {
                session_id: preview.session_id.clone(),
                columns: Some(vec!["name".into(), "id".into()]),
                wait: Some(true),
                ..Default::default()
            })
            .await
            .expect("export");
        assert_eq!(response.status, "completed");
        assert_eq!(response.content_type, "text/csv");
        assert_eq!(response.columns, vec!["id", "name"]);

        let output = fs::read_to_string(dir.path().join("people_converted.csv")).expect("output");
        assert_eq!(output, "id,name\n1,Ann\n2,\"5\"\" TV\"\n");

        let progress = server.progress(&preview.session_id).await.expect("progress");
        assert_eq!(progress.status, "completed");
        assert_eq!(progress.progress_percent, 100);
        assert_eq!(progress.rows_written, 2);
    }

    #[tokio::test]
    async fn test_export_without_selection_rejected() {
        let dir = TempDir::new().expect("temp dir");
        let input = write_input(&dir, "a.csv", "a,b\n1,2\n");
        let server = DsvTranscoderServer::new(AppState::default());
        let preview = server
            .preview_file(PreviewFileParams {
                file_path: input,
                preview_rows: None,
            })
            .await
            .expect("preview");

        let err = server
            .export_columns(ExportColumnsParams {
                session_id: preview.session_id,
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TranscodeError::EmptySelection));
        assert!(!dir.path().join("a_converted.csv").exists());
    }

    #[tokio::test]
    async fn test_presets_through_server() {
        let dir = TempDir::new().expect("temp dir");
        let input = write_input(&dir, "a.csv", "id,name,email\n1,Ann,a@x\n");
        let server = DsvTranscoderServer::new(AppState::default());
        let preview = server
            .preview_file(PreviewFileParams {
                file_path: input,
                preview_rows: Some(1),
            })
            .await
            .expect("preview");

        server
            .save_preset(SavePresetParams {
                name: "contact".into(),
                columns: Some(vec!["email".into(), "name".into()]),
                session_id: None,
            })
            .await
            .expect("save");

        let selected = server
            .apply_preset(ApplyPresetParams {
                session_id: preview.session_id.clone(),
                name: "contact".into(),
            })
            .await
            .expect("apply");
        assert_eq!(selected, vec!["name", "email"]);

        let response = server
            .export_columns(ExportColumnsParams {
                session_id: preview.session_id,
                output_file: Some("contacts.txt".into()),
                wait: Some(true),
                ..Default::default()
            })
            .await
            .expect("export");
        assert!(response.output_file.ends_with("contacts.csv"));
        let output = fs::read_to_string(dir.path().join("contacts.csv")).expect("output");
        assert_eq!(output, "name,email\nAnn,a@x\n");

        let err = server
            .apply_preset(ApplyPresetParams {
                session_id: "missing".into(),
                name: "contact".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TranscodeError::SessionNotFound(_)));
    }
}
