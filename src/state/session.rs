use crate::csv_processor::{
    preview_source, ByteSource, ColumnSelection, CsvSink, Delimiter, HeaderRow, PreviewReport,
    TokenizerOptions,
};
use crate::export::{run_export, ExportGuard, ExportReport, ExportRun};
use crate::state::presets::ColumnPreset;
use crate::utils::{output_file_name, Result, TranscodeError, TranscodeOptions};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Everything learned about one input: its structure from the preview and the
/// columns the user picked. Opening a different file means a new session.
///
/// Clones share the export flag, so at most one export runs per session no
/// matter how many handles exist.
#[derive(Debug, Clone)]
pub struct TranscodeSession {
    id: String,
    source_name: String,
    source_len: u64,
    preview: PreviewReport,
    selection: Option<ColumnSelection>,
    options: TranscodeOptions,
    exporting: Arc<AtomicBool>,
}

impl TranscodeSession {
    pub fn open<B: ByteSource>(
        source_name: impl Into<String>,
        source: &mut B,
        options: TranscodeOptions,
    ) -> Result<Self> {
        let source_name = source_name.into();
        let preview = preview_source(source, &options)?;
        let session = Self::from_preview(source_name, preview, options);

        tracing::info!(
            session_id = %session.id,
            source = %session.source_name,
            bytes = session.source_len,
            delimiter = %session.delimiter(),
            columns = session.header().len(),
            "Session opened"
        );
        Ok(session)
    }

    pub fn from_preview(source_name: impl Into<String>, preview: PreviewReport, options: TranscodeOptions) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source_name: source_name.into(),
            source_len: preview.file_size_bytes,
            preview,
            selection: None,
            options,
            exporting: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn source_len(&self) -> u64 {
        self.source_len
    }

    pub fn delimiter(&self) -> Delimiter {
        self.preview.delimiter
    }

    pub fn header(&self) -> &HeaderRow {
        &self.preview.header
    }

    pub fn preview(&self) -> &PreviewReport {
        &self.preview
    }

    pub fn options(&self) -> &TranscodeOptions {
        &self.options
    }

    pub fn selection(&self) -> Option<&ColumnSelection> {
        self.selection.as_ref()
    }

    pub fn is_exporting(&self) -> bool {
        self.exporting.load(Ordering::Acquire)
    }

    pub fn tokenizer_options(&self) -> TokenizerOptions {
        self.preview.tokenizer_options(&self.options)
    }

    pub fn select_columns(&mut self, indices: impl IntoIterator<Item = usize>) -> Result<&ColumnSelection> {
        let selection = ColumnSelection::new(indices, self.header())?;
        Ok(self.selection.insert(selection))
    }

    pub fn select_by_names<S: AsRef<str>>(&mut self, names: &[S]) -> Result<&ColumnSelection> {
        let selection = ColumnSelection::by_names(names, self.header())?;
        Ok(self.selection.insert(selection))
    }

    pub fn select_all(&mut self) -> Result<&ColumnSelection> {
        let selection = ColumnSelection::all(self.header())?;
        Ok(self.selection.insert(selection))
    }

    pub fn apply_preset(&mut self, preset: &ColumnPreset) -> Result<&ColumnSelection> {
        let selection = preset.apply(self.header())?;
        tracing::debug!(session_id = %self.id, preset = %preset.name, columns = selection.len(), "Preset applied");
        Ok(self.selection.insert(selection))
    }

    pub fn to_preset(&self, name: impl Into<String>) -> Result<ColumnPreset> {
        let selection = self.selection.as_ref().ok_or(TranscodeError::EmptySelection)?;
        ColumnPreset::from_selection(name, selection, self.header())
    }

    pub fn output_file_name(&self, override_name: Option<&str>) -> String {
        output_file_name(&self.source_name, override_name)
    }

    /// Starts an export pass over `source` with the current selection. Fails
    /// before any I/O when nothing is selected or another pass is running.
    pub fn start_export<B: ByteSource>(&self, source: B) -> Result<ExportRun<B>> {
        let selection = self.selection.clone().ok_or(TranscodeError::EmptySelection)?;
        let guard = ExportGuard::reserve(&self.exporting)?;

        if source.len() != self.source_len {
            tracing::warn!(
                session_id = %self.id,
                previewed = self.source_len,
                actual = source.len(),
                "Source size changed since preview"
            );
        }

        let run = ExportRun::new(
            source,
            self.header().clone(),
            selection,
            self.tokenizer_options(),
            &self.options,
        )?;
        Ok(run.with_guard(guard))
    }

    /// Runs a full export into `sink` and keeps any header columns the pass
    /// discovered.
    pub async fn export<B, S, F>(&mut self, source: B, sink: S, on_progress: F) -> Result<ExportReport>
    where
        B: ByteSource,
        S: CsvSink,
        F: FnMut(u8),
    {
        let run = self.start_export(source)?;
        let report = run_export(run, sink, on_progress).await?;
        self.absorb_header(&report.header);
        Ok(report)
    }

    /// Adopts a header grown during an export so later selections can see the
    /// `extra_*` columns.
    pub fn absorb_header(&mut self, header: &HeaderRow) {
        if header.len() > self.preview.header.len() {
            self.preview.header = header.clone();
        }
    }
}
