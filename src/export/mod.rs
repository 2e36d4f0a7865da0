pub mod guard;

pub use guard::ExportGuard;

use crate::csv_processor::{
    check_admission, encode_line, write_line, ByteSource, ChunkBoundaryManager, ChunkRange,
    ColumnReconciler, ColumnSelection, CsvSink, ExportArtifact, HeaderRow, TokenizerOptions,
    WindowChunker,
};
use crate::utils::{Result, StructuralWarning, TranscodeError, TranscodeOptions};
use serde::{Deserialize, Serialize};

/// Warnings past this many are counted but not kept.
pub const MAX_REPORTED_WARNINGS: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportReport {
    /// Projected header, as written on the first output line.
    pub columns: Vec<String>,
    /// Full header at the end of the pass, including any `extra_*` columns.
    pub header: HeaderRow,
    pub rows_written: usize,
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub windows: usize,
    pub padded_rows: usize,
    pub overlong_rows: usize,
    pub warnings: Vec<StructuralWarning>,
    pub warnings_suppressed: usize,
    pub artifact: Option<ExportArtifact>,
}

/// One streaming export pass. Each call to [`ExportRun::next_chunk`] reads at
/// most one window from the source and returns the encoded CSV it produced;
/// the projected header comes out first.
pub struct ExportRun<B> {
    source: B,
    windows: Vec<ChunkRange>,
    next_window: usize,
    total_bytes: u64,
    bytes_read: u64,
    manager: ChunkBoundaryManager,
    reconciler: ColumnReconciler,
    selection: ColumnSelection,
    columns: Vec<String>,
    header_line: Option<String>,
    header_skipped: bool,
    rows_written: usize,
    warnings: Vec<StructuralWarning>,
    warnings_suppressed: usize,
    failed: bool,
    _guard: Option<ExportGuard>,
}

impl<B: ByteSource> ExportRun<B> {
    /// Validates the selection against `header` and the source against the
    /// admission ceiling. Nothing is read yet.
    pub fn new(
        source: B,
        header: HeaderRow,
        selection: ColumnSelection,
        tokenizer: TokenizerOptions,
        options: &TranscodeOptions,
    ) -> Result<Self> {
        if header.is_empty() {
            return Err(TranscodeError::NoHeader);
        }
        if selection.is_empty() {
            return Err(TranscodeError::EmptySelection);
        }
        if let Some(&index) = selection.indices().iter().find(|&&i| i >= header.len()) {
            return Err(TranscodeError::ColumnOutOfRange {
                index,
                columns: header.len(),
            });
        }

        let total_bytes = source.len();
        check_admission(total_bytes, options)?;

        let windows = WindowChunker::new(options.chunk_size_bytes).calculate_chunks(total_bytes);
        let columns = selection.names(&header);
        let mut header_line = encode_line(columns.iter().map(|c| Some(c.as_str())));
        header_line.push('\n');

        Ok(Self {
            source,
            windows,
            next_window: 0,
            total_bytes,
            bytes_read: 0,
            manager: ChunkBoundaryManager::new(tokenizer, options.max_residue_bytes),
            reconciler: ColumnReconciler::new(header),
            selection,
            columns,
            header_line: Some(header_line),
            header_skipped: false,
            rows_written: 0,
            warnings: Vec::new(),
            warnings_suppressed: 0,
            failed: false,
            _guard: None,
        })
    }

    /// Ties the session's export flag to the lifetime of this run.
    pub fn with_guard(mut self, guard: ExportGuard) -> Self {
        self._guard = Some(guard);
        self
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn window_count(&self) -> usize {
        self.windows.len()
    }

    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    pub fn is_finished(&self) -> bool {
        self.manager.is_finished()
    }

    /// Whole percent of the source consumed. Never decreases; 100 only once
    /// the final window has been flushed.
    pub fn percent(&self) -> u8 {
        if self.is_finished() {
            return 100;
        }
        if self.total_bytes == 0 {
            return 0;
        }
        (self.bytes_read.saturating_mul(100) / self.total_bytes).min(99) as u8
    }

    /// Next encoded chunk, or `None` once the source is exhausted. A chunk may
    /// be empty when a window completed no rows.
    pub fn next_chunk(&mut self) -> Result<Option<String>> {
        if self.failed {
            return Ok(None);
        }
        if let Some(line) = self.header_line.take() {
            return Ok(Some(line));
        }
        let Some(range) = self.windows.get(self.next_window).copied() else {
            return Ok(None);
        };
        self.next_window += 1;

        match self.process_window(range) {
            Ok(chunk) => Ok(Some(chunk)),
            Err(e) => {
                self.failed = true;
                Err(e)
            }
        }
    }

    fn process_window(&mut self, range: ChunkRange) -> Result<String> {
        let bytes = self.source.read_range(range.offset, range.len)?;
        self.bytes_read += bytes.len() as u64;

        let output = self.manager.feed(&bytes, range.is_last)?;
        self.record_warnings(output.warnings);

        let mut chunk = String::new();
        let mut rows = 0;
        for mut row in output.rows {
            if !self.header_skipped {
                self.header_skipped = true;
                continue;
            }
            self.reconciler.reconcile(&mut row);
            write_line(&mut chunk, self.selection.project(&row));
            chunk.push('\n');
            rows += 1;
        }
        self.rows_written += rows;
        let reconciled = self.reconciler.take_warnings();
        self.record_warnings(reconciled);

        tracing::debug!(
            window = range.index,
            offset = range.offset,
            len = range.len,
            rows,
            residue_bytes = self.manager.residue().len(),
            "Window exported"
        );

        Ok(chunk)
    }

    fn record_warnings(&mut self, warnings: Vec<StructuralWarning>) {
        for warning in warnings {
            if self.warnings.len() < MAX_REPORTED_WARNINGS {
                self.warnings.push(warning);
            } else {
                self.warnings_suppressed += 1;
            }
        }
    }

    pub fn into_report(self, artifact: Option<ExportArtifact>, bytes_written: u64) -> ExportReport {
        ExportReport {
            columns: self.columns,
            padded_rows: self.reconciler.padded_rows(),
            overlong_rows: self.reconciler.overlong_rows(),
            header: self.reconciler.into_header(),
            rows_written: self.rows_written,
            bytes_read: self.bytes_read,
            bytes_written,
            windows: self.windows.len(),
            warnings: self.warnings,
            warnings_suppressed: self.warnings_suppressed,
            artifact,
        }
    }
}

impl<B: ByteSource> Iterator for ExportRun<B> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_chunk().transpose()
    }
}

/// Drives `run` to completion into `sink`, yielding to the scheduler between
/// windows. On any error the sink is discarded and nothing is handed back.
pub async fn run_export<B, S, F>(mut run: ExportRun<B>, mut sink: S, mut on_progress: F) -> Result<ExportReport>
where
    B: ByteSource,
    S: CsvSink,
    F: FnMut(u8),
{
    tracing::info!(
        windows = run.window_count(),
        columns = run.columns().len(),
        "Export started"
    );

    if let Err(e) = pump(&mut run, &mut sink, &mut on_progress).await {
        tracing::error!(error = %e, rows_written = run.rows_written(), "Export failed");
        sink.discard();
        return Err(e);
    }

    let bytes_written = sink.bytes_written();
    let artifact = sink.finish()?;
    let report = run.into_report(Some(artifact), bytes_written);

    tracing::info!(
        rows = report.rows_written,
        bytes_read = report.bytes_read,
        bytes_written = report.bytes_written,
        padded = report.padded_rows,
        overlong = report.overlong_rows,
        warnings = report.warnings.len() + report.warnings_suppressed,
        "Export completed"
    );

    Ok(report)
}

async fn pump<B, S, F>(run: &mut ExportRun<B>, sink: &mut S, on_progress: &mut F) -> Result<()>
where
    B: ByteSource,
    S: CsvSink,
    F: FnMut(u8),
{
    while let Some(chunk) = run.next_chunk()? {
        if !chunk.is_empty() {
            sink.write_chunk(&chunk)?;
        }
        on_progress(run.percent());
        tokio::task::yield_now().await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csv_processor::{preview_text, AtomicFileSink, MemorySource, MemorySink};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn prepare(input: &str, chunk_size: usize) -> (HeaderRow, TokenizerOptions, TranscodeOptions) {
        let options = TranscodeOptions::default().with_chunk_size(chunk_size);
        let report = preview_text(input, true, &options);
        let tokenizer = report.tokenizer_options(&options);
        (report.header, tokenizer, options)
    }

    fn run_for(input: &str, chunk_size: usize, indices: &[usize]) -> ExportRun<MemorySource> {
        let (header, tokenizer, options) = prepare(input, chunk_size);
        let selection = ColumnSelection::new(indices.iter().copied(), &header).expect("selection");
        ExportRun::new(MemorySource::new(input), header, selection, tokenizer, &options).expect("run")
    }

    async fn export_to_string(input: &str, chunk_size: usize, indices: &[usize]) -> (String, Vec<u8>) {
        let mut progress = Vec::new();
        let report = run_export(run_for(input, chunk_size, indices), MemorySink::new(), |p| {
            progress.push(p)
        })
        .await
        .expect("export");
        let blob = report.artifact.and_then(|a| a.as_blob().map(str::to_string));
        (blob.expect("blob"), progress)
    }

    #[tokio::test]
    async fn test_projects_selected_columns() {
        let input = "id,name,city\n1,Alice,Paris\n2,\"Smith, Bob\",Rome\n";
        let (out, progress) = export_to_string(input, 1024, &[1, 2]).await;
        assert_eq!(out, "name,city\nAlice,Paris\n\"Smith, Bob\",Rome\n");
        assert_eq!(progress.last(), Some(&100));
    }

    #[tokio::test]
    async fn test_header_only_input() {
        let (out, progress) = export_to_string("a,b,c\n", 1024, &[0, 2]).await;
        assert_eq!(out, "a,c\n");
        assert_eq!(progress.last(), Some(&100));
    }

    #[tokio::test]
    async fn test_short_rows_padded() {
        let (out, _) = export_to_string("a,b,c,d\nx,y\n", 1024, &[0, 1, 2, 3]).await;
        assert_eq!(out, "a,b,c,d\nx,y,,\n");
    }

    #[tokio::test]
    async fn test_surplus_fields_extend_header_once() {
        let input = "a,b\n1,2\n3,4,5\n6,7,8,9\n";
        let (header, tokenizer, options) = prepare(input, 4);
        let selection = ColumnSelection::all(&header).expect("selection");
        let run = ExportRun::new(MemorySource::new(input), header, selection, tokenizer, &options)
            .expect("run");
        let report = run_export(run, MemorySink::new(), |_| {}).await.expect("export");

        // preview already saw the wide rows and extended the header by one
        assert_eq!(report.header.names(), vec!["a", "b", "extra_1"]);
        assert_eq!(report.header.extra_count(), 1);
        assert_eq!(report.overlong_rows, 1);
        assert_eq!(
            report.artifact.and_then(|a| a.as_blob().map(str::to_string)).as_deref(),
            Some("a,b,extra_1\n1,2,\n3,4,5\n6,7,8\n")
        );
    }

    #[tokio::test]
    async fn test_window_size_does_not_change_output() {
        let input = "h1,h2,h3\r\n\"a,1\",\"multi\r\nline\",x\r\nb,\"q\"\"q\",  y\rc,,\n\"é\",ü,ß";
        let (whole, _) = export_to_string(input, 1 << 20, &[0, 1, 2]).await;
        for window in 1..=11 {
            let (windowed, progress) = export_to_string(input, window, &[0, 1, 2]).await;
            assert_eq!(windowed, whole, "window size {}", window);
            assert!(progress.windows(2).all(|w| w[0] <= w[1]));
            assert_eq!(progress.last(), Some(&100));
        }
    }

    #[tokio::test]
    async fn test_decode_error_discards_file() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let target = dir.path().join("out.csv");

        let input = b"a,b\n1,2\n\xff\xfe,3\n".to_vec();
        let options = TranscodeOptions::default().with_chunk_size(4);
        let header = HeaderRow::from_fields(vec!["a".into(), "b".into()]);
        let selection = ColumnSelection::all(&header).expect("selection");
        let tokenizer = TokenizerOptions::for_delimiter(crate::csv_processor::Delimiter::Comma);
        let run = ExportRun::new(MemorySource::new(input), header, selection, tokenizer, &options)
            .expect("run");

        let sink = AtomicFileSink::create(&target).expect("sink");
        let err = run_export(run, sink, |_| {}).await.unwrap_err();
        assert!(matches!(err, TranscodeError::Decode { offset: 8, .. }));
        assert!(!target.exists());
        assert_eq!(std::fs::read_dir(dir.path()).expect("read dir").count(), 0);
    }

    #[test]
    fn test_selection_checked_against_header() {
        let header = HeaderRow::from_fields(vec!["a".into()]);
        let selection = ColumnSelection::all(&HeaderRow::from_fields(vec!["a".into(), "b".into()]))
            .expect("selection");
        let err = ExportRun::new(
            MemorySource::new("a\n1\n"),
            header,
            selection,
            TokenizerOptions::for_delimiter(crate::csv_processor::Delimiter::Comma),
            &TranscodeOptions::default(),
        )
        .err()
        .expect("error");
        assert!(matches!(err, TranscodeError::ColumnOutOfRange { index: 1, columns: 1 }));
    }

    #[test]
    fn test_pull_iterator_yields_header_first() {
        let run = run_for("a,b\n1,2\n3,4\n", 3, &[1]);
        let chunks: Vec<String> = run.collect::<Result<_>>().expect("chunks");
        assert_eq!(chunks[0], "b\n");
        assert_eq!(chunks.concat(), "b\n2\n4\n");
    }

    #[tokio::test]
    async fn test_guard_released_after_run() {
        let flag = Arc::new(AtomicBool::new(false));
        let guard = ExportGuard::reserve(&flag).expect("guard");
        let run = run_for("a\n1\n", 2, &[0]).with_guard(guard);
        assert!(flag.load(Ordering::Acquire));
        run_export(run, MemorySink::new(), |_| {}).await.expect("export");
        assert!(!flag.load(Ordering::Acquire));
    }

    #[test]
    fn test_admission_checked_on_start() {
        let input = "a\n1\n";
        let (header, tokenizer, _) = prepare(input, 4);
        let options = TranscodeOptions::default().with_max_file_bytes(2);
        let selection = ColumnSelection::all(&header).expect("selection");
        let err = ExportRun::new(MemorySource::new(input), header, selection, tokenizer, &options)
            .err()
            .expect("error");
        assert!(matches!(err, TranscodeError::FileTooLarge { .. }));
    }
}
