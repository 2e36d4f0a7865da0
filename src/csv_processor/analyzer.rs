use crate::csv_processor::boundary::find_safe_cut;
use crate::csv_processor::delimiter::{detect_delimiter, Delimiter};
use crate::csv_processor::reader::{check_admission, ByteSource};
use crate::csv_processor::reconciler::{ColumnReconciler, HeaderRow};
use crate::csv_processor::tokenizer::{Tokenizer, TokenizerOptions};
use crate::utils::{Result, StructuralWarning, TranscodeError, TranscodeOptions};
use serde::{Deserialize, Serialize};

const BOM: char = '\u{feff}';

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewReport {
    /// Length of the whole source; 0 when built from text alone.
    pub file_size_bytes: u64,
    pub delimiter: Delimiter,
    pub header: HeaderRow,
    pub sample_rows: Vec<Vec<String>>,
    pub warnings: Vec<StructuralWarning>,
    /// The preview saw only a prefix of the source.
    pub truncated: bool,
}

impl PreviewReport {
    pub fn column_names(&self) -> Vec<String> {
        self.header.names()
    }

    pub fn tokenizer_options(&self, options: &TranscodeOptions) -> TokenizerOptions {
        TokenizerOptions::for_delimiter(self.delimiter).with_max_field_chars(options.max_field_chars)
    }
}

/// Reads the first `preview_bytes` of `source` and infers delimiter, header
/// and a handful of sample rows.
pub fn preview_source<B: ByteSource>(source: &mut B, options: &TranscodeOptions) -> Result<PreviewReport> {
    let size = source.len();
    check_admission(size, options)?;

    let prefix = source.read_range(0, options.preview_bytes)?;
    let whole = prefix.len() as u64 >= size;

    let text = match std::str::from_utf8(&prefix) {
        Ok(text) => text,
        Err(e) if e.error_len().is_none() && !whole => {
            // Only the trailing partial sequence is cut; everything before it
            // was already validated.
            std::str::from_utf8(&prefix[..e.valid_up_to()]).map_err(|source| TranscodeError::Decode {
                offset: 0,
                source,
            })?
        }
        Err(e) => {
            return Err(TranscodeError::Decode {
                offset: e.valid_up_to() as u64,
                source: e,
            })
        }
    };

    let mut report = preview_text(text, whole, options);
    report.file_size_bytes = size;
    Ok(report)
}

/// `complete` says whether `text` is the entire input; if not, the text is cut
/// back to the last row boundary outside quotes before parsing.
pub fn preview_text(text: &str, complete: bool, options: &TranscodeOptions) -> PreviewReport {
    let text = text.strip_prefix(BOM).unwrap_or(text);
    let delimiter = detect_delimiter(text);
    let tokenizer_options =
        TokenizerOptions::for_delimiter(delimiter).with_max_field_chars(options.max_field_chars);

    let text = if complete {
        text
    } else {
        match find_safe_cut(text, &tokenizer_options) {
            Some(cut) => &text[..cut],
            None => text,
        }
    };

    let tokenized = Tokenizer::new(tokenizer_options).tokenize_limited(
        text,
        true,
        options.preview_rows.saturating_add(1),
    );

    let mut warnings = Vec::new();
    if tokenized.truncated_fields > 0 {
        warnings.push(StructuralWarning::FieldTruncated {
            count: tokenized.truncated_fields,
        });
    }

    let mut rows = tokenized.rows.into_iter();
    let header = rows.next().map(HeaderRow::from_fields).unwrap_or_default();
    let mut reconciler = ColumnReconciler::new(header);
    let mut sample_rows = Vec::new();

    for (i, mut row) in rows.enumerate() {
        let expected = reconciler.header().len();
        if row.len() != expected {
            let warning = StructuralWarning::ColumnCountMismatch {
                row: i + 1,
                expected,
                found: row.len(),
            };
            tracing::warn!(%warning, "Preview row does not match header");
            warnings.push(warning);
        }
        reconciler.reconcile(&mut row);
        warnings.extend(
            reconciler
                .take_warnings()
                .into_iter()
                .filter(|w| matches!(w, StructuralWarning::HeaderExtended { .. })),
        );
        sample_rows.push(row);
    }

    let header = reconciler.into_header();
    tracing::debug!(
        %delimiter,
        columns = header.len(),
        samples = sample_rows.len(),
        warnings = warnings.len(),
        "Preview built"
    );

    PreviewReport {
        file_size_bytes: 0,
        delimiter,
        header,
        sample_rows,
        warnings,
        truncated: !complete,
    }
}
