use crate::csv_processor::tokenizer::{Lexeme, Lexer, Tokenized, Tokenizer, TokenizerOptions};
use crate::utils::{Result, StructuralWarning, TranscodeError};

const BOM: char = '\u{feff}';

/// Byte offset just past the last row terminator that sits outside any quoted
/// span. A `\r` ending the buffer does not count: it may be half of `\r\n`.
pub fn find_safe_cut(text: &str, options: &TokenizerOptions) -> Option<usize> {
    let mut cut = None;
    for lexeme in Lexer::new(text, options) {
        if let Lexeme::Terminator { end } = lexeme {
            if end == text.len() && text.ends_with('\r') {
                continue;
            }
            cut = Some(end);
        }
    }
    cut
}

#[derive(Debug, Default)]
pub struct WindowOutput {
    pub rows: Vec<Vec<String>>,
    pub warnings: Vec<StructuralWarning>,
}

/// Feeds successive byte windows through the tokenizer without losing or
/// duplicating a row that straddles a window edge.
pub struct ChunkBoundaryManager {
    tokenizer: Tokenizer,
    residue: String,
    pending_bytes: Vec<u8>,
    bytes_fed: u64,
    bom_checked: bool,
    finished: bool,
    max_residue_bytes: usize,
}

impl ChunkBoundaryManager {
    pub fn new(options: TokenizerOptions, max_residue_bytes: usize) -> Self {
        Self {
            tokenizer: Tokenizer::new(options),
            residue: String::new(),
            pending_bytes: Vec::new(),
            bytes_fed: 0,
            bom_checked: false,
            finished: false,
            max_residue_bytes,
        }
    }

    pub fn residue(&self) -> &str {
        &self.residue
    }

    pub fn bytes_fed(&self) -> u64 {
        self.bytes_fed
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Decodes `bytes` (carrying an incomplete trailing UTF-8 sequence over to
    /// the next call) and returns every row completed so far.
    pub fn feed(&mut self, bytes: &[u8], is_last: bool) -> Result<WindowOutput> {
        let mut buf = std::mem::take(&mut self.pending_bytes);
        let start = self.bytes_fed - buf.len() as u64;
        buf.extend_from_slice(bytes);
        self.bytes_fed += bytes.len() as u64;

        let valid = match std::str::from_utf8(&buf) {
            Ok(_) => buf.len(),
            Err(e) if e.error_len().is_none() && !is_last => e.valid_up_to(),
            Err(e) => {
                return Err(TranscodeError::Decode {
                    offset: start + e.valid_up_to() as u64,
                    source: e,
                })
            }
        };
        self.pending_bytes = buf.split_off(valid);
        let text = String::from_utf8(buf).map_err(|e| TranscodeError::Decode {
            offset: start,
            source: e.utf8_error(),
        })?;

        Ok(self.feed_text(&text, is_last))
    }

    pub fn feed_text(&mut self, text: &str, is_last: bool) -> WindowOutput {
        let mut text = text;
        if !self.bom_checked && !text.is_empty() {
            self.bom_checked = true;
            text = text.strip_prefix(BOM).unwrap_or(text);
        }

        let mut combined = std::mem::take(&mut self.residue);
        combined.push_str(text);

        let mut output = WindowOutput::default();

        if is_last {
            self.finished = true;
            let tokenized = self.tokenizer.tokenize(&combined, true);
            if tokenized.unterminated_quote {
                let warning = StructuralWarning::UnterminatedQuote {
                    offset: self.bytes_fed,
                };
                tracing::warn!(%warning, "Flushing unterminated quoted field");
                output.warnings.push(warning);
            }
            self.collect(tokenized, &mut output);
            return output;
        }

        let cut = find_safe_cut(&combined, self.tokenizer.options()).unwrap_or(0);
        let residue_len = combined.len() - cut;

        if residue_len > self.max_residue_bytes {
            let warning = StructuralWarning::SplitLine {
                offset: self.bytes_fed,
                residue_bytes: residue_len,
            };
            tracing::warn!(%warning, "No safe cut point; accepting the whole buffer");
            output.warnings.push(warning);
            let tokenized = self.tokenizer.tokenize(&combined, true);
            self.collect(tokenized, &mut output);
            return output;
        }

        let tokenized = self.tokenizer.tokenize(&combined[..cut], false);
        debug_assert!(tokenized.tail.is_none());
        self.residue = combined[cut..].to_string();
        self.collect(tokenized, &mut output);

        tracing::trace!(
            rows = output.rows.len(),
            residue_bytes = self.residue.len(),
            "Window tokenized"
        );

        output
    }

    fn collect(&self, tokenized: Tokenized, output: &mut WindowOutput) {
        if tokenized.truncated_fields > 0 {
            let warning = StructuralWarning::FieldTruncated {
                count: tokenized.truncated_fields,
            };
            tracing::warn!(%warning, max_chars = self.tokenizer.options().max_field_chars, "Oversized fields truncated");
            output.warnings.push(warning);
        }
        output.rows.extend(tokenized.rows);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csv_processor::delimiter::Delimiter;

    fn manager(delimiter: Delimiter) -> ChunkBoundaryManager {
        ChunkBoundaryManager::new(TokenizerOptions::for_delimiter(delimiter), 1 << 20)
    }

    fn feed_in_windows(input: &[u8], window: usize, delimiter: Delimiter) -> Vec<Vec<String>> {
        let mut m = manager(delimiter);
        let mut rows = Vec::new();
        let mut offset = 0;
        loop {
            let end = (offset + window).min(input.len());
            let is_last = end == input.len();
            rows.extend(m.feed(&input[offset..end], is_last).expect("feed").rows);
            if is_last {
                break;
            }
            offset = end;
        }
        rows
    }

    #[test]
    fn test_safe_cut_skips_quoted_terminators() {
        let options = TokenizerOptions::for_delimiter(Delimiter::Comma);
        let text = "a,b\n1,\"x\ny\"\n2,\"open\n";
        assert_eq!(find_safe_cut(text, &options), Some(12));
        assert_eq!(&text[..12], "a,b\n1,\"x\ny\"\n");
    }

    #[test]
    fn test_safe_cut_defers_trailing_cr() {
        let options = TokenizerOptions::for_delimiter(Delimiter::Comma);
        assert_eq!(find_safe_cut("a,b\r\n1,2\r", &options), Some(5));
        assert_eq!(find_safe_cut("a,b\r1,2", &options), Some(4));
        assert_eq!(find_safe_cut("no terminator", &options), None);
    }

    #[test]
    fn test_row_straddling_windows() {
        let mut m = manager(Delimiter::Comma);
        let first = m.feed(b"a,b\n1,\"hel", false).expect("feed");
        assert_eq!(first.rows, vec![vec!["a", "b"]]);
        assert_eq!(m.residue(), "1,\"hel");

        let second = m.feed(b"lo\nworld\"\n2,x", false).expect("feed");
        assert_eq!(second.rows, vec![vec!["1", "hello\nworld"]]);
        assert_eq!(m.residue(), "2,x");

        let last = m.feed(b"", true).expect("feed");
        assert_eq!(last.rows, vec![vec!["2", "x"]]);
        assert!(m.is_finished());
    }

    #[test]
    fn test_window_size_does_not_change_rows() {
        let input = "h1,h2,h3\r\n\"a,1\",\"multi\r\nline\",x\r\nb,\"q\"\"q\",y\rc,,\n\"é\",ü,ß".as_bytes();
        let whole = feed_in_windows(input, input.len(), Delimiter::Comma);
        for window in 1..=9 {
            assert_eq!(feed_in_windows(input, window, Delimiter::Comma), whole, "window {window}");
        }
        assert_eq!(whole.len(), 5);
        assert_eq!(whole[1], vec!["a,1", "multi\r\nline", "x"]);
        assert_eq!(whole[4], vec!["é", "ü", "ß"]);
    }

    #[test]
    fn test_tsv_literal_quotes_across_windows() {
        let input = "a\tb\n5\" screen\t\"quoted\tcell\"\nlast\trow\n".as_bytes();
        let whole = feed_in_windows(input, input.len(), Delimiter::Tab);
        for window in 1..=7 {
            assert_eq!(feed_in_windows(input, window, Delimiter::Tab), whole, "window {window}");
        }
        assert_eq!(whole[1], vec!["5\" screen", "quoted\tcell"]);
        assert_eq!(whole[2], vec!["last", "row"]);
    }

    #[test]
    fn test_tsv_doubled_quote_before_tab_across_windows() {
        let input = "h1\th2\n\"abc\"\"\tx\nr2\ty\n\"say \"\"hi\"\"\"\tz\n".as_bytes();
        let whole = feed_in_windows(input, input.len(), Delimiter::Tab);
        for window in 1..=8 {
            assert_eq!(feed_in_windows(input, window, Delimiter::Tab), whole, "window {window}");
        }
        assert_eq!(whole.len(), 4);
        assert_eq!(whole[1], vec!["abc\"", "x"]);
        assert_eq!(whole[2], vec!["r2", "y"]);
        assert_eq!(whole[3], vec!["say \"hi\"", "z"]);
    }

    #[test]
    fn test_bom_stripped_even_when_split() {
        let mut input = vec![0xEF, 0xBB, 0xBF];
        input.extend_from_slice(b"id,name\n1,a\n");
        let rows = feed_in_windows(&input, 1, Delimiter::Comma);
        assert_eq!(rows[0], vec!["id", "name"]);
    }

    #[test]
    fn test_invalid_utf8_is_decode_error() {
        let mut m = manager(Delimiter::Comma);
        m.feed(b"a,b\n", false).expect("feed");
        let err = m.feed(&[b'x', 0xFF, b'y'], false).unwrap_err();
        match err {
            TranscodeError::Decode { offset, .. } => assert_eq!(offset, 5),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_truncated_utf8_at_end_is_decode_error() {
        let mut m = manager(Delimiter::Comma);
        let err = m.feed(&[b'a', 0xE6, 0x9D], true).unwrap_err();
        assert!(matches!(err, TranscodeError::Decode { offset: 1, .. }));
    }

    #[test]
    fn test_degrades_when_residue_exceeds_limit() {
        let mut m = ChunkBoundaryManager::new(TokenizerOptions::for_delimiter(Delimiter::Comma), 8);
        let out = m.feed(b"a,b\n1,\"never closed and long", false).expect("feed");
        assert_eq!(out.rows.len(), 2);
        assert!(matches!(out.warnings[0], StructuralWarning::SplitLine { .. }));
        assert_eq!(m.residue(), "");
    }

    #[test]
    fn test_unterminated_quote_warning_on_flush() {
        let mut m = manager(Delimiter::Comma);
        let out = m.feed(b"a,b\n1,\"open", true).expect("feed");
        assert_eq!(out.rows[1], vec!["1", "open"]);
        assert!(matches!(out.warnings[0], StructuralWarning::UnterminatedQuote { .. }));
    }
}
