use crate::csv_processor::delimiter::Delimiter;
use crate::utils::config::DEFAULT_MAX_FIELD_CHARS;
use std::iter::Peekable;
use std::str::CharIndices;

const QUOTE: char = '"';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenizerOptions {
    pub delimiter: Delimiter,
    pub literal_quotes: bool,
    pub max_field_chars: usize,
}

impl TokenizerOptions {
    pub fn for_delimiter(delimiter: Delimiter) -> Self {
        Self {
            delimiter,
            literal_quotes: delimiter.literal_quotes(),
            max_field_chars: DEFAULT_MAX_FIELD_CHARS,
        }
    }

    pub fn with_literal_quotes(mut self, literal_quotes: bool) -> Self {
        self.literal_quotes = literal_quotes;
        self
    }

    pub fn with_max_field_chars(mut self, max_field_chars: usize) -> Self {
        self.max_field_chars = max_field_chars;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lexeme {
    Char(char),
    /// Opening or closing quote; contributes no content.
    Quote,
    Delimiter,
    /// `end` is the byte offset just past the terminator.
    Terminator { end: usize },
}

/// Quote-state machine shared by the tokenizer and the safe-cut scanner so
/// both agree on where quoted spans begin and end.
pub(crate) struct Lexer<'a> {
    chars: Peekable<CharIndices<'a>>,
    delimiter: char,
    literal_quotes: bool,
    in_quotes: bool,
    at_field_start: bool,
}

impl<'a> Lexer<'a> {
    pub(crate) fn new(text: &'a str, options: &TokenizerOptions) -> Self {
        Self {
            chars: text.char_indices().peekable(),
            delimiter: options.delimiter.as_char(),
            literal_quotes: options.literal_quotes,
            in_quotes: false,
            at_field_start: true,
        }
    }

    pub(crate) fn in_quotes(&self) -> bool {
        self.in_quotes
    }

    fn is_field_edge(&self, next: Option<char>) -> bool {
        match next {
            None | Some('\n') | Some('\r') => true,
            Some(c) => c == self.delimiter,
        }
    }

    fn char_after_pair(&self) -> Option<char> {
        let mut ahead = self.chars.clone();
        ahead.next();
        ahead.peek().map(|&(_, c)| c)
    }
}

impl Iterator for Lexer<'_> {
    type Item = Lexeme;

    fn next(&mut self) -> Option<Lexeme> {
        let (i, c) = self.chars.next()?;
        let next = self.chars.peek().map(|&(_, n)| n);

        if self.in_quotes {
            if c == QUOTE {
                if next == Some(QUOTE) {
                    // In literal mode a pair right before a field edge is a
                    // literal quote followed by the closing one.
                    if !(self.literal_quotes && self.is_field_edge(self.char_after_pair())) {
                        self.chars.next();
                    }
                    return Some(Lexeme::Char(QUOTE));
                }
                if !self.literal_quotes || self.is_field_edge(next) {
                    self.in_quotes = false;
                    return Some(Lexeme::Quote);
                }
            }
            return Some(Lexeme::Char(c));
        }

        if c == self.delimiter {
            self.at_field_start = true;
            return Some(Lexeme::Delimiter);
        }

        match c {
            '\r' if next == Some('\n') => {
                self.chars.next();
                self.at_field_start = true;
                Some(Lexeme::Terminator { end: i + 2 })
            }
            '\r' | '\n' => {
                self.at_field_start = true;
                Some(Lexeme::Terminator { end: i + 1 })
            }
            QUOTE
                if !self.literal_quotes
                    || (self.at_field_start && !self.is_field_edge(next)) =>
            {
                self.in_quotes = true;
                self.at_field_start = false;
                Some(Lexeme::Quote)
            }
            _ => {
                self.at_field_start = false;
                Some(Lexeme::Char(c))
            }
        }
    }
}

/// The row still being read when the buffer ran out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialRow {
    pub fields: Vec<String>,
    pub in_quotes: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Tokenized {
    pub rows: Vec<Vec<String>>,
    pub tail: Option<PartialRow>,
    pub unterminated_quote: bool,
    pub truncated_fields: usize,
}

#[derive(Debug, Clone)]
pub struct Tokenizer {
    options: TokenizerOptions,
}

impl Tokenizer {
    pub fn new(options: TokenizerOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &TokenizerOptions {
        &self.options
    }

    /// Splits `text` into rows. With `at_end` the trailing row is emitted even
    /// without a terminator; otherwise it is returned as `tail`.
    pub fn tokenize(&self, text: &str, at_end: bool) -> Tokenized {
        self.tokenize_limited(text, at_end, usize::MAX)
    }

    pub fn tokenize_limited(&self, text: &str, at_end: bool, max_rows: usize) -> Tokenized {
        let mut out = Tokenized::default();
        let mut lexer = Lexer::new(text, &self.options);
        let mut field = FieldBuffer::new(self.options.max_field_chars);
        let mut row: Vec<String> = Vec::new();
        let mut row_started = false;

        while out.rows.len() < max_rows {
            let Some(lexeme) = lexer.next() else {
                break;
            };

            match lexeme {
                Lexeme::Char(c) => {
                    row_started = true;
                    if !field.push(c) {
                        out.truncated_fields += 1;
                    }
                }
                Lexeme::Quote => row_started = true,
                Lexeme::Delimiter => {
                    row_started = true;
                    row.push(field.take());
                }
                Lexeme::Terminator { .. } => {
                    row.push(field.take());
                    push_row(&mut out.rows, std::mem::take(&mut row));
                    row_started = false;
                }
            }
        }

        if row_started {
            row.push(field.take());
            if at_end {
                out.unterminated_quote = lexer.in_quotes();
                push_row(&mut out.rows, row);
            } else {
                out.tail = Some(PartialRow {
                    fields: row,
                    in_quotes: lexer.in_quotes(),
                });
            }
        }

        out
    }
}

struct FieldBuffer {
    value: String,
    chars: usize,
    max_chars: usize,
    truncated: bool,
}

impl FieldBuffer {
    fn new(max_chars: usize) -> Self {
        Self {
            value: String::new(),
            chars: 0,
            max_chars,
            truncated: false,
        }
    }

    /// Returns false only the first time this field overflows.
    fn push(&mut self, c: char) -> bool {
        if self.chars < self.max_chars {
            self.value.push(c);
            self.chars += 1;
            return true;
        }
        if self.truncated {
            return true;
        }
        self.truncated = true;
        false
    }

    fn take(&mut self) -> String {
        self.chars = 0;
        self.truncated = false;
        std::mem::take(&mut self.value)
    }
}

fn push_row(rows: &mut Vec<Vec<String>>, row: Vec<String>) {
    let blank = row.is_empty() || (row.len() == 1 && row[0].is_empty());
    if !blank {
        rows.push(row);
    }
}
