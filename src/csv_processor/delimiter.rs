use crate::csv_processor::tokenizer::{Tokenizer, TokenizerOptions};
use serde::{Deserialize, Serialize};

const SAMPLE_LINES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delimiter {
    Comma,
    Tab,
    Pipe,
    Semicolon,
}

impl Delimiter {
    /// Detection order; earlier candidates win ties.
    pub const CANDIDATES: [Delimiter; 4] = [
        Delimiter::Comma,
        Delimiter::Tab,
        Delimiter::Pipe,
        Delimiter::Semicolon,
    ];

    pub fn as_char(self) -> char {
        match self {
            Delimiter::Comma => ',',
            Delimiter::Tab => '\t',
            Delimiter::Pipe => '|',
            Delimiter::Semicolon => ';',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        Self::CANDIDATES.into_iter().find(|d| d.as_char() == c)
    }

    /// Tab-delimited exports routinely carry bare quote characters, so quotes
    /// only matter at field edges there.
    pub fn literal_quotes(self) -> bool {
        self == Delimiter::Tab
    }
}

impl std::fmt::Display for Delimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Delimiter::Comma => write!(f, "comma"),
            Delimiter::Tab => write!(f, "tab"),
            Delimiter::Pipe => write!(f, "pipe"),
            Delimiter::Semicolon => write!(f, "semicolon"),
        }
    }
}

/// Picks the candidate whose per-line count (outside quotes) is highest and
/// most consistent. Falls back to comma when no candidate appears at all.
pub fn detect_delimiter(sample: &str) -> Delimiter {
    let mut best = Delimiter::Comma;
    let mut best_score = 0.0_f64;

    for candidate in Delimiter::CANDIDATES {
        let counts = occurrences_per_line(sample, candidate);
        let score = consistency_score(&counts);
        tracing::trace!(delimiter = %candidate, ?counts, score, "Delimiter candidate scored");
        if score > best_score {
            best = candidate;
            best_score = score;
        }
    }

    best
}

fn occurrences_per_line(sample: &str, candidate: Delimiter) -> Vec<usize> {
    let tokenizer = Tokenizer::new(TokenizerOptions::for_delimiter(candidate));
    tokenizer
        .tokenize_limited(sample, true, SAMPLE_LINES * 2)
        .rows
        .iter()
        .filter(|row| !(row.len() == 1 && row[0].trim().is_empty()))
        .take(SAMPLE_LINES)
        .map(|row| row.len().saturating_sub(1))
        .collect()
}

/// Mean occurrence count weighted down by its variance across lines.
pub fn consistency_score(counts: &[usize]) -> f64 {
    if counts.is_empty() {
        return 0.0;
    }

    let n = counts.len() as f64;
    let mean = counts.iter().sum::<usize>() as f64 / n;
    if mean <= 0.0 {
        return 0.0;
    }

    let variance = counts
        .iter()
        .map(|&c| {
            let d = c as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;

    mean / (1.0 + variance)
}
