use crate::csv_processor::reconciler::HeaderRow;
use crate::utils::{Result, TranscodeError};
use serde::{Deserialize, Serialize};

/// Non-empty set of column indices, kept in header order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSelection {
    indices: Vec<usize>,
}

impl ColumnSelection {
    pub fn new(indices: impl IntoIterator<Item = usize>, header: &HeaderRow) -> Result<Self> {
        if header.is_empty() {
            return Err(TranscodeError::NoHeader);
        }

        let mut indices: Vec<usize> = indices.into_iter().collect();
        if let Some(&index) = indices.iter().find(|&&i| i >= header.len()) {
            return Err(TranscodeError::ColumnOutOfRange {
                index,
                columns: header.len(),
            });
        }
        indices.sort_unstable();
        indices.dedup();

        if indices.is_empty() {
            return Err(TranscodeError::EmptySelection);
        }

        Ok(Self { indices })
    }

    pub fn all(header: &HeaderRow) -> Result<Self> {
        Self::new(0..header.len(), header)
    }

    /// Every column whose name equals one of `names`. Names not present in the
    /// header are ignored.
    pub fn by_names<S: AsRef<str>>(names: &[S], header: &HeaderRow) -> Result<Self> {
        let indices = header
            .columns()
            .iter()
            .enumerate()
            .filter(|(_, column)| names.iter().any(|n| n.as_ref() == column.name))
            .map(|(i, _)| i);
        Self::new(indices, header)
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn names(&self, header: &HeaderRow) -> Vec<String> {
        self.indices
            .iter()
            .filter_map(|&i| header.name(i).map(str::to_string))
            .collect()
    }

    /// Selected values of `record`; `None` where the record is too short.
    pub fn project<'a>(&'a self, record: &'a [String]) -> impl Iterator<Item = Option<&'a str>> + 'a {
        self.indices
            .iter()
            .map(move |&i| record.get(i).map(String::as_str))
    }
}
