use crate::utils::StructuralWarning;
use serde::{Deserialize, Serialize};

pub const EXTRA_COLUMN_PREFIX: &str = "extra_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub extra: bool,
}

/// Column names taken from the first row. Only ever grows, and only once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderRow {
    columns: Vec<Column>,
    extended: bool,
}

impl HeaderRow {
    pub fn from_fields(fields: Vec<String>) -> Self {
        Self {
            columns: fields
                .into_iter()
                .map(|name| Column { name, extra: false })
                .collect(),
            extended: false,
        }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.columns.get(index).map(|c| c.name.as_str())
    }

    pub fn is_extended(&self) -> bool {
        self.extended
    }

    pub fn extra_count(&self) -> usize {
        self.columns.iter().filter(|c| c.extra).count()
    }

    fn extend(&mut self, added: usize) {
        for n in 1..=added {
            self.columns.push(Column {
                name: format!("{}{}", EXTRA_COLUMN_PREFIX, n),
                extra: true,
            });
        }
        self.extended = true;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    Exact,
    Padded { missing: usize },
    Overlong { surplus: usize, header_extended: bool },
}

/// Aligns records against the header: short rows are padded with empty
/// strings, surplus fields are kept and flagged through extra header columns.
#[derive(Debug, Clone)]
pub struct ColumnReconciler {
    header: HeaderRow,
    rows_seen: usize,
    padded_rows: usize,
    overlong_rows: usize,
    warnings: Vec<StructuralWarning>,
}

impl ColumnReconciler {
    pub fn new(header: HeaderRow) -> Self {
        Self {
            header,
            rows_seen: 0,
            padded_rows: 0,
            overlong_rows: 0,
            warnings: Vec::new(),
        }
    }

    pub fn header(&self) -> &HeaderRow {
        &self.header
    }

    pub fn into_header(self) -> HeaderRow {
        self.header
    }

    pub fn rows_seen(&self) -> usize {
        self.rows_seen
    }

    pub fn padded_rows(&self) -> usize {
        self.padded_rows
    }

    pub fn overlong_rows(&self) -> usize {
        self.overlong_rows
    }

    /// Warnings raised since the last call, oldest first.
    pub fn take_warnings(&mut self) -> Vec<StructuralWarning> {
        std::mem::take(&mut self.warnings)
    }

    pub fn reconcile(&mut self, record: &mut Vec<String>) -> Reconciliation {
        self.rows_seen += 1;
        let width = self.header.len();

        if record.len() < width {
            let missing = width - record.len();
            record.resize(width, String::new());
            self.padded_rows += 1;
            return Reconciliation::Padded { missing };
        }

        if record.len() > width {
            let surplus = record.len() - width;
            let header_extended = !self.header.is_extended();
            let warning = if header_extended {
                self.header.extend(surplus);
                StructuralWarning::HeaderExtended {
                    row: self.rows_seen,
                    added: surplus,
                }
            } else {
                StructuralWarning::ColumnCountMismatch {
                    row: self.rows_seen,
                    expected: width,
                    found: record.len(),
                }
            };
            tracing::warn!(%warning, "Row wider than header");
            self.warnings.push(warning);
            self.overlong_rows += 1;
            return Reconciliation::Overlong {
                surplus,
                header_extended,
            };
        }

        Reconciliation::Exact
    }
}
