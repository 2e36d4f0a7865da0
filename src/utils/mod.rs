pub mod config;
pub mod errors;

pub use config::{AppConfig, TranscodeOptions};
pub use errors::{ErrorKind, Result, StructuralWarning, TranscodeError};

use std::path::Path;

pub const CSV_CONTENT_TYPE: &str = "text/csv";

/// `<stem>_converted.csv` unless the caller supplies a name, whose extension is
/// then forced to `.csv`.
pub fn output_file_name(original: &str, override_name: Option<&str>) -> String {
    match override_name.map(str::trim).filter(|s| !s.is_empty()) {
        Some(name) => Path::new(name)
            .with_extension("csv")
            .to_string_lossy()
            .into_owned(),
        None => {
            let stem = Path::new(original)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "output".to_string());
            format!("{}_converted.csv", stem)
        }
    }
}
