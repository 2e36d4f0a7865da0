use crate::csv_processor::{ColumnSelection, HeaderRow};
use crate::utils::{Result, TranscodeError};
use redb::{Database, ReadableTable, TableDefinition};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

const PRESETS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("presets");

/// A named list of header names, re-applied to later files by name equality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ColumnPreset {
    pub name: String,
    pub headers: Vec<String>,
}

impl ColumnPreset {
    pub fn new(name: impl Into<String>, headers: Vec<String>) -> Result<Self> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(TranscodeError::InvalidPresetName(name));
        }
        if headers.is_empty() {
            return Err(TranscodeError::EmptySelection);
        }
        Ok(Self { name, headers })
    }

    pub fn from_selection(name: impl Into<String>, selection: &ColumnSelection, header: &HeaderRow) -> Result<Self> {
        Self::new(name, selection.names(header))
    }

    /// Selects every column of `header` whose name is in the preset. Fails
    /// with `EmptySelection` when none of the names survive.
    pub fn apply(&self, header: &HeaderRow) -> Result<ColumnSelection> {
        ColumnSelection::by_names(&self.headers, header)
    }
}

/// Key-value storage for presets, keyed by preset name.
pub trait PresetStore: Send + Sync {
    fn save(&self, name: &str, headers: &[String]) -> Result<ColumnPreset>;

    fn load(&self, name: &str) -> Result<Option<ColumnPreset>>;

    /// All presets, ordered by name.
    fn list(&self) -> Result<Vec<ColumnPreset>>;

    /// Returns whether a preset was removed.
    fn delete(&self, name: &str) -> Result<bool>;

    fn get(&self, name: &str) -> Result<ColumnPreset> {
        self.load(name)?
            .ok_or_else(|| TranscodeError::PresetNotFound(name.to_string()))
    }
}

fn db_err(e: impl std::fmt::Display) -> TranscodeError {
    TranscodeError::DatabaseError(e.to_string())
}

pub struct RedbPresetStore {
    db: Arc<Database>,
}

impl RedbPresetStore {
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(db_path).map_err(db_err)?;

        let write_txn = db.begin_write().map_err(db_err)?;
        {
            let _ = write_txn.open_table(PRESETS_TABLE).map_err(db_err)?;
        }
        write_txn.commit().map_err(db_err)?;

        tracing::info!(path = %db_path.display(), "Preset store opened");
        Ok(Self { db: Arc::new(db) })
    }

    fn decode(name: &str, data: &[u8]) -> Result<ColumnPreset> {
        let headers: Vec<String> = serde_json::from_slice(data)
            .map_err(|e| TranscodeError::SerializationError(e.to_string()))?;
        Ok(ColumnPreset {
            name: name.to_string(),
            headers,
        })
    }
}

impl PresetStore for RedbPresetStore {
    fn save(&self, name: &str, headers: &[String]) -> Result<ColumnPreset> {
        let preset = ColumnPreset::new(name, headers.to_vec())?;
        let data = serde_json::to_vec(&preset.headers)
            .map_err(|e| TranscodeError::SerializationError(e.to_string()))?;

        let write_txn = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = write_txn.open_table(PRESETS_TABLE).map_err(db_err)?;
            table
                .insert(preset.name.as_str(), data.as_slice())
                .map_err(db_err)?;
        }
        write_txn.commit().map_err(db_err)?;

        tracing::debug!(preset = %preset.name, columns = preset.headers.len(), "Preset saved");
        Ok(preset)
    }

    fn load(&self, name: &str) -> Result<Option<ColumnPreset>> {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let table = read_txn.open_table(PRESETS_TABLE).map_err(db_err)?;

        match table.get(name.trim()) {
            Ok(Some(data)) => Self::decode(name.trim(), data.value()).map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    fn list(&self) -> Result<Vec<ColumnPreset>> {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let table = read_txn.open_table(PRESETS_TABLE).map_err(db_err)?;

        let mut presets = Vec::new();
        for result in table.iter().map_err(db_err)? {
            let (key, value) = result.map_err(db_err)?;
            presets.push(Self::decode(key.value(), value.value())?);
        }
        Ok(presets)
    }

    fn delete(&self, name: &str) -> Result<bool> {
        let write_txn = self.db.begin_write().map_err(db_err)?;
        let removed = {
            let mut table = write_txn.open_table(PRESETS_TABLE).map_err(db_err)?;
            let removed = table.remove(name.trim()).map_err(db_err)?.is_some();
            removed
        };
        write_txn.commit().map_err(db_err)?;
        Ok(removed)
    }
}

#[derive(Debug, Default)]
pub struct MemoryPresetStore {
    presets: RwLock<BTreeMap<String, Vec<String>>>,
}

impl MemoryPresetStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> TranscodeError {
    TranscodeError::DatabaseError("preset store lock poisoned".to_string())
}

impl PresetStore for MemoryPresetStore {
    fn save(&self, name: &str, headers: &[String]) -> Result<ColumnPreset> {
        let preset = ColumnPreset::new(name, headers.to_vec())?;
        self.presets
            .write()
            .map_err(poisoned)?
            .insert(preset.name.clone(), preset.headers.clone());
        Ok(preset)
    }

    fn load(&self, name: &str) -> Result<Option<ColumnPreset>> {
        let presets = self.presets.read().map_err(poisoned)?;
        Ok(presets.get(name.trim()).map(|headers| ColumnPreset {
            name: name.trim().to_string(),
            headers: headers.clone(),
        }))
    }

    fn list(&self) -> Result<Vec<ColumnPreset>> {
        let presets = self.presets.read().map_err(poisoned)?;
        Ok(presets
            .iter()
            .map(|(name, headers)| ColumnPreset {
                name: name.clone(),
                headers: headers.clone(),
            })
            .collect())
    }

    fn delete(&self, name: &str) -> Result<bool> {
        Ok(self
            .presets
            .write()
            .map_err(poisoned)?
            .remove(name.trim())
            .is_some())
    }
}
