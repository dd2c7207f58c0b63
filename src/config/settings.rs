use log::{ debug, warn };
use serde::{ Deserialize, Serialize };
use std::fs;
use std::path::{ Path, PathBuf };
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::llm::catalog::{ self, DEFAULT_MODEL };

pub const MIN_FONT_SIZE: f32 = 0.8;
pub const DEFAULT_FONT_SIZE: f32 = 1.0;
pub const MAX_FONT_SIZE: f32 = 1.5;
pub const FONT_SIZE_STEP: f32 = 0.1;

pub type SharedSettings = Arc<RwLock<SettingsManager>>;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("settings file IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("settings file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// On-disk shape of the key-value store. Keys absent from the file are
/// `None` until the manager writes its defaults.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct StoredSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    font_size: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    selected_model: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SettingsSnapshot {
    pub font_size: f32,
    pub selected_model: String,
    pub large_font: bool,
}

/// Process-wide user preferences (font scale and selected model) kept in a
/// small JSON file. Every mutation is written through immediately.
#[derive(Debug)]
pub struct SettingsManager {
    path: PathBuf,
    values: StoredSettings,
}

impl SettingsManager {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref().to_path_buf();
        let values = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                StoredSettings::default()
            } else {
                serde_json::from_str(&raw)?
            }
        } else {
            StoredSettings::default()
        };

        let mut manager = Self { path, values };
        match manager.values.font_size {
            None => {
                manager.set_font_size(DEFAULT_FONT_SIZE)?;
            }
            Some(size) if !(MIN_FONT_SIZE..=MAX_FONT_SIZE).contains(&size) => {
                warn!("Stored font size {} is out of range, clamping", size);
                manager.set_font_size(size)?;
            }
            Some(_) => {}
        }
        if manager.values.selected_model.is_none() {
            manager.set_selected_model(DEFAULT_MODEL)?;
        }
        Ok(manager)
    }

    pub fn shared(self) -> SharedSettings {
        Arc::new(RwLock::new(self))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&self.values)?;
        fs::write(&self.path, json)?;
        debug!("Settings written to {}", self.path.display());
        Ok(())
    }

    pub fn font_size(&self) -> f32 {
        self.values.font_size.unwrap_or(DEFAULT_FONT_SIZE)
    }

    pub fn set_font_size(&mut self, size: f32) -> Result<f32, SettingsError> {
        let clamped = clamp_font_size(size);
        self.values.font_size = Some(clamped);
        self.persist()?;
        Ok(clamped)
    }

    pub fn increase_font_size(&mut self) -> Result<f32, SettingsError> {
        let current = self.font_size();
        if current < MAX_FONT_SIZE {
            return self.set_font_size(current + FONT_SIZE_STEP);
        }
        Ok(current)
    }

    pub fn decrease_font_size(&mut self) -> Result<f32, SettingsError> {
        let current = self.font_size();
        if current > MIN_FONT_SIZE {
            return self.set_font_size(current - FONT_SIZE_STEP);
        }
        Ok(current)
    }

    /// Switches between the default and the largest scale.
    pub fn toggle_font_size(&mut self) -> Result<f32, SettingsError> {
        if self.font_size() > DEFAULT_FONT_SIZE {
            self.set_font_size(DEFAULT_FONT_SIZE)
        } else {
            self.set_font_size(MAX_FONT_SIZE)
        }
    }

    pub fn is_large_font_size(&self) -> bool {
        self.font_size() > DEFAULT_FONT_SIZE
    }

    pub fn selected_model(&self) -> String {
        self.values.selected_model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string())
    }

    /// Stores the id when it is in the catalog, the default model otherwise.
    pub fn set_selected_model(&mut self, model_id: &str) -> Result<String, SettingsError> {
        let valid = match catalog::find_model(model_id) {
            Some(model) => model.id,
            None => {
                warn!("Unknown model '{}' selected, storing default {}", model_id, DEFAULT_MODEL);
                DEFAULT_MODEL
            }
        };
        self.values.selected_model = Some(valid.to_string());
        self.persist()?;
        Ok(valid.to_string())
    }

    pub fn clear_all_settings(&mut self) -> Result<(), SettingsError> {
        self.values = StoredSettings::default();
        self.set_font_size(DEFAULT_FONT_SIZE)?;
        self.set_selected_model(DEFAULT_MODEL)?;
        Ok(())
    }

    pub fn snapshot(&self) -> SettingsSnapshot {
        SettingsSnapshot {
            font_size: self.font_size(),
            selected_model: self.selected_model(),
            large_font: self.is_large_font_size(),
        }
    }
}

/// Clamps into `[MIN_FONT_SIZE, MAX_FONT_SIZE]` and rounds to two decimals
/// so repeated steps do not drift.
pub fn clamp_font_size(size: f32) -> f32 {
    if size.is_nan() {
        return DEFAULT_FONT_SIZE;
    }
    let rounded = (size * 100.0).round() / 100.0;
    rounded.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE)
}
