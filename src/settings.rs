use std::path::Path;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::SettingsError;

pub const DEFAULT_SETTINGS_FILE: &str = "render_settings.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenderSettings {
    #[serde(default)]
    pub batching: BatchingSettings,
    #[serde(default)]
    pub backend: BackendSettings,
}

impl RenderSettings {
    pub fn load() -> Self {
        Self::load_from_path(DEFAULT_SETTINGS_FILE)
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Self::try_load_from_path(path) {
            Ok(settings) => {
                info!("Loaded render settings from {:?}", path);
                settings
            }
            Err(err) if err.is_not_found() => {
                info!(
                    "Render settings file {:?} not found. Using default settings.",
                    path
                );
                RenderSettings::default()
            }
            Err(err) => {
                warn!("{}. Falling back to default render settings.", err);
                RenderSettings::default()
            }
        }
    }

    pub fn try_load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&contents).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_json(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<RenderSettings>(contents).map(RenderSettings::validate)
    }

    fn validate(mut self) -> Self {
        if self.batching.max_batched_items_cap == Some(0) {
            warn!("max_batched_items_cap must be at least 1. Ignoring the cap.");
            self.batching.max_batched_items_cap = None;
        }

        if self.backend.sample_count == 0 {
            warn!("Sample count must be greater than zero. Using 1 instead.");
            self.backend.sample_count = 1;
        }

        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchingSettings {
    #[serde(default)]
    pub buffer_usage: BufferUsage,
    /// Upper bound on matrix batches per GPU batch, applied on top of the
    /// shader's own limit.
    #[serde(default)]
    pub max_batched_items_cap: Option<u32>,
}

impl Default for BatchingSettings {
    fn default() -> Self {
        Self {
            buffer_usage: BufferUsage::default(),
            max_batched_items_cap: None,
        }
    }
}

impl BatchingSettings {
    pub fn effective_capacity(&self, shader_max: u32) -> u32 {
        let shader_max = shader_max.max(1);
        match self.max_batched_items_cap {
            Some(cap) => shader_max.min(cap.max(1)),
            None => shader_max,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSettings {
    #[serde(default = "BackendSettings::default_sample_count")]
    pub sample_count: u32,
    #[serde(default = "BackendSettings::default_depth_testing")]
    pub depth_testing: bool,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            sample_count: Self::default_sample_count(),
            depth_testing: Self::default_depth_testing(),
        }
    }
}

impl BackendSettings {
    const fn default_sample_count() -> u32 {
        1
    }

    const fn default_depth_testing() -> bool {
        true
    }
}

/// Usage hint for batch buffers. Backends without usage hints ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferUsage {
    Static,
    #[default]
    Dynamic,
    Stream,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_replaces_invalid_values_with_defaults() {
        let settings = RenderSettings::from_json(
            r#"{ "batching": { "max_batched_items_cap": 0 }, "backend": { "sample_count": 0 } }"#,
        )
        .unwrap();

        assert_eq!(settings.batching.max_batched_items_cap, None);
        assert_eq!(settings.backend.sample_count, 1);
    }

    #[test]
    fn missing_sections_use_defaults() {
        let settings = RenderSettings::from_json("{}").unwrap();

        assert_eq!(settings.batching.buffer_usage, BufferUsage::Dynamic);
        assert!(settings.backend.depth_testing);
    }

    #[test]
    fn parses_buffer_usage_in_snake_case() {
        let settings =
            RenderSettings::from_json(r#"{ "batching": { "buffer_usage": "static" } }"#).unwrap();

        assert_eq!(settings.batching.buffer_usage, BufferUsage::Static);
    }

    #[test]
    fn effective_capacity_respects_cap_and_shader_limit() {
        let mut batching = BatchingSettings::default();
        assert_eq!(batching.effective_capacity(8), 8);
        assert_eq!(batching.effective_capacity(0), 1);

        batching.max_batched_items_cap = Some(2);
        assert_eq!(batching.effective_capacity(8), 2);
        assert_eq!(batching.effective_capacity(1), 1);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let settings = RenderSettings::load_from_path("does/not/exist/render_settings.json");
        assert_eq!(settings.backend.sample_count, 1);

        let err = RenderSettings::try_load_from_path("does/not/exist/render_settings.json")
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
