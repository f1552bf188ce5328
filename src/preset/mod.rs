//! In-memory preset manager
//!
//! A preset maps each discriminator to one complete parameter container.
//! The `Default` preset always exists. Presets can be exported to and
//! imported from JSON; files on disk are left to the caller.

use crate::error::{SynthError, SynthResult};
use crate::params::{Discriminator, ParamContainer, Patch};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Name of the preset that always exists
pub const DEFAULT_PRESET: &str = "Default";

/// Containers of one preset, keyed by discriminator
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Preset {
    containers: BTreeMap<Discriminator, ParamContainer>,
}

impl Preset {
    /// A preset holding every container of `patch`
    pub fn from_patch(patch: &Patch) -> Self {
        let containers = patch
            .containers()
            .into_iter()
            .map(|c| (c.discriminator(), c))
            .collect();
        Self { containers }
    }

    pub fn get(&self, discriminator: Discriminator) -> Option<&ParamContainer> {
        self.containers.get(&discriminator)
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    pub fn containers(&self) -> impl Iterator<Item = &ParamContainer> {
        self.containers.values()
    }
}

/// Exported form: preset name to its list of tagged containers
#[derive(Debug, Serialize, Deserialize)]
#[serde(transparent)]
struct PresetFile(BTreeMap<String, Vec<ParamContainer>>);

/// Session preset store
#[derive(Debug, Clone)]
pub struct PresetManager {
    defaults: Preset,
    presets: BTreeMap<String, Preset>,
    current: String,
}

impl PresetManager {
    /// A manager holding only the `Default` preset, which is selected
    pub fn new() -> Self {
        let defaults = Preset::from_patch(&Patch::default());
        let mut presets = BTreeMap::new();
        presets.insert(DEFAULT_PRESET.to_string(), defaults.clone());
        Self {
            defaults,
            presets,
            current: DEFAULT_PRESET.to_string(),
        }
    }

    /// Name of the selected preset
    pub fn current(&self) -> &str {
        &self.current
    }

    pub fn current_preset(&self) -> Option<&Preset> {
        self.presets.get(&self.current)
    }

    /// Add or replace a container in the selected preset. Fields absent
    /// from `container` are filled from the default preset.
    pub fn save_to_current_preset(&mut self, container: ParamContainer) {
        let discriminator = container.discriminator();
        let filled = match self.defaults.get(discriminator) {
            Some(defaults) => container.or(defaults),
            None => container,
        };
        debug!(preset = %self.current, "saving {}", discriminator.label());
        self.presets
            .entry(self.current.clone())
            .or_default()
            .containers
            .insert(discriminator, filled);
    }

    /// The container saved under `discriminator` in the selected preset
    pub fn load_from_current_preset(
        &self,
        discriminator: Discriminator,
    ) -> SynthResult<ParamContainer> {
        let container = self
            .current_preset()
            .and_then(|p| p.get(discriminator))
            .copied()
            .ok_or_else(|| SynthError::ContainerNotFound {
                preset: self.current.clone(),
                discriminator,
            })?;
        debug!(preset = %self.current, "loading {}", discriminator.label());
        Ok(container)
    }

    /// Every container of the selected preset, in discriminator order
    pub fn load_all(&self) -> Vec<ParamContainer> {
        self.current_preset()
            .map(|p| p.containers().copied().collect())
            .unwrap_or_default()
    }

    /// Store a copy of the selected preset under `name`
    pub fn save_preset(&mut self, name: &str, overwrite: bool) -> SynthResult<()> {
        if self.presets.contains_key(name) && !overwrite {
            return Err(SynthError::PresetExists(name.to_string()));
        }
        let snapshot = self.current_preset().cloned().unwrap_or_default();
        self.presets.insert(name.to_string(), snapshot);
        debug!(preset = name, "preset saved");
        Ok(())
    }

    /// Select a preset
    pub fn set_preset(&mut self, name: &str) -> SynthResult<()> {
        if !self.presets.contains_key(name) {
            return Err(SynthError::PresetNotFound(name.to_string()));
        }
        self.current = name.to_string();
        debug!(preset = name, "preset selected");
        Ok(())
    }

    /// Names of every preset, sorted
    pub fn preset_names(&self) -> Vec<String> {
        self.presets.keys().cloned().collect()
    }

    /// Export all presets, or only the named ones (unknown names are skipped)
    pub fn export_json(&self, names: Option<&[&str]>) -> SynthResult<String> {
        let selected = self
            .presets
            .iter()
            .filter(|(name, _)| names.map_or(true, |n| n.contains(&name.as_str())))
            .map(|(name, preset)| (name.clone(), preset.containers().copied().collect()))
            .collect();
        Ok(serde_json::to_string_pretty(&PresetFile(selected))?)
    }

    /// Replace the preset map with the contents of `json`. `Default` is
    /// always restored; if the selected preset is gone, `Default` is selected.
    pub fn import_json(&mut self, json: &str) -> SynthResult<()> {
        let PresetFile(file) = serde_json::from_str(json)?;
        let mut presets: BTreeMap<String, Preset> = file
            .into_iter()
            .map(|(name, containers)| {
                let containers = containers
                    .into_iter()
                    .map(|c| (c.discriminator(), c))
                    .collect();
                (name, Preset { containers })
            })
            .collect();
        presets.insert(DEFAULT_PRESET.to_string(), self.defaults.clone());
        self.presets = presets;
        if !self.presets.contains_key(&self.current) {
            self.current = DEFAULT_PRESET.to_string();
        }
        debug!(count = self.presets.len(), "presets imported");
        Ok(())
    }
}

impl Default for PresetManager {
    fn default() -> Self {
        Self::new()
    }
}
