//! Persistent settings and the configuration store.
//!
//! All settings live in one JSON document. Reads deserialize into typed
//! values once; writes replace the whole document through a temporary file
//! and a rename, so readers see either the old or the new document.

use crate::library::LibraryFolders;
use crate::region::RegionSet;
use crate::util::{WinSsimError, WinSsimResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Bounding-box colours offered to the operator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BboxColor {
    White,
    #[default]
    Red,
    Blue,
    Green,
    Black,
}

impl BboxColor {
    /// RGB triple of the colour.
    pub fn rgb(self) -> [u8; 3] {
        match self {
            Self::White => [255, 255, 255],
            Self::Red => [255, 0, 0],
            Self::Blue => [0, 0, 255],
            Self::Green => [0, 255, 0],
            Self::Black => [0, 0, 0],
        }
    }
}

/// Settings consumed by a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunSettings {
    pub timer_seconds: u32,
    pub bbox_line_width: u32,
    pub bbox_color: BboxColor,
}

/// Complete persisted settings document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub timer_seconds: u32,
    pub log_level: String,
    pub bbox_line_width: u32,
    pub bbox_color: BboxColor,
    pub thumbnail_width: u32,
    pub thumbnail_height: u32,
    pub pattern_folder: PathBuf,
    pub thumbnail_folder: PathBuf,
    pub results_folder: PathBuf,
    pub origin_folder: PathBuf,
    pub region_set: RegionSet,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timer_seconds: 10,
            log_level: "INFO".to_string(),
            bbox_line_width: 2,
            bbox_color: BboxColor::Red,
            thumbnail_width: 150,
            thumbnail_height: 150,
            pattern_folder: PathBuf::from("Mirror_Standard/MirrorStandards"),
            thumbnail_folder: PathBuf::from("Mirror_Standard/Thumbnails"),
            results_folder: PathBuf::from("Mirror_Standard/Results"),
            origin_folder: PathBuf::from("Mirror_Standard/Origin_Folder"),
            region_set: RegionSet::default(),
        }
    }
}

impl Settings {
    pub fn run_settings(&self) -> RunSettings {
        RunSettings {
            timer_seconds: self.timer_seconds,
            bbox_line_width: self.bbox_line_width,
            bbox_color: self.bbox_color,
        }
    }

    pub fn library_folders(&self) -> LibraryFolders {
        LibraryFolders {
            patterns: self.pattern_folder.clone(),
            thumbnails: self.thumbnail_folder.clone(),
            origin: self.origin_folder.clone(),
        }
    }
}

/// Atomic read/replace access to persisted configuration.
pub trait ConfigStore {
    fn load_region_set(&self) -> WinSsimResult<RegionSet>;
    fn save_region_set(&self, set: &RegionSet) -> WinSsimResult<()>;
    fn load_run_settings(&self) -> WinSsimResult<RunSettings>;
}

/// Settings document stored as a JSON file.
#[derive(Debug)]
pub struct JsonConfigStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the document; a missing file yields defaults.
    pub fn load(&self) -> WinSsimResult<Settings> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Settings::default()),
            Err(err) => Err(err.into()),
        }
    }

    /// Replaces the whole document.
    pub fn save(&self, settings: &Settings) -> WinSsimResult<()> {
        let json = serde_json::to_string_pretty(settings)?;
        let tmp = self.path.with_extension("json.tmp");
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Applies `edit` to the current document and saves the result.
    pub fn update<F>(&self, edit: F) -> WinSsimResult<Settings>
    where
        F: FnOnce(&mut Settings),
    {
        let _guard = self.lock.lock().map_err(|_| WinSsimError::Config {
            reason: "configuration lock poisoned".to_string(),
        })?;
        let mut settings = self.load()?;
        edit(&mut settings);
        self.save(&settings)?;
        Ok(settings)
    }
}

impl ConfigStore for JsonConfigStore {
    fn load_region_set(&self) -> WinSsimResult<RegionSet> {
        Ok(self.load()?.region_set)
    }

    fn save_region_set(&self, set: &RegionSet) -> WinSsimResult<()> {
        let set = set.clone();
        self.update(move |settings| settings.region_set = set)?;
        Ok(())
    }

    fn load_run_settings(&self) -> WinSsimResult<RunSettings> {
        Ok(self.load()?.run_settings())
    }
}

/// In-memory store for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    settings: Mutex<Settings>,
}

impl MemoryConfigStore {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Mutex::new(settings),
        }
    }

    pub fn snapshot(&self) -> WinSsimResult<Settings> {
        self.settings
            .lock()
            .map(|s| s.clone())
            .map_err(|_| poisoned())
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load_region_set(&self) -> WinSsimResult<RegionSet> {
        Ok(self.snapshot()?.region_set)
    }

    fn save_region_set(&self, set: &RegionSet) -> WinSsimResult<()> {
        let mut guard = self.settings.lock().map_err(|_| poisoned())?;
        guard.region_set = set.clone();
        Ok(())
    }

    fn load_run_settings(&self) -> WinSsimResult<RunSettings> {
        Ok(self.snapshot()?.run_settings())
    }
}

fn poisoned() -> WinSsimError {
    WinSsimError::Config {
        reason: "configuration lock poisoned".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::{Region, RegionPair, SyncMode};

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonConfigStore::new(dir.path().join("settings.json"));
        let run = store.load_run_settings().unwrap();
        assert_eq!(run.timer_seconds, 10);
        assert_eq!(run.bbox_color, BboxColor::Red);
        assert_eq!(store.load_region_set().unwrap(), RegionSet::default());
    }

    #[test]
    fn region_set_save_replaces_only_regions() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonConfigStore::new(dir.path().join("settings.json"));
        store
            .update(|s| s.timer_seconds = 3)
            .unwrap();

        let set = RegionSet::from_pairs(
            vec![
                RegionPair::mirrored(Region::new(0, 0, 20, 20)),
                RegionPair::mirrored(Region::new(20, 0, 40, 20)),
            ],
            SyncMode::Enabled,
        )
        .unwrap();
        store.save_region_set(&set).unwrap();

        assert_eq!(store.load_region_set().unwrap(), set);
        assert_eq!(store.load_run_settings().unwrap().timer_seconds, 3);
        assert!(!dir.path().join("settings.json.tmp").exists());
    }

    #[test]
    fn colours_use_uppercase_names() {
        let json = serde_json::to_string(&BboxColor::Green).unwrap();
        assert_eq!(json, "\"GREEN\"");
        let partial: Settings = serde_json::from_str(r#"{"bbox_color":"BLUE"}"#).unwrap();
        assert_eq!(partial.bbox_color, BboxColor::Blue);
        assert_eq!(partial.timer_seconds, 10);
    }
}
