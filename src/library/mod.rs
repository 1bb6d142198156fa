//! Ordered pattern libraries.
//!
//! Patterns are reference images named `NN_Pattern.png`, where `NN` is a
//! zero-padded numeric id. Libraries are ordered by natural file-name order
//! and expose a cursor: the aggregator reads the current pattern and advances
//! the cursor after every recorded comparison.

use crate::compare::Pattern;
use crate::image::io::load_rgb_image;
use crate::trace::trace_warn;
use crate::util::{natural_cmp, WinSsimError, WinSsimResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Stable numeric pattern identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PatternId(u32);

impl PatternId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Parses the id from a file name such as `03_Pattern.png`.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let prefix = name.split('_').next()?;
        if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        prefix.parse().ok().map(Self)
    }

    /// Canonical pattern file name, e.g. `03_Pattern.png`.
    pub fn file_name(self) -> String {
        format!("{self}_Pattern.png")
    }
}

impl fmt::Display for PatternId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

/// Source of reference patterns, read by cursor.
pub trait PatternSource {
    /// The pattern under the cursor, or `None` when nothing is selected or
    /// the image cannot be loaded.
    fn current_pattern(&mut self) -> Option<Pattern>;

    /// Moves the cursor to the next pattern, wrapping to the first, and
    /// returns the new current id. `None` for an empty library.
    fn advance_pattern(&mut self) -> Option<PatternId>;

    /// Number of patterns in the library.
    fn pattern_count(&self) -> usize;

    /// Moves the cursor back to the first pattern.
    fn rewind(&mut self);
}

/// In-memory pattern library.
#[derive(Clone, Debug, Default)]
pub struct PatternLibrary {
    patterns: Vec<Pattern>,
    cursor: usize,
}

impl PatternLibrary {
    /// Creates a library ordered by pattern id.
    pub fn new(mut patterns: Vec<Pattern>) -> Self {
        patterns.sort_by_key(|p| p.id);
        Self {
            patterns,
            cursor: 0,
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Selects the pattern at `index`.
    pub fn select(&mut self, index: usize) -> WinSsimResult<PatternId> {
        let pattern = self.patterns.get(index).ok_or(WinSsimError::NoPatternSelected)?;
        self.cursor = index;
        Ok(pattern.id)
    }

    pub fn ids(&self) -> Vec<PatternId> {
        self.patterns.iter().map(|p| p.id).collect()
    }
}

impl PatternSource for PatternLibrary {
    fn current_pattern(&mut self) -> Option<Pattern> {
        self.patterns.get(self.cursor).cloned()
    }

    fn advance_pattern(&mut self) -> Option<PatternId> {
        if self.patterns.is_empty() {
            return None;
        }
        self.cursor = (self.cursor + 1) % self.patterns.len();
        Some(self.patterns[self.cursor].id)
    }

    fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    fn rewind(&mut self) {
        self.cursor = 0;
    }
}

/// Folders holding the patterns and their companions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryFolders {
    /// Full-resolution patterns (`NN_Pattern.png`).
    pub patterns: PathBuf,
    /// Lower-resolution thumbnails, same file names.
    pub thumbnails: PathBuf,
    /// Original full-resolution sources, same file names.
    pub origin: PathBuf,
}

#[derive(Clone, Debug)]
struct Entry {
    id: PatternId,
    file_name: String,
}

/// Pattern library backed by a folder of image files.
///
/// Only the pattern under the cursor is kept in memory.
#[derive(Debug)]
pub struct FolderPatternLibrary {
    folders: LibraryFolders,
    entries: Vec<Entry>,
    cursor: usize,
    cached: Option<(usize, Pattern)>,
}

impl FolderPatternLibrary {
    /// Lists the pattern folder.
    pub fn open(folders: LibraryFolders) -> WinSsimResult<Self> {
        let entries = list_patterns(&folders.patterns)?;
        Ok(Self {
            folders,
            entries,
            cursor: 0,
            cached: None,
        })
    }

    /// Re-lists the pattern folder, keeping the cursor when it is still valid.
    pub fn refresh(&mut self) -> WinSsimResult<()> {
        self.entries = list_patterns(&self.folders.patterns)?;
        if self.cursor >= self.entries.len() {
            self.cursor = 0;
        }
        self.cached = None;
        Ok(())
    }

    pub fn ids(&self) -> Vec<PatternId> {
        self.entries.iter().map(|e| e.id).collect()
    }

    pub fn pattern_path(&self, id: PatternId) -> Option<PathBuf> {
        self.entry(id).map(|e| self.folders.patterns.join(&e.file_name))
    }

    pub fn thumbnail_path(&self, id: PatternId) -> Option<PathBuf> {
        self.entry(id).map(|e| self.folders.thumbnails.join(&e.file_name))
    }

    pub fn origin_path(&self, id: PatternId) -> Option<PathBuf> {
        self.entry(id).map(|e| self.folders.origin.join(&e.file_name))
    }

    fn entry(&self, id: PatternId) -> Option<&Entry> {
        self.entries.iter().find(|e| e.id == id)
    }
}

impl PatternSource for FolderPatternLibrary {
    fn current_pattern(&mut self) -> Option<Pattern> {
        if let Some((idx, pattern)) = &self.cached {
            if *idx == self.cursor {
                return Some(pattern.clone());
            }
        }
        let entry = self.entries.get(self.cursor)?;
        let path = self.folders.patterns.join(&entry.file_name);
        match load_rgb_image(&path) {
            Ok(image) => {
                let pattern = Pattern {
                    id: entry.id,
                    image,
                    path: Some(path),
                };
                self.cached = Some((self.cursor, pattern.clone()));
                Some(pattern)
            }
            Err(err) => {
                trace_warn!(
                    "pattern_load_failed",
                    file = entry.file_name.as_str(),
                    error = err.to_string().as_str()
                );
                None
            }
        }
    }

    fn advance_pattern(&mut self) -> Option<PatternId> {
        if self.entries.is_empty() {
            return None;
        }
        self.cursor = (self.cursor + 1) % self.entries.len();
        Some(self.entries[self.cursor].id)
    }

    fn pattern_count(&self) -> usize {
        self.entries.len()
    }

    fn rewind(&mut self) {
        self.cursor = 0;
    }
}

fn list_patterns(dir: &Path) -> WinSsimResult<Vec<Entry>> {
    let mut names = Vec::new();
    for item in fs::read_dir(dir)? {
        let item = item?;
        if !item.file_type()?.is_file() {
            continue;
        }
        let name = item.file_name().to_string_lossy().into_owned();
        if !is_image_name(&name) {
            continue;
        }
        names.push(name);
    }
    names.sort_by(|a, b| natural_cmp(a, b));

    let mut entries = Vec::with_capacity(names.len());
    for file_name in names {
        match PatternId::from_file_name(&file_name) {
            Some(id) => entries.push(Entry { id, file_name }),
            None => {
                trace_warn!("pattern_name_skipped", file = file_name.as_str());
            }
        }
    }
    Ok(entries)
}

fn is_image_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    [".png", ".jpg", ".jpeg"].iter().any(|ext| lower.ends_with(ext))
}
