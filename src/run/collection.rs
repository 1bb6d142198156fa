//! Runs and collections.

use crate::compare::Comparison;
use crate::util::{RunningMean, WinSsimError, WinSsimResult};
use std::path::{Path, PathBuf};

/// Collection name used when the operator does not pick one.
pub const DEFAULT_COLLECTION_NAME: &str = "Default_WinSSIM";

/// A collection name collision and how it was resolved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FolderConflict {
    pub requested: String,
    pub resolved: String,
}

/// Returns `requested` if it is free, otherwise the first free
/// `{base}_{n}` for `n = 1, 2, ...`, where `base` is `requested` without any
/// trailing `_{digits}` suffix.
pub fn resolve_collection_name<F>(requested: &str, exists: F) -> String
where
    F: Fn(&str) -> bool,
{
    if !exists(requested) {
        return requested.to_string();
    }
    let base = match requested.rsplit_once('_') {
        Some((head, tail))
            if !head.is_empty() && !tail.is_empty() && tail.bytes().all(|b| b.is_ascii_digit()) =>
        {
            head
        }
        _ => requested,
    };
    let mut n = 1usize;
    loop {
        let candidate = format!("{base}_{n}");
        if !exists(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Named group of runs captured in one session.
#[derive(Clone, Debug)]
pub struct Collection {
    requested: String,
    name: String,
    storage_path: PathBuf,
    sealed_runs: usize,
    mean: RunningMean,
}

impl Collection {
    pub fn new(requested: impl Into<String>, name: impl Into<String>, storage_path: PathBuf) -> Self {
        Self {
            requested: requested.into(),
            name: name.into(),
            storage_path,
            sealed_runs: 0,
            mean: RunningMean::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }

    /// Set when the requested name was taken and a suffix was added.
    pub fn conflict(&self) -> Option<FolderConflict> {
        (self.requested != self.name).then(|| FolderConflict {
            requested: self.requested.clone(),
            resolved: self.name.clone(),
        })
    }

    /// Number of runs sealed so far in this session.
    pub fn sealed_runs(&self) -> usize {
        self.sealed_runs
    }

    /// Mean score over every comparison recorded in this collection.
    pub fn average(&self) -> f64 {
        self.mean.mean()
    }

    pub fn comparison_count(&self) -> usize {
        self.mean.count()
    }

    pub(crate) fn record(&mut self, score: f64) {
        self.mean.push(score);
    }

    pub(crate) fn note_sealed(&mut self) -> usize {
        self.sealed_runs += 1;
        self.sealed_runs
    }
}

/// One pass through the pattern library.
#[derive(Clone, Debug)]
pub struct Run {
    collection_name: String,
    storage_path: PathBuf,
    ordinal: usize,
    comparisons: Vec<Comparison>,
    cursor: usize,
    mean: RunningMean,
    pattern_total: usize,
    sealed: bool,
}

impl Run {
    /// Opens run `ordinal` over a library of `pattern_total` patterns.
    pub fn new(
        collection_name: impl Into<String>,
        storage_path: PathBuf,
        ordinal: usize,
        pattern_total: usize,
    ) -> Self {
        Self {
            collection_name: collection_name.into(),
            storage_path,
            ordinal,
            comparisons: Vec::new(),
            cursor: 0,
            mean: RunningMean::new(),
            pattern_total,
            sealed: false,
        }
    }

    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }

    /// 1-based run number within the collection.
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn comparisons(&self) -> &[Comparison] {
        &self.comparisons
    }

    /// Number of patterns visited in this run.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn cumulative_sum(&self) -> f64 {
        self.mean.sum()
    }

    pub fn count(&self) -> usize {
        self.mean.count()
    }

    /// `cumulative_sum / count`, 0 before the first comparison.
    pub fn running_average(&self) -> f64 {
        self.mean.mean()
    }

    /// Library size captured when the run was opened.
    pub fn pattern_total(&self) -> usize {
        self.pattern_total
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// True once every pattern of the snapshot has been visited.
    pub fn is_complete(&self) -> bool {
        self.cursor >= self.pattern_total
    }

    /// Running average the run would report after adding `scores`.
    pub(crate) fn preview_averages(&self, scores: impl IntoIterator<Item = f64>) -> Vec<f64> {
        let mut mean = self.mean;
        scores.into_iter().map(|s| mean.push(s)).collect()
    }

    /// Appends the comparisons of one trigger and advances the cursor.
    pub(crate) fn record(&mut self, comparisons: Vec<Comparison>) -> WinSsimResult<()> {
        if self.sealed {
            return Err(WinSsimError::Sealed {
                ordinal: self.ordinal,
            });
        }
        for mut comparison in comparisons {
            comparison.running_average = self.mean.push(comparison.score);
            self.comparisons.push(comparison);
        }
        self.cursor += 1;
        Ok(())
    }

    pub(crate) fn seal(&mut self) {
        self.sealed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_names_are_kept() {
        assert_eq!(resolve_collection_name("Line_A", |_| false), "Line_A");
    }

    #[test]
    fn conflicts_replace_numeric_suffix() {
        let taken = ["Default_WinSSIM", "Default_WinSSIM_1", "Default_WinSSIM_2"];
        let exists = |name: &str| taken.contains(&name);
        assert_eq!(
            resolve_collection_name("Default_WinSSIM", exists),
            "Default_WinSSIM_3"
        );
        assert_eq!(
            resolve_collection_name("Default_WinSSIM_1", exists),
            "Default_WinSSIM_3"
        );
    }

    #[test]
    fn sealed_run_rejects_records() {
        let mut run = Run::new("c", PathBuf::from("c/run_1"), 1, 2);
        run.record(Vec::new()).unwrap();
        run.seal();
        assert_eq!(
            run.record(Vec::new()),
            Err(WinSsimError::Sealed { ordinal: 1 })
        );
    }
}
