//! Read-back of persisted runs.
//!
//! Walks a results tree laid out as `{date}/{collection}/run_{n}` and parses
//! each run's annotation file.

use crate::run::{RecordRow, ANNOTATION_DIR, ANNOTATION_FILE};
use crate::trace::trace_warn;
use crate::util::{natural_cmp, WinSsimResult};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Parsed contents of one run directory.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunSummary {
    pub date: String,
    pub collection: String,
    pub run: String,
    pub path: PathBuf,
    pub rows: Vec<RecordRow>,
}

impl RunSummary {
    pub fn comparisons(&self) -> usize {
        self.rows.len()
    }

    /// Running average of the last record, i.e. the run's mean score.
    pub fn final_average(&self) -> Option<f64> {
        self.rows.last().map(|row| row.running_average)
    }
}

/// Parses an annotation file. Malformed rows are skipped.
pub fn read_annotation(path: &Path) -> WinSsimResult<Vec<RecordRow>> {
    let text = fs::read_to_string(path)?;
    let mut rows = Vec::new();
    for (idx, line) in text.lines().enumerate().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        match parse_row(line) {
            Some(row) => rows.push(row),
            None => {
                trace_warn!("annotation_row_skipped", line = idx + 1);
            }
        }
    }
    Ok(rows)
}

fn parse_row(line: &str) -> Option<RecordRow> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    let [sn, image_file, pattern_file, score, average] = fields.as_slice() else {
        return None;
    };
    Some(RecordRow {
        sn: sn.to_string(),
        image_file: image_file.to_string(),
        pattern_file: pattern_file.to_string(),
        score: score.parse().ok()?,
        running_average: average.parse().ok()?,
    })
}

/// Summarizes every run under `results_root`, ordered by date, collection
/// and run (natural order). Runs without an annotation file have no rows.
pub fn scan_results(results_root: &Path) -> WinSsimResult<Vec<RunSummary>> {
    let mut summaries = Vec::new();
    for date in sorted_dirs(results_root)? {
        for collection in sorted_dirs(&date)? {
            for run in sorted_dirs(&collection)? {
                let annotation = run.join(ANNOTATION_DIR).join(ANNOTATION_FILE);
                let rows = if annotation.is_file() {
                    read_annotation(&annotation)?
                } else {
                    Vec::new()
                };
                summaries.push(RunSummary {
                    date: file_name(&date),
                    collection: file_name(&collection),
                    run: file_name(&run),
                    path: run,
                    rows,
                });
            }
        }
    }
    Ok(summaries)
}

fn sorted_dirs(dir: &Path) -> WinSsimResult<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort_by(|a, b| natural_cmp(&file_name(a), &file_name(b)));
    Ok(dirs)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_rows_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Annotation.csv");
        fs::write(
            &path,
            "SN,Image_Name,Pattern_Name,SSIM_Value,Current Average Value\n\
             01,01_Image.png,01_Pattern.png,0.5,0.5\n\
             garbage\n\
             02,02_Image.png,02_Pattern.png,1,0.75\n",
        )
        .unwrap();
        let rows = read_annotation(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].sn, "02");
        assert_eq!(rows[1].running_average, 0.75);
    }

    #[test]
    fn runs_are_ordered_naturally() {
        let dir = tempfile::tempdir().unwrap();
        let collection = dir.path().join("2024-01-02").join("Line");
        for run in ["run_10", "run_2", "run_1"] {
            fs::create_dir_all(collection.join(run)).unwrap();
        }
        let runs: Vec<String> = scan_results(dir.path())
            .unwrap()
            .into_iter()
            .map(|s| s.run)
            .collect();
        assert_eq!(runs, vec!["run_1", "run_2", "run_10"]);
    }
}
