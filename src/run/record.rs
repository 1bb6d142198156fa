//! Persistence of comparisons.
//!
//! Storage layout written by [`FsRecordSink`]:
//!
//! ```text
//! {results}/{YYYY-MM-DD}/{collection}/run_{n}/
//!     {stem}_Image.png               image crop
//!     {stem}_Pattern.png             pattern crop
//!     {stem}_FullScale_Image.png     frame with the image region outlined
//!     {stem}_FullScale_Pattern.png   pattern with the pattern region outlined
//!     ANNOTATION/Annotation.csv      one row per comparison
//! ```
//!
//! `stem` is the pattern id, or `{id}_{region}` when several regions are
//! compared per capture.

use super::collection::{resolve_collection_name, Collection, Run};
use crate::compare::Comparison;
use crate::image::draw::draw_bbox;
use crate::image::io::save_png;
use crate::image::ImageView;
use crate::trace::trace_event;
use crate::util::WinSsimResult;
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Folder holding the annotation file inside a run directory.
pub const ANNOTATION_DIR: &str = "ANNOTATION";
/// Annotation file name.
pub const ANNOTATION_FILE: &str = "Annotation.csv";
/// Header row of the annotation file.
pub const ANNOTATION_HEADER: &str = "SN,Image_Name,Pattern_Name,SSIM_Value,Current Average Value";

/// Full-scale images and overlay style for one record.
#[derive(Clone, Copy, Debug)]
pub struct Evidence<'a> {
    pub frame: ImageView<'a>,
    pub pattern: ImageView<'a>,
    pub bbox_rgb: [u8; 3],
    pub bbox_line_width: u32,
    /// Several regions are compared per capture.
    pub multi_region: bool,
}

/// One row of the annotation file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordRow {
    pub sn: String,
    pub image_file: String,
    pub pattern_file: String,
    pub score: f64,
    pub running_average: f64,
}

impl RecordRow {
    pub fn new(comparison: &Comparison, multi_region: bool) -> Self {
        let sn = if multi_region {
            format!("{}_{}", comparison.pattern_id, comparison.region_id)
        } else {
            comparison.pattern_id.to_string()
        };
        Self {
            image_file: format!("{sn}_Image.png"),
            pattern_file: format!("{sn}_Pattern.png"),
            sn,
            score: comparison.score,
            running_average: comparison.running_average,
        }
    }

    pub fn to_csv_line(&self) -> String {
        format!(
            "{},{},{},{},{}",
            self.sn, self.image_file, self.pattern_file, self.score, self.running_average
        )
    }
}

/// Destination of collections, runs and comparison records.
pub trait RecordSink {
    /// Creates storage for a collection, suffixing the name on conflict.
    fn open_collection(&mut self, requested: &str) -> WinSsimResult<Collection>;

    /// Creates storage for the next run of `collection` and returns its path.
    fn open_run(&mut self, collection: &Collection) -> WinSsimResult<PathBuf>;

    /// Appends every comparison of one trigger to `run`. The first write
    /// creates the record file with its header.
    ///
    /// Either all rows are appended or none: evidence images are written
    /// first and the rows follow in a single append.
    fn write_comparison_records(
        &mut self,
        run: &Run,
        comparisons: &[Comparison],
        evidence: &Evidence<'_>,
    ) -> WinSsimResult<()>;
}

/// Record sink writing PNG evidence and a CSV annotation file.
#[derive(Clone, Debug)]
pub struct FsRecordSink {
    results_root: PathBuf,
    date: NaiveDate,
}

impl FsRecordSink {
    /// Sink stamped with today's local date.
    pub fn new(results_root: impl Into<PathBuf>) -> Self {
        Self::with_date(results_root, Local::now().date_naive())
    }

    pub fn with_date(results_root: impl Into<PathBuf>, date: NaiveDate) -> Self {
        Self {
            results_root: results_root.into(),
            date,
        }
    }

    pub fn results_root(&self) -> &Path {
        &self.results_root
    }

    /// `{results}/{YYYY-MM-DD}`.
    pub fn date_dir(&self) -> PathBuf {
        self.results_root
            .join(self.date.format("%Y-%m-%d").to_string())
    }
}

impl RecordSink for FsRecordSink {
    fn open_collection(&mut self, requested: &str) -> WinSsimResult<Collection> {
        let date_dir = self.date_dir();
        fs::create_dir_all(&date_dir)?;
        let name = resolve_collection_name(requested, |name| date_dir.join(name).exists());
        let path = date_dir.join(&name);
        fs::create_dir_all(&path)?;
        trace_event!("collection_created", name = name.as_str());
        Ok(Collection::new(requested, name, path))
    }

    fn open_run(&mut self, collection: &Collection) -> WinSsimResult<PathBuf> {
        let root = collection.storage_path();
        fs::create_dir_all(root)?;
        let mut ordinal = highest_run_ordinal(root)? + 1;
        loop {
            let path = root.join(format!("{RUN_PREFIX}{ordinal}"));
            match fs::create_dir(&path) {
                Ok(()) => {
                    trace_event!("run_opened", path = path.display().to_string().as_str());
                    return Ok(path);
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => ordinal += 1,
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn write_comparison_records(
        &mut self,
        run: &Run,
        comparisons: &[Comparison],
        evidence: &Evidence<'_>,
    ) -> WinSsimResult<()> {
        let dir = run.storage_path();
        fs::create_dir_all(dir)?;
        let rows: Vec<RecordRow> = comparisons
            .iter()
            .map(|cmp| RecordRow::new(cmp, evidence.multi_region))
            .collect();

        for (comparison, row) in comparisons.iter().zip(&rows) {
            write_evidence(dir, comparison, row, evidence)?;
        }

        let annotation_dir = dir.join(ANNOTATION_DIR);
        fs::create_dir_all(&annotation_dir)?;
        let csv_path = annotation_dir.join(ANNOTATION_FILE);
        let is_new = !csv_path.exists();
        let mut text = String::new();
        if is_new {
            text.push_str(ANNOTATION_HEADER);
            text.push('\n');
        }
        for row in &rows {
            text.push_str(&row.to_csv_line());
            text.push('\n');
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&csv_path)?;
        file.write_all(text.as_bytes())?;
        Ok(())
    }
}

/// Run directories are named `run_{n}`.
const RUN_PREFIX: &str = "run_";

/// Largest `n` among the `run_{n}` directories in `collection_dir`, 0 if none.
fn highest_run_ordinal(collection_dir: &Path) -> WinSsimResult<usize> {
    let mut highest = 0;
    for entry in fs::read_dir(collection_dir)? {
        let name = entry?.file_name();
        let ordinal = name
            .to_str()
            .and_then(|n| n.strip_prefix(RUN_PREFIX))
            .and_then(|n| n.parse::<usize>().ok());
        if let Some(n) = ordinal {
            highest = highest.max(n);
        }
    }
    Ok(highest)
}

fn write_evidence(
    dir: &Path,
    comparison: &Comparison,
    row: &RecordRow,
    evidence: &Evidence<'_>,
) -> WinSsimResult<()> {
    save_png(comparison.image_crop.view(), dir.join(&row.image_file))?;
    save_png(comparison.pattern_crop.view(), dir.join(&row.pattern_file))?;

    let mut frame = evidence.frame.to_owned_image();
    draw_bbox(
        &mut frame,
        comparison.image_region,
        evidence.bbox_rgb,
        evidence.bbox_line_width,
    );
    save_png(frame.view(), dir.join(format!("{}_FullScale_Image.png", row.sn)))?;

    let mut pattern = evidence.pattern.to_owned_image();
    draw_bbox(
        &mut pattern,
        comparison.pattern_region,
        evidence.bbox_rgb,
        evidence.bbox_line_width,
    );
    save_png(pattern.view(), dir.join(format!("{}_FullScale_Pattern.png", row.sn)))
}

/// Record sink keeping everything in memory.
#[derive(Clone, Debug)]
pub struct MemoryRecordSink {
    root: PathBuf,
    collections: Vec<String>,
    runs: Vec<PathBuf>,
    rows: Vec<(PathBuf, RecordRow)>,
}

impl MemoryRecordSink {
    pub fn new() -> Self {
        Self {
            root: PathBuf::from("memory"),
            collections: Vec::new(),
            runs: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Paths of every run opened so far, in order.
    pub fn runs(&self) -> &[PathBuf] {
        &self.runs
    }

    /// Rows written to the run stored at `path`.
    pub fn rows_for(&self, path: &Path) -> Vec<&RecordRow> {
        self.rows
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, row)| row)
            .collect()
    }

    pub fn rows(&self) -> impl Iterator<Item = &RecordRow> {
        self.rows.iter().map(|(_, row)| row)
    }
}

impl Default for MemoryRecordSink {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordSink for MemoryRecordSink {
    fn open_collection(&mut self, requested: &str) -> WinSsimResult<Collection> {
        let name = resolve_collection_name(requested, |name| {
            self.collections.iter().any(|c| c == name)
        });
        self.collections.push(name.clone());
        let path = self.root.join(&name);
        Ok(Collection::new(requested, name, path))
    }

    fn open_run(&mut self, collection: &Collection) -> WinSsimResult<PathBuf> {
        let existing = self
            .runs
            .iter()
            .filter(|p| p.starts_with(collection.storage_path()))
            .count();
        let path = collection
            .storage_path()
            .join(format!("run_{}", existing + 1));
        self.runs.push(path.clone());
        Ok(path)
    }

    fn write_comparison_records(
        &mut self,
        run: &Run,
        comparisons: &[Comparison],
        evidence: &Evidence<'_>,
    ) -> WinSsimResult<()> {
        let path = run.storage_path();
        self.rows.extend(comparisons.iter().map(|cmp| {
            (path.to_path_buf(), RecordRow::new(cmp, evidence.multi_region))
        }));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::OwnedImage;
    use crate::library::PatternId;
    use crate::region::Region;

    fn comparison(score: f64) -> Comparison {
        let crop = OwnedImage::filled(4, 4, 3, 50).unwrap();
        Comparison {
            pattern_id: PatternId::new(3),
            region_id: 2,
            image_region: Region::new(0, 0, 4, 4),
            pattern_region: Region::new(0, 0, 4, 4),
            image_crop: crop.clone(),
            pattern_crop: crop,
            score,
            running_average: score,
        }
    }

    #[test]
    fn row_names_follow_region_mode() {
        let cmp = comparison(0.5);
        let single = RecordRow::new(&cmp, false);
        assert_eq!(single.image_file, "03_Image.png");
        let multi = RecordRow::new(&cmp, true);
        assert_eq!(multi.sn, "03_2");
        assert_eq!(multi.pattern_file, "03_2_Pattern.png");
    }

    #[test]
    fn fs_sink_writes_header_once_and_evidence() {
        let dir = tempfile::tempdir().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 5, 17).unwrap();
        let mut sink = FsRecordSink::with_date(dir.path(), date);
        let collection = sink.open_collection(DEFAULT).unwrap();
        let run_path = sink.open_run(&collection).unwrap();
        assert_eq!(
            run_path,
            dir.path().join("2024-05-17").join(DEFAULT).join("run_1")
        );

        let run = Run::new(collection.name(), run_path.clone(), 1, 2);
        let frame = OwnedImage::filled(8, 8, 3, 0).unwrap();
        let evidence = Evidence {
            frame: frame.view(),
            pattern: frame.view(),
            bbox_rgb: [255, 0, 0],
            bbox_line_width: 1,
            multi_region: false,
        };
        sink.write_comparison_records(&run, &[comparison(0.25)], &evidence)
            .unwrap();
        sink.write_comparison_records(&run, &[comparison(0.75)], &evidence)
            .unwrap();

        let csv = fs::read_to_string(run_path.join(ANNOTATION_DIR).join(ANNOTATION_FILE)).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], ANNOTATION_HEADER);
        assert_eq!(lines[1], "03,03_Image.png,03_Pattern.png,0.25,0.25");
        for name in [
            "03_Image.png",
            "03_Pattern.png",
            "03_FullScale_Image.png",
            "03_FullScale_Pattern.png",
        ] {
            assert!(run_path.join(name).exists(), "{name} missing");
        }
    }

    #[test]
    fn fs_sink_suffixes_conflicting_collections() {
        let dir = tempfile::tempdir().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 5, 17).unwrap();
        let mut sink = FsRecordSink::with_date(dir.path(), date);
        let first = sink.open_collection(DEFAULT).unwrap();
        assert!(first.conflict().is_none());
        let second = sink.open_collection(DEFAULT).unwrap();
        assert_eq!(second.name(), "Default_WinSSIM_1");
        assert_eq!(second.conflict().unwrap().requested, DEFAULT);
    }

    #[test]
    fn failed_evidence_write_appends_no_rows() {
        let dir = tempfile::tempdir().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 5, 17).unwrap();
        let mut sink = FsRecordSink::with_date(dir.path(), date);
        let collection = sink.open_collection(DEFAULT).unwrap();
        let run_path = sink.open_run(&collection).unwrap();
        let run = Run::new(collection.name(), run_path.clone(), 1, 1);

        let first = comparison(0.5);
        let mut second = comparison(0.25);
        second.region_id = 3;
        // A directory squatting on the second crop's file name makes its save fail.
        fs::create_dir(run_path.join("03_3_Image.png")).unwrap();

        let frame = OwnedImage::filled(8, 8, 3, 0).unwrap();
        let evidence = Evidence {
            frame: frame.view(),
            pattern: frame.view(),
            bbox_rgb: [255, 0, 0],
            bbox_line_width: 1,
            multi_region: true,
        };
        let pair = [first, second];
        assert!(sink.write_comparison_records(&run, &pair, &evidence).is_err());
        let csv_path = run_path.join(ANNOTATION_DIR).join(ANNOTATION_FILE);
        assert!(!csv_path.exists());

        fs::remove_dir(run_path.join("03_3_Image.png")).unwrap();
        sink.write_comparison_records(&run, &pair, &evidence).unwrap();
        let csv = fs::read_to_string(csv_path).unwrap();
        let sns: Vec<&str> = csv
            .lines()
            .skip(1)
            .filter_map(|line| line.split(',').next())
            .collect();
        assert_eq!(sns, vec!["03_2", "03_3"]);
    }

    #[test]
    fn open_run_never_reuses_an_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 5, 17).unwrap();
        let mut sink = FsRecordSink::with_date(dir.path(), date);
        let collection = sink.open_collection("Line").unwrap();
        let old_run = collection.storage_path().join("run_2");
        fs::create_dir_all(old_run.join(ANNOTATION_DIR)).unwrap();
        fs::write(old_run.join(ANNOTATION_DIR).join(ANNOTATION_FILE), "old\n").unwrap();
        fs::write(collection.storage_path().join("notes.txt"), "stray").unwrap();

        let path = sink.open_run(&collection).unwrap();
        assert_eq!(path, collection.storage_path().join("run_3"));
        let next = sink.open_run(&collection).unwrap();
        assert_eq!(next, collection.storage_path().join("run_4"));
        assert_eq!(
            fs::read_to_string(old_run.join(ANNOTATION_DIR).join(ANNOTATION_FILE)).unwrap(),
            "old\n"
        );
    }

    const DEFAULT: &str = crate::run::DEFAULT_COLLECTION_NAME;
}
