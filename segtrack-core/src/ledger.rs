//! Append-only CSV log of segment observations.
//!
//! Layout (one row per segment per run):
//! `segment_id,segment_name,date,total_attempts_on_date,daily_attempts,athlete_count`
//!
//! Features:
//! - Header written only when the file is created or empty
//! - Malformed rows are skipped with a warning, never rewritten
//! - A file with an unexpected header is quarantined ({filename}.quarantined)
//!   and a fresh log is started
//! - Rows recorded during a run are visible to later records in the same run

use crate::strava::{SegmentId, SegmentSnapshot};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const HEADER: [&str; 6] = [
    "segment_id",
    "segment_name",
    "date",
    "total_attempts_on_date",
    "daily_attempts",
    "athlete_count",
];

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("log I/O error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> LedgerError + '_ {
    move |source| LedgerError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// One observation of one segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRow {
    pub segment_id: SegmentId,
    pub segment_name: String,
    pub date: NaiveDate,
    pub total_attempts_on_date: u64,
    pub daily_attempts: u64,
    pub athlete_count: u64,
}

/// Attempts since the previous observation.
///
/// The first observation of a segment has no baseline and counts as zero.
/// Strava occasionally recalculates totals downwards; that also counts as zero.
pub fn daily_attempts(previous_total: Option<u64>, current_total: u64) -> u64 {
    match previous_total {
        None => 0,
        Some(prev) => current_total.saturating_sub(prev),
    }
}

/// The segment log file plus everything recorded but not yet written.
#[derive(Debug)]
pub struct SegmentLog {
    path: PathBuf,
    rows: Vec<LogRow>,
    pending: usize,
    needs_header: bool,
}

impl SegmentLog {
    /// Load the log at `path`. A missing or empty file is an empty log.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();

        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "segment log not found, will create");
                return Ok(Self::empty(path));
            }
            Err(e) => return Err(io_err(&path)(e)),
        };

        if text.trim().is_empty() {
            return Ok(Self::empty(path));
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(text.as_bytes());

        let header_ok = reader
            .headers()
            .map(|h| h.iter().map(str::trim).eq(HEADER.iter().copied()))
            .unwrap_or(false);

        if !header_ok {
            let moved_to = quarantine(&path)?;
            tracing::warn!(
                path = %path.display(),
                quarantined = %moved_to.display(),
                "segment log has an unexpected header; quarantined and starting a new log"
            );
            return Ok(Self::empty(path));
        }

        let mut rows = Vec::new();
        for (i, record) in reader.deserialize::<LogRow>().enumerate() {
            match record {
                Ok(row) => rows.push(row),
                // +2: header line and 1-based numbering
                Err(e) => tracing::warn!(line = i + 2, error = %e, "skipping malformed log row"),
            }
        }

        Ok(Self {
            path,
            rows,
            pending: 0,
            needs_header: false,
        })
    }

    fn empty(path: PathBuf) -> Self {
        Self {
            path,
            rows: Vec::new(),
            pending: 0,
            needs_header: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All rows in file order, including unwritten ones.
    pub fn rows(&self) -> &[LogRow] {
        &self.rows
    }

    /// Latest observation of a segment; on equal dates the later row wins.
    pub fn last_observation(&self, id: SegmentId) -> Option<&LogRow> {
        self.rows
            .iter()
            .filter(|r| r.segment_id == id)
            .fold(None, |best: Option<&LogRow>, row| match best {
                Some(b) if b.date > row.date => Some(b),
                _ => Some(row),
            })
    }

    /// Derive the row for `snapshot` on `date` and queue it for writing.
    pub fn record(&mut self, snapshot: &SegmentSnapshot, date: NaiveDate) -> LogRow {
        let previous = self.last_observation(snapshot.id);
        let prev_total = previous.map(|r| r.total_attempts_on_date);

        if let Some(prev) = previous {
            if snapshot.effort_count < prev.total_attempts_on_date {
                tracing::warn!(
                    segment = %snapshot.id,
                    current = snapshot.effort_count,
                    previous = prev.total_attempts_on_date,
                    previous_date = %prev.date,
                    "total attempts decreased since last observation; recording 0 daily attempts"
                );
            }
        }

        let row = LogRow {
            segment_id: snapshot.id,
            segment_name: snapshot.name.clone(),
            date,
            total_attempts_on_date: snapshot.effort_count,
            daily_attempts: daily_attempts(prev_total, snapshot.effort_count),
            athlete_count: snapshot.athlete_count,
        };

        tracing::info!(
            segment = %row.segment_id,
            total = row.total_attempts_on_date,
            previous = ?prev_total,
            daily = row.daily_attempts,
            athletes = row.athlete_count,
            "recorded observation"
        );

        self.rows.push(row.clone());
        self.pending += 1;
        row
    }

    /// Rows for one segment, ordered by date (file order within a date).
    pub fn rows_for(&self, id: SegmentId) -> Vec<&LogRow> {
        let mut rows: Vec<&LogRow> = self.rows.iter().filter(|r| r.segment_id == id).collect();
        rows.sort_by_key(|r| r.date);
        rows
    }

    /// Distinct segments in first-seen order, each with its most recent name.
    pub fn segments(&self) -> Vec<(SegmentId, String)> {
        let mut out: Vec<(SegmentId, String)> = Vec::new();
        for row in &self.rows {
            match out.iter_mut().find(|(id, _)| *id == row.segment_id) {
                Some(entry) => entry.1 = row.segment_name.clone(),
                None => out.push((row.segment_id, row.segment_name.clone())),
            }
        }
        out
    }

    /// Number of recorded rows not yet written.
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Append all pending rows to the file. Returns how many were written.
    pub fn flush(&mut self) -> Result<usize, LedgerError> {
        if self.pending == 0 {
            return Ok(0);
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err(parent))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .map_err(io_err(&self.path))?;

        let len = file.metadata().map_err(io_err(&self.path))?.len();
        let write_header = self.needs_header || len == 0;

        // Hand-edited files sometimes lose their trailing newline.
        if !write_header && !ends_with_newline(&mut file, len).map_err(io_err(&self.path))? {
            file.write_all(b"\n").map_err(io_err(&self.path))?;
        }

        let start = self.rows.len() - self.pending;
        {
            let mut wtr = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(&mut file);
            if write_header {
                wtr.write_record(HEADER)?;
            }
            for row in &self.rows[start..] {
                wtr.serialize(row)?;
            }
            wtr.flush().map_err(io_err(&self.path))?;
        }

        let written = self.pending;
        self.pending = 0;
        self.needs_header = false;
        tracing::info!(path = %self.path.display(), rows = written, "appended to segment log");
        Ok(written)
    }
}

fn ends_with_newline(file: &mut fs::File, len: u64) -> io::Result<bool> {
    if len == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

/// Move an unreadable log aside without overwriting an earlier quarantine.
fn quarantine(path: &Path) -> Result<PathBuf, LedgerError> {
    let name = path.file_name().unwrap_or_default();
    let suffixed = |suffix: &str| {
        let mut file_name = name.to_os_string();
        file_name.push(suffix);
        path.with_file_name(file_name)
    };

    let mut target = suffixed(".quarantined");
    if target.exists() {
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S");
        target = suffixed(&format!(".{stamp}.quarantined"));
    }
    fs::rename(path, &target).map_err(io_err(path))?;
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn snap(id: u64, efforts: u64) -> SegmentSnapshot {
        SegmentSnapshot {
            id: SegmentId(id),
            name: format!("Hill {id}"),
            effort_count: efforts,
            athlete_count: efforts / 2,
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    #[test]
    fn first_observation_counts_zero() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = SegmentLog::open(dir.path().join("log.csv")).unwrap();
        let row = log.record(&snap(1, 500), day(1));
        assert_eq!(row.daily_attempts, 0);
        assert_eq!(row.total_attempts_on_date, 500);
    }

    #[test]
    fn later_observation_counts_difference() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = SegmentLog::open(dir.path().join("log.csv")).unwrap();
        log.record(&snap(1, 500), day(1));
        let row = log.record(&snap(1, 512), day(2));
        assert_eq!(row.daily_attempts, 12);
    }

    #[test]
    fn decreasing_total_clamps_to_zero() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = SegmentLog::open(dir.path().join("log.csv")).unwrap();
        log.record(&snap(1, 500), day(1));
        let row = log.record(&snap(1, 490), day(2));
        assert_eq!(row.daily_attempts, 0);
    }

    #[test]
    fn segments_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = SegmentLog::open(dir.path().join("log.csv")).unwrap();
        log.record(&snap(1, 100), day(1));
        let row = log.record(&snap(2, 900), day(1));
        assert_eq!(row.daily_attempts, 0);
    }

    #[test]
    fn writes_header_once_and_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");

        let mut log = SegmentLog::open(&path).unwrap();
        log.record(&snap(1, 100), day(1));
        assert_eq!(log.flush().unwrap(), 1);

        let mut log = SegmentLog::open(&path).unwrap();
        assert_eq!(log.rows().len(), 1);
        log.record(&snap(1, 104), day(2));
        log.flush().unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], HEADER.join(","));
        assert_eq!(lines[1], "1,Hill 1,2024-05-01,100,0,50");
        assert_eq!(lines[2], "1,Hill 1,2024-05-02,104,4,52");
    }

    #[test]
    fn flush_without_pending_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let mut log = SegmentLog::open(&path).unwrap();
        assert_eq!(log.flush().unwrap(), 0);
        assert!(!path.exists());
    }

    #[test]
    fn quotes_names_with_commas() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let mut log = SegmentLog::open(&path).unwrap();
        let mut s = snap(3, 10);
        s.name = "Up, \"the\" hill".into();
        log.record(&s, day(1));
        log.flush().unwrap();

        let reopened = SegmentLog::open(&path).unwrap();
        assert_eq!(reopened.rows()[0].segment_name, "Up, \"the\" hill");
    }

    #[test]
    fn empty_file_gets_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        fs::write(&path, "").unwrap();
        let mut log = SegmentLog::open(&path).unwrap();
        log.record(&snap(1, 5), day(1));
        log.flush().unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("segment_id,"));
    }

    #[test]
    fn malformed_rows_are_skipped_not_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        fs::write(
            &path,
            "segment_id,segment_name,date,total_attempts_on_date,daily_attempts,athlete_count\n\
             1,Hill,2024-05-01,100,0,10\n\
             1,Hill,not-a-date,,0,10\n",
        )
        .unwrap();
        let log = SegmentLog::open(&path).unwrap();
        assert_eq!(log.rows().len(), 1);
        assert!(fs::read_to_string(&path).unwrap().contains("not-a-date"));
    }

    #[test]
    fn unexpected_header_is_quarantined() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        fs::write(&path, "id,when\n1,yesterday\n").unwrap();

        let mut log = SegmentLog::open(&path).unwrap();
        assert!(log.rows().is_empty());
        assert!(!path.exists());
        assert!(dir.path().join("log.csv.quarantined").exists());

        log.record(&snap(1, 5), day(1));
        log.flush().unwrap();
        assert!(fs::read_to_string(&path).unwrap().starts_with("segment_id,"));
    }

    #[test]
    fn quarantine_keeps_the_full_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("segments.log");

        fs::write(&path, "id,when\n").unwrap();
        SegmentLog::open(&path).unwrap();
        assert!(dir.path().join("segments.log.quarantined").exists());
        assert!(!dir.path().join("segments.csv.quarantined").exists());

        // A second bad file does not overwrite the first.
        fs::write(&path, "other,header\n").unwrap();
        SegmentLog::open(&path).unwrap();
        let moved: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".quarantined"))
            .collect();
        assert_eq!(moved.len(), 2, "{moved:?}");
        assert!(moved.iter().all(|n| n.starts_with("segments.log.")));
        assert_eq!(
            fs::read_to_string(dir.path().join("segments.log.quarantined")).unwrap(),
            "id,when\n"
        );
    }

    #[test]
    fn missing_trailing_newline_is_repaired() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        fs::write(
            &path,
            "segment_id,segment_name,date,total_attempts_on_date,daily_attempts,athlete_count\n\
             1,Hill,2024-05-01,100,0,10",
        )
        .unwrap();
        let mut log = SegmentLog::open(&path).unwrap();
        log.record(&snap(1, 103), day(2));
        log.flush().unwrap();

        let reopened = SegmentLog::open(&path).unwrap();
        assert_eq!(reopened.rows().len(), 2);
        assert_eq!(reopened.rows()[1].daily_attempts, 3);
    }

    #[test]
    fn last_observation_prefers_latest_date_then_file_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = SegmentLog::open(dir.path().join("log.csv")).unwrap();
        log.record(&snap(1, 100), day(3));
        log.record(&snap(1, 90), day(1));
        log.record(&snap(1, 120), day(3));
        assert_eq!(log.last_observation(SegmentId(1)).unwrap().total_attempts_on_date, 120);
        let dates: Vec<_> = log.rows_for(SegmentId(1)).iter().map(|r| r.date).collect();
        assert_eq!(dates, vec![day(1), day(3), day(3)]);
    }

    #[test]
    fn segments_track_latest_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = SegmentLog::open(dir.path().join("log.csv")).unwrap();
        log.record(&snap(2, 1), day(1));
        log.record(&snap(1, 1), day(1));
        let mut renamed = snap(2, 2);
        renamed.name = "Renamed".into();
        log.record(&renamed, day(2));
        assert_eq!(
            log.segments(),
            vec![(SegmentId(2), "Renamed".to_string()), (SegmentId(1), "Hill 1".to_string())]
        );
    }

    proptest! {
        #[test]
        fn daily_attempts_sum_to_growth(totals in proptest::collection::vec(0u64..10_000, 1..30)) {
            let mut sorted = totals.clone();
            sorted.sort_unstable();
            let mut prev = None;
            let mut sum = 0;
            for &t in &sorted {
                sum += daily_attempts(prev, t);
                prev = Some(t);
            }
            prop_assert_eq!(sum, sorted[sorted.len() - 1] - sorted[0]);
        }

        #[test]
        fn daily_attempts_never_exceed_total(prev in proptest::option::of(0u64..1_000_000), cur in 0u64..1_000_000) {
            prop_assert!(daily_attempts(prev, cur) <= cur);
        }
    }
}
