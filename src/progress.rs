//! Durable per-day tally table.
//!
//! A flat CSV file: one header row, then one append-only row per completed
//! day. The last row doubles as the resumption point for an interrupted run.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use thiserror::Error;
use tracing::info;

const HEADER: &str = "date,count,earliest_index";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// One completed day: how many posts it had and the smallest index seen for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyTally {
    pub date: NaiveDate,
    pub count: u64,
    pub earliest_index: u64,
}

/// Where to pick up an interrupted crawl, derived from the last persisted row.
///
/// `resume_index` is one position before the oldest index already recorded, so
/// the partially-seen boundary day is re-walked rather than trusted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlCursor {
    pub resume_date: Option<NaiveDate>,
    pub resume_index: Option<u64>,
}

#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("failed to access progress table {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("progress table {path} line {line}: {message}")]
    Malformed {
        path: PathBuf,
        line: usize,
        message: String,
    },
}

/// Append-only CSV table of completed days.
#[derive(Debug, Clone)]
pub struct ProgressStore {
    path: PathBuf,
}

impl ProgressStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Derive the resumption cursor from the table, creating an empty table
    /// (header only) if none exists yet.
    pub fn load(&self) -> Result<CrawlCursor, ProgressError> {
        if !self.path.exists() {
            self.create_empty()?;
            return Ok(CrawlCursor::default());
        }

        let rows = self.read_rows()?;
        Ok(match rows.last() {
            Some(last) => CrawlCursor {
                resume_date: Some(last.date),
                resume_index: Some(last.earliest_index - 1),
            },
            None => CrawlCursor::default(),
        })
    }

    /// Append one completed day and flush it to stable storage before returning.
    pub fn append(&self, tally: &DailyTally) -> Result<(), ProgressError> {
        if !self.path.exists() {
            self.create_empty()?;
        }

        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;
        writeln!(
            file,
            "{},{},{}",
            tally.date.format(DATE_FORMAT),
            tally.count,
            tally.earliest_index
        )
        .map_err(|e| self.io_error(e))?;
        file.sync_all().map_err(|e| self.io_error(e))?;
        Ok(())
    }

    /// Read every persisted row, in append order.
    pub fn read_rows(&self) -> Result<Vec<DailyTally>, ProgressError> {
        let text = fs::read_to_string(&self.path).map_err(|e| self.io_error(e))?;
        let mut lines = text.lines().enumerate();

        match lines.next() {
            Some((_, header)) if header.trim() == HEADER => {}
            Some((_, header)) => {
                return Err(self.malformed(
                    1,
                    format!("expected header `{HEADER}`, found `{}`", header.trim()),
                ));
            }
            None => return Err(self.malformed(1, "missing header row".to_string())),
        }

        let mut rows = Vec::new();
        for (i, line) in lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            rows.push(self.parse_row(i + 1, line)?);
        }
        Ok(rows)
    }

    fn create_empty(&self) -> Result<(), ProgressError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
            }
        }
        let mut file = File::create(&self.path).map_err(|e| self.io_error(e))?;
        writeln!(file, "{HEADER}").map_err(|e| self.io_error(e))?;
        file.sync_all().map_err(|e| self.io_error(e))?;
        info!(path = %self.path.display(), "Created empty progress table");
        Ok(())
    }

    fn parse_row(&self, line_no: usize, line: &str) -> Result<DailyTally, ProgressError> {
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() != 3 {
            return Err(self.malformed(
                line_no,
                format!("expected 3 fields, found {}", fields.len()),
            ));
        }

        let date = NaiveDate::parse_from_str(fields[0], DATE_FORMAT)
            .map_err(|e| self.malformed(line_no, format!("bad date `{}`: {e}", fields[0])))?;
        let count: u64 = fields[1]
            .parse()
            .map_err(|e| self.malformed(line_no, format!("bad count `{}`: {e}", fields[1])))?;
        let earliest_index: u64 = fields[2].parse().map_err(|e| {
            self.malformed(line_no, format!("bad earliest_index `{}`: {e}", fields[2]))
        })?;
        if earliest_index == 0 {
            return Err(self.malformed(line_no, "earliest_index must be positive".to_string()));
        }

        Ok(DailyTally {
            date,
            count,
            earliest_index,
        })
    }

    fn io_error(&self, source: std::io::Error) -> ProgressError {
        ProgressError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn malformed(&self, line: usize, message: String) -> ProgressError {
        ProgressError::Malformed {
            path: self.path.clone(),
            line,
            message,
        }
    }
}
