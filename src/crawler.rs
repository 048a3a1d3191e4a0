//! Reverse-chronological walk over a board's post archive.
//!
//! Starting from the newest index (or the persisted resumption point), posts
//! are visited in strictly decreasing index order. Posts are folded into an
//! in-memory per-day counter; each time the parsed date changes, the finished
//! day is appended to the progress table before the walk continues.
//!
//! Precondition on the remote archive: post dates are non-increasing as the
//! index descends (the board is append-only in index order). The walk checks
//! this and logs a warning on violations, but does not reorder posts.

use chrono::{NaiveDate, NaiveDateTime};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::client::{BoardClient, BoardSession, RemotePost};
use crate::config::Config;
use crate::progress::{CrawlCursor, DailyTally, ProgressError, ProgressStore};
use crate::retry::{with_retry, RetryExhausted};
use crate::session;

/// Board timestamps look like `Thu Aug  7 12:34:56 2025`.
const POST_DATE_FORMAT: &str = "%a %b %d %H:%M:%S %Y";

/// A condition that ends the run. Per-post fetch failures are not here: those
/// are downgraded to skips and the walk continues.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("authentication failed")]
    Authentication(#[source] RetryExhausted),
    #[error("could not determine the newest index of board {board}")]
    LatestIndex {
        board: String,
        #[source]
        source: RetryExhausted,
    },
    #[error("failed to persist crawl progress")]
    Persistence(#[from] ProgressError),
}

/// What one finished run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    /// Index the walk started from (newest, or the resumption point).
    pub start_index: u64,
    pub days_completed: u64,
    pub posts_counted: u64,
    /// Posts lost to retry exhaustion or unparseable dates. Any day flushed
    /// while this was non-zero is logged as incomplete.
    pub posts_skipped: u64,
}

/// In-memory accumulator for the day currently being walked.
#[derive(Debug)]
struct ActiveDay {
    date: NaiveDate,
    count: u64,
    skipped: u64,
}

impl ActiveDay {
    fn new(date: NaiveDate) -> Self {
        Self {
            date,
            count: 1,
            skipped: 0,
        }
    }
}

/// Outcome of one index step.
#[derive(Debug)]
enum Step {
    Post(RemotePost),
    Skip { index: u64 },
}

/// Run one crawl: load the cursor, open a session, walk the archive, and
/// close the session on every exit path.
pub async fn run<C: BoardClient>(
    client: &C,
    store: &ProgressStore,
    config: &Config,
) -> Result<CrawlSummary, CrawlError> {
    let cursor = store.load()?;
    if let (Some(date), Some(index)) = (cursor.resume_date, cursor.resume_index) {
        info!(resume_date = %date, resume_index = index, "Resuming from persisted progress");
    }

    let session = session::open(client, &config.username, &config.password, config.retry_policy())
        .await?;
    let outcome = traverse(client, &session, &cursor, store, config).await;
    session::close(client, &session).await;
    outcome
}

async fn traverse<C: BoardClient>(
    client: &C,
    session: &BoardSession,
    cursor: &CrawlCursor,
    store: &ProgressStore,
    config: &Config,
) -> Result<CrawlSummary, CrawlError> {
    let policy = config.retry_policy();

    let newest = with_retry(policy, "latest-index", || {
        client.latest_index(session, &config.board)
    })
    .await
    .map_err(|source| CrawlError::LatestIndex {
        board: config.board.clone(),
        source,
    })?;

    let start_index = cursor.resume_index.unwrap_or(newest);
    info!(
        board = %config.board,
        newest_index = newest,
        start_index,
        "Starting reverse walk"
    );

    let mut summary = CrawlSummary {
        start_index,
        ..CrawlSummary::default()
    };
    let mut active: Option<ActiveDay> = None;

    // Strictly decreasing by one per step; the walk ends when index 1 has
    // been processed, on both fetch outcomes.
    for index in (1..=start_index).rev() {
        match fetch_step(client, session, config, index).await {
            Step::Post(post) => match parse_post_date(&post.date) {
                Some(date) => {
                    summary.posts_counted += 1;
                    active = Some(fold_post(store, active, date, index, &mut summary)?);
                }
                None => {
                    warn!(
                        index,
                        raw_date = %post.date,
                        "Unparseable post date, treating post as skipped"
                    );
                    record_skip(active.as_mut(), &mut summary);
                }
            },
            Step::Skip { index } => {
                debug!(index, "Index contributed nothing to the tally");
                record_skip(active.as_mut(), &mut summary);
            }
        }
    }

    if let Some(day) = active {
        // The walk ended at index 1, so that is the final day's earliest index.
        flush_day(store, &day, 1, &mut summary)?;
    }

    info!(
        days = summary.days_completed,
        posts = summary.posts_counted,
        skipped = summary.posts_skipped,
        "Walk finished"
    );
    Ok(summary)
}

/// Fetch the post at `index`, downgrading retry exhaustion to an explicit skip.
async fn fetch_step<C: BoardClient>(
    client: &C,
    session: &BoardSession,
    config: &Config,
    index: u64,
) -> Step {
    match with_retry(config.retry_policy(), "fetch-post", || {
        client.fetch_post(session, &config.board, index)
    })
    .await
    {
        Ok(post) => Step::Post(post),
        Err(e) => {
            warn!(index, error = %e, "Skipping unreachable post");
            Step::Skip { index }
        }
    }
}

/// Fold one dated post into the active day, flushing the previous day when
/// the date changes.
fn fold_post(
    store: &ProgressStore,
    active: Option<ActiveDay>,
    date: NaiveDate,
    index: u64,
    summary: &mut CrawlSummary,
) -> Result<ActiveDay, CrawlError> {
    Ok(match active {
        None => ActiveDay::new(date),
        Some(mut day) if day.date == date => {
            day.count += 1;
            day
        }
        Some(day) => {
            if date > day.date {
                warn!(
                    index,
                    post_date = %date,
                    active_date = %day.date,
                    "Post date newer than active day; archive ordering precondition violated"
                );
            }
            // This index starts a new day, so the previous one was the old
            // day's earliest.
            flush_day(store, &day, index + 1, summary)?;
            ActiveDay::new(date)
        }
    })
}

fn flush_day(
    store: &ProgressStore,
    day: &ActiveDay,
    earliest_index: u64,
    summary: &mut CrawlSummary,
) -> Result<(), CrawlError> {
    store.append(&DailyTally {
        date: day.date,
        count: day.count,
        earliest_index,
    })?;
    summary.days_completed += 1;

    if day.skipped > 0 {
        warn!(
            date = %day.date,
            count = day.count,
            skipped = day.skipped,
            earliest_index,
            "Day tally persisted incomplete, unreachable posts were skipped"
        );
    } else {
        info!(
            date = %day.date,
            count = day.count,
            earliest_index,
            "Day tally persisted"
        );
    }
    Ok(())
}

fn record_skip(active: Option<&mut ActiveDay>, summary: &mut CrawlSummary) {
    summary.posts_skipped += 1;
    if let Some(day) = active {
        day.skipped += 1;
    }
}

fn parse_post_date(raw: &str) -> Option<NaiveDate> {
    NaiveDateTime::parse_from_str(raw.trim(), POST_DATE_FORMAT)
        .ok()
        .map(|dt| dt.date())
}
