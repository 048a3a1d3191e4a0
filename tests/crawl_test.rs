//! Integration tests for the reverse-chronological crawl engine.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bbs_post_tally::client::{BoardClient, BoardSession, ClientError, RemotePost};
use bbs_post_tally::config::Config;
use bbs_post_tally::crawler::{self, CrawlError};
use bbs_post_tally::progress::{DailyTally, ProgressStore};
use chrono::NaiveDate;
use tempfile::TempDir;

/// In-memory board archive with failure injection.
struct FakeBoard {
    /// index -> raw post timestamp
    posts: BTreeMap<u64, String>,
    reject_credentials: bool,
    latest_unreachable: bool,
    /// Indices whose fetch fails on every attempt.
    dead_indices: HashSet<u64>,
    /// Indices whose fetch fails this many times, then succeeds.
    flaky_indices: HashMap<u64, u64>,
    attempts: Mutex<HashMap<u64, u64>>,
    visited: Mutex<Vec<u64>>,
    sessions_closed: AtomicU64,
}

impl FakeBoard {
    fn new(posts: BTreeMap<u64, String>) -> Self {
        Self {
            posts,
            reject_credentials: false,
            latest_unreachable: false,
            dead_indices: HashSet::new(),
            flaky_indices: HashMap::new(),
            attempts: Mutex::new(HashMap::new()),
            visited: Mutex::new(Vec::new()),
            sessions_closed: AtomicU64::new(0),
        }
    }

    fn visited(&self) -> Vec<u64> {
        self.visited.lock().unwrap().clone()
    }

    fn attempts_for(&self, index: u64) -> u64 {
        self.attempts.lock().unwrap().get(&index).copied().unwrap_or(0)
    }

    fn sessions_closed(&self) -> u64 {
        self.sessions_closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BoardClient for FakeBoard {
    async fn authenticate(
        &self,
        _username: &str,
        _password: &str,
    ) -> Result<BoardSession, ClientError> {
        if self.reject_credentials {
            return Err(ClientError::Auth);
        }
        Ok(BoardSession::new("fake-token"))
    }

    async fn latest_index(
        &self,
        _session: &BoardSession,
        _board: &str,
    ) -> Result<u64, ClientError> {
        if self.latest_unreachable {
            return Err(ClientError::transient("board unreachable"));
        }
        Ok(self.posts.keys().next_back().copied().unwrap_or(0))
    }

    async fn fetch_post(
        &self,
        _session: &BoardSession,
        _board: &str,
        index: u64,
    ) -> Result<RemotePost, ClientError> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let entry = attempts.entry(index).or_insert(0);
            *entry += 1;
            *entry
        };
        if attempt == 1 {
            self.visited.lock().unwrap().push(index);
        }

        if self.dead_indices.contains(&index) {
            return Err(ClientError::transient("post unreachable"));
        }
        if let Some(&failures) = self.flaky_indices.get(&index) {
            if attempt <= failures {
                return Err(ClientError::transient("flaky post"));
            }
        }

        match self.posts.get(&index) {
            Some(raw) => Ok(RemotePost {
                index,
                date: raw.clone(),
                author: Some("poster".to_string()),
                title: None,
            }),
            None => Err(ClientError::NotFound { index }),
        }
    }

    async fn end_session(&self, _session: &BoardSession) -> Result<(), ClientError> {
        self.sessions_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn raw_timestamp(date: NaiveDate) -> String {
    date.and_hms_opt(12, 0, 0)
        .unwrap()
        .format("%a %b %d %H:%M:%S %Y")
        .to_string()
}

/// Indices 1-3 on Aug 5, 4-5 on Aug 6, 6-9 on Aug 7.
fn three_day_board() -> BTreeMap<u64, String> {
    let mut posts = BTreeMap::new();
    for index in 1..=3 {
        posts.insert(index, raw_timestamp(day(2025, 8, 5)));
    }
    for index in 4..=5 {
        posts.insert(index, raw_timestamp(day(2025, 8, 6)));
    }
    for index in 6..=9 {
        posts.insert(index, raw_timestamp(day(2025, 8, 7)));
    }
    posts
}

fn test_setup(temp_dir: &TempDir) -> (Config, ProgressStore) {
    let path = temp_dir.path().join("tally.csv");
    let config = Config {
        output_path: path.clone(),
        ..Config::for_testing()
    };
    (config, ProgressStore::new(path))
}

#[tokio::test]
async fn test_full_crawl_matches_date_histogram() {
    let temp_dir = TempDir::new().unwrap();
    let (config, store) = test_setup(&temp_dir);
    let board = FakeBoard::new(three_day_board());

    let summary = crawler::run(&board, &store, &config)
        .await
        .expect("crawl failed");

    // Rows land in walk order: newest day first, each with the smallest index
    // observed for that date.
    let rows = store.read_rows().unwrap();
    assert_eq!(
        rows,
        vec![
            DailyTally {
                date: day(2025, 8, 7),
                count: 4,
                earliest_index: 6
            },
            DailyTally {
                date: day(2025, 8, 6),
                count: 2,
                earliest_index: 4
            },
            DailyTally {
                date: day(2025, 8, 5),
                count: 3,
                earliest_index: 1
            },
        ]
    );

    assert_eq!(summary.start_index, 9);
    assert_eq!(summary.days_completed, 3);
    assert_eq!(summary.posts_counted, 9);
    assert_eq!(summary.posts_skipped, 0);
    assert_eq!(board.sessions_closed(), 1);
}

#[tokio::test]
async fn test_visits_every_index_once_in_descending_order() {
    let temp_dir = TempDir::new().unwrap();
    let (config, store) = test_setup(&temp_dir);
    let board = FakeBoard::new(three_day_board());

    crawler::run(&board, &store, &config)
        .await
        .expect("crawl failed");

    let expected: Vec<u64> = (1..=9).rev().collect();
    assert_eq!(board.visited(), expected);
}

#[tokio::test]
async fn test_resume_starts_one_before_last_persisted_row() {
    let temp_dir = TempDir::new().unwrap();
    let (config, store) = test_setup(&temp_dir);

    // A previous run completed Aug 7 (earliest index 6) and was then stopped
    // partway through Aug 6.
    store
        .append(&DailyTally {
            date: day(2025, 8, 7),
            count: 4,
            earliest_index: 6,
        })
        .unwrap();

    let board = FakeBoard::new(three_day_board());
    let summary = crawler::run(&board, &store, &config)
        .await
        .expect("crawl failed");

    // The boundary day is re-walked from index 5; already-completed days are
    // not revisited and not re-appended.
    assert_eq!(board.visited(), vec![5, 4, 3, 2, 1]);
    assert_eq!(summary.start_index, 5);

    let rows = store.read_rows().unwrap();
    assert_eq!(
        rows,
        vec![
            DailyTally {
                date: day(2025, 8, 7),
                count: 4,
                earliest_index: 6
            },
            DailyTally {
                date: day(2025, 8, 6),
                count: 2,
                earliest_index: 4
            },
            DailyTally {
                date: day(2025, 8, 5),
                count: 3,
                earliest_index: 1
            },
        ]
    );
    assert_eq!(
        rows.iter().filter(|r| r.date == day(2025, 8, 7)).count(),
        1,
        "completed day must not be re-appended"
    );
}

#[tokio::test]
async fn test_unreachable_post_undercounts_without_aborting() {
    let temp_dir = TempDir::new().unwrap();
    let (config, store) = test_setup(&temp_dir);
    let mut board = FakeBoard::new(three_day_board());
    board.dead_indices.insert(7);

    let summary = crawler::run(&board, &store, &config)
        .await
        .expect("a single unreachable post must not abort the run");

    // Aug 7 is short by exactly the one unreachable post.
    let rows = store.read_rows().unwrap();
    assert_eq!(rows[0].date, day(2025, 8, 7));
    assert_eq!(rows[0].count, 3);
    assert_eq!(rows.len(), 3);
    assert_eq!(summary.posts_counted, 8);
    assert_eq!(summary.posts_skipped, 1);
    // Every retry attempt was spent on the dead index.
    assert_eq!(board.attempts_for(7), u64::from(config.max_retries));
}

#[tokio::test]
async fn test_fatal_latest_index_lookup_appends_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let (config, store) = test_setup(&temp_dir);
    let mut board = FakeBoard::new(three_day_board());
    board.latest_unreachable = true;

    let err = crawler::run(&board, &store, &config).await.unwrap_err();

    assert!(matches!(err, CrawlError::LatestIndex { .. }));
    assert!(store.read_rows().unwrap().is_empty());
    assert!(board.visited().is_empty());
    assert_eq!(board.sessions_closed(), 1, "session closed exactly once");
}

#[tokio::test]
async fn test_rejected_credentials_abort_before_traversal() {
    let temp_dir = TempDir::new().unwrap();
    let (config, store) = test_setup(&temp_dir);
    let mut board = FakeBoard::new(three_day_board());
    board.reject_credentials = true;

    let err = crawler::run(&board, &store, &config).await.unwrap_err();

    assert!(matches!(err, CrawlError::Authentication(_)));
    assert!(board.visited().is_empty());
    assert!(store.read_rows().unwrap().is_empty());
    assert_eq!(board.sessions_closed(), 0, "no session was ever opened");
}

#[tokio::test]
async fn test_flaky_post_is_retried_until_success() {
    let temp_dir = TempDir::new().unwrap();
    let (config, store) = test_setup(&temp_dir);
    let mut board = FakeBoard::new(three_day_board());
    // Fails twice, succeeds on the third attempt; max_retries is 3.
    board.flaky_indices.insert(5, 2);

    let summary = crawler::run(&board, &store, &config)
        .await
        .expect("crawl failed");

    assert_eq!(board.attempts_for(5), 3);
    assert_eq!(summary.posts_skipped, 0);
    let rows = store.read_rows().unwrap();
    assert_eq!(rows[1].date, day(2025, 8, 6));
    assert_eq!(rows[1].count, 2, "the flaky post still counts");
}

#[tokio::test]
async fn test_empty_board_finishes_without_rows() {
    let temp_dir = TempDir::new().unwrap();
    let (config, store) = test_setup(&temp_dir);
    let board = FakeBoard::new(BTreeMap::new());

    let summary = crawler::run(&board, &store, &config)
        .await
        .expect("crawl failed");

    assert_eq!(summary.start_index, 0);
    assert_eq!(summary.days_completed, 0);
    assert!(store.read_rows().unwrap().is_empty());
    assert_eq!(board.sessions_closed(), 1);
}
