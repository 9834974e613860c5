//! Daily screenshot limit backed by files that survive restarts.
//!
//! The count file holds a single `YYYY-MM-DD:N` line. A count recorded for
//! an earlier day reads as zero. The out-of-tokens flag file, when present,
//! blocks further screenshots regardless of the count.

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::UsageLimiter;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// File-backed [`UsageLimiter`].
#[derive(Debug)]
pub struct FileUsageLimiter {
    count_file: PathBuf,
    tokens_flag: PathBuf,
    daily_limit: u64,
    /// Serialises read-modify-write cycles within this process.
    guard: Mutex<()>,
}

impl FileUsageLimiter {
    /// Creates a limiter over the given files.
    #[must_use]
    pub fn new(
        count_file: impl Into<PathBuf>,
        tokens_flag: impl Into<PathBuf>,
        daily_limit: u64,
    ) -> Self {
        Self {
            count_file: count_file.into(),
            tokens_flag: tokens_flag.into(),
            daily_limit,
            guard: Mutex::new(()),
        }
    }

    fn today() -> NaiveDate {
        Local::now().date_naive()
    }

    async fn read_count(&self, today: NaiveDate) -> u64 {
        let contents = match tokio::fs::read_to_string(&self.count_file).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return 0,
            Err(e) => {
                warn!(path = %self.count_file.display(), error = %e, "Cannot read usage count");
                return 0;
            }
        };

        match parse_count(&contents) {
            Some((date, count)) if date == today => count,
            Some(_) => 0,
            None => {
                warn!(path = %self.count_file.display(), "Ignoring malformed usage count");
                0
            }
        }
    }

    async fn write_count(&self, today: NaiveDate, count: u64) {
        let line = format!("{}:{count}", today.format(DATE_FORMAT));
        if let Err(e) = tokio::fs::write(&self.count_file, line).await {
            warn!(path = %self.count_file.display(), error = %e, "Cannot persist usage count");
        }
    }

    async fn tokens_exhausted(&self) -> bool {
        tokio::fs::try_exists(&self.tokens_flag)
            .await
            .unwrap_or(false)
    }
}

fn parse_count(contents: &str) -> Option<(NaiveDate, u64)> {
    let (date, count) = contents.trim().split_once(':')?;
    let date = NaiveDate::parse_from_str(date, DATE_FORMAT).ok()?;
    let count = count.trim().parse().ok()?;
    Some((date, count))
}

#[async_trait]
impl UsageLimiter for FileUsageLimiter {
    async fn daily_count(&self) -> u64 {
        let _guard = self.guard.lock().await;
        self.read_count(Self::today()).await
    }

    async fn increment(&self) -> u64 {
        let _guard = self.guard.lock().await;
        let today = Self::today();
        let count = self.read_count(today).await.saturating_add(1);
        self.write_count(today, count).await;
        debug!(count, limit = self.daily_limit, "Usage count incremented");
        count
    }

    async fn is_exceeded(&self) -> bool {
        if self.tokens_exhausted().await {
            return true;
        }
        self.daily_count().await >= self.daily_limit
    }

    async fn try_acquire(&self) -> Option<u64> {
        let _guard = self.guard.lock().await;
        if self.tokens_exhausted().await {
            debug!(path = %self.tokens_flag.display(), "Out-of-tokens flag set");
            return None;
        }

        let today = Self::today();
        let count = self.read_count(today).await;
        if count >= self.daily_limit {
            return None;
        }
        let count = count + 1;
        self.write_count(today, count).await;
        debug!(count, limit = self.daily_limit, "Usage slot acquired");
        Some(count)
    }

    async fn mark_out_of_tokens(&self) {
        let path = self.tokens_flag.display();
        match tokio::fs::write(&self.tokens_flag, b"").await {
            Ok(()) => warn!(path = %path, "Analyzer out of tokens, blocking screenshots"),
            Err(e) => warn!(path = %path, error = %e, "Cannot write out-of-tokens flag"),
        }
    }
}
