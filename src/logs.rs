use anyhow::Result;
use std::{
    future::Future,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

/// A single line observed in the log store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    /// Nanoseconds since the Unix epoch
    pub timestamp: u64,
    pub text: String,
}

impl LogLine {
    #[cfg(test)]
    pub fn new(timestamp: u64, text: impl Into<String>) -> Self {
        Self {
            timestamp,
            text: text.into(),
        }
    }
}

/// Half-open time range `[start, end)` in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogWindow {
    pub start: u64,
    pub end: u64,
}

impl LogWindow {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// The window ending at `now` and reaching `lookback` into the past.
    pub fn trailing(now: u64, lookback: Duration) -> Self {
        let lookback = u64::try_from(lookback.as_nanos()).unwrap_or(u64::MAX);
        Self {
            start: now.saturating_sub(lookback),
            end: now,
        }
    }

    #[cfg(test)]
    pub fn contains(&self, timestamp: u64) -> bool {
        self.start <= timestamp && timestamp < self.end
    }
}

pub fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Oldest lines first
    Forward,
    /// Newest lines first
    Backward,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Backward => "backward",
        }
    }
}

/// Range query against the log store.
///
/// A line matches when its text contains any of `contains_any`. `direction`
/// decides which end of the window the `limit` is applied from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    pub contains_any: Vec<String>,
    pub window: LogWindow,
    pub limit: u32,
    pub direction: Direction,
}

impl LogQuery {
    pub fn new<I, S>(contains_any: I, window: LogWindow) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            contains_any: contains_any.into_iter().map(Into::into).collect(),
            window,
            limit: 100,
            direction: Direction::Backward,
        }
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    #[cfg(test)]
    pub fn matches(&self, text: &str) -> bool {
        self.contains_any.iter().any(|needle| text.contains(needle.as_str()))
    }
}

/// Anything that can answer range queries over the server log.
pub trait LogSource: Send + Sync {
    /// Lines matching `query`, always returned oldest first.
    fn query_range(&self, query: &LogQuery) -> impl Future<Output = Result<Vec<LogLine>>> + Send;
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use itertools::Itertools;

    /// In-memory log store honouring window, limit and direction.
    #[derive(Default)]
    pub struct MemoryLogs {
        pub lines: Vec<LogLine>,
    }

    impl MemoryLogs {
        pub fn new(lines: impl IntoIterator<Item = (u64, &'static str)>) -> Self {
            Self {
                lines: lines
                    .into_iter()
                    .map(|(ts, text)| LogLine::new(ts, text))
                    .collect(),
            }
        }
    }

    impl LogSource for MemoryLogs {
        async fn query_range(&self, query: &LogQuery) -> Result<Vec<LogLine>> {
            let matching = self
                .lines
                .iter()
                .filter(|l| query.window.contains(l.timestamp) && query.matches(&l.text))
                .sorted_by_key(|l| l.timestamp)
                .cloned()
                .collect::<Vec<_>>();
            let limit = query.limit as usize;
            let selected = match query.direction {
                Direction::Forward => matching.into_iter().take(limit).collect(),
                Direction::Backward => {
                    let skip = matching.len().saturating_sub(limit);
                    matching.into_iter().skip(skip).collect()
                }
            };
            Ok(selected)
        }
    }

    /// Log store whose every query fails.
    pub struct BrokenLogs;

    impl LogSource for BrokenLogs {
        async fn query_range(&self, _query: &LogQuery) -> Result<Vec<LogLine>> {
            anyhow::bail!("connection refused")
        }
    }
}
