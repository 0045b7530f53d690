//! Per-URL diagnostic trail of every acquisition attempt.
//!
//! Records are appended under the request URL in insertion order. A `START`
//! record resets the timing baseline for its URL; later records without an
//! explicit duration get the elapsed time since that baseline.

use super::platform::Platform;
use crate::utils::{round_secs, truncate};
use chrono::{DateTime, Local};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::{self, Write as _};
use std::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::info;

/// Action label that marks the beginning of an acquisition.
pub const START: &str = "START";

pub const DEFAULT_RETENTION: usize = 1000;

#[derive(Debug, Clone, PartialEq)]
pub struct AttemptRecord {
    pub timestamp: DateTime<Local>,
    pub action: String,
    pub status: String,
    pub source: Option<String>,
    /// Seconds since the last `START` record for the same URL.
    pub duration: Option<f64>,
    pub error: Option<String>,
    pub identity: Option<String>,
    pub platform: Option<Platform>,
}

impl fmt::Display for AttemptRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.timestamp.format("%H:%M:%S"),
            self.action,
            self.status
        )?;
        if let Some(identity) = &self.identity {
            write!(f, " | @{}", identity)?;
        }
        if let Some(source) = &self.source {
            write!(f, " | via {}", truncate(source, 40))?;
        }
        if let Some(platform) = &self.platform {
            write!(f, " | {}", platform)?;
        }
        if let Some(duration) = self.duration {
            write!(f, " | {:.2}s", duration)?;
        }
        if let Some(error) = &self.error {
            write!(f, " | error: {}", truncate(error, 120))?;
        }
        Ok(())
    }
}

/// An attempt before it is stamped and stored.
#[derive(Debug, Clone, Default)]
pub struct Attempt {
    action: String,
    status: String,
    source: Option<String>,
    error: Option<String>,
    identity: Option<String>,
    platform: Option<Platform>,
}

impl Attempt {
    pub fn new(action: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            status: status.into(),
            ..Default::default()
        }
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn error(mut self, error: impl ToString) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub fn identity(mut self, identity: Option<&str>) -> Self {
        self.identity = identity.map(str::to_string);
        self
    }

    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }
}

#[derive(Default)]
struct LogState {
    records: HashMap<String, Vec<AttemptRecord>>,
    // URLs in first-seen order, oldest first.
    order: VecDeque<String>,
    started: HashMap<String, Instant>,
}

pub struct AttemptLog {
    state: Mutex<LogState>,
    retention: usize,
}

impl Default for AttemptLog {
    fn default() -> Self {
        Self::new()
    }
}

impl AttemptLog {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }

    /// Keeps at most `retention` URLs; the oldest are evicted first.
    pub fn with_retention(retention: usize) -> Self {
        Self {
            state: Mutex::new(LogState::default()),
            retention: retention.max(1),
        }
    }

    fn state(&self) -> MutexGuard<'_, LogState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record(&self, url: &str, attempt: Attempt) {
        let now = Instant::now();

        info!(
            url = %truncate(url, 50),
            action = %attempt.action,
            status = %attempt.status,
            "📝 {}: {}",
            attempt.action,
            if attempt.status.is_empty() { "⏳" } else { attempt.status.as_str() }
        );

        let mut state = self.state();
        let is_start = attempt.action == START;
        if is_start {
            state.started.insert(url.to_string(), now);
        }

        let duration = if is_start {
            None
        } else {
            state
                .started
                .get(url)
                .map(|started| round_secs(now.duration_since(*started).as_secs_f64()))
        };

        let record = AttemptRecord {
            timestamp: Local::now(),
            action: attempt.action,
            status: attempt.status,
            source: attempt.source,
            duration,
            error: attempt.error,
            identity: attempt.identity,
            platform: attempt.platform,
        };

        if !state.records.contains_key(url) {
            state.order.push_back(url.to_string());
        }
        state
            .records
            .entry(url.to_string())
            .or_default()
            .push(record);

        while state.order.len() > self.retention {
            if let Some(oldest) = state.order.pop_front() {
                state.records.remove(&oldest);
                state.started.remove(&oldest);
            }
        }
    }

    /// Records for `url` in insertion order; empty for unknown URLs.
    pub fn query(&self, url: &str) -> Vec<AttemptRecord> {
        self.state().records.get(url).cloned().unwrap_or_default()
    }

    /// Tracked URLs, oldest first.
    pub fn all_keys(&self) -> Vec<String> {
        self.state().order.iter().cloned().collect()
    }

    /// Detailed timeline for one URL, used by the `/log` command.
    pub fn render_timeline(&self, url: &str, max_records: usize) -> Option<String> {
        let records = self.query(url);
        if records.is_empty() {
            return None;
        }

        let mut text = String::new();
        let _ = writeln!(text, "📋 DETAILED LOG");
        let _ = writeln!(text, "🔗 URL: {}", url);
        write_summary(&mut text, &records);

        let mut seen = HashSet::new();
        let sources: Vec<&str> = records
            .iter()
            .filter_map(|r| r.source.as_deref())
            .map(|s| truncate(s, 40))
            .filter(|s| seen.insert(*s))
            .take(3)
            .collect();
        if !sources.is_empty() {
            let _ = writeln!(text, "🔌 Sources: {}", sources.join(", "));
        }
        let _ = writeln!(text, "📊 Records: {}", records.len());
        let _ = writeln!(text);

        let skip = records.len().saturating_sub(max_records);
        for (i, record) in records.iter().skip(skip).enumerate() {
            let _ = writeln!(text, "{}. {}", i + 1, record);
        }
        if skip > 0 {
            let _ = writeln!(
                text,
                "... (showing last {} of {} records)",
                max_records,
                records.len()
            );
        }
        Some(text)
    }

    /// Summary of the most recent URLs, used by the `/logs` command.
    pub fn render_recent(&self, max_urls: usize, max_records: usize) -> Option<String> {
        let keys = self.all_keys();
        if keys.is_empty() {
            return None;
        }

        let mut text = String::new();
        let _ = writeln!(text, "🔍 LAST {} DOWNLOADS", max_urls);
        for url in keys.iter().skip(keys.len().saturating_sub(max_urls)) {
            let records = self.query(url);
            if records.is_empty() {
                continue;
            }
            let _ = writeln!(text);
            let _ = writeln!(text, "🔗 URL: {}", truncate(url, 60));
            write_summary(&mut text, &records);
            let _ = writeln!(text, "📊 Records: {}", records.len());
            for record in records.iter().skip(records.len().saturating_sub(max_records)) {
                let _ = writeln!(text, "{}", record);
            }
        }
        Some(text)
    }
}

fn write_summary(text: &mut String, records: &[AttemptRecord]) {
    let identity = records
        .iter()
        .find_map(|r| r.identity.as_deref())
        .unwrap_or("unknown");
    let _ = writeln!(text, "👤 User: @{}", identity);
    if let Some(platform) = records.iter().find_map(|r| r.platform) {
        let _ = writeln!(text, "📱 Platform: {}", platform.tag().to_uppercase());
    }
    if let Some(total) = records.last().and_then(|r| r.duration) {
        let _ = writeln!(text, "⏱ Total: {:.2}s", total);
    }
}
