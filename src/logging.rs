use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::env;
use std::sync::{Arc, Mutex, PoisonError};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Default maximum number of activity entries to keep in memory
pub const DEFAULT_MAX_LOG_LINES: usize = 10000;

/// Environment variable holding the tracing filter directives
pub const LOG_FILTER_ENV: &str = "FILENAVIGATOR_LOG";

/// Installs the global tracing subscriber. Diagnostics go to stderr so that
/// stdout stays free for machine-readable output. Safe to call twice.
pub fn init_tracing() {
    let filter = env::var(LOG_FILTER_ENV).unwrap_or_else(|_| "info".to_string());
    let filter_layer = EnvFilter::try_new(&filter).unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_ansi(false),
        )
        .with(filter_layer)
        .try_init();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogCategory {
    FileDetected,
    FileMoved,
    MoveFailed,
    BatchCompleted,
    FileDeleted,
    DestinationInvalidated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: u64,
    pub timestamp: String,
    pub level: String,
    pub category: LogCategory,
    pub message: String,
}

struct LogState {
    entries: VecDeque<LogEntry>,
    next_id: u64,
}

/// Bounded in-memory activity log, oldest entries drop first.
#[derive(Clone)]
pub struct LogManager {
    state: Arc<Mutex<LogState>>,
    max_lines: usize,
}

impl std::fmt::Debug for LogManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogManager")
            .field("max_lines", &self.max_lines)
            .finish_non_exhaustive()
    }
}

impl Default for LogManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LOG_LINES)
    }
}

impl LogManager {
    pub fn new(max_lines: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(LogState {
                entries: VecDeque::with_capacity(max_lines.min(1024)),
                next_id: 1,
            })),
            max_lines,
        }
    }

    pub fn log(&self, level: &str, category: LogCategory, message: &str) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = LogEntry {
            id: state.next_id,
            timestamp: chrono::Utc::now().to_rfc3339(),
            level: level.to_string(),
            category,
            message: message.to_string(),
        };
        state.next_id += 1;
        state.entries.push_back(entry);

        while state.entries.len() > self.max_lines {
            state.entries.pop_front();
        }
    }

    pub fn info(&self, category: LogCategory, message: &str) {
        self.log("info", category, message);
    }

    pub fn warn(&self, category: LogCategory, message: &str) {
        self.log("warning", category, message);
    }

    pub fn get_logs(&self, category: Option<LogCategory>) -> Vec<LogEntry> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match category {
            Some(category) => state
                .entries
                .iter()
                .filter(|l| l.category == category)
                .cloned()
                .collect(),
            None => state.entries.iter().cloned().collect(),
        }
    }

    /// Get logs with pagination for large activity logs
    pub fn get_logs_paginated(
        &self,
        category: Option<LogCategory>,
        offset: usize,
        limit: usize,
    ) -> Vec<LogEntry> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state
            .entries
            .iter()
            .filter(|l| category.map_or(true, |c| l.category == c))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_manager_new() {
        let manager = LogManager::new(100);
        assert!(manager.is_empty());
    }

    #[test]
    fn test_log_manager_rotation() {
        let manager = LogManager::new(3);

        for i in 0..5 {
            manager.info(LogCategory::FileMoved, &format!("message {}", i));
        }

        let logs = manager.get_logs(None);
        assert_eq!(logs.len(), 3);
        assert_eq!(logs[0].message, "message 2");
        assert_eq!(logs[2].id, 5);
    }

    #[test]
    fn test_log_manager_filters_by_category() {
        let manager = LogManager::new(10);

        manager.info(LogCategory::FileDetected, "a.png");
        manager.info(LogCategory::FileMoved, "a.png -> /dest");
        manager.warn(LogCategory::MoveFailed, "b.png");

        assert_eq!(manager.get_logs(None).len(), 3);
        let failed = manager.get_logs(Some(LogCategory::MoveFailed));
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].level, "warning");
        assert!(manager.get_logs(Some(LogCategory::FileDeleted)).is_empty());
    }

    #[test]
    fn test_log_manager_pagination() {
        let manager = LogManager::new(100);

        for i in 0..20 {
            manager.info(LogCategory::FileDetected, &format!("message {}", i));
        }

        let page1 = manager.get_logs_paginated(None, 0, 10);
        assert_eq!(page1.len(), 10);

        let page2 = manager.get_logs_paginated(None, 10, 10);
        assert_eq!(page2.len(), 10);
        assert_eq!(page2[0].message, "message 10");

        let page3 = manager.get_logs_paginated(None, 20, 10);
        assert_eq!(page3.len(), 0);
    }

    #[test]
    fn test_init_tracing_twice() {
        init_tracing();
        init_tracing();
    }
}
