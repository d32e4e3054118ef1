//! Progress reporting collaborator.

use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warning,
    Error,
    Debug,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Level::Info => "info",
            Level::Warning => "warning",
            Level::Error => "error",
            Level::Debug => "debug",
        };
        f.write_str(name)
    }
}

pub trait ProgressBar {
    fn increment(&mut self);
    fn complete(&mut self);
}

pub trait Progress {
    fn notify(&self, level: Level, message: &str);
    fn start_bar(&self, name: &str, total: u64) -> Box<dyn ProgressBar>;
}

/// Reports progress as `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgress;

impl Progress for TracingProgress {
    fn notify(&self, level: Level, message: &str) {
        match level {
            Level::Info => info!("{}", message),
            Level::Warning => warn!("{}", message),
            Level::Error => error!("{}", message),
            Level::Debug => debug!("{}", message),
        }
    }

    fn start_bar(&self, name: &str, total: u64) -> Box<dyn ProgressBar> {
        debug!(bar = name, total, "started");
        Box::new(TracingBar {
            name: name.to_string(),
            total,
            done: 0,
        })
    }
}

struct TracingBar {
    name: String,
    total: u64,
    done: u64,
}

impl TracingBar {
    /// Roughly every tenth of the way, so large tables do not flood the log.
    fn should_report(&self) -> bool {
        let step = (self.total / 10).max(1);
        self.done % step == 0 || self.done == self.total
    }
}

impl ProgressBar for TracingBar {
    fn increment(&mut self) {
        self.done += 1;
        if self.should_report() {
            debug!(bar = %self.name, done = self.done, total = self.total, "progress");
        }
    }

    fn complete(&mut self) {
        debug!(bar = %self.name, done = self.done, total = self.total, "complete");
    }
}

/// Captured progress, shared between the recorder and its bars.
#[derive(Debug, Default)]
pub struct Recorded {
    pub messages: Vec<(Level, String)>,
    /// `(name, total, increments, completed)` per bar in start order.
    pub bars: Vec<(String, u64, u64, bool)>,
}

/// Keeps every message and bar in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingProgress {
    recorded: Arc<Mutex<Recorded>>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(Level, String)> {
        self.lock().messages.clone()
    }

    pub fn messages_at(&self, level: Level) -> Vec<String> {
        self.lock()
            .messages
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }

    pub fn bars(&self) -> Vec<(String, u64, u64, bool)> {
        self.lock().bars.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Progress for RecordingProgress {
    fn notify(&self, level: Level, message: &str) {
        self.lock().messages.push((level, message.to_string()));
    }

    fn start_bar(&self, name: &str, total: u64) -> Box<dyn ProgressBar> {
        let mut recorded = self.lock();
        recorded.bars.push((name.to_string(), total, 0, false));
        Box::new(RecordingBar {
            recorded: self.recorded.clone(),
            slot: recorded.bars.len() - 1,
        })
    }
}

struct RecordingBar {
    recorded: Arc<Mutex<Recorded>>,
    slot: usize,
}

impl RecordingBar {
    fn update(&self, f: impl FnOnce(&mut (String, u64, u64, bool))) {
        let mut recorded = self.recorded.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(bar) = recorded.bars.get_mut(self.slot) {
            f(bar);
        }
    }
}

impl ProgressBar for RecordingBar {
    fn increment(&mut self) {
        self.update(|bar| bar.2 += 1);
    }

    fn complete(&mut self) {
        self.update(|bar| bar.3 = true);
    }
}
