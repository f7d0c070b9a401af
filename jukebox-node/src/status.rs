//! Rolling status board
//!
//! Keeps the latest coordination event per category (store, socket, control,
//! queue). Advisory only: nothing reads it to make a decision.

use chrono::{DateTime, Utc};
use jukebox_common::events::{EventBus, JukeboxEvent, StatusCategory};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Latest line for one category
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusLine {
    pub category: StatusCategory,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Shared, cloneable handle to the status lines
#[derive(Clone, Default)]
pub struct StatusBoard {
    lines: Arc<RwLock<BTreeMap<StatusCategory, StatusLine>>>,
    bus: Option<Arc<EventBus>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also publish every update as a `StatusLine` event
    pub fn with_bus(bus: Arc<EventBus>) -> Self {
        Self {
            lines: Arc::default(),
            bus: Some(bus),
        }
    }

    pub fn set(&self, category: StatusCategory, message: impl Into<String>) {
        let line = StatusLine {
            category,
            message: message.into(),
            at: Utc::now(),
        };
        debug!("[{}] {}", category, line.message);

        if let Some(bus) = &self.bus {
            bus.emit_lossy(JukeboxEvent::StatusLine {
                category,
                message: line.message.clone(),
                timestamp: line.at,
            });
        }

        let mut lines = self.lines.write().unwrap_or_else(|e| e.into_inner());
        lines.insert(category, line);
    }

    pub fn latest(&self, category: StatusCategory) -> Option<StatusLine> {
        let lines = self.lines.read().unwrap_or_else(|e| e.into_inner());
        lines.get(&category).cloned()
    }

    /// All current lines in category order
    pub fn lines(&self) -> Vec<StatusLine> {
        let lines = self.lines.read().unwrap_or_else(|e| e.into_inner());
        lines.values().cloned().collect()
    }

    /// Single-line rendering, e.g. `store: ok | queue: 2 queued`
    pub fn render(&self) -> String {
        self.lines()
            .iter()
            .map(|line| format!("{}: {}", line.category, line.message))
            .collect::<Vec<_>>()
            .join(" | ")
    }
}
