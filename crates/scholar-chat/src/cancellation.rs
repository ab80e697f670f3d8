//! Cancellation coordination
//!
//! Tracks one cancellation token per in-flight unit of work (an initial
//! submission or a "load more"). A unit leaves the registry when it settles.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::types::MessageId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkId(Uuid);

impl WorkId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for WorkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkPhase {
    AwaitingQueryInterpretation,
    AwaitingPageFetch,
    StreamingSummaries,
}

/// A live unit of work
#[derive(Debug, Clone)]
pub struct ActiveUnit {
    pub token: CancellationToken,
    pub phase: WorkPhase,
    /// The bot message this unit fills, once it exists.
    pub message_id: Option<MessageId>,
    pub started_at: DateTime<Utc>,
}

/// Read-only view of a unit for callers outside the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitStatus {
    pub work_id: WorkId,
    pub phase: WorkPhase,
    pub message_id: Option<MessageId>,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Default)]
pub struct CancellationRegistry {
    units: DashMap<WorkId, ActiveUnit>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, phase: WorkPhase) -> (WorkId, CancellationToken) {
        let id = WorkId::new();
        let token = CancellationToken::new();
        self.units.insert(
            id,
            ActiveUnit {
                token: token.clone(),
                phase,
                message_id: None,
                started_at: Utc::now(),
            },
        );
        tracing::debug!(work_id = %id, phase = ?phase, "Registered unit of work");
        (id, token)
    }

    pub fn set_phase(&self, id: WorkId, phase: WorkPhase) {
        if let Some(mut unit) = self.units.get_mut(&id) {
            unit.phase = phase;
        }
    }

    pub fn attach_message(&self, id: WorkId, message_id: MessageId) {
        if let Some(mut unit) = self.units.get_mut(&id) {
            unit.message_id = Some(message_id);
        }
    }

    /// Remove a unit once it has settled. Its token is left untouched.
    pub fn complete(&self, id: WorkId) {
        if self.units.remove(&id).is_some() {
            tracing::debug!(work_id = %id, "Unit of work completed");
        }
    }

    /// Cancel a single unit.
    pub fn cancel(&self, id: WorkId) -> bool {
        match self.units.remove(&id) {
            Some((_, unit)) => {
                unit.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every unit filling `message_id`.
    pub fn cancel_for_message(&self, message_id: MessageId) -> usize {
        let ids: Vec<WorkId> = self
            .units
            .iter()
            .filter(|entry| entry.message_id == Some(message_id))
            .map(|entry| *entry.key())
            .collect();
        ids.into_iter().filter(|id| self.cancel(*id)).count()
    }

    /// Signal every live token and clear the registry. Returns how many units
    /// were cancelled.
    pub fn abort_all(&self) -> usize {
        let ids: Vec<WorkId> = self.units.iter().map(|entry| *entry.key()).collect();
        let mut cancelled = 0;
        for id in ids {
            if let Some((_, unit)) = self.units.remove(&id) {
                unit.token.cancel();
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            tracing::info!(cancelled, "Aborted in-flight work");
        }
        cancelled
    }

    pub fn active_units(&self) -> Vec<UnitStatus> {
        let now = Utc::now();
        let mut units: Vec<UnitStatus> = self
            .units
            .iter()
            .map(|entry| UnitStatus {
                work_id: *entry.key(),
                phase: entry.phase,
                message_id: entry.message_id,
                started_at: entry.started_at,
                elapsed_ms: (now - entry.started_at).num_milliseconds().max(0) as u64,
            })
            .collect();
        units.sort_by_key(|u| u.started_at);
        units
    }

    pub fn is_idle(&self) -> bool {
        self.units.is_empty()
    }
}
