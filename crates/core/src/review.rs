//! Review tasks for human follow-up.
//!
//! The sink is fire-and-forget: a failed enqueue is logged and never changes the outcome
//! already decided for the caller.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use register_ids::RecordUuid;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::RegisterResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewCategory {
    /// An intake matched existing persons only partially.
    PotentialDuplicate,
    /// A status-defining date change needs a human decision.
    StatusDateChange,
}

impl ReviewCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ReviewCategory::PotentialDuplicate => "potential_duplicate",
            ReviewCategory::StatusDateChange => "status_date_change",
        }
    }
}

impl fmt::Display for ReviewCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the task is about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ReviewSubject {
    Person(RecordUuid),
    UnresolvedRegistration(RecordUuid),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewTask {
    pub task_id: RecordUuid,
    pub category: ReviewCategory,
    pub reason: String,
    pub subject: ReviewSubject,
    pub due: DateTime<Utc>,
}

impl ReviewTask {
    pub fn new(
        category: ReviewCategory,
        reason: impl Into<String>,
        subject: ReviewSubject,
        due_after: chrono::Duration,
    ) -> Self {
        Self {
            task_id: RecordUuid::new(),
            category,
            reason: reason.into(),
            subject,
            due: Utc::now() + due_after,
        }
    }
}

#[async_trait]
pub trait ReviewTaskSink: Send + Sync {
    async fn enqueue(&self, task: ReviewTask) -> RegisterResult<()>;
}

/// Enqueues `task`, logging instead of failing.
pub async fn enqueue_quietly(sink: &dyn ReviewTaskSink, task: ReviewTask) {
    let task_id = task.task_id;
    let category = task.category;
    if let Err(e) = sink.enqueue(task).await {
        tracing::warn!(%task_id, %category, error = %e, "failed to enqueue review task");
    }
}
