//! # Windlass core vocabulary
//!
//! Shared types for the windlass workflow decider:
//! - [`TaskSpec`] — the nodes of a workflow definition (activities, timers)
//! - [`RetryStrategy`] — rules deciding whether a failed activity is re-scheduled
//! - [`HistoryEvent`] — parsed coordinator history events
//! - [`Decision`] — the records a decision round sends back to the coordinator
//!
//! This crate speaks the coordinator's wire shapes
//! (`{eventId, eventType, <typeName>EventAttributes}` events,
//! `{decisionType, <typeName>DecisionAttributes}` decisions) and nothing else;
//! the decision logic lives in `windlass-decider`.

pub mod decision;
pub mod event;
pub mod retry;
pub mod task;

pub use decision::{respond_decisions, ActivityType, Decision};
pub use event::{
    DecisionTaskResponse, EventError, EventType, HistoryEvent, OpenCounts, WorkflowExecution,
    WorkflowExecutionDescription, WorkflowType,
};
pub use retry::RetryStrategy;
pub use task::{ActivityTask, ActivityTimeouts, TaskSpec, TimerTask};
