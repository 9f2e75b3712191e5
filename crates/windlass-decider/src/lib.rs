//! # Windlass decision engine
//!
//! Computes the next decision batch for a running workflow execution from
//! the event history the coordinator hands back:
//!
//! ```text
//! coordinator history ──▶ History ──▶ DecisionBuilder ──▶ Vec<Decision>
//!                                          │
//!                            ExecutionGraph + RetryStrategy
//! ```
//!
//! The engine is synchronous, deterministic and stateless across decision
//! rounds: each round is recomputed from scratch out of the history, so two
//! fresh builders over the same graph and history produce equal batches.
//! Polling the coordinator and executing activities are somebody else's job.
//!
//! ## Example
//!
//! ```ignore
//! use windlass_decider::prelude::*;
//!
//! let fetch = ActivityTask::new("fetch", "v1");
//! let parse = ActivityTask::new("parse", "v1").with_requires([fetch.id.clone()]);
//! let graph = ExecutionGraph::from_tasks(vec![fetch.into(), parse.into()])?;
//!
//! let mut builder = DecisionBuilder::new(graph, "windlass_activities");
//! let history = History::new(&response)?;
//! let decisions = builder.decisions_for(&history)?;
//! ```

pub mod builder;
pub mod graph;
pub mod history;

pub use builder::{DeciderError, DecisionBuilder};
pub use graph::{ExecutionGraph, GraphError};
pub use history::{DecisionWindow, History, HistoryError};

/// Prelude for common imports
pub mod prelude {
    pub use crate::builder::{DeciderError, DecisionBuilder};
    pub use crate::graph::{ExecutionGraph, GraphError};
    pub use crate::history::{DecisionWindow, History, HistoryError};
    pub use windlass_core::{
        ActivityTask, ActivityTimeouts, Decision, DecisionTaskResponse, HistoryEvent,
        RetryStrategy, TaskSpec, TimerTask, WorkflowExecutionDescription,
    };
}
