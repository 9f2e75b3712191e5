//! Task specifications
//!
//! A workflow definition is a DAG over task specs. Two kinds exist:
//! [`ActivityTask`] for work handed to activity workers and [`TimerTask`] for
//! coordinator-side delays. Predecessors are referenced by id, never by
//! embedding, so specs stay acyclic under serialization.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::retry::RetryStrategy;

/// A node of the execution graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskSpec {
    /// An activity invocation executed by a worker on the activity task list
    Activity(ActivityTask),

    /// A delay managed by the coordinator
    Timer(TimerTask),
}

impl TaskSpec {
    /// Identifier of the task, unique within a graph
    pub fn id(&self) -> &str {
        match self {
            Self::Activity(task) => &task.id,
            Self::Timer(timer) => &timer.id,
        }
    }

    /// Ids of the direct predecessors, in declared order
    pub fn requires(&self) -> &[String] {
        match self {
            Self::Activity(task) => &task.requires,
            Self::Timer(timer) => &timer.requires,
        }
    }
}

impl From<ActivityTask> for TaskSpec {
    fn from(task: ActivityTask) -> Self {
        Self::Activity(task)
    }
}

impl From<TimerTask> for TaskSpec {
    fn from(timer: TimerTask) -> Self {
        Self::Timer(timer)
    }
}

/// Specification of one activity invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityTask {
    /// Activity type name as registered at the coordinator
    pub name: String,

    /// Activity type version
    pub version: String,

    /// Unique id within the graph; derived as `name:version[:suffix]` when
    /// not set explicitly
    pub id: String,

    /// Static input, wrapped by the decision builder at scheduling time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,

    /// Ids of tasks that must complete before this one is scheduled
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<String>,

    /// Rule applied when an attempt fails; no rule means any failure fails
    /// the workflow
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_strategy: Option<RetryStrategy>,

    /// Per-task timeout overrides
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeouts: Option<ActivityTimeouts>,
}

impl ActivityTask {
    /// Create an activity task with the derived id `name:version`
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        let name = name.into();
        let version = version.into();
        let id = format!("{}:{}", name, version);
        Self {
            name,
            version,
            id,
            input: None,
            requires: Vec::new(),
            retry_strategy: None,
            timeouts: None,
        }
    }

    /// Replace the derived id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Derive the id as `name:version:suffix`
    pub fn with_id_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.id = format!("{}:{}:{}", self.name, self.version, suffix.into());
        self
    }

    /// Set the static activity input
    pub fn with_input(mut self, input: Value) -> Self {
        self.input = Some(input);
        self
    }

    /// Declare the predecessors, in order
    pub fn with_requires<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requires = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Set the retry strategy
    pub fn with_retry(mut self, strategy: RetryStrategy) -> Self {
        self.retry_strategy = Some(strategy);
        self
    }

    /// Set per-task timeouts
    pub fn with_timeouts(mut self, timeouts: ActivityTimeouts) -> Self {
        self.timeouts = Some(timeouts);
        self
    }
}

/// Specification of a coordinator-side timer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerTask {
    /// Unique id within the graph, also used as the wire `timerId`
    pub id: String,

    /// Delay between the start decision and the fired event
    pub delay_in_seconds: u64,

    /// Ids of tasks that must complete before the timer is started
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<String>,
}

impl TimerTask {
    /// Create a timer task
    pub fn new(id: impl Into<String>, delay_in_seconds: u64) -> Self {
        Self {
            id: id.into(),
            delay_in_seconds,
            requires: Vec::new(),
        }
    }

    /// Declare the predecessors, in order
    pub fn with_requires<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requires = ids.into_iter().map(Into::into).collect();
        self
    }
}

/// Timeout knobs for one activity attempt, in seconds
///
/// Unset fields fall back to the defaults registered with the activity type
/// at the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActivityTimeouts {
    /// Maximum queue time before a worker claims the attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_to_start: Option<u64>,

    /// Maximum total time from scheduling to close
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_to_close: Option<u64>,

    /// Maximum execution time of one attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_to_close: Option<u64>,

    /// Maximum silence between worker heartbeats
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat: Option<u64>,
}

impl ActivityTimeouts {
    /// Timeouts with every knob unset
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the schedule-to-start timeout
    pub fn with_schedule_to_start(mut self, seconds: u64) -> Self {
        self.schedule_to_start = Some(seconds);
        self
    }

    /// Set the schedule-to-close timeout
    pub fn with_schedule_to_close(mut self, seconds: u64) -> Self {
        self.schedule_to_close = Some(seconds);
        self
    }

    /// Set the start-to-close timeout
    pub fn with_start_to_close(mut self, seconds: u64) -> Self {
        self.start_to_close = Some(seconds);
        self
    }

    /// Set the heartbeat timeout
    pub fn with_heartbeat(mut self, seconds: u64) -> Self {
        self.heartbeat = Some(seconds);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_activity_id_derived_from_name_and_version() {
        let task = ActivityTask::new("compress", "v2");
        assert_eq!(task.id, "compress:v2");
    }

    #[test]
    fn test_activity_id_with_suffix() {
        let task = ActivityTask::new("compress", "v2").with_id_suffix("eu");
        assert_eq!(task.id, "compress:v2:eu");
    }

    #[test]
    fn test_activity_id_override() {
        let task = ActivityTask::new("compress", "v2").with_id("custom");
        assert_eq!(task.id, "custom");
    }

    #[test]
    fn test_requires_keeps_declared_order() {
        let task = ActivityTask::new("merge", "v1").with_requires(["b", "a", "c"]);
        assert_eq!(task.requires, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_task_spec_accessors() {
        let activity: TaskSpec = ActivityTask::new("a", "v1").with_requires(["x"]).into();
        let timer: TaskSpec = TimerTask::new("pause", 60).into();

        assert_eq!(activity.id(), "a:v1");
        assert_eq!(activity.requires(), ["x".to_string()]);
        assert_eq!(timer.id(), "pause");
        assert!(timer.requires().is_empty());
    }

    #[test]
    fn test_spec_serialization_round_trip() {
        let task: TaskSpec = ActivityTask::new("a", "v1")
            .with_input(json!({"date": 1}))
            .with_retry(RetryStrategy::instant(2))
            .with_timeouts(ActivityTimeouts::new().with_start_to_close(30))
            .into();

        let encoded = serde_json::to_string(&task).unwrap();
        assert!(encoded.contains("\"type\":\"activity\""));

        let parsed: TaskSpec = serde_json::from_str(&encoded).unwrap();
        assert_eq!(task, parsed);
    }
}
