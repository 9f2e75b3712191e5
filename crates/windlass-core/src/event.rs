//! Coordinator history events
//!
//! The coordinator returns the history of a workflow execution as a list of
//! events shaped `{eventId, eventType, eventTimestamp,
//! <typeName>EventAttributes}`. Events parse into [`HistoryEvent`]s; the
//! per-type attribute bag stays raw JSON and is interpreted by the history
//! view. Parsing fails loudly on malformed events — event ids are never
//! fabricated.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors raised while interpreting coordinator payloads
#[derive(Debug, Error)]
pub enum EventError {
    /// The raw event is not a JSON object
    #[error("history event is not a JSON object")]
    NotAnObject,

    /// A mandatory field is missing or has the wrong shape
    #[error("event {event_id}: missing or malformed field `{field}`")]
    MalformedField { event_id: i64, field: &'static str },
}

/// Event types recognized by the decision engine
///
/// Anything outside this vocabulary parses as [`EventType::Other`] and is
/// ignored by the classification predicates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventType {
    WorkflowExecutionStarted,
    WorkflowExecutionCompleted,
    WorkflowExecutionFailed,
    DecisionTaskScheduled,
    DecisionTaskStarted,
    DecisionTaskCompleted,
    DecisionTaskTimedOut,
    DecisionTaskFailed,
    ActivityTaskScheduled,
    ActivityTaskStarted,
    ActivityTaskCompleted,
    ActivityTaskFailed,
    ActivityTaskTimedOut,
    ActivityTaskCanceled,
    TimerStarted,
    TimerFired,
    TimerCanceled,
    /// An event type the engine does not interpret
    Other(String),
}

impl EventType {
    /// Parse the coordinator's PascalCase type name
    pub fn parse(name: &str) -> Self {
        match name {
            "WorkflowExecutionStarted" => Self::WorkflowExecutionStarted,
            "WorkflowExecutionCompleted" => Self::WorkflowExecutionCompleted,
            "WorkflowExecutionFailed" => Self::WorkflowExecutionFailed,
            "DecisionTaskScheduled" => Self::DecisionTaskScheduled,
            "DecisionTaskStarted" => Self::DecisionTaskStarted,
            "DecisionTaskCompleted" => Self::DecisionTaskCompleted,
            "DecisionTaskTimedOut" => Self::DecisionTaskTimedOut,
            "DecisionTaskFailed" => Self::DecisionTaskFailed,
            "ActivityTaskScheduled" => Self::ActivityTaskScheduled,
            "ActivityTaskStarted" => Self::ActivityTaskStarted,
            "ActivityTaskCompleted" => Self::ActivityTaskCompleted,
            "ActivityTaskFailed" => Self::ActivityTaskFailed,
            "ActivityTaskTimedOut" => Self::ActivityTaskTimedOut,
            "ActivityTaskCanceled" => Self::ActivityTaskCanceled,
            "TimerStarted" => Self::TimerStarted,
            "TimerFired" => Self::TimerFired,
            "TimerCanceled" => Self::TimerCanceled,
            other => Self::Other(other.to_string()),
        }
    }

    /// The coordinator's PascalCase name
    pub fn as_str(&self) -> &str {
        match self {
            Self::WorkflowExecutionStarted => "WorkflowExecutionStarted",
            Self::WorkflowExecutionCompleted => "WorkflowExecutionCompleted",
            Self::WorkflowExecutionFailed => "WorkflowExecutionFailed",
            Self::DecisionTaskScheduled => "DecisionTaskScheduled",
            Self::DecisionTaskStarted => "DecisionTaskStarted",
            Self::DecisionTaskCompleted => "DecisionTaskCompleted",
            Self::DecisionTaskTimedOut => "DecisionTaskTimedOut",
            Self::DecisionTaskFailed => "DecisionTaskFailed",
            Self::ActivityTaskScheduled => "ActivityTaskScheduled",
            Self::ActivityTaskStarted => "ActivityTaskStarted",
            Self::ActivityTaskCompleted => "ActivityTaskCompleted",
            Self::ActivityTaskFailed => "ActivityTaskFailed",
            Self::ActivityTaskTimedOut => "ActivityTaskTimedOut",
            Self::ActivityTaskCanceled => "ActivityTaskCanceled",
            Self::TimerStarted => "TimerStarted",
            Self::TimerFired => "TimerFired",
            Self::TimerCanceled => "TimerCanceled",
            Self::Other(name) => name,
        }
    }

    /// Key of the per-type attribute bag, e.g. `activityTaskFailedEventAttributes`
    pub fn attributes_key(&self) -> String {
        let name = self.as_str();
        let mut key = String::with_capacity(name.len() + "EventAttributes".len());
        let mut chars = name.chars();
        if let Some(first) = chars.next() {
            key.extend(first.to_lowercase());
        }
        key.push_str(chars.as_str());
        key.push_str("EventAttributes");
        key
    }

    /// A decision round that was lost (timed out or failed)
    pub fn is_decision_failure(&self) -> bool {
        matches!(self, Self::DecisionTaskTimedOut | Self::DecisionTaskFailed)
    }

    /// Failure, timeout or cancellation of an activity or timer
    pub fn is_faulty(&self) -> bool {
        matches!(
            self,
            Self::ActivityTaskFailed
                | Self::ActivityTaskTimedOut
                | Self::ActivityTaskCanceled
                | Self::TimerCanceled
        )
    }

    /// Success-terminal event of an activity or timer
    pub fn is_completion(&self) -> bool {
        matches!(self, Self::ActivityTaskCompleted | Self::TimerFired)
    }

    /// Timer-scoped event carrying a `timerId` attribute
    pub fn is_timer(&self) -> bool {
        matches!(self, Self::TimerStarted | Self::TimerFired | Self::TimerCanceled)
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One event of a workflow execution history
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEvent {
    /// Id assigned by the coordinator, strictly increasing within a history
    pub event_id: i64,

    /// Parsed event type
    pub event_type: EventType,

    /// Timestamp assigned by the coordinator
    pub event_timestamp: DateTime<Utc>,

    /// The `<typeName>EventAttributes` bag, raw
    pub attributes: Value,
}

impl HistoryEvent {
    /// Parse one raw coordinator event
    pub fn from_value(raw: &Value) -> Result<Self, EventError> {
        let object = raw.as_object().ok_or(EventError::NotAnObject)?;

        let event_id = object
            .get("eventId")
            .and_then(Value::as_i64)
            .ok_or(EventError::MalformedField {
                event_id: 0,
                field: "eventId",
            })?;

        let type_name = object
            .get("eventType")
            .and_then(Value::as_str)
            .ok_or(EventError::MalformedField {
                event_id,
                field: "eventType",
            })?;
        let event_type = EventType::parse(type_name);

        let event_timestamp = object
            .get("eventTimestamp")
            .and_then(parse_timestamp)
            .ok_or(EventError::MalformedField {
                event_id,
                field: "eventTimestamp",
            })?;

        let attributes = object
            .get(&event_type.attributes_key())
            .cloned()
            .unwrap_or(Value::Null);

        Ok(Self {
            event_id,
            event_type,
            event_timestamp,
            attributes,
        })
    }

    /// String attribute from the event's attribute bag
    pub fn attr_str(&self, field: &'static str) -> Result<&str, EventError> {
        self.attributes
            .get(field)
            .and_then(Value::as_str)
            .ok_or(EventError::MalformedField {
                event_id: self.event_id,
                field,
            })
    }

    /// Integer attribute from the event's attribute bag
    pub fn attr_i64(&self, field: &'static str) -> Result<i64, EventError> {
        self.attributes
            .get(field)
            .and_then(Value::as_i64)
            .ok_or(EventError::MalformedField {
                event_id: self.event_id,
                field,
            })
    }

    /// Payload attribute, decoded
    ///
    /// The coordinator JSON-encodes payloads into strings; structured values
    /// pass through, and a string that is not valid JSON stays a string.
    pub fn payload(&self, field: &str) -> Option<Value> {
        match self.attributes.get(field) {
            None | Some(Value::Null) => None,
            Some(Value::String(text)) => {
                Some(serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.clone())))
            }
            Some(value) => Some(value.clone()),
        }
    }
}

/// Coordinator timestamps arrive as epoch seconds (possibly fractional) or
/// RFC 3339 strings.
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(number) => {
            let seconds = number.as_f64()?;
            let whole = seconds.trunc() as i64;
            let nanos = ((seconds - seconds.trunc()) * 1e9).round() as u32;
            Utc.timestamp_opt(whole, nanos).single()
        }
        Value::String(text) => DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|parsed| parsed.with_timezone(&Utc)),
        _ => None,
    }
}

/// Raw long-poll response for one decision task
///
/// Only `events` feeds the history view; the remaining fields ride along for
/// the poll loop (task token to answer with, pagination, execution ids).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DecisionTaskResponse {
    /// Raw history events, ascending by `eventId`
    pub events: Vec<Value>,

    /// Id of the `DecisionTaskStarted` of the previous round, if any
    pub previous_started_event_id: Option<i64>,

    /// Id of the `DecisionTaskStarted` this response answers
    pub started_event_id: Option<i64>,

    /// Opaque token to pass back with the decision batch
    pub task_token: Option<String>,

    /// The workflow execution the decision task belongs to
    pub workflow_execution: Option<WorkflowExecution>,

    /// The registered workflow type
    pub workflow_type: Option<WorkflowType>,

    /// Set when the history continues on another page
    pub next_page_token: Option<String>,
}

/// Workflow execution identifier pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExecution {
    pub workflow_id: String,
    pub run_id: String,
}

/// Registered workflow type reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowType {
    pub name: String,
    pub version: String,
}

/// Subset of the coordinator's describe-workflow-execution answer consulted
/// by the decision builder
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowExecutionDescription {
    pub open_counts: OpenCounts,
}

/// Open activity and timer counts as reported by the coordinator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OpenCounts {
    pub open_activity_tasks: u32,
    pub open_timers: u32,
}

impl OpenCounts {
    /// True while the coordinator still tracks unfinished work
    pub fn any_open(&self) -> bool {
        self.open_activity_tasks + self.open_timers > 0
    }
}
