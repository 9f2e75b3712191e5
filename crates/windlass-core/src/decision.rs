//! Decision records sent back to the coordinator
//!
//! A decision round answers the coordinator with a batch of decisions. In
//! memory they are typed records; on the wire every record becomes
//! `{"decisionType": ..., "<typeName>DecisionAttributes": {...}}` with
//! payloads JSON-encoded as strings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::task::ActivityTimeouts;

/// Activity type reference as registered at the coordinator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityType {
    pub name: String,
    pub version: String,
}

/// One decision of a decision round
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Hand an activity attempt to the workers polling `task_list`
    ScheduleActivityTask {
        activity_type: ActivityType,
        activity_id: String,
        task_list: String,
        /// JSON-encoded input; retries carry the original bytes unchanged
        input: Option<String>,
        timeouts: Option<ActivityTimeouts>,
    },

    /// Ask the coordinator to fire a timer after the timeout
    StartTimer {
        timer_id: String,
        /// Seconds between the decision and the `TimerFired` event
        start_to_fire_timeout: u64,
    },

    /// Close the workflow execution successfully
    CompleteWorkflowExecution { result: Option<Value> },

    /// Close the workflow execution as failed
    FailWorkflowExecution {
        reason: String,
        /// Failed task id mapped to the failure details of its last attempt
        details: BTreeMap<String, String>,
    },

    /// Cancel a running timer
    CancelTimer { timer_id: String },
}

impl Decision {
    /// The coordinator's name for this decision type
    pub fn decision_type(&self) -> &'static str {
        match self {
            Self::ScheduleActivityTask { .. } => "ScheduleActivityTask",
            Self::StartTimer { .. } => "StartTimer",
            Self::CompleteWorkflowExecution { .. } => "CompleteWorkflowExecution",
            Self::FailWorkflowExecution { .. } => "FailWorkflowExecution",
            Self::CancelTimer { .. } => "CancelTimer",
        }
    }

    /// Terminal decisions close the workflow execution
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::CompleteWorkflowExecution { .. } | Self::FailWorkflowExecution { .. }
        )
    }

    /// Serialize into the coordinator's decision shape
    pub fn to_value(&self) -> Value {
        let (attributes_key, attributes) = match self {
            Self::ScheduleActivityTask {
                activity_type,
                activity_id,
                task_list,
                input,
                timeouts,
            } => {
                let mut attributes = Map::new();
                attributes.insert(
                    "activityType".to_string(),
                    json!({"name": activity_type.name, "version": activity_type.version}),
                );
                attributes.insert("activityId".to_string(), Value::String(activity_id.clone()));
                attributes.insert("taskList".to_string(), json!({"name": task_list}));
                if let Some(input) = input {
                    attributes.insert("input".to_string(), Value::String(input.clone()));
                }
                if let Some(timeouts) = timeouts {
                    insert_timeout(&mut attributes, "scheduleToStartTimeout", timeouts.schedule_to_start);
                    insert_timeout(&mut attributes, "scheduleToCloseTimeout", timeouts.schedule_to_close);
                    insert_timeout(&mut attributes, "startToCloseTimeout", timeouts.start_to_close);
                    insert_timeout(&mut attributes, "heartbeatTimeout", timeouts.heartbeat);
                }
                ("scheduleActivityTaskDecisionAttributes", attributes)
            }

            Self::StartTimer {
                timer_id,
                start_to_fire_timeout,
            } => {
                let mut attributes = Map::new();
                attributes.insert("timerId".to_string(), Value::String(timer_id.clone()));
                attributes.insert(
                    "startToFireTimeout".to_string(),
                    Value::String(start_to_fire_timeout.to_string()),
                );
                ("startTimerDecisionAttributes", attributes)
            }

            Self::CompleteWorkflowExecution { result } => {
                let mut attributes = Map::new();
                if let Some(result) = result {
                    attributes.insert("result".to_string(), Value::String(result.to_string()));
                }
                ("completeWorkflowExecutionDecisionAttributes", attributes)
            }

            Self::FailWorkflowExecution { reason, details } => {
                let mut attributes = Map::new();
                attributes.insert("reason".to_string(), Value::String(reason.clone()));
                let details: Map<String, Value> = details
                    .iter()
                    .map(|(task_id, text)| (task_id.clone(), Value::String(text.clone())))
                    .collect();
                attributes.insert(
                    "details".to_string(),
                    Value::String(Value::Object(details).to_string()),
                );
                ("failWorkflowExecutionDecisionAttributes", attributes)
            }

            Self::CancelTimer { timer_id } => {
                let mut attributes = Map::new();
                attributes.insert("timerId".to_string(), Value::String(timer_id.clone()));
                ("cancelTimerDecisionAttributes", attributes)
            }
        };

        let mut decision = Map::new();
        decision.insert(
            "decisionType".to_string(),
            Value::String(self.decision_type().to_string()),
        );
        decision.insert(attributes_key.to_string(), Value::Object(attributes));
        Value::Object(decision)
    }
}

fn insert_timeout(attributes: &mut Map<String, Value>, key: &str, seconds: Option<u64>) {
    if let Some(seconds) = seconds {
        attributes.insert(key.to_string(), Value::String(seconds.to_string()));
    }
}

/// Package a decision batch as the respond-decision-task-completed payload
pub fn respond_decisions(task_token: &str, decisions: &[Decision]) -> Value {
    json!({
        "taskToken": task_token,
        "decisions": decisions.iter().map(Decision::to_value).collect::<Vec<_>>(),
    })
}
