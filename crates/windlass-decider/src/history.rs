//! Read-only view over a workflow execution history
//!
//! Wraps the events of one decision-task poll response and answers the
//! queries the decision builder needs: decision-round boundaries, window
//! classification, task/event correlation, failure counts and results.
//! The view is rebuilt per round from the raw response and never mutates;
//! queries on malformed events fail loudly instead of guessing.

use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;

use windlass_core::{DecisionTaskResponse, EventError, EventType, HistoryEvent, TaskSpec};

/// Errors raised by history construction and queries
#[derive(Debug, Error)]
pub enum HistoryError {
    /// A raw event failed to parse
    #[error(transparent)]
    Event(#[from] EventError),

    /// Event ids must be strictly increasing
    #[error("event ids not strictly increasing at event {event_id}")]
    OutOfOrder { event_id: i64 },

    /// An event references another event that is not part of the history
    #[error("event {event_id} references missing event {referenced}")]
    MissingEvent { event_id: i64, referenced: i64 },

    /// A referenced event has an unexpected type
    #[error("event {event_id} is a `{actual}`, expected `{expected}`")]
    UnexpectedEventType {
        event_id: i64,
        actual: String,
        expected: &'static str,
    },
}

/// Events of one decision window, bucketed for dispatch
#[derive(Debug, Default)]
pub struct DecisionWindow<'a> {
    /// Decision rounds that were lost (timed out or failed)
    pub decision_failed: Vec<&'a HistoryEvent>,

    /// Activity and timer failures, timeouts and cancellations
    pub faulty: Vec<&'a HistoryEvent>,

    /// Activity completions and fired timers
    pub completed: Vec<&'a HistoryEvent>,
}

/// Read-only projection over one workflow execution's event history
pub struct History {
    events: Vec<HistoryEvent>,
    index_by_id: HashMap<i64, usize>,
}

impl History {
    /// Build the view from a raw poll response
    pub fn new(response: &DecisionTaskResponse) -> Result<Self, HistoryError> {
        let mut events = Vec::with_capacity(response.events.len());
        for raw in &response.events {
            events.push(HistoryEvent::from_value(raw)?);
        }
        Self::from_events(events)
    }

    /// Build the view from already-parsed events
    ///
    /// Events must arrive sorted by ascending `event_id`.
    pub fn from_events(events: Vec<HistoryEvent>) -> Result<Self, HistoryError> {
        let mut index_by_id = HashMap::with_capacity(events.len());
        let mut last_id = i64::MIN;
        for (index, event) in events.iter().enumerate() {
            if event.event_id <= last_id {
                return Err(HistoryError::OutOfOrder {
                    event_id: event.event_id,
                });
            }
            last_id = event.event_id;
            index_by_id.insert(event.event_id, index);
        }
        Ok(Self { events, index_by_id })
    }

    /// All events, ascending by id
    pub fn events(&self) -> &[HistoryEvent] {
        &self.events
    }

    /// Event by id
    pub fn event(&self, event_id: i64) -> Option<&HistoryEvent> {
        self.index_by_id.get(&event_id).map(|&index| &self.events[index])
    }

    /// True iff no decision round has completed for this execution yet
    pub fn first_decision_task(&self) -> bool {
        !self
            .events
            .iter()
            .any(|event| event.event_type == EventType::DecisionTaskCompleted)
    }

    /// Event id of the most recent `DecisionTaskCompleted`, or 0
    pub fn previous_decision_id(&self) -> i64 {
        self.latest_of_type(EventType::DecisionTaskCompleted)
    }

    /// Event id of the `DecisionTaskStarted` the current round answers, or 0
    pub fn decision_task_started_event_id(&self) -> i64 {
        self.latest_of_type(EventType::DecisionTaskStarted)
    }

    fn latest_of_type(&self, event_type: EventType) -> i64 {
        self.events
            .iter()
            .rev()
            .find(|event| event.event_type == event_type)
            .map(|event| event.event_id)
            .unwrap_or(0)
    }

    /// Id of the `DecisionTaskStarted` preceding the round a lost decision answered
    ///
    /// `decision_failed` is a decision-failure event; its `startedEventId`
    /// attribute names the started event of the lost round. Returns 0 when
    /// no earlier round exists.
    pub fn id_previous_started(&self, decision_failed: &HistoryEvent) -> Result<i64, HistoryError> {
        let started_id = decision_failed.attr_i64("startedEventId")?;
        Ok(self
            .events
            .iter()
            .rev()
            .filter(|event| event.event_type == EventType::DecisionTaskStarted)
            .map(|event| event.event_id)
            .find(|&event_id| event_id < started_id)
            .unwrap_or(0))
    }

    /// Partition the open interval `(lo, hi)` into dispatch buckets
    ///
    /// Events outside the classification vocabulary are dropped; each bucket
    /// keeps ascending event-id order.
    pub fn get_events_for_decision(&self, lo: i64, hi: i64) -> DecisionWindow<'_> {
        let mut window = DecisionWindow::default();
        for event in self
            .events
            .iter()
            .filter(|event| event.event_id > lo && event.event_id < hi)
        {
            if event.event_type.is_decision_failure() {
                window.decision_failed.push(event);
            } else if event.event_type.is_faulty() {
                window.faulty.push(event);
            } else if event.event_type.is_completion() {
                window.completed.push(event);
            }
        }
        window
    }

    /// Activity id behind an activity-scoped event
    ///
    /// `ActivityTaskScheduled` carries the id directly; every later attempt
    /// event references it through `scheduledEventId`.
    pub fn id_activity_task_event(&self, event: &HistoryEvent) -> Result<String, HistoryError> {
        if event.event_type == EventType::ActivityTaskScheduled {
            return Ok(event.attr_str("activityId")?.to_string());
        }
        let scheduled = self.event_task_scheduled(event)?;
        Ok(scheduled.attr_str("activityId")?.to_string())
    }

    /// Task id behind any task-scoped event, timers included
    pub fn id_task_event(&self, event: &HistoryEvent) -> Result<String, HistoryError> {
        if event.event_type.is_timer() {
            return Ok(event.attr_str("timerId")?.to_string());
        }
        self.id_activity_task_event(event)
    }

    /// The `ActivityTaskScheduled` event an activity event traces back to
    pub fn event_task_scheduled(&self, event: &HistoryEvent) -> Result<&HistoryEvent, HistoryError> {
        let scheduled_id = event.attr_i64("scheduledEventId")?;
        let scheduled = self.event(scheduled_id).ok_or(HistoryError::MissingEvent {
            event_id: event.event_id,
            referenced: scheduled_id,
        })?;
        if scheduled.event_type != EventType::ActivityTaskScheduled {
            return Err(HistoryError::UnexpectedEventType {
                event_id: scheduled.event_id,
                actual: scheduled.event_type.to_string(),
                expected: "ActivityTaskScheduled",
            });
        }
        Ok(scheduled)
    }

    /// Count of `ActivityTaskFailed` events recorded for the given activity id
    pub fn number_activity_task_failures(&self, activity_id: &str) -> Result<u32, HistoryError> {
        let mut failures = 0;
        for event in &self.events {
            if event.event_type == EventType::ActivityTaskFailed
                && self.id_activity_task_event(event)? == activity_id
            {
                failures += 1;
            }
        }
        Ok(failures)
    }

    /// Result payload of the latest completion of the given activity id
    pub fn result_completed_activity(&self, task_id: &str) -> Result<Option<Value>, HistoryError> {
        for event in self.events.iter().rev() {
            if event.event_type == EventType::ActivityTaskCompleted
                && self.id_activity_task_event(event)? == task_id
            {
                return Ok(event.payload("result"));
            }
        }
        Ok(None)
    }

    /// Whether the task already has a success-terminal event
    pub fn is_task_completed(&self, task: &TaskSpec) -> Result<bool, HistoryError> {
        match task {
            TaskSpec::Activity(_) => {
                for event in &self.events {
                    if event.event_type == EventType::ActivityTaskCompleted
                        && self.id_activity_task_event(event)? == task.id()
                    {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            TaskSpec::Timer(_) => {
                for event in &self.events {
                    if event.event_type == EventType::TimerFired
                        && event.attr_str("timerId")? == task.id()
                    {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }

    /// Input recorded in `WorkflowExecutionStarted`, if any
    pub fn workflow_input(&self) -> Option<Value> {
        self.events
            .iter()
            .find(|event| event.event_type == EventType::WorkflowExecutionStarted)
            .and_then(|event| event.payload("input"))
    }
}
