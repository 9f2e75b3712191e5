//! The decision builder
//!
//! [`DecisionBuilder`] answers one decision round: given the execution graph
//! and the history view of the coordinator's poll response, it classifies
//! the current decision window and emits the next batch of decisions.
//!
//! A round moves through classification once: a lost decision round is
//! replayed, faulty tasks are retried or fail the workflow, completions fan
//! out to dependent tasks or close the workflow. The per-round flags
//! `workflow_fail` / `workflow_complete` are write-once within a round and
//! reset on the next one.

use std::collections::{BTreeMap, HashSet};

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};

use windlass_core::{
    ActivityTask, ActivityTimeouts, ActivityType, Decision, EventType, HistoryEvent, TaskSpec,
    TimerTask, WorkflowExecutionDescription,
};

use crate::graph::ExecutionGraph;
use crate::history::{History, HistoryError};

/// Failure reason when a task without a retry strategy fails
const REASON_TASK_FAILED: &str = "task_failed";

/// Failure reason when the retry budget is exhausted
const REASON_RETRY_LIMIT_REACHED: &str = "task_retry_limit_reached";

/// Errors that abort a decision round
///
/// A round either yields a complete batch or one of these; partial batches
/// are never returned.
#[derive(Debug, Error)]
pub enum DeciderError {
    /// A history query failed or the history is inconsistent
    #[error(transparent)]
    History(#[from] HistoryError),

    /// The history references a task id the execution graph does not know
    #[error("history references unknown task `{task_id}`")]
    UnknownTask { task_id: String },
}

/// Builds the decision batch for one decision round
///
/// The builder is stateless across rounds: [`DecisionBuilder::decisions_for`]
/// recomputes everything from the history, resetting the per-round terminal
/// flags first. Distinct instances over the same graph and history produce
/// equal batches, so a caller may pipeline rounds with fresh builders or
/// reuse one sequentially.
pub struct DecisionBuilder {
    graph: ExecutionGraph,
    activity_task_list: String,
    default_timeouts: Option<ActivityTimeouts>,
    execution_description: Option<WorkflowExecutionDescription>,
    workflow_fail: bool,
    workflow_complete: bool,
}

impl DecisionBuilder {
    /// Create a builder over a validated graph
    ///
    /// `activity_task_list` is the task list scheduled activities are handed
    /// to.
    pub fn new(graph: ExecutionGraph, activity_task_list: impl Into<String>) -> Self {
        Self {
            graph,
            activity_task_list: activity_task_list.into(),
            default_timeouts: None,
            execution_description: None,
            workflow_fail: false,
            workflow_complete: false,
        }
    }

    /// Default timeouts for activities without per-task overrides
    pub fn with_default_timeouts(mut self, timeouts: ActivityTimeouts) -> Self {
        self.default_timeouts = Some(timeouts);
        self
    }

    /// Latest describe-workflow-execution answer, consulted for open counts
    ///
    /// Without a description the builder assumes no open work.
    pub fn set_execution_description(
        &mut self,
        description: Option<WorkflowExecutionDescription>,
    ) {
        self.execution_description = description;
    }

    /// True iff this round decided to close the workflow execution
    pub fn is_terminate_workflow(&self) -> bool {
        self.workflow_fail || self.workflow_complete
    }

    /// Compute the decision batch for the round described by `history`
    pub fn decisions_for(&mut self, history: &History) -> Result<Vec<Decision>, DeciderError> {
        self.workflow_fail = false;
        self.workflow_complete = false;

        let previous_decision_id = history.previous_decision_id();
        let started_event_id = history.decision_task_started_event_id();
        debug!(
            previous_decision_id,
            started_event_id, "collecting decisions"
        );
        self.collect_decisions(history, previous_decision_id, started_event_id)
    }

    /// Classify one decision window and emit its decisions
    ///
    /// Windows whose decision round was lost expand into the windows of the
    /// rounds they should have answered; the worklist keeps replay depth off
    /// the call stack.
    fn collect_decisions(
        &mut self,
        history: &History,
        lo: i64,
        hi: i64,
    ) -> Result<Vec<Decision>, DeciderError> {
        if history.first_decision_task() {
            debug!("first decision round, scheduling source tasks");
            return self.decisions_after_workflow_start(history);
        }

        let mut decisions = Vec::new();
        let mut windows = vec![(lo, hi)];
        while let Some((lo, hi)) = windows.pop() {
            let window = history.get_events_for_decision(lo, hi);

            if !window.decision_failed.is_empty() {
                // Replay the lost rounds in place of this window. Reverse
                // push order so the earliest lost round is emitted first.
                for failed in window.decision_failed.iter().rev() {
                    let started_id = failed
                        .attr_i64("startedEventId")
                        .map_err(HistoryError::from)?;
                    let previous_started = history.id_previous_started(failed)?;
                    debug!(
                        started_id,
                        previous_started, "replaying lost decision round"
                    );
                    windows.push((previous_started, started_id));
                }
                continue;
            }

            if !window.faulty.is_empty() {
                let faulty_decisions = self.decisions_for_faulty(history, &window.faulty)?;
                if self.workflow_fail {
                    // Terminal round: the failure decision stands alone.
                    return Ok(faulty_decisions);
                }
                decisions.extend(faulty_decisions);
            } else if !window.completed.is_empty() {
                if self.all_workflow_tasks_finished(history, &window.completed)? {
                    return self.decisions_after_successful_workflow_execution(history);
                }
                decisions
                    .extend(self.decisions_after_activity_completion(history, &window.completed)?);
            }
        }
        Ok(decisions)
    }

    /// Decisions for the very first round: schedule every source task
    fn decisions_after_workflow_start(
        &self,
        history: &History,
    ) -> Result<Vec<Decision>, DeciderError> {
        let mut decisions = Vec::new();
        for task in self.graph.first_tasks() {
            decisions.push(self.decision_for(history, task)?);
        }
        Ok(decisions)
    }

    /// Retry-or-fail handling for the window's faulty events
    ///
    /// Emits one re-schedule per retryable failure. The first failure out of
    /// retry budget (or without a strategy) fails the workflow; the failure
    /// decision then stands alone and remaining faulty events are ignored.
    fn decisions_for_faulty(
        &mut self,
        history: &History,
        faulty: &[&HistoryEvent],
    ) -> Result<Vec<Decision>, DeciderError> {
        if self.is_terminate_workflow() {
            return Ok(Vec::new());
        }

        let mut decisions = Vec::new();
        for event in faulty {
            let task_id = history.id_task_event(event)?;
            let task = self
                .graph
                .task_by_id(&task_id)
                .ok_or_else(|| DeciderError::UnknownTask {
                    task_id: task_id.clone(),
                })?;

            let mut has_retry_strategy = false;
            if let TaskSpec::Activity(activity) = task {
                if let Some(strategy) = &activity.retry_strategy {
                    let failures = history.number_activity_task_failures(&task_id)?;
                    if strategy.should_retry(failures) {
                        debug!(activity_id = %task_id, failures, "re-scheduling failed activity");
                        decisions.push(self.retry_decision(history, event, activity)?);
                        continue;
                    }
                    has_retry_strategy = true;
                }
            }

            let reason = if has_retry_strategy {
                REASON_RETRY_LIMIT_REACHED
            } else {
                REASON_TASK_FAILED
            };
            let details = self.details_failed_tasks(history, faulty)?;
            info!(task_id = %task_id, reason, "failing workflow execution");
            self.workflow_fail = true;
            return Ok(vec![Decision::FailWorkflowExecution {
                reason: reason.to_string(),
                details,
            }]);
        }
        Ok(decisions)
    }

    /// Single terminal decision closing a finished workflow
    fn decisions_after_successful_workflow_execution(
        &mut self,
        history: &History,
    ) -> Result<Vec<Decision>, DeciderError> {
        let result = self.workflow_result(history)?;
        info!("workflow tasks finished, completing workflow execution");
        self.workflow_complete = true;
        Ok(vec![Decision::CompleteWorkflowExecution { result }])
    }

    /// Schedule every task whose dependency closure just became complete
    fn decisions_after_activity_completion(
        &self,
        history: &History,
        completed: &[&HistoryEvent],
    ) -> Result<Vec<Decision>, DeciderError> {
        let mut completed_ids = Vec::with_capacity(completed.len());
        for event in completed {
            completed_ids.push(history.id_task_event(event)?);
        }

        let tasks = self.tasks_to_be_scheduled(history, &completed_ids)?;
        let mut decisions = Vec::with_capacity(tasks.len());
        for task in tasks {
            decisions.push(self.decision_for(history, task)?);
        }
        Ok(decisions)
    }

    /// Dependents of the given tasks that are ready and not yet completed
    ///
    /// A task depending on several just-completed predecessors appears once;
    /// first occurrence wins.
    fn tasks_to_be_scheduled(
        &self,
        history: &History,
        completed_ids: &[String],
    ) -> Result<Vec<&TaskSpec>, DeciderError> {
        let mut seen = HashSet::new();
        let mut tasks = Vec::new();
        for completed_id in completed_ids {
            for task in self.tasks_to_be_scheduled_single_id(history, completed_id)? {
                if seen.insert(task.id().to_string()) {
                    tasks.push(task);
                }
            }
        }
        Ok(tasks)
    }

    /// Ready dependents of one completed task
    fn tasks_to_be_scheduled_single_id(
        &self,
        history: &History,
        completed_id: &str,
    ) -> Result<Vec<&TaskSpec>, DeciderError> {
        let mut ready = Vec::new();
        for successor in self.graph.successors(completed_id) {
            if history.is_task_completed(successor)? {
                continue;
            }
            let mut dependencies_completed = true;
            for dependency in successor.requires() {
                let dependency_task =
                    self.graph
                        .task_by_id(dependency)
                        .ok_or_else(|| DeciderError::UnknownTask {
                            task_id: dependency.clone(),
                        })?;
                if !history.is_task_completed(dependency_task)? {
                    dependencies_completed = false;
                    break;
                }
            }
            if dependencies_completed {
                ready.push(successor);
            }
        }
        Ok(ready)
    }

    /// Scheduling decision for one task spec
    fn decision_for(&self, history: &History, task: &TaskSpec) -> Result<Decision, DeciderError> {
        match task {
            TaskSpec::Activity(activity) => self.schedule_activity_decision(history, activity),
            TaskSpec::Timer(timer) => Ok(Self::start_timer_decision(timer)),
        }
    }

    fn start_timer_decision(timer: &TimerTask) -> Decision {
        Decision::StartTimer {
            timer_id: timer.id.clone(),
            start_to_fire_timeout: timer.delay_in_seconds,
        }
    }

    /// `ScheduleActivityTask` with freshly wrapped input
    fn schedule_activity_decision(
        &self,
        history: &History,
        activity: &ActivityTask,
    ) -> Result<Decision, DeciderError> {
        let input = self.activity_input(history, activity)?;
        Ok(Decision::ScheduleActivityTask {
            activity_type: ActivityType {
                name: activity.name.clone(),
                version: activity.version.clone(),
            },
            activity_id: activity.id.clone(),
            task_list: self.activity_task_list.clone(),
            input: input.map(|value| value.to_string()),
            timeouts: activity.timeouts.or(self.default_timeouts),
        })
    }

    /// Re-schedule a faulty activity with the input of the original attempt
    ///
    /// The input string of the `ActivityTaskScheduled` event is reused
    /// verbatim: runtime wrapping may have enriched it beyond the task's
    /// static input.
    fn retry_decision(
        &self,
        history: &History,
        event: &HistoryEvent,
        activity: &ActivityTask,
    ) -> Result<Decision, DeciderError> {
        let scheduled = history.event_task_scheduled(event)?;
        let input = match scheduled.attributes.get("input") {
            None | Some(Value::Null) => None,
            Some(Value::String(text)) => Some(text.clone()),
            Some(value) => Some(value.to_string()),
        };
        Ok(Decision::ScheduleActivityTask {
            activity_type: ActivityType {
                name: activity.name.clone(),
                version: activity.version.clone(),
            },
            activity_id: activity.id.clone(),
            task_list: self.activity_task_list.clone(),
            input,
            timeouts: activity.timeouts.or(self.default_timeouts),
        })
    }

    /// Structured input for an activity attempt
    ///
    /// Source tasks see the workflow input next to their own static input;
    /// dependent tasks see each predecessor's result keyed by predecessor
    /// id, in declared order.
    fn activity_input(
        &self,
        history: &History,
        activity: &ActivityTask,
    ) -> Result<Option<Value>, DeciderError> {
        let mut input = Map::new();
        if activity.requires.is_empty() {
            if let Some(value) = &activity.input {
                input.insert("activity_task".to_string(), value.clone());
            }
            if let Some(value) = history.workflow_input() {
                input.insert("workflow".to_string(), value);
            }
        } else {
            for dependency in &activity.requires {
                if let Some(result) = history.result_completed_activity(dependency)? {
                    input.insert(dependency.clone(), result);
                }
            }
            if let Some(value) = &activity.input {
                input.insert("activity_task".to_string(), value.clone());
            }
        }

        if input.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Value::Object(input)))
        }
    }

    /// Per-task failure details from the window's `ActivityTaskFailed` events
    ///
    /// Events arrive in ascending order, so each task keeps the details of
    /// its last recorded failure.
    fn details_failed_tasks(
        &self,
        history: &History,
        faulty: &[&HistoryEvent],
    ) -> Result<BTreeMap<String, String>, DeciderError> {
        let mut details = BTreeMap::new();
        for event in faulty {
            if event.event_type != EventType::ActivityTaskFailed {
                continue;
            }
            let task_id = history.id_task_event(event)?;
            if let Some(text) = event.attributes.get("details").and_then(Value::as_str) {
                details.insert(task_id, text.to_string());
            }
        }
        Ok(details)
    }

    /// Terminal classification: nothing depends on the completions, the
    /// coordinator reports no open work and every sink is done
    fn all_workflow_tasks_finished(
        &self,
        history: &History,
        completed: &[&HistoryEvent],
    ) -> Result<bool, DeciderError> {
        if self.completed_have_depending_tasks(history, completed)? {
            return Ok(false);
        }
        if self.open_task_counts() {
            return Ok(false);
        }
        self.outgoing_vertices_completed(history)
    }

    /// Any just-completed task with a successor that is not itself done
    fn completed_have_depending_tasks(
        &self,
        history: &History,
        completed: &[&HistoryEvent],
    ) -> Result<bool, DeciderError> {
        for event in completed {
            let task_id = history.id_task_event(event)?;
            for successor in self.graph.successors(&task_id) {
                if !history.is_task_completed(successor)? {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Open activity/timer counts from the latest execution description
    fn open_task_counts(&self) -> bool {
        self.execution_description
            .as_ref()
            .map(|description| description.open_counts.any_open())
            .unwrap_or(false)
    }

    /// Every sink of the graph has a success-terminal event
    fn outgoing_vertices_completed(&self, history: &History) -> Result<bool, DeciderError> {
        for task in self.graph.outgoing_vertices() {
            if !history.is_task_completed(task)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Result mapping for the completion decision
    ///
    /// Every activity sink's recorded result keyed by task id, or absent
    /// when any of them is missing. Timer sinks carry no result and are
    /// left out. An absent mapping never holds the round open; the
    /// completion decision simply carries no result.
    fn workflow_result(&self, history: &History) -> Result<Option<Value>, DeciderError> {
        let mut results = Map::new();
        for task in self.graph.outgoing_vertices() {
            if !matches!(task, TaskSpec::Activity(_)) {
                continue;
            }
            match history.result_completed_activity(task.id())? {
                Some(result) => {
                    results.insert(task.id().to_string(), result);
                }
                None => return Ok(None),
            }
        }

        if results.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Value::Object(results)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use windlass_core::{DecisionTaskResponse, OpenCounts, RetryStrategy};

    fn raw_event(id: i64, event_type: &str, attributes: Value) -> Value {
        let mut event = serde_json::Map::new();
        event.insert("eventId".to_string(), json!(id));
        event.insert("eventType".to_string(), json!(event_type));
        event.insert("eventTimestamp".to_string(), json!(1_452_556_800 + id));
        event.insert(EventType::parse(event_type).attributes_key(), attributes);
        Value::Object(event)
    }

    fn history(events: Vec<Value>) -> History {
        let response = DecisionTaskResponse {
            events,
            ..Default::default()
        };
        History::new(&response).unwrap()
    }

    fn linear_graph() -> ExecutionGraph {
        let first = ActivityTask::new("activity1", "v1").with_input(json!({"date": 1}));
        let second = ActivityTask::new("activity2", "v1").with_requires([first.id.clone()]);
        ExecutionGraph::from_tasks(vec![first.into(), second.into()]).unwrap()
    }

    fn builder() -> DecisionBuilder {
        DecisionBuilder::new(linear_graph(), "windlass_activities")
    }

    fn description(open_activity_tasks: u32, open_timers: u32) -> WorkflowExecutionDescription {
        WorkflowExecutionDescription {
            open_counts: OpenCounts {
                open_activity_tasks,
                open_timers,
            },
        }
    }

    #[test]
    fn test_new_builder_is_not_terminal() {
        let builder = builder();
        assert!(!builder.workflow_fail);
        assert!(!builder.workflow_complete);
        assert!(!builder.is_terminate_workflow());
        assert_eq!(builder.activity_task_list, "windlass_activities");
    }

    #[test]
    fn test_is_terminate_workflow_is_the_disjunction() {
        for (fail, complete, expected) in [
            (false, false, false),
            (false, true, true),
            (true, false, true),
            (true, true, true),
        ] {
            let mut builder = builder();
            builder.workflow_fail = fail;
            builder.workflow_complete = complete;
            assert_eq!(builder.is_terminate_workflow(), expected);
        }
    }

    #[test]
    fn test_first_round_schedules_source_tasks() {
        let history = history(vec![
            raw_event(1, "WorkflowExecutionStarted", json!({})),
            raw_event(2, "DecisionTaskStarted", json!({})),
        ]);

        let decisions = builder().decisions_for(&history).unwrap();
        assert_eq!(decisions.len(), 1);
        let Decision::ScheduleActivityTask { activity_id, task_list, .. } = &decisions[0] else {
            panic!("expected ScheduleActivityTask, got {:?}", decisions[0]);
        };
        assert_eq!(activity_id, "activity1:v1");
        assert_eq!(task_list, "windlass_activities");
    }

    #[test]
    fn test_first_round_with_timer_source() {
        let graph =
            ExecutionGraph::from_tasks(vec![TimerTask::new("timer_id", 60).into()]).unwrap();
        let mut builder = DecisionBuilder::new(graph, "windlass_activities");
        let history = history(vec![
            raw_event(1, "WorkflowExecutionStarted", json!({})),
            raw_event(2, "DecisionTaskStarted", json!({})),
        ]);

        let decisions = builder.decisions_for(&history).unwrap();
        assert_eq!(
            decisions,
            vec![Decision::StartTimer {
                timer_id: "timer_id".to_string(),
                start_to_fire_timeout: 60,
            }]
        );
    }

    #[test]
    fn test_first_round_wraps_workflow_input() {
        let history = history(vec![
            raw_event(
                1,
                "WorkflowExecutionStarted",
                json!({"input": {"foo": "bar"}}),
            ),
            raw_event(2, "DecisionTaskStarted", json!({})),
        ]);

        let decisions = builder().decisions_for(&history).unwrap();
        let Decision::ScheduleActivityTask { input, .. } = &decisions[0] else {
            panic!("expected ScheduleActivityTask");
        };
        let input: Value = serde_json::from_str(input.as_deref().unwrap()).unwrap();
        assert_eq!(input["activity_task"], json!({"date": 1}));
        assert_eq!(input["workflow"], json!({"foo": "bar"}));
    }

    /// History of a completed first round for `activity1:v1` with `failures`
    /// recorded failures, ending in a fresh decision round.
    fn failure_history(failures: usize) -> History {
        let mut events = vec![
            raw_event(1, "WorkflowExecutionStarted", json!({})),
            raw_event(2, "DecisionTaskStarted", json!({})),
            raw_event(3, "DecisionTaskCompleted", json!({"startedEventId": 2})),
        ];
        let mut next_id = 4;
        for _ in 0..failures {
            events.push(raw_event(
                next_id,
                "ActivityTaskScheduled",
                json!({"activityId": "activity1:v1", "input": "{\"date\":1}"}),
            ));
            events.push(raw_event(
                next_id + 1,
                "ActivityTaskFailed",
                json!({"scheduledEventId": next_id, "details": "Error"}),
            ));
            next_id += 2;
        }
        events.push(raw_event(next_id, "DecisionTaskStarted", json!({})));
        history(events)
    }

    #[test]
    fn test_faulty_task_retried_within_budget() {
        let first = ActivityTask::new("activity1", "v1").with_retry(RetryStrategy::instant(1));
        let graph = ExecutionGraph::from_tasks(vec![first.into()]).unwrap();
        let mut builder = DecisionBuilder::new(graph, "windlass_activities");

        let decisions = builder.decisions_for(&failure_history(1)).unwrap();
        assert_eq!(decisions.len(), 1);
        let Decision::ScheduleActivityTask { activity_id, input, .. } = &decisions[0] else {
            panic!("expected ScheduleActivityTask");
        };
        assert_eq!(activity_id, "activity1:v1");
        // the original attempt's input string, byte for byte
        assert_eq!(input.as_deref(), Some("{\"date\":1}"));
        assert!(!builder.is_terminate_workflow());
    }

    #[test]
    fn test_faulty_task_retry_limit_reached() {
        let first = ActivityTask::new("activity1", "v1").with_retry(RetryStrategy::instant(1));
        let graph = ExecutionGraph::from_tasks(vec![first.into()]).unwrap();
        let mut builder = DecisionBuilder::new(graph, "windlass_activities");

        let decisions = builder.decisions_for(&failure_history(2)).unwrap();
        assert_eq!(decisions.len(), 1);
        let Decision::FailWorkflowExecution { reason, details } = &decisions[0] else {
            panic!("expected FailWorkflowExecution");
        };
        assert_eq!(reason, "task_retry_limit_reached");
        assert_eq!(details.get("activity1:v1").map(String::as_str), Some("Error"));
        assert!(builder.is_terminate_workflow());
    }

    #[test]
    fn test_faulty_task_without_retry_strategy() {
        let graph =
            ExecutionGraph::from_tasks(vec![ActivityTask::new("activity1", "v1").into()]).unwrap();
        let mut builder = DecisionBuilder::new(graph, "windlass_activities");

        let decisions = builder.decisions_for(&failure_history(1)).unwrap();
        assert_eq!(decisions.len(), 1);
        let Decision::FailWorkflowExecution { reason, details } = &decisions[0] else {
            panic!("expected FailWorkflowExecution");
        };
        assert_eq!(reason, "task_failed");
        assert_eq!(details.get("activity1:v1").map(String::as_str), Some("Error"));
        assert!(builder.is_terminate_workflow());
    }

    #[test]
    fn test_faulty_handler_short_circuits_after_failure() {
        let history = failure_history(1);
        let window = history.get_events_for_decision(3, 6);
        let mut builder = builder();
        builder.workflow_fail = true;

        let decisions = builder.decisions_for_faulty(&history, &window.faulty).unwrap();
        assert!(decisions.is_empty());
    }

    #[test]
    fn test_faulty_unknown_task_is_fatal() {
        let graph =
            ExecutionGraph::from_tasks(vec![ActivityTask::new("other", "v1").into()]).unwrap();
        let mut builder = DecisionBuilder::new(graph, "windlass_activities");

        let result = builder.decisions_for(&failure_history(1));
        assert!(matches!(
            result,
            Err(DeciderError::UnknownTask { task_id }) if task_id == "activity1:v1"
        ));
    }

    #[test]
    fn test_lost_decision_round_is_replayed() {
        // Round one completed and scheduled activity1; its failure then
        // triggered a round that timed out, so the current round replays it.
        let first = ActivityTask::new("activity1", "v1").with_retry(RetryStrategy::instant(1));
        let graph = ExecutionGraph::from_tasks(vec![first.into()]).unwrap();
        let mut builder = DecisionBuilder::new(graph, "windlass_activities");

        let history = history(vec![
            raw_event(1, "WorkflowExecutionStarted", json!({})),
            raw_event(2, "DecisionTaskStarted", json!({})),
            raw_event(3, "DecisionTaskCompleted", json!({"startedEventId": 2})),
            raw_event(
                4,
                "ActivityTaskScheduled",
                json!({"activityId": "activity1:v1", "input": "{\"date\":1}"}),
            ),
            raw_event(5, "ActivityTaskFailed", json!({"scheduledEventId": 4, "details": "Error"})),
            raw_event(6, "DecisionTaskStarted", json!({})),
            raw_event(7, "DecisionTaskTimedOut", json!({"startedEventId": 6})),
            raw_event(8, "DecisionTaskStarted", json!({})),
        ]);

        let decisions = builder.decisions_for(&history).unwrap();
        assert_eq!(decisions.len(), 1);
        let Decision::ScheduleActivityTask { activity_id, .. } = &decisions[0] else {
            panic!("expected the lost round's retry to be replayed");
        };
        assert_eq!(activity_id, "activity1:v1");
    }

    /// History where both tasks of the linear graph completed.
    fn completed_history() -> History {
        history(vec![
            raw_event(1, "WorkflowExecutionStarted", json!({})),
            raw_event(2, "DecisionTaskStarted", json!({})),
            raw_event(3, "DecisionTaskCompleted", json!({"startedEventId": 2})),
            raw_event(4, "ActivityTaskScheduled", json!({"activityId": "activity1:v1"})),
            raw_event(5, "ActivityTaskCompleted", json!({"scheduledEventId": 4})),
            raw_event(6, "DecisionTaskStarted", json!({})),
            raw_event(7, "DecisionTaskCompleted", json!({"startedEventId": 6})),
            raw_event(8, "ActivityTaskScheduled", json!({"activityId": "activity2:v1"})),
            raw_event(
                9,
                "ActivityTaskCompleted",
                json!({"scheduledEventId": 8, "result": "{\"foo\":\"bar\"}"}),
            ),
            raw_event(10, "DecisionTaskStarted", json!({})),
        ])
    }

    #[test]
    fn test_completed_workflow_emits_single_complete_decision() {
        let mut builder = builder();
        let decisions = builder.decisions_for(&completed_history()).unwrap();

        assert_eq!(decisions.len(), 1);
        let Decision::CompleteWorkflowExecution { result } = &decisions[0] else {
            panic!("expected CompleteWorkflowExecution");
        };
        assert_eq!(result, &Some(json!({"activity2:v1": {"foo": "bar"}})));
        assert!(builder.is_terminate_workflow());
        assert!(builder.workflow_complete);
        assert!(!builder.workflow_fail);
    }

    #[test]
    fn test_open_tasks_defer_completion() {
        let mut builder = builder();
        builder.set_execution_description(Some(description(1, 0)));

        let decisions = builder.decisions_for(&completed_history()).unwrap();
        assert!(decisions.is_empty());
        assert!(!builder.is_terminate_workflow());
    }

    #[test]
    fn test_open_task_counts() {
        for (activities, timers, expected) in
            [(0, 0, false), (1, 0, true), (0, 1, true), (1, 1, true)]
        {
            let mut builder = builder();
            builder.set_execution_description(Some(description(activities, timers)));
            assert_eq!(builder.open_task_counts(), expected);
        }
    }

    #[test]
    fn test_open_task_counts_without_description() {
        let builder = builder();
        assert!(!builder.open_task_counts());
    }

    #[test]
    fn test_completion_schedules_dependent_task() {
        let mut builder = builder();
        let history = history(vec![
            raw_event(1, "WorkflowExecutionStarted", json!({})),
            raw_event(2, "DecisionTaskStarted", json!({})),
            raw_event(3, "DecisionTaskCompleted", json!({"startedEventId": 2})),
            raw_event(4, "ActivityTaskScheduled", json!({"activityId": "activity1:v1"})),
            raw_event(
                5,
                "ActivityTaskCompleted",
                json!({"scheduledEventId": 4, "result": "{\"rows\":3}"}),
            ),
            raw_event(6, "DecisionTaskStarted", json!({})),
        ]);

        let decisions = builder.decisions_for(&history).unwrap();
        assert_eq!(decisions.len(), 1);
        let Decision::ScheduleActivityTask { activity_id, input, .. } = &decisions[0] else {
            panic!("expected ScheduleActivityTask");
        };
        assert_eq!(activity_id, "activity2:v1");
        // dependent input carries the predecessor's result keyed by its id
        let input: Value = serde_json::from_str(input.as_deref().unwrap()).unwrap();
        assert_eq!(input["activity1:v1"], json!({"rows": 3}));
        assert!(!builder.is_terminate_workflow());
    }

    #[test]
    fn test_fan_out_schedules_each_ready_task_once() {
        let a = ActivityTask::new("a", "v1").with_id("a");
        let b = ActivityTask::new("b", "v1").with_id("b");
        let c = ActivityTask::new("c", "v1").with_id("c").with_requires(["a", "b"]);
        let d = ActivityTask::new("d", "v1").with_id("d").with_requires(["b"]);
        let graph =
            ExecutionGraph::from_tasks(vec![a.into(), b.into(), c.into(), d.into()]).unwrap();
        let mut builder = DecisionBuilder::new(graph, "windlass_activities");

        let history = history(vec![
            raw_event(1, "WorkflowExecutionStarted", json!({})),
            raw_event(2, "DecisionTaskStarted", json!({})),
            raw_event(3, "DecisionTaskCompleted", json!({"startedEventId": 2})),
            raw_event(4, "ActivityTaskScheduled", json!({"activityId": "a"})),
            raw_event(5, "ActivityTaskScheduled", json!({"activityId": "b"})),
            raw_event(6, "ActivityTaskCompleted", json!({"scheduledEventId": 4})),
            raw_event(7, "ActivityTaskCompleted", json!({"scheduledEventId": 5})),
            raw_event(8, "DecisionTaskStarted", json!({})),
        ]);

        let decisions = builder.decisions_for(&history).unwrap();
        let scheduled: Vec<&str> = decisions
            .iter()
            .map(|decision| match decision {
                Decision::ScheduleActivityTask { activity_id, .. } => activity_id.as_str(),
                other => panic!("expected ScheduleActivityTask, got {:?}", other),
            })
            .collect();
        assert_eq!(scheduled, vec!["c", "d"]);
    }

    #[test]
    fn test_tasks_to_be_scheduled_single_id() {
        let a = ActivityTask::new("a", "v1").with_id("a");
        let b = ActivityTask::new("b", "v1").with_id("b");
        let c = ActivityTask::new("c", "v1").with_id("c").with_requires(["a", "b"]);
        let d = ActivityTask::new("d", "v1").with_id("d").with_requires(["b"]);
        let graph =
            ExecutionGraph::from_tasks(vec![a.into(), b.into(), c.into(), d.into()]).unwrap();
        let builder = DecisionBuilder::new(graph, "windlass_activities");

        let history = history(vec![
            raw_event(4, "ActivityTaskScheduled", json!({"activityId": "a"})),
            raw_event(5, "ActivityTaskScheduled", json!({"activityId": "b"})),
            raw_event(6, "ActivityTaskCompleted", json!({"scheduledEventId": 4})),
            raw_event(7, "ActivityTaskCompleted", json!({"scheduledEventId": 5})),
        ]);

        let ready: Vec<&str> = builder
            .tasks_to_be_scheduled_single_id(&history, "a")
            .unwrap()
            .iter()
            .map(|task| task.id())
            .collect();
        assert_eq!(ready, vec!["c"]);

        let ready: Vec<&str> = builder
            .tasks_to_be_scheduled_single_id(&history, "b")
            .unwrap()
            .iter()
            .map(|task| task.id())
            .collect();
        assert_eq!(ready, vec!["c", "d"]);
    }

    #[test]
    fn test_completion_without_sink_result_carries_no_result() {
        // activity2 completed without a recorded result: the mapping is
        // absent, but the round still terminates.
        let mut builder = builder();
        let history = history(vec![
            raw_event(1, "WorkflowExecutionStarted", json!({})),
            raw_event(2, "DecisionTaskStarted", json!({})),
            raw_event(3, "DecisionTaskCompleted", json!({"startedEventId": 2})),
            raw_event(4, "ActivityTaskScheduled", json!({"activityId": "activity1:v1"})),
            raw_event(5, "ActivityTaskCompleted", json!({"scheduledEventId": 4})),
            raw_event(6, "DecisionTaskStarted", json!({})),
            raw_event(7, "DecisionTaskCompleted", json!({"startedEventId": 6})),
            raw_event(8, "ActivityTaskScheduled", json!({"activityId": "activity2:v1"})),
            raw_event(9, "ActivityTaskCompleted", json!({"scheduledEventId": 8})),
            raw_event(10, "DecisionTaskStarted", json!({})),
        ]);

        assert_eq!(builder.workflow_result(&history).unwrap(), None);

        let decisions = builder.decisions_for(&history).unwrap();
        assert_eq!(
            decisions,
            vec![Decision::CompleteWorkflowExecution { result: None }]
        );
        assert!(builder.is_terminate_workflow());
    }

    #[test]
    fn test_default_timeouts_apply_when_task_has_none() {
        let graph =
            ExecutionGraph::from_tasks(vec![ActivityTask::new("a", "v1").into()]).unwrap();
        let mut builder = DecisionBuilder::new(graph, "windlass_activities")
            .with_default_timeouts(ActivityTimeouts::new().with_start_to_close(30));

        let history = history(vec![
            raw_event(1, "WorkflowExecutionStarted", json!({})),
            raw_event(2, "DecisionTaskStarted", json!({})),
        ]);

        let decisions = builder.decisions_for(&history).unwrap();
        let Decision::ScheduleActivityTask { timeouts, .. } = &decisions[0] else {
            panic!("expected ScheduleActivityTask");
        };
        assert_eq!(timeouts.and_then(|t| t.start_to_close), Some(30));
    }

    #[test]
    fn test_empty_window_yields_no_decisions() {
        // A timer is still pending; the round has nothing to do.
        let mut builder = builder();
        let history = history(vec![
            raw_event(1, "WorkflowExecutionStarted", json!({})),
            raw_event(2, "DecisionTaskStarted", json!({})),
            raw_event(3, "DecisionTaskCompleted", json!({"startedEventId": 2})),
            raw_event(4, "DecisionTaskStarted", json!({})),
        ]);

        let decisions = builder.decisions_for(&history).unwrap();
        assert!(decisions.is_empty());
        assert!(!builder.is_terminate_workflow());
    }
}
