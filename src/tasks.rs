//! Suggested-task operations and fan-out
//!
//! The suggestion job turns recent session context into actionable task
//! records with one gateway call. Every insert flows through the store's
//! watch channel into the fan-out listener, which batches bursts and
//! announces them to both hub channels.

use chrono::Utc;
use log::{error, info, warn};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

use crate::constants::TASK_SYNC_LIMIT;
use crate::error::{GatewayError, TaskError};
use crate::events::{DashboardEvent, ExtensionEvent};
use crate::gateway::{CapabilityGateway, ResponseFormat, TextResult};
use crate::hub::BroadcastHub;
use crate::models::{SuggestedTask, TaskStatus, WorkspaceService};
use crate::store::RecordStore;

/// Bursts of inserts within this window are announced as one batch
const FANOUT_DEBOUNCE: Duration = Duration::from_millis(250);

/// How many recent sessions feed the suggestion prompt
const SUGGESTION_CONTEXT_SESSIONS: u64 = 5;

/// Upper bound on the dashboard's TASKS_UPDATED list
const DASHBOARD_TASK_LIMIT: u64 = 100;

const SUGGEST_SYSTEM_PROMPT: &str = "You suggest concrete follow-up tasks from \
a user's recent browsing and recording activity. Respond with a JSON array of \
task objects: title (string), description (string), and optionally service \
(one of gmail, calendar, tasks, docs, drive, sheets), action (string) and \
params (object). Only include service/action/params when the task maps to a \
real integration. Suggest at most five tasks.";

pub struct TaskService {
    gateway: Arc<dyn CapabilityGateway>,
    store: RecordStore,
    hub: Arc<BroadcastHub>,
}

impl TaskService {
    pub fn new(
        gateway: Arc<dyn CapabilityGateway>,
        store: RecordStore,
        hub: Arc<BroadcastHub>,
    ) -> Self {
        TaskService {
            gateway,
            store,
            hub,
        }
    }

    /// Generate and persist task suggestions from recent activity plus the
    /// caller-provided context. Returns the persisted records with their
    /// durable ids; announcement happens via the fan-out listener.
    pub async fn suggest(
        &self,
        context: &str,
        source_context: Option<&str>,
    ) -> Result<Vec<SuggestedTask>, TaskError> {
        let prompt = self.build_suggestion_prompt(context).await;
        let response = self
            .gateway
            .ask_text(&prompt, Some(SUGGEST_SYSTEM_PROMPT), ResponseFormat::Json, &[])
            .await?;

        let items = match response {
            TextResult::Structured(value) => extract_task_array(value),
            TextResult::Raw(_) => {
                return Err(TaskError::Gateway(GatewayError::MalformedResponse(
                    "suggestion response was not JSON".to_string(),
                )))
            }
        };

        let mut persisted = Vec::new();
        for item in items {
            let mut task = match parse_suggested_task(&item, source_context) {
                Some(task) => task,
                None => {
                    warn!("Skipping suggestion without a title: {}", item);
                    continue;
                }
            };
            task.validate()?;
            let durable_id = self.store.insert_task(&task).await?;
            task.id = durable_id;
            persisted.push(task);
        }
        info!("Persisted {} suggested tasks", persisted.len());
        Ok(persisted)
    }

    /// Apply a status change through the transition table, then tell
    /// dashboards the list changed.
    /// The write is a conditional claim keyed on the status that passed
    /// the table check, so a concurrent writer cannot slip a forbidden
    /// transition in between the read and the write.
    pub async fn update_status(
        &self,
        id: &str,
        next: TaskStatus,
    ) -> Result<SuggestedTask, TaskError> {
        let mut task = self
            .store
            .find_task(id)
            .await?
            .ok_or_else(|| TaskError::Store(crate::error::StoreError::NotFound(id.to_string())))?;
        let from = task.status;
        if !from.can_transition_to(next) {
            return Err(TaskError::InvalidTransition { from, to: next });
        }
        if !self.store.claim_task_status(id, from, next).await? {
            // Lost the race: the row no longer holds the status we checked
            return Err(TaskError::InvalidTransition { from, to: next });
        }
        task.status = next;
        self.broadcast_dashboard_list().await;
        Ok(task)
    }

    /// Delete a task and tell dashboards the list changed
    pub async fn delete(&self, id: &str) -> Result<bool, TaskError> {
        let deleted = self.store.delete_task(id).await?;
        if deleted {
            self.broadcast_dashboard_list().await;
        }
        Ok(deleted)
    }

    /// Execute a task's Workspace action.
    /// pending -> in_progress -> completed on success; a failed action
    /// resets the task to pending so it can be retried.
    pub async fn execute(&self, id: &str) -> Result<Value, TaskError> {
        let task = self
            .store
            .find_task(id)
            .await?
            .ok_or_else(|| TaskError::Store(crate::error::StoreError::NotFound(id.to_string())))?;

        let (service, action) = match (task.service, task.action.as_deref()) {
            (Some(service), Some(action)) => (service, action),
            _ => {
                return Err(TaskError::InvalidTask(
                    "task has no executable action".to_string(),
                ))
            }
        };
        if !task.status.can_transition_to(TaskStatus::InProgress) {
            return Err(TaskError::InvalidTransition {
                from: task.status,
                to: TaskStatus::InProgress,
            });
        }

        // Conditional claim: of two concurrent execute calls, exactly one
        // moves the row to in_progress and runs the action
        if !self
            .store
            .claim_task_status(id, task.status, TaskStatus::InProgress)
            .await?
        {
            return Err(TaskError::InvalidTransition {
                from: task.status,
                to: TaskStatus::InProgress,
            });
        }
        let params = task.params.clone().unwrap_or(Value::Object(Default::default()));

        match self.gateway.execute_action(service, action, &params).await {
            Ok(result) => {
                if !self
                    .store
                    .claim_task_status(id, TaskStatus::InProgress, TaskStatus::Completed)
                    .await?
                {
                    error!("Task {} left in_progress during execution", id);
                }
                self.broadcast_dashboard_list().await;
                Ok(result)
            }
            Err(e) => {
                // Compensating reset, not a table transition: the action
                // never ran so the task goes back to the queue
                match self
                    .store
                    .claim_task_status(id, TaskStatus::InProgress, TaskStatus::Pending)
                    .await
                {
                    Ok(true) => {}
                    Ok(false) => error!("Task {} left in_progress during execution", id),
                    Err(reset) => error!("Failed to reset task {} to pending: {}", id, reset),
                }
                self.broadcast_dashboard_list().await;
                Err(TaskError::Gateway(e))
            }
        }
    }

    async fn build_suggestion_prompt(&self, context: &str) -> String {
        let mut prompt = String::from("Recent sessions:\n");
        match self.store.list_sessions(SUGGESTION_CONTEXT_SESSIONS).await {
            Ok(sessions) if !sessions.is_empty() => {
                for session in &sessions {
                    prompt.push_str(&format!(
                        "- {} ({}): {}\n",
                        session.title, session.source_url, session.summary.tldr
                    ));
                }
            }
            Ok(_) => prompt.push_str("(none)\n"),
            Err(e) => {
                warn!("Could not load recent sessions for suggestions: {}", e);
                prompt.push_str("(unavailable)\n");
            }
        }
        if !context.trim().is_empty() {
            prompt.push_str("\nCurrent context:\n");
            prompt.push_str(context);
        }
        prompt
    }

    async fn broadcast_dashboard_list(&self) {
        match self.store.list_tasks(None, DASHBOARD_TASK_LIMIT).await {
            Ok(tasks) => {
                self.hub
                    .broadcast_dashboard(&DashboardEvent::TasksUpdated { tasks });
            }
            Err(e) => error!("Could not load task list for broadcast: {}", e),
        }
    }
}

/// Accept either a bare array or an object wrapping one under "tasks"
fn extract_task_array(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("tasks") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// Build a pending task from one suggestion object.
/// An unknown service drops the whole integration triple so the shape
/// invariant (action/params require service) keeps holding.
fn parse_suggested_task(item: &Value, source_context: Option<&str>) -> Option<SuggestedTask> {
    let title = item.get("title")?.as_str()?.trim();
    if title.is_empty() {
        return None;
    }
    let description = item
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let service = item
        .get("service")
        .and_then(Value::as_str)
        .and_then(WorkspaceService::parse);
    let (action, params) = match service {
        Some(_) => (
            item.get("action")
                .and_then(Value::as_str)
                .map(str::to_string),
            item.get("params").filter(|p| p.is_object()).cloned(),
        ),
        None => (None, None),
    };

    Some(SuggestedTask {
        id: String::new(),
        title: title.to_string(),
        description,
        service,
        action,
        params,
        status: TaskStatus::Pending,
        created_at: Utc::now(),
        source_context: source_context.map(str::to_string),
    })
}

/// Background listener driving task announcements.
///
/// Subscribes to the store's insert watch so every insert path fans out,
/// not only the suggestion endpoint. Bursts are debounced into one
/// announcement. Runs until the store (and its channel) is dropped.
pub async fn run_task_fanout(store: RecordStore, hub: Arc<BroadcastHub>) {
    let mut inserts = store.watch_task_inserts();
    loop {
        match inserts.recv().await {
            Ok(_first) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!("Task fan-out lagged, {} inserts coalesced", skipped);
            }
            Err(RecvError::Closed) => return,
        }

        // Drain the burst before announcing
        loop {
            match tokio::time::timeout(FANOUT_DEBOUNCE, inserts.recv()).await {
                Ok(Ok(_)) => continue,
                Ok(Err(RecvError::Lagged(_))) => continue,
                Ok(Err(RecvError::Closed)) | Err(_) => break,
            }
        }

        announce_tasks(&store, &hub).await;
    }
}

/// Push the current task state to both channels: dashboards get the full
/// list, extensions get the bounded non-terminal subset
pub async fn announce_tasks(store: &RecordStore, hub: &BroadcastHub) {
    match store.list_tasks(None, DASHBOARD_TASK_LIMIT).await {
        Ok(tasks) => {
            hub.broadcast_dashboard(&DashboardEvent::TasksUpdated { tasks });
        }
        Err(e) => error!("Task fan-out could not load the dashboard list: {}", e),
    }
    match store.list_open_tasks(TASK_SYNC_LIMIT).await {
        Ok(tasks) => {
            hub.broadcast_extension(&ExtensionEvent::SyncedTasks { tasks });
        }
        Err(e) => error!("Task fan-out could not load the extension subset: {}", e),
    }
}
