use crate::cancel::CancelToken;
use crate::domain::{AnalysisResult, GeneratedProject, GeneratedTask, Insights, STATUS_TODO};
use crate::error::StoreError;
use crate::store::{
    insert_positioned, row_id, Filter, RowStore, Schema, TABLE_PROJECTS, TABLE_SESSION_HISTORY,
    TABLE_TASKS, TABLE_TRANSCRIPTS,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{error, info, warn};

/// Local correlation key of a project within one generated batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BatchKey(usize);

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedProject {
    pub key: BatchKey,
    pub project: GeneratedProject,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedTask {
    pub project: BatchKey,
    pub task: GeneratedTask,
}

/// A generated batch with tasks linked to projects by key, not by name
#[derive(Debug, Clone, PartialEq)]
pub struct BatchPlan {
    pub projects: Vec<PlannedProject>,
    pub tasks: Vec<PlannedTask>,
    /// Tasks whose `project_name` matched no project in the batch
    pub unresolved: Vec<GeneratedTask>,
    pub insights: Insights,
}

impl BatchPlan {
    pub fn from_result(result: &AnalysisResult) -> Self {
        let mut projects: Vec<PlannedProject> = Vec::new();
        for project in &result.projects {
            if projects.iter().any(|p| p.project.name == project.name) {
                warn!(name = %project.name, "duplicate project in batch, keeping the first");
                continue;
            }
            projects.push(PlannedProject {
                key: BatchKey(projects.len()),
                project: project.clone(),
            });
        }

        let mut tasks = Vec::new();
        let mut unresolved = Vec::new();
        for task in &result.tasks {
            match resolve(&projects, &task.project_name) {
                Some(key) => tasks.push(PlannedTask {
                    project: key,
                    task: task.clone(),
                }),
                None => {
                    warn!(title = %task.title, project = %task.project_name, "task references unknown project");
                    unresolved.push(task.clone());
                }
            }
        }

        Self {
            projects,
            tasks,
            unresolved,
            insights: result.insights.clone(),
        }
    }

    pub fn tasks_for(&self, key: BatchKey) -> impl Iterator<Item = &PlannedTask> {
        self.tasks.iter().filter(move |t| t.project == key)
    }
}

/// Exact name first, then a trimmed case-insensitive match
fn resolve(projects: &[PlannedProject], name: &str) -> Option<BatchKey> {
    projects
        .iter()
        .find(|p| p.project.name == name)
        .or_else(|| {
            let wanted = name.trim().to_lowercase();
            projects
                .iter()
                .find(|p| p.project.name.trim().to_lowercase() == wanted)
        })
        .map(|p| p.key)
}

/// Ids created by a successfully applied batch
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchSummary {
    pub transcript_id: String,
    pub project_ids: Vec<String>,
    pub task_ids: Vec<String>,
    pub unresolved: usize,
}

/// Rows created so far, undone in reverse if the batch fails
#[derive(Debug, Default)]
pub struct CompensationLog {
    created: Vec<(&'static str, String)>,
}

impl CompensationLog {
    pub fn record(&mut self, table: &'static str, id: String) {
        self.created.push((table, id));
    }

    pub fn len(&self) -> usize {
        self.created.len()
    }

    pub fn is_empty(&self) -> bool {
        self.created.is_empty()
    }

    /// Delete every recorded row, newest first. Returns rows removed.
    pub fn rollback(self, store: &dyn RowStore) -> usize {
        let mut removed = 0;
        for (table, id) in self.created.into_iter().rev() {
            match store.delete(table, &[Filter::eq("id", id.clone())]) {
                Ok(()) => removed += 1,
                Err(e) => error!(table, id = %id, error = %e, "compensating delete failed"),
            }
        }
        removed
    }
}

fn check(cancel: &CancelToken) -> Result<(), StoreError> {
    if cancel.is_cancelled() {
        Err(StoreError::Cancelled)
    } else {
        Ok(())
    }
}

/// Persist a generated batch: transcript, projects, tasks, then history.
///
/// Projects get positions after `first_position`; tasks are numbered from
/// zero within their project. A failure or cancellation at any step deletes
/// everything written so far before the error is returned.
pub fn apply_batch(
    store: &dyn RowStore,
    user_id: &str,
    transcript: &str,
    plan: &BatchPlan,
    schema: &Schema,
    first_position: i64,
    cancel: &CancelToken,
) -> Result<BatchSummary, StoreError> {
    let mut log = CompensationLog::default();
    match write_batch(store, user_id, transcript, plan, schema, first_position, cancel, &mut log) {
        Ok(summary) => {
            info!(
                projects = summary.project_ids.len(),
                tasks = summary.task_ids.len(),
                unresolved = summary.unresolved,
                "batch applied"
            );
            Ok(summary)
        }
        Err(e) => {
            warn!(error = %e, written = log.len(), "batch failed, rolling back");
            let removed = log.rollback(store);
            info!(removed, "batch rolled back");
            Err(e)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn write_batch(
    store: &dyn RowStore,
    user_id: &str,
    transcript: &str,
    plan: &BatchPlan,
    schema: &Schema,
    first_position: i64,
    cancel: &CancelToken,
    log: &mut CompensationLog,
) -> Result<BatchSummary, StoreError> {
    check(cancel)?;
    let transcript_row = store.insert(
        TABLE_TRANSCRIPTS,
        json!({"user_id": user_id, "content": transcript}),
    )?;
    let transcript_id = row_id(&transcript_row)?;
    log.record(TABLE_TRANSCRIPTS, transcript_id.clone());

    let mut ids: HashMap<BatchKey, String> = HashMap::new();
    let mut summary = BatchSummary {
        transcript_id: transcript_id.clone(),
        unresolved: plan.unresolved.len(),
        ..Default::default()
    };

    for (offset, planned) in plan.projects.iter().enumerate() {
        check(cancel)?;
        let row = json!({
            "user_id": user_id,
            "name": planned.project.name,
            "description": planned.project.description,
            "status": planned.project.status.as_str(),
        });
        let inserted =
            insert_positioned(store, schema, TABLE_PROJECTS, row, first_position + offset as i64)?;
        let id = row_id(&inserted)?;
        log.record(TABLE_PROJECTS, id.clone());
        ids.insert(planned.key, id.clone());
        summary.project_ids.push(id);
    }

    for planned in &plan.projects {
        let Some(project_id) = ids.get(&planned.key) else {
            continue;
        };
        for (position, task) in plan.tasks_for(planned.key).enumerate() {
            check(cancel)?;
            let row = json!({
                "user_id": user_id,
                "project_id": project_id,
                "title": task.task.title,
                "description": task.task.description,
                "priority": task.task.priority.as_str(),
                "status": STATUS_TODO,
            });
            let inserted = insert_positioned(store, schema, TABLE_TASKS, row, position as i64)?;
            let id = row_id(&inserted)?;
            log.record(TABLE_TASKS, id.clone());
            summary.task_ids.push(id);
        }
    }

    check(cancel)?;
    let history = store.insert(
        TABLE_SESSION_HISTORY,
        json!({
            "user_id": user_id,
            "transcript_id": transcript_id,
            "insights": plan.insights,
            "projects_created": summary.project_ids.len(),
            "tasks_created": summary.task_ids.len(),
        }),
    )?;
    log.record(TABLE_SESSION_HISTORY, row_id(&history)?);

    Ok(summary)
}
