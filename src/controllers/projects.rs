use super::ops::{
    temp_id, IdMap, OpKind, OpLog, OpOutcome, RemoteCall, RemoteWorker, Reply, Settled,
    WorkerEvent,
};
use super::reorder::{move_across, move_within, position_updates};
use super::undo::UndoSlot;
use crate::cancel::{CancelOnDrop, CancelToken};
use crate::domain::{
    assemble_projects, palette_color, Project, ProjectRow, ProjectStatus, Step, TaskRow,
    STATUS_DONE, STATUS_TODO,
};
use crate::error::StoreError;
use crate::store::{
    decode_rows, insert_positioned, row_id, select_ordered, write_positions, Filter, Query,
    RowStore, Schema, POSITION_COLUMN, TABLE_PROJECTS, TABLE_TASKS,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Something removed from the list that can still be brought back
#[derive(Debug, Clone, PartialEq)]
pub enum Removed {
    Project(Project),
    Step(Step),
}

/// Where an item sits in the project list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Project(usize),
    Step { project: usize, index: usize },
}

/// One visible row of the flattened project list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlatRow {
    pub project: usize,
    pub step: Option<usize>,
}

impl From<FlatRow> for Location {
    fn from(row: FlatRow) -> Self {
        match row.step {
            Some(index) => Location::Step {
                project: row.project,
                index,
            },
            None => Location::Project(row.project),
        }
    }
}

#[derive(Debug)]
struct DragState {
    origin: Location,
    current: Location,
    /// Owning project id of a dragged step, at pick-up time
    origin_parent: Option<String>,
    snapshot: Vec<Project>,
}

/// Local change waiting on its remote call; undone if the call fails
enum Effect {
    CreateProject { local_id: String, index: usize },
    RenameProject { id: String, previous: String },
    DeleteProject { project: Project, index: usize, at: Instant },
    CreateStep { local_id: String, position: usize },
    RenameStep { id: String, previous: String },
    ToggleStep { id: String, done: bool },
    DeleteStep { step: Step, index: usize, parent: String, at: Instant },
    RestoreProject { local_id: String, step_ids: Vec<String> },
    RestoreStep { local_id: String },
    Reorder { snapshot: Vec<Project>, origin: Location },
}

struct Pending {
    kind: OpKind,
    token: CancelToken,
    effect: Effect,
}

/// Optimistic mirror of the user's projects and their steps.
///
/// Mutations change local state and return at once; the remote write runs
/// on a worker and `poll` folds its result back in, undoing the local
/// change if the write failed.
pub struct ProjectsController {
    store: Arc<dyn RowStore>,
    schema: Arc<Schema>,
    user_id: Option<String>,
    pub projects: Vec<Project>,
    pub selected_index: usize,
    drag: Option<DragState>,
    pub undo: UndoSlot<Removed>,
    pub ops: OpLog,
    worker: RemoteWorker,
    pending: HashMap<u64, Pending>,
    /// Temp ids handed out before a create landed, and their stored ids
    aliases: HashMap<String, String>,
    lifetime: CancelOnDrop,
}

impl ProjectsController {
    pub fn new(store: Arc<dyn RowStore>, schema: Arc<Schema>) -> Self {
        let worker = RemoteWorker::spawn(Arc::clone(&store), Arc::clone(&schema));
        Self {
            store,
            schema,
            user_id: None,
            projects: Vec::new(),
            selected_index: 0,
            drag: None,
            undo: UndoSlot::new(),
            ops: OpLog::new(),
            worker,
            pending: HashMap::new(),
            aliases: HashMap::new(),
            lifetime: CancelOnDrop::new(),
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Switch owner. Local state of the previous user is dropped and its
    /// outstanding writes are discarded.
    pub fn set_user(&mut self, user_id: Option<String>) {
        if self.user_id == user_id {
            return;
        }
        self.user_id = user_id;
        self.projects.clear();
        self.selected_index = 0;
        self.drag = None;
        self.undo.clear();
        self.pending.clear();
        self.aliases.clear();
        self.lifetime.reset();
    }

    /// Replace local state with the user's rows, ordered by position
    pub fn load(&mut self) -> Result<(), StoreError> {
        let Some(user_id) = self.user_id.clone() else {
            self.projects.clear();
            return Ok(());
        };
        let project_rows = select_ordered(
            self.store.as_ref(),
            Query::table(TABLE_PROJECTS)
                .eq("user_id", user_id.clone())
                .order_by(POSITION_COLUMN, true),
            &self.schema,
        )?;
        let task_rows = select_ordered(
            self.store.as_ref(),
            Query::table(TABLE_TASKS)
                .eq("user_id", user_id)
                .order_by(POSITION_COLUMN, true),
            &self.schema,
        )?;
        let projects: Vec<ProjectRow> = decode_rows(project_rows)?;
        let tasks: Vec<TaskRow> = decode_rows(task_rows)?;
        self.projects = assemble_projects(projects, tasks);
        self.drag = None;
        self.clamp_selection();
        info!(projects = self.projects.len(), "projects loaded");
        Ok(())
    }

    /// True when no remote write is outstanding
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }

    /// Log an operation and hand its remote call to the worker
    fn queue(&mut self, kind: OpKind, target: &str, effect: Effect, call: RemoteCall) -> bool {
        let op = self.ops.begin(kind, target);
        let token = self.lifetime.token();
        if !self.worker.submit(op, token.clone(), call) {
            warn!(op, ?kind, "remote worker gone, change not saved");
            self.ops.settle(
                op,
                OpOutcome::Reverted {
                    reason: "background worker stopped".to_string(),
                },
            );
            self.revert(effect);
            return false;
        }
        self.pending.insert(op, Pending { kind, token, effect });
        true
    }

    /// Fold finished remote writes into local state
    pub fn poll(&mut self) -> Vec<Settled> {
        let mut settled = Vec::new();
        while let Some(event) = self.worker.try_next() {
            let (op, result) = match event {
                WorkerEvent::Retrying { op, attempt } => {
                    self.ops.settle(op, OpOutcome::Retrying { attempt });
                    continue;
                }
                WorkerEvent::Finished { op, result } => (op, result),
            };
            let Some(pending) = self.pending.remove(&op) else {
                self.ops.settle(op, OpOutcome::Discarded);
                continue;
            };
            if pending.token.is_cancelled() {
                debug!(op, "owner changed, result discarded");
                self.ops.settle(op, OpOutcome::Discarded);
                continue;
            }

            let outcome = OpOutcome::of(&result);
            self.ops.settle(op, outcome.clone());
            match result {
                Ok(reply) => self.apply(pending.effect, reply),
                Err(e) => {
                    warn!(op, kind = ?pending.kind, error = %e, "change reverted");
                    self.revert(pending.effect);
                }
            }
            settled.push(Settled {
                kind: pending.kind,
                outcome,
            });
        }
        settled
    }

    fn apply(&mut self, effect: Effect, reply: Reply) {
        let positioned = self.schema.writes_positions();
        match (effect, reply) {
            (Effect::CreateProject { local_id, index }, Reply::Created(id)) => {
                if let Some(pi) = self.project_index(&local_id) {
                    self.projects[pi].id = id.clone();
                    self.projects[pi].position = positioned.then_some(index as i64);
                }
                self.aliases.insert(local_id, id);
            }
            (Effect::CreateStep { local_id, position }, Reply::Created(id)) => {
                if let Some((pi, si)) = self.find_step(&local_id) {
                    let step = &mut self.projects[pi].steps[si];
                    step.id = id.clone();
                    step.position = positioned.then_some(position as i64);
                }
                self.aliases.insert(local_id, id);
            }
            (Effect::RestoreStep { local_id }, Reply::Created(id)) => {
                if let Some((pi, si)) = self.find_step(&local_id) {
                    self.projects[pi].steps[si].id = id.clone();
                }
                self.aliases.insert(local_id, id);
            }
            (Effect::RestoreProject { local_id, step_ids }, Reply::Restored { project, steps }) => {
                for (local, stored) in step_ids.iter().zip(&steps) {
                    if let Some((pi, si)) = self.find_step(local) {
                        self.projects[pi].steps[si].id = stored.clone();
                    }
                    self.aliases.insert(local.clone(), stored.clone());
                }
                if let Some(pi) = self.project_index(&local_id) {
                    self.projects[pi].id = project.clone();
                }
                self.aliases.insert(local_id, project);
                info!("project restored");
            }
            (Effect::DeleteProject { project, index, at }, _) => {
                self.undo.put(Removed::Project(project), index, None, at);
            }
            (Effect::DeleteStep { step, index, parent, at }, _) => {
                let parent = self.canonical(&parent).to_string();
                self.undo.put(Removed::Step(step), index, Some(parent), at);
            }
            (Effect::Reorder { .. }, _) => self.refresh_positions(),
            _ => {}
        }
    }

    /// Undo the local half of a change whose remote write failed
    fn revert(&mut self, effect: Effect) {
        match effect {
            Effect::CreateProject { local_id, .. } | Effect::RestoreProject { local_id, .. } => {
                if let Some(pi) = self.project_index(&local_id) {
                    self.projects.remove(pi);
                }
            }
            Effect::RenameProject { id, previous } => {
                if let Some(pi) = self.project_index(&id) {
                    self.projects[pi].title = previous;
                }
            }
            Effect::DeleteProject { project, index, .. } => {
                let at = index.min(self.projects.len());
                self.projects.insert(at, project);
            }
            Effect::CreateStep { local_id, .. } | Effect::RestoreStep { local_id } => {
                if let Some((pi, si)) = self.find_step(&local_id) {
                    self.projects[pi].steps.remove(si);
                }
            }
            Effect::RenameStep { id, previous } => {
                if let Some((pi, si)) = self.find_step(&id) {
                    self.projects[pi].steps[si].title = previous;
                }
            }
            Effect::ToggleStep { id, done } => {
                if let Some((pi, si)) = self.find_step(&id) {
                    self.projects[pi].steps[si].done = !done;
                }
            }
            Effect::DeleteStep { step, index, parent, .. } => {
                if let Some(pi) = self.project_index(&parent) {
                    let steps = &mut self.projects[pi].steps;
                    let at = index.min(steps.len());
                    steps.insert(at, step);
                }
            }
            Effect::Reorder { snapshot, origin } => {
                self.projects = snapshot;
                self.adopt_stored_ids();
                if let Some(flat) = self.flat_index_of(origin) {
                    self.selected_index = flat;
                }
            }
        }
        self.clamp_selection();
    }

    /// The id a row is known by now; temp ids map to their stored id once known
    fn canonical<'a>(&'a self, id: &'a str) -> &'a str {
        self.aliases.get(id).map(String::as_str).unwrap_or(id)
    }

    /// Swap temp ids left in a restored snapshot for their stored ids
    fn adopt_stored_ids(&mut self) {
        let aliases = &self.aliases;
        for project in &mut self.projects {
            if let Some(stored) = aliases.get(&project.id) {
                project.id = stored.clone();
            }
            for step in &mut project.steps {
                if let Some(stored) = aliases.get(&step.id) {
                    step.id = stored.clone();
                }
            }
        }
    }

    fn require_user(&self) -> Option<String> {
        if self.user_id.is_none() {
            warn!("mutation ignored, no signed-in user");
        }
        self.user_id.clone()
    }

    fn project_index(&self, id: &str) -> Option<usize> {
        let id = self.canonical(id);
        self.projects.iter().position(|p| p.id == id)
    }

    /// (project index, step index) of a step
    pub fn find_step(&self, step_id: &str) -> Option<(usize, usize)> {
        let step_id = self.canonical(step_id);
        self.projects
            .iter()
            .enumerate()
            .find_map(|(pi, p)| p.step_index(step_id).map(|si| (pi, si)))
    }

    pub fn step_count(&self) -> usize {
        self.projects.iter().map(|p| p.steps.len()).sum()
    }

    // Projects

    /// Add a project at the end of the list. Returns its local id.
    pub fn create_project(&mut self, title: &str) -> Option<String> {
        let title = title.trim();
        if title.is_empty() {
            debug!("empty project title rejected");
            return None;
        }
        let user_id = self.require_user()?;

        let index = self.projects.len();
        let local_id = temp_id();
        self.projects.push(Project::new(
            local_id.clone(),
            title.to_string(),
            palette_color(index),
        ));

        let row = json!({
            "user_id": user_id,
            "name": title,
            "status": ProjectStatus::Active.as_str(),
        });
        let local = local_id.clone();
        let call: RemoteCall = Box::new(move |store, schema, ids| {
            let stored = insert_positioned(store, schema, TABLE_PROJECTS, row.clone(), index as i64)?;
            let id = row_id(&stored)?;
            ids.record(&local, &id);
            Ok(Reply::Created(id))
        });
        let effect = Effect::CreateProject {
            local_id: local_id.clone(),
            index,
        };
        self.queue(OpKind::CreateProject, &local_id, effect, call)
            .then_some(local_id)
    }

    pub fn rename_project(&mut self, id: &str, title: &str) -> bool {
        let title = title.trim();
        if title.is_empty() {
            return false;
        }
        let Some(index) = self.project_index(id) else {
            return false;
        };
        let previous = std::mem::replace(&mut self.projects[index].title, title.to_string());
        let id = self.projects[index].id.clone();

        let patch = json!({ "name": title });
        let target = id.clone();
        let call: RemoteCall = Box::new(move |store, _, ids| {
            store.update(TABLE_PROJECTS, &[Filter::eq("id", ids.resolve(&target)?)], patch.clone())?;
            Ok(Reply::Done)
        });
        self.queue(
            OpKind::RenameProject,
            &id.clone(),
            Effect::RenameProject { id, previous },
            call,
        )
    }

    /// Remove a project; its steps go with it remotely. The undo record is
    /// kept once the delete has landed.
    pub fn delete_project(&mut self, id: &str, now: Instant) -> bool {
        let Some(index) = self.project_index(id) else {
            return false;
        };
        let project = self.projects.remove(index);
        self.clamp_selection();

        let target = project.id.clone();
        let call: RemoteCall = Box::new(move |store, _, ids| {
            store.delete(TABLE_PROJECTS, &[Filter::eq("id", ids.resolve(&target)?)])?;
            Ok(Reply::Done)
        });
        let id = project.id.clone();
        let effect = Effect::DeleteProject {
            project,
            index,
            at: now,
        };
        self.queue(OpKind::DeleteProject, &id, effect, call)
    }

    // Steps

    /// Append a step to a project. Returns its local id.
    pub fn create_step(&mut self, project_id: &str, title: &str) -> Option<String> {
        let title = title.trim();
        if title.is_empty() {
            debug!("empty step title rejected");
            return None;
        }
        let user_id = self.require_user()?;
        let project_index = self.project_index(project_id)?;

        let parent = self.projects[project_index].id.clone();
        let position = self.projects[project_index].steps.len();
        let local_id = temp_id();
        self.projects[project_index]
            .steps
            .push(Step::new(local_id.clone(), title.to_string()));

        let row = json!({
            "user_id": user_id,
            "title": title,
            "status": STATUS_TODO,
        });
        let local = local_id.clone();
        let call: RemoteCall = Box::new(move |store, schema, ids| {
            let mut row = row.clone();
            row["project_id"] = json!(ids.resolve(&parent)?);
            let stored = insert_positioned(store, schema, TABLE_TASKS, row, position as i64)?;
            let id = row_id(&stored)?;
            ids.record(&local, &id);
            Ok(Reply::Created(id))
        });
        let effect = Effect::CreateStep {
            local_id: local_id.clone(),
            position,
        };
        self.queue(OpKind::CreateStep, &local_id, effect, call)
            .then_some(local_id)
    }

    pub fn rename_step(&mut self, step_id: &str, title: &str) -> bool {
        let title = title.trim();
        if title.is_empty() {
            return false;
        }
        let Some((pi, si)) = self.find_step(step_id) else {
            return false;
        };
        let previous = std::mem::replace(&mut self.projects[pi].steps[si].title, title.to_string());
        let id = self.projects[pi].steps[si].id.clone();

        let patch = json!({ "title": title });
        let target = id.clone();
        let call: RemoteCall = Box::new(move |store, _, ids| {
            store.update(TABLE_TASKS, &[Filter::eq("id", ids.resolve(&target)?)], patch.clone())?;
            Ok(Reply::Done)
        });
        self.queue(
            OpKind::RenameStep,
            &id.clone(),
            Effect::RenameStep { id, previous },
            call,
        )
    }

    pub fn toggle_step_done(&mut self, step_id: &str) -> bool {
        let Some((pi, si)) = self.find_step(step_id) else {
            return false;
        };
        let step = &mut self.projects[pi].steps[si];
        let done = !step.done;
        step.done = done;
        let id = step.id.clone();

        let patch = json!({ "status": if done { STATUS_DONE } else { STATUS_TODO } });
        let target = id.clone();
        let call: RemoteCall = Box::new(move |store, _, ids| {
            store.update(TABLE_TASKS, &[Filter::eq("id", ids.resolve(&target)?)], patch.clone())?;
            Ok(Reply::Done)
        });
        self.queue(
            OpKind::ToggleStep,
            &id.clone(),
            Effect::ToggleStep { id, done },
            call,
        )
    }

    pub fn delete_step(&mut self, step_id: &str, now: Instant) -> bool {
        let Some((pi, si)) = self.find_step(step_id) else {
            return false;
        };
        let parent = self.projects[pi].id.clone();
        let step = self.projects[pi].steps.remove(si);
        self.clamp_selection();

        let target = step.id.clone();
        let call: RemoteCall = Box::new(move |store, _, ids| {
            store.delete(TABLE_TASKS, &[Filter::eq("id", ids.resolve(&target)?)])?;
            Ok(Reply::Done)
        });
        let id = step.id.clone();
        let effect = Effect::DeleteStep {
            step,
            index: si,
            parent,
            at: now,
        };
        self.queue(OpKind::DeleteStep, &id, effect, call)
    }

    // Undo

    /// Bring back the last deleted item, once, inside the undo window.
    ///
    /// The item is stored again under a new id and reinserted at its
    /// recorded index.
    pub fn undo_delete(&mut self, now: Instant) -> bool {
        let Some(record) = self.undo.take(now) else {
            return false;
        };
        match record.item {
            Removed::Project(project) => self.restore_project(project, record.index),
            Removed::Step(step) => match record.parent {
                Some(parent) => self.restore_step(step, record.index, &parent),
                None => false,
            },
        }
    }

    fn restore_project(&mut self, project: Project, index: usize) -> bool {
        let Some(user_id) = self.require_user() else {
            return false;
        };
        let at = index.min(self.projects.len());
        let local_id = temp_id();
        let mut local = project.clone();
        local.id = local_id.clone();
        for step in &mut local.steps {
            step.id = temp_id();
        }
        let step_ids: Vec<String> = local.steps.iter().map(|s| s.id.clone()).collect();
        self.projects.insert(at, local);

        let locals = (local_id.clone(), step_ids.clone());
        let call: RemoteCall = Box::new(move |store, schema, ids| {
            let (project_id, steps) = recreate_project(store, schema, &user_id, &project, at as i64)?;
            ids.record(&locals.0, &project_id);
            for (local, stored) in locals.1.iter().zip(&steps) {
                ids.record(local, stored);
            }
            Ok(Reply::Restored {
                project: project_id,
                steps,
            })
        });
        let effect = Effect::RestoreProject {
            local_id: local_id.clone(),
            step_ids,
        };
        self.queue(OpKind::RestoreProject, &local_id, effect, call)
    }

    fn restore_step(&mut self, step: Step, index: usize, parent: &str) -> bool {
        let Some(user_id) = self.require_user() else {
            return false;
        };
        let Some(pi) = self.project_index(parent) else {
            warn!(project = parent, "owning project is gone, step not restored");
            return false;
        };
        let parent = self.projects[pi].id.clone();
        let at = index.min(self.projects[pi].steps.len());
        let local_id = temp_id();
        let mut local = step.clone();
        local.id = local_id.clone();
        self.projects[pi].steps.insert(at, local);

        let local = local_id.clone();
        let call: RemoteCall = Box::new(move |store, schema, ids| {
            let row = step_row(&user_id, &ids.resolve(&parent)?, &step);
            let id = row_id(&insert_positioned(store, schema, TABLE_TASKS, row, at as i64)?)?;
            ids.record(&local, &id);
            Ok(Reply::Created(id))
        });
        let effect = Effect::RestoreStep {
            local_id: local_id.clone(),
        };
        self.queue(OpKind::RestoreStep, &local_id, effect, call)
    }

    /// Drop the undo record once its window has passed
    pub fn tick(&mut self, now: Instant) {
        if self.undo.expire(now) {
            debug!("undo window closed");
        }
    }

    // Reordering

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    /// Pick up the selected row
    pub fn begin_drag(&mut self) -> bool {
        let Some(row) = self.get_selected() else {
            return false;
        };
        let origin = Location::from(row);
        let origin_parent = row.step.map(|_| self.projects[row.project].id.clone());
        self.drag = Some(DragState {
            origin,
            current: origin,
            origin_parent,
            snapshot: self.projects.clone(),
        });
        true
    }

    /// Move the dragged item to `target`, locally only
    pub fn drag_to(&mut self, target: Location) -> bool {
        let Some(current) = self.drag.as_ref().map(|d| d.current) else {
            return false;
        };
        let moved = match (current, target) {
            (Location::Project(from), Location::Project(to)) => {
                move_within(&mut self.projects, from, to)
            }
            (
                Location::Step { project: p, index: from },
                Location::Step { project: q, index: to },
            ) if p == q => match self.projects.get_mut(p) {
                Some(project) => move_within(&mut project.steps, from, to),
                None => false,
            },
            (
                Location::Step { project: p, index: from },
                Location::Step { project: q, index: to },
            ) => match pair_mut(&mut self.projects, p, q) {
                Some((src, dst)) => move_across(&mut src.steps, &mut dst.steps, from, to),
                None => false,
            },
            _ => false,
        };
        if !moved {
            return false;
        }

        let landed = match target {
            Location::Step { project, index } => Location::Step {
                project,
                index: index.min(self.projects[project].steps.len().saturating_sub(1)),
            },
            other => other,
        };
        if let Some(drag) = self.drag.as_mut() {
            drag.current = landed;
        }
        if let Some(flat) = self.flat_index_of(landed) {
            self.selected_index = flat;
        }
        true
    }

    /// Move the dragged item one row up (`-1`) or down (`+1`)
    pub fn drag_by(&mut self, delta: i32) -> bool {
        let Some(current) = self.drag.as_ref().map(|d| d.current) else {
            return false;
        };
        let target = match current {
            Location::Project(i) => {
                let j = i as i64 + delta as i64;
                if j < 0 || j >= self.projects.len() as i64 {
                    return false;
                }
                Location::Project(j as usize)
            }
            Location::Step { project, index } => {
                let len = self.projects[project].steps.len();
                if delta < 0 && index > 0 {
                    Location::Step { project, index: index - 1 }
                } else if delta < 0 && project > 0 {
                    let above = project - 1;
                    Location::Step {
                        project: above,
                        index: self.projects[above].steps.len(),
                    }
                } else if delta > 0 && index + 1 < len {
                    Location::Step { project, index: index + 1 }
                } else if delta > 0 && project + 1 < self.projects.len() {
                    Location::Step { project: project + 1, index: 0 }
                } else {
                    return false;
                }
            }
        };
        self.drag_to(target)
    }

    /// Drop the dragged item and queue one write of every affected list
    pub fn end_drag(&mut self) -> bool {
        let Some(drag) = self.drag.take() else {
            return false;
        };
        if drag.origin == drag.current {
            return true;
        }

        let (target, call): (String, RemoteCall) = match drag.current {
            Location::Project(_) => {
                let updates = position_updates(&self.projects, |p| p.id.as_str());
                let call: RemoteCall = Box::new(move |store, schema, ids| {
                    write_positions(store, schema, TABLE_PROJECTS, &resolve_updates(ids, &updates)?)?;
                    Ok(Reply::Done)
                });
                ("projects".to_string(), call)
            }
            Location::Step { project, index } => {
                let destination = &self.projects[project];
                let moved_id = destination.steps[index].id.clone();
                let destination_id = destination.id.clone();
                let crossed = drag
                    .origin_parent
                    .as_deref()
                    .map(|id| self.canonical(id) != self.canonical(&destination_id))
                    .unwrap_or(true);

                let mut lists = vec![position_updates(&destination.steps, |s| s.id.as_str())];
                if crossed {
                    if let Some(source) = drag
                        .origin_parent
                        .as_deref()
                        .and_then(|id| self.project_index(id))
                        .map(|pi| &self.projects[pi])
                    {
                        lists.insert(0, position_updates(&source.steps, |s| s.id.as_str()));
                    }
                }

                let moved = moved_id.clone();
                let call: RemoteCall = Box::new(move |store, schema, ids| {
                    if crossed {
                        store.update(
                            TABLE_TASKS,
                            &[Filter::eq("id", ids.resolve(&moved)?)],
                            json!({ "project_id": ids.resolve(&destination_id)? }),
                        )?;
                    }
                    for updates in &lists {
                        write_positions(store, schema, TABLE_TASKS, &resolve_updates(ids, updates)?)?;
                    }
                    Ok(Reply::Done)
                });
                (moved_id, call)
            }
        };

        let effect = Effect::Reorder {
            snapshot: drag.snapshot,
            origin: drag.origin,
        };
        self.queue(OpKind::Reorder, &target, effect, call)
    }

    /// Put the dragged item back where it was picked up
    pub fn cancel_drag(&mut self) {
        if let Some(drag) = self.drag.take() {
            self.projects = drag.snapshot;
            self.adopt_stored_ids();
            if let Some(flat) = self.flat_index_of(drag.origin) {
                self.selected_index = flat;
            }
        }
    }

    fn refresh_positions(&mut self) {
        if !self.schema.writes_positions() {
            return;
        }
        for (pi, project) in self.projects.iter_mut().enumerate() {
            project.position = Some(pi as i64);
            for (si, step) in project.steps.iter_mut().enumerate() {
                step.position = Some(si as i64);
            }
        }
    }

    // Selection

    /// Projects followed by their steps, in display order
    pub fn flat_rows(&self) -> Vec<FlatRow> {
        let mut rows = Vec::new();
        for (pi, project) in self.projects.iter().enumerate() {
            rows.push(FlatRow { project: pi, step: None });
            for si in 0..project.steps.len() {
                rows.push(FlatRow {
                    project: pi,
                    step: Some(si),
                });
            }
        }
        rows
    }

    pub fn get_selected(&self) -> Option<FlatRow> {
        self.flat_rows().get(self.selected_index).copied()
    }

    pub fn selected_project(&self) -> Option<&Project> {
        self.get_selected().map(|row| &self.projects[row.project])
    }

    pub fn selected_step(&self) -> Option<&Step> {
        let row = self.get_selected()?;
        self.projects[row.project].steps.get(row.step?)
    }

    fn flat_index_of(&self, location: Location) -> Option<usize> {
        self.flat_rows()
            .iter()
            .position(|row| Location::from(*row) == location)
    }

    pub fn select_up(&mut self) {
        if self.selected_index > 0 {
            self.selected_index -= 1;
        }
    }

    pub fn select_down(&mut self) {
        let len = self.flat_rows().len();
        if len > 0 && self.selected_index < len - 1 {
            self.selected_index += 1;
        }
    }

    fn clamp_selection(&mut self) {
        let len = self.flat_rows().len();
        if len == 0 {
            self.selected_index = 0;
        } else if self.selected_index >= len {
            self.selected_index = len - 1;
        }
    }

    /// Next free project position, for rows created elsewhere
    pub fn next_position(&self) -> i64 {
        self.projects
            .iter()
            .filter_map(|p| p.position)
            .max()
            .map(|max| max + 1)
            .unwrap_or(self.projects.len() as i64)
    }
}

fn resolve_updates(ids: &IdMap, updates: &[(String, i64)]) -> Result<Vec<(String, i64)>, StoreError> {
    updates
        .iter()
        .map(|(id, position)| Ok((ids.resolve(id)?, *position)))
        .collect()
}

fn pair_mut<T>(items: &mut [T], a: usize, b: usize) -> Option<(&mut T, &mut T)> {
    if a == b || a >= items.len() || b >= items.len() {
        return None;
    }
    if a < b {
        let (left, right) = items.split_at_mut(b);
        Some((&mut left[a], &mut right[0]))
    } else {
        let (left, right) = items.split_at_mut(a);
        Some((&mut right[0], &mut left[b]))
    }
}

fn step_row(user_id: &str, project_id: &str, step: &Step) -> serde_json::Value {
    json!({
        "user_id": user_id,
        "project_id": project_id,
        "title": step.title,
        "description": step.description,
        "priority": step.priority.as_str(),
        "status": if step.done { STATUS_DONE } else { STATUS_TODO },
    })
}

/// Insert a project and its steps again. A failed step insert removes the
/// new project (and with it the steps already written).
fn recreate_project(
    store: &dyn RowStore,
    schema: &Schema,
    user_id: &str,
    project: &Project,
    position: i64,
) -> Result<(String, Vec<String>), StoreError> {
    let row = json!({
        "user_id": user_id,
        "name": project.title,
        "status": ProjectStatus::Active.as_str(),
    });
    let project_id = row_id(&insert_positioned(store, schema, TABLE_PROJECTS, row, position)?)?;

    let mut step_ids = Vec::with_capacity(project.steps.len());
    for (i, step) in project.steps.iter().enumerate() {
        let inserted = insert_positioned(
            store,
            schema,
            TABLE_TASKS,
            step_row(user_id, &project_id, step),
            i as i64,
        )
        .and_then(|stored| row_id(&stored));
        match inserted {
            Ok(id) => step_ids.push(id),
            Err(e) => {
                if let Err(cleanup) = store.delete(TABLE_PROJECTS, &[Filter::eq("id", project_id.clone())]) {
                    warn!(error = %cleanup, "could not remove partially restored project");
                }
                return Err(e);
            }
        }
    }
    Ok((project_id, step_ids))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::controllers::ops::is_temp_id;
    use crate::controllers::undo::UNDO_WINDOW;
    use crate::store::{Capability, MemoryStore, SlowStore};
    use pretty_assertions::assert_eq;
    use std::thread;
    use std::time::Duration;

    fn controller_with(store: Arc<dyn RowStore>, capability: Capability) -> ProjectsController {
        let mut controller = ProjectsController::new(store, Arc::new(Schema::new(capability)));
        controller.set_user(Some("u1".to_string()));
        controller
    }

    fn controller() -> (Arc<MemoryStore>, ProjectsController) {
        let store = Arc::new(MemoryStore::new());
        let controller = controller_with(Arc::clone(&store) as Arc<dyn RowStore>, Capability::Positioned);
        (store, controller)
    }

    /// Poll until every queued write has been folded back in
    pub(crate) fn settle(c: &mut ProjectsController) -> Vec<Settled> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut settled = Vec::new();
        loop {
            settled.extend(c.poll());
            if c.is_idle() || Instant::now() > deadline {
                return settled;
            }
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn reverted(settled: &Settled) -> bool {
        matches!(settled.outcome, OpOutcome::Reverted { .. })
    }

    fn reload(store: Arc<MemoryStore>) -> ProjectsController {
        let mut fresh = controller_with(store as Arc<dyn RowStore>, Capability::Positioned);
        fresh.load().unwrap();
        fresh
    }

    fn titles(project: &Project) -> Vec<&str> {
        project.steps.iter().map(|s| s.title.as_str()).collect()
    }

    fn denied() -> StoreError {
        StoreError::Status {
            status: 403,
            code: None,
            message: "denied".into(),
        }
    }

    #[test]
    fn test_create_and_load_roundtrip_order() {
        let (store, mut c) = controller();
        let p = c.create_project("Garden").unwrap();
        c.create_step(&p, "Buy seeds").unwrap();
        c.create_step(&p, "Dig beds").unwrap();
        c.create_project("Taxes").unwrap();
        settle(&mut c);

        let fresh = reload(store);
        assert_eq!(fresh.projects.len(), 2);
        assert_eq!(fresh.projects[0].title, "Garden");
        assert_eq!(titles(&fresh.projects[0]), vec!["Buy seeds", "Dig beds"]);
        assert_eq!(fresh.projects[0].steps[1].position, Some(1));
        assert_eq!(fresh.projects[0].id, c.projects[0].id);
    }

    #[test]
    fn test_mutations_return_before_the_write_lands() {
        let store = Arc::new(SlowStore::new(Duration::from_millis(300)));
        let mut c = controller_with(Arc::clone(&store) as Arc<dyn RowStore>, Capability::Positioned);

        let started = Instant::now();
        let p = c.create_project("Garden").unwrap();
        let s = c.create_step(&p, "Water").unwrap();
        assert!(c.toggle_step_done(&s));
        assert!(started.elapsed() < Duration::from_millis(150));

        assert!(is_temp_id(&c.projects[0].id));
        assert!(c.projects[0].steps[0].done);
        assert!(store.inner.rows(TABLE_PROJECTS).is_empty());
        assert!(!c.is_idle());

        settle(&mut c);
        assert!(!is_temp_id(&c.projects[0].id));
        assert_eq!(store.inner.rows(TABLE_TASKS).len(), 1);
        assert_eq!(store.inner.rows(TABLE_TASKS)[0]["project_id"], c.projects[0].id.as_str());
        assert_eq!(store.inner.rows(TABLE_TASKS)[0]["status"], "done");
    }

    #[test]
    fn test_retried_delete_does_not_block() {
        let (store, mut c) = controller();
        let p = c.create_project("Garden").unwrap();
        let s = c.create_step(&p, "Water").unwrap();
        settle(&mut c);
        for _ in 0..3 {
            store.fail_next("delete", TABLE_TASKS, StoreError::Transport("unreachable".into()));
        }

        let started = Instant::now();
        assert!(c.delete_step(&s, started));
        assert!(started.elapsed() < Duration::from_millis(100));
        assert_eq!(c.step_count(), 0);

        let settled = settle(&mut c);
        assert_eq!(settled.len(), 1);
        assert_eq!(settled[0].kind, OpKind::DeleteStep);
        assert!(reverted(&settled[0]));
        assert_eq!(titles(&c.projects[0]), vec!["Water"]);
        assert!(c.undo.peek().is_none());
    }

    #[test]
    fn test_empty_titles_rejected() {
        let (store, mut c) = controller();
        assert!(c.create_project("   ").is_none());
        let p = c.create_project("Garden").unwrap();
        assert!(c.create_step(&p, "").is_none());
        assert!(!c.rename_project(&p, " "));
        settle(&mut c);
        assert_eq!(c.projects[0].title, "Garden");
        assert_eq!(store.rows(TABLE_TASKS).len(), 0);
    }

    #[test]
    fn test_step_count_tracks_creates_and_deletes() {
        let (store, mut c) = controller();
        let p = c.create_project("Garden").unwrap();
        let now = Instant::now();

        let mut ids = Vec::new();
        for i in 0..5 {
            ids.push(c.create_step(&p, &format!("step {}", i)).unwrap());
        }
        assert!(c.rename_step(&ids[1], "renamed"));
        assert!(c.delete_step(&ids[0], now));
        settle(&mut c);

        store.fail_next("delete", TABLE_TASKS, denied());
        assert!(c.delete_step(&ids[2], now));
        let settled = settle(&mut c);
        assert!(settled.iter().any(|s| s.kind == OpKind::DeleteStep && reverted(s)));

        assert!(c.delete_step(&ids[3], now));
        assert!(c.rename_step(&ids[4], "last"));
        settle(&mut c);

        // 5 creates, 2 successful deletes
        assert_eq!(c.step_count(), 3);
        assert_eq!(store.rows(TABLE_TASKS).len(), 3);
        assert_eq!(titles(&c.projects[0]), vec!["renamed", "step 2", "last"]);
    }

    #[test]
    fn test_failed_create_is_reverted() {
        let (store, mut c) = controller();
        let p = c.create_project("Garden").unwrap();
        settle(&mut c);
        store.fail_next("insert", TABLE_TASKS, denied());

        assert!(c.create_step(&p, "Buy seeds").is_some());
        assert_eq!(c.projects[0].steps.len(), 1);
        settle(&mut c);
        assert!(c.projects[0].steps.is_empty());
        assert!(matches!(c.ops.iter().next_back().unwrap().outcome, OpOutcome::Reverted { .. }));
    }

    #[test]
    fn test_steps_queued_behind_failed_project_revert() {
        let (store, mut c) = controller();
        store.fail_next("insert", TABLE_PROJECTS, denied());
        let p = c.create_project("Garden").unwrap();
        c.create_step(&p, "Water").unwrap();

        let settled = settle(&mut c);
        assert_eq!(settled.len(), 2);
        assert!(settled.iter().all(reverted));
        assert!(c.projects.is_empty());
        assert!(store.rows(TABLE_TASKS).is_empty());
    }

    #[test]
    fn test_failed_rename_restores_title() {
        let (store, mut c) = controller();
        let p = c.create_project("Garden").unwrap();
        settle(&mut c);
        store.fail_next("update", TABLE_PROJECTS, denied());

        assert!(c.rename_project(&p, "Yard"));
        assert_eq!(c.projects[0].title, "Yard");
        settle(&mut c);
        assert_eq!(c.projects[0].title, "Garden");
    }

    #[test]
    fn test_toggle_step_done_persists_status() {
        let (store, mut c) = controller();
        let p = c.create_project("Garden").unwrap();
        let s = c.create_step(&p, "Water").unwrap();

        assert!(c.toggle_step_done(&s));
        settle(&mut c);
        assert!(c.projects[0].steps[0].done);
        assert_eq!(store.rows(TABLE_TASKS)[0]["status"], "done");

        store.fail_next("update", TABLE_TASKS, denied());
        assert!(c.toggle_step_done(&s));
        assert!(!c.projects[0].steps[0].done);
        settle(&mut c);
        assert!(c.projects[0].steps[0].done);
    }

    #[test]
    fn test_undo_step_inside_window_once() {
        let (store, mut c) = controller();
        let p = c.create_project("Garden").unwrap();
        c.create_step(&p, "a").unwrap();
        let b = c.create_step(&p, "b").unwrap();
        c.create_step(&p, "c").unwrap();
        assert!(c.toggle_step_done(&b));
        settle(&mut c);
        let stored_b = c.projects[0].steps[1].id.clone();

        let start = Instant::now();
        assert!(c.delete_step(&b, start));
        assert_eq!(titles(&c.projects[0]), vec!["a", "c"]);
        settle(&mut c);

        assert!(c.undo_delete(start + Duration::from_secs(2)));
        assert_eq!(titles(&c.projects[0]), vec!["a", "b", "c"]);
        settle(&mut c);
        let restored = &c.projects[0].steps[1];
        assert!(restored.done);
        assert_ne!(restored.id, stored_b);
        assert_eq!(store.rows(TABLE_TASKS).len(), 3);

        assert!(!c.undo_delete(start + Duration::from_secs(2)));
        assert_eq!(c.step_count(), 3);
    }

    #[test]
    fn test_undo_after_window_is_noop() {
        let (_store, mut c) = controller();
        let p = c.create_project("Garden").unwrap();
        let s = c.create_step(&p, "a").unwrap();

        let start = Instant::now();
        assert!(c.delete_step(&s, start));
        settle(&mut c);
        c.tick(start + UNDO_WINDOW + Duration::from_millis(1));
        assert!(c.undo.peek().is_none());
        assert!(!c.undo_delete(start + Duration::from_secs(1)));
        assert_eq!(c.step_count(), 0);
    }

    #[test]
    fn test_undo_project_recreates_steps() {
        let (store, mut c) = controller();
        c.create_project("First").unwrap();
        let p = c.create_project("Garden").unwrap();
        c.create_step(&p, "a").unwrap();
        c.create_step(&p, "b").unwrap();
        c.create_project("Last").unwrap();
        settle(&mut c);
        let stored = c.projects[1].id.clone();

        let start = Instant::now();
        assert!(c.delete_project(&p, start));
        settle(&mut c);
        assert_eq!(store.rows(TABLE_TASKS).len(), 0);

        assert!(c.undo_delete(start + Duration::from_secs(1)));
        settle(&mut c);
        let names: Vec<&str> = c.projects.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(names, vec!["First", "Garden", "Last"]);
        assert_ne!(c.projects[1].id, stored);
        assert_eq!(titles(&c.projects[1]), vec!["a", "b"]);
        assert_eq!(store.rows(TABLE_TASKS).len(), 2);
        assert_eq!(store.rows(TABLE_TASKS)[0]["project_id"], c.projects[1].id.as_str());
        assert_eq!(store.rows(TABLE_TASKS)[0]["id"], c.projects[1].steps[0].id.as_str());
    }

    #[test]
    fn test_newer_delete_replaces_undo_record() {
        let (_store, mut c) = controller();
        let p = c.create_project("Garden").unwrap();
        let a = c.create_step(&p, "a").unwrap();
        let b = c.create_step(&p, "b").unwrap();

        let start = Instant::now();
        c.delete_step(&a, start);
        c.delete_step(&b, start);
        settle(&mut c);
        assert!(c.undo_delete(start));
        assert_eq!(titles(&c.projects[0]), vec!["b"]);
        assert!(!c.undo_delete(start));
    }

    #[test]
    fn test_drag_within_project_persists_once_on_drop() {
        let (store, mut c) = controller();
        let p = c.create_project("Garden").unwrap();
        for t in ["a", "b", "c"] {
            c.create_step(&p, t).unwrap();
        }
        settle(&mut c);
        c.selected_index = 1; // step "a"
        assert!(c.begin_drag());
        assert!(c.drag_by(1));
        assert!(c.drag_by(1));
        assert_eq!(titles(&c.projects[0]), vec!["b", "c", "a"]);

        let updates = |store: &MemoryStore| {
            store
                .operations()
                .iter()
                .filter(|op| op.kind == "update")
                .count()
        };
        assert_eq!(updates(&store), 0);

        assert!(c.end_drag());
        settle(&mut c);
        assert_eq!(updates(&store), 3);

        let fresh = reload(store);
        assert_eq!(titles(&fresh.projects[0]), vec!["b", "c", "a"]);
    }

    #[test]
    fn test_drag_across_projects_moves_owner() {
        let (store, mut c) = controller();
        let p1 = c.create_project("One").unwrap();
        c.create_step(&p1, "a").unwrap();
        c.create_step(&p1, "b").unwrap();
        let p2 = c.create_project("Two").unwrap();
        c.create_step(&p2, "x").unwrap();
        settle(&mut c);

        c.selected_index = 2; // step "b"
        assert!(c.begin_drag());
        assert!(c.drag_by(1));
        assert_eq!(titles(&c.projects[0]), vec!["a"]);
        assert_eq!(titles(&c.projects[1]), vec!["b", "x"]);
        assert_eq!(c.selected_step().unwrap().title, "b");
        assert!(c.end_drag());
        settle(&mut c);

        let fresh = reload(store);
        assert_eq!(titles(&fresh.projects[0]), vec!["a"]);
        assert_eq!(titles(&fresh.projects[1]), vec!["b", "x"]);
    }

    #[test]
    fn test_failed_drop_restores_snapshot() {
        let (store, mut c) = controller();
        c.create_project("One").unwrap();
        c.create_project("Two").unwrap();
        settle(&mut c);

        c.selected_index = 0;
        assert!(c.begin_drag());
        assert!(c.drag_by(1));
        store.fail_next("update", TABLE_PROJECTS, denied());
        assert!(c.end_drag());
        settle(&mut c);

        let names: Vec<&str> = c.projects.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(names, vec!["One", "Two"]);
        assert!(!c.is_dragging());
    }

    #[test]
    fn test_cancel_drag_restores_order() {
        let (store, mut c) = controller();
        let p = c.create_project("Garden").unwrap();
        c.create_step(&p, "a").unwrap();
        c.create_step(&p, "b").unwrap();

        c.selected_index = 1;
        c.begin_drag();
        c.drag_by(1);
        settle(&mut c);
        c.cancel_drag();
        assert_eq!(titles(&c.projects[0]), vec!["a", "b"]);
        assert!(c.projects[0].steps.iter().all(|s| !is_temp_id(&s.id)));
        assert_eq!(c.selected_index, 1);
        assert!(store.operations().iter().all(|op| op.kind != "update"));
    }

    #[test]
    fn test_legacy_schema_reorders_locally_only() {
        let store = Arc::new(MemoryStore::legacy());
        let mut c = controller_with(Arc::clone(&store) as Arc<dyn RowStore>, Capability::Legacy);
        let p = c.create_project("Garden").unwrap();
        c.create_step(&p, "a").unwrap();
        c.create_step(&p, "b").unwrap();
        settle(&mut c);
        assert!(store.rows(TABLE_TASKS)[0].get("position").is_none());

        c.selected_index = 1;
        c.begin_drag();
        c.drag_by(1);
        assert!(c.end_drag());
        settle(&mut c);
        assert_eq!(titles(&c.projects[0]), vec!["b", "a"]);
        assert!(store.operations().iter().all(|op| op.kind != "update"));
    }

    #[test]
    fn test_set_user_drops_previous_state() {
        let (_store, mut c) = controller();
        c.create_project("Garden").unwrap();
        c.set_user(Some("u2".to_string()));
        assert!(c.projects.is_empty());
        assert!(c.is_idle());
        c.load().unwrap();
        assert!(c.projects.is_empty());
    }

    #[test]
    fn test_late_result_after_user_switch_is_discarded() {
        let store = Arc::new(SlowStore::new(Duration::from_millis(200)));
        let mut c = controller_with(Arc::clone(&store) as Arc<dyn RowStore>, Capability::Positioned);
        c.create_project("Garden").unwrap();
        thread::sleep(Duration::from_millis(20));
        c.set_user(Some("u2".to_string()));

        thread::sleep(Duration::from_millis(400));
        assert!(c.poll().is_empty());
        assert!(c.projects.is_empty());
        assert_eq!(c.ops.iter().next_back().unwrap().outcome, OpOutcome::Discarded);
    }
}
