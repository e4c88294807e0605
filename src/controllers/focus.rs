use super::ops::{OpKind, OpLog, OpOutcome, RemoteCall, RemoteWorker, Reply, WorkerEvent};
use crate::cancel::{CancelOnDrop, CancelToken};
use crate::domain::{assemble_projects, Difficulty, Project, ProjectRow, Step, TaskRow};
use crate::error::StoreError;
use crate::store::{
    decode_rows, select_ordered, Filter, Query, RowStore, Schema, POSITION_COLUMN,
    TABLE_PROJECTS, TABLE_TASKS,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Drag distance a release must pass to count as a swipe
pub const SWIPE_THRESHOLD: f32 = 100.0;
pub const DEFAULT_DURATION_MINUTES: u32 = 25;
pub const TODAY_BUCKET: &str = "Today";

/// A remaining step, as shown in the focus queue
#[derive(Debug, Clone, PartialEq)]
pub struct FocusTask {
    pub id: String,
    pub title: String,
    pub project_name: String,
    pub project_id: Option<String>,
    pub duration_minutes: u32,
    pub core: bool,
    pub difficulty: Difficulty,
    pub insight: Option<String>,
}

impl FocusTask {
    pub fn from_step(step: &Step, project: &Project) -> Self {
        Self {
            id: step.id.clone(),
            title: step.title.clone(),
            project_name: project.title.clone(),
            project_id: Some(project.id.clone()),
            duration_minutes: step.duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES),
            core: step.core,
            difficulty: Difficulty::from(step.priority),
            insight: step.description.clone(),
        }
    }
}

/// What a released swipe did to the queue
#[derive(Debug, Clone, PartialEq)]
pub enum SwipeOutcome {
    Completed(FocusTask),
    Cycled,
    SnappedBack,
    Empty,
}

/// How a bucket should be displayed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketView {
    /// Nothing was ever in the bucket
    Empty,
    Active,
    /// Everything that was in the bucket has been completed
    Completed,
}

/// One named queue of tasks; only the front task is actionable
#[derive(Debug, Clone)]
pub struct FocusQueue {
    pub name: String,
    pub project_id: Option<String>,
    tasks: VecDeque<FocusTask>,
    started_with: usize,
    offset: f32,
}

impl FocusQueue {
    pub fn new(name: &str, project_id: Option<String>, tasks: Vec<FocusTask>) -> Self {
        Self {
            name: name.to_string(),
            project_id,
            started_with: tasks.len(),
            tasks: tasks.into(),
            offset: 0.0,
        }
    }

    pub fn front(&self) -> Option<&FocusTask> {
        self.tasks.front()
    }

    pub fn tasks(&self) -> impl Iterator<Item = &FocusTask> {
        self.tasks.iter()
    }

    pub fn remaining(&self) -> usize {
        self.tasks.len()
    }

    pub fn started_with(&self) -> usize {
        self.started_with
    }

    pub fn offset(&self) -> f32 {
        self.offset
    }

    /// Accumulate horizontal drag on the front task
    pub fn drag(&mut self, dx: f32) {
        if !self.tasks.is_empty() {
            self.offset += dx;
        }
    }

    /// Judge the accumulated drag and reset it
    pub fn release(&mut self) -> SwipeOutcome {
        let offset = std::mem::take(&mut self.offset);
        if self.tasks.is_empty() {
            return SwipeOutcome::Empty;
        }
        if offset >= SWIPE_THRESHOLD {
            match self.tasks.pop_front() {
                Some(task) => SwipeOutcome::Completed(task),
                None => SwipeOutcome::Empty,
            }
        } else if offset <= -SWIPE_THRESHOLD {
            self.tasks.rotate_left(1);
            SwipeOutcome::Cycled
        } else {
            SwipeOutcome::SnappedBack
        }
    }

    /// Put a task back at the front (a completion that did not stick)
    pub fn restore_front(&mut self, task: FocusTask) {
        self.tasks.push_front(task);
    }

    /// Take a task out as if it had never been queued here
    pub fn withdraw(&mut self, task_id: &str) -> Option<FocusTask> {
        let index = self.tasks.iter().position(|t| t.id == task_id)?;
        let task = self.tasks.remove(index)?;
        self.started_with = self.started_with.saturating_sub(1);
        Some(task)
    }

    /// Queue a task at the back, counting it as part of the bucket
    pub fn admit(&mut self, task: FocusTask) {
        self.tasks.push_back(task);
        self.started_with += 1;
    }

    pub fn view(&self) -> BucketView {
        if self.started_with == 0 {
            BucketView::Empty
        } else if self.tasks.is_empty() {
            BucketView::Completed
        } else {
            BucketView::Active
        }
    }
}

/// Build the Today bucket followed by one bucket per project with open steps.
///
/// Tasks picked for Today are listed there only, in the order they were
/// picked. Returns the buckets and the Today ids that still exist.
pub fn build_buckets(projects: &[Project], today_ids: &[String]) -> (Vec<FocusQueue>, Vec<String>) {
    let open: Vec<FocusTask> = projects
        .iter()
        .flat_map(|p| p.remaining_steps().map(move |s| FocusTask::from_step(s, p)))
        .collect();

    let today: Vec<FocusTask> = today_ids
        .iter()
        .filter_map(|id| open.iter().find(|t| &t.id == id).cloned())
        .collect();
    let kept_ids: Vec<String> = today.iter().map(|t| t.id.clone()).collect();

    let mut buckets = vec![FocusQueue::new(TODAY_BUCKET, None, today)];
    for project in projects {
        let tasks: Vec<FocusTask> = open
            .iter()
            .filter(|t| t.project_id.as_deref() == Some(project.id.as_str()))
            .filter(|t| !kept_ids.contains(&t.id))
            .cloned()
            .collect();
        if !tasks.is_empty() {
            buckets.push(FocusQueue::new(&project.title, Some(project.id.clone()), tasks));
        }
    }
    (buckets, kept_ids)
}

/// A completion whose remote delete has not landed yet
struct PendingCompletion {
    token: CancelToken,
    task: FocusTask,
    /// Project id of the bucket it came from; `None` for Today
    bucket: Option<String>,
    /// Where it sat in the Today order, if it was picked for Today
    today_index: Option<usize>,
}

/// Focus screen state: buckets of open tasks worked front to back
pub struct FocusController {
    store: Arc<dyn RowStore>,
    schema: Arc<Schema>,
    user_id: Option<String>,
    pub buckets: Vec<FocusQueue>,
    pub selected: usize,
    today_ids: Vec<String>,
    pub ops: OpLog,
    worker: RemoteWorker,
    pending: HashMap<u64, PendingCompletion>,
    lifetime: CancelOnDrop,
}

impl FocusController {
    pub fn new(store: Arc<dyn RowStore>, schema: Arc<Schema>, today_ids: Vec<String>) -> Self {
        let worker = RemoteWorker::spawn(Arc::clone(&store), Arc::clone(&schema));
        Self {
            store,
            schema,
            user_id: None,
            buckets: vec![FocusQueue::new(TODAY_BUCKET, None, Vec::new())],
            selected: 0,
            today_ids,
            ops: OpLog::new(),
            worker,
            pending: HashMap::new(),
            lifetime: CancelOnDrop::new(),
        }
    }

    pub fn set_user(&mut self, user_id: Option<String>) {
        if self.user_id == user_id {
            return;
        }
        self.user_id = user_id;
        self.buckets = vec![FocusQueue::new(TODAY_BUCKET, None, Vec::new())];
        self.selected = 0;
        self.pending.clear();
        self.lifetime.reset();
    }

    /// True when no completion is waiting on the store
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }

    /// Ids picked for Today, in order
    pub fn today_ids(&self) -> &[String] {
        &self.today_ids
    }

    pub fn load(&mut self) -> Result<(), StoreError> {
        let Some(user_id) = self.user_id.clone() else {
            return Ok(());
        };
        let project_rows: Vec<ProjectRow> = decode_rows(select_ordered(
            self.store.as_ref(),
            Query::table(TABLE_PROJECTS)
                .eq("user_id", user_id.clone())
                .order_by(POSITION_COLUMN, true),
            &self.schema,
        )?)?;
        let task_rows: Vec<TaskRow> = decode_rows(select_ordered(
            self.store.as_ref(),
            Query::table(TABLE_TASKS)
                .eq("user_id", user_id)
                .order_by(POSITION_COLUMN, true),
            &self.schema,
        )?)?;
        let projects = assemble_projects(project_rows, task_rows);
        self.rebuild(&projects);
        Ok(())
    }

    /// Rebuild buckets from already loaded projects
    pub fn rebuild(&mut self, projects: &[Project]) {
        let (buckets, today_ids) = build_buckets(projects, &self.today_ids);
        self.buckets = buckets;
        self.today_ids = today_ids;
        self.clamp_selection();
        debug!(buckets = self.buckets.len(), "focus buckets built");
    }

    pub fn current(&self) -> Option<&FocusQueue> {
        self.buckets.get(self.selected)
    }

    pub fn next_bucket(&mut self) {
        if self.selected + 1 < self.buckets.len() {
            self.selected += 1;
        }
    }

    pub fn prev_bucket(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    fn clamp_selection(&mut self) {
        if self.selected >= self.buckets.len() {
            self.selected = self.buckets.len().saturating_sub(1);
        }
    }

    pub fn drag(&mut self, dx: f32) {
        if let Some(bucket) = self.buckets.get_mut(self.selected) {
            bucket.drag(dx);
        }
    }

    /// Release the swipe on the current bucket.
    ///
    /// A completion leaves the queue at once and its task row is deleted in
    /// the background; `poll` puts it back if the delete fails.
    pub fn release(&mut self) -> SwipeOutcome {
        let selected = self.selected;
        let Some(bucket) = self.buckets.get_mut(selected) else {
            return SwipeOutcome::Empty;
        };
        let outcome = bucket.release();
        if let SwipeOutcome::Completed(task) = &outcome {
            let bucket = bucket.project_id.clone();
            let today_index = self.today_ids.iter().position(|id| id == &task.id);
            if let Some(i) = today_index {
                self.today_ids.remove(i);
            }
            let completion = PendingCompletion {
                token: self.lifetime.token(),
                task: task.clone(),
                bucket,
                today_index,
            };
            if !self.queue_completion(completion) {
                return SwipeOutcome::SnappedBack;
            }
        }
        outcome
    }

    /// Swipe the front task of the current bucket past the threshold
    pub fn complete_front(&mut self) -> SwipeOutcome {
        self.drag(SWIPE_THRESHOLD);
        self.release()
    }

    /// Send the front task of the current bucket to the back
    pub fn cycle_front(&mut self) -> SwipeOutcome {
        self.drag(-SWIPE_THRESHOLD);
        self.release()
    }

    /// Delete the task row, then its project if that was the last row.
    /// A failed project cleanup only logs; the task is gone either way.
    fn queue_completion(&mut self, completion: PendingCompletion) -> bool {
        let task_id = completion.task.id.clone();
        let project_id = completion.task.project_id.clone();
        let call: RemoteCall = Box::new(move |store, _, ids| {
            store.delete(TABLE_TASKS, &[Filter::eq("id", ids.resolve(&task_id)?)])?;
            info!(task = %task_id, "task completed");
            if let Some(project_id) = project_id.as_deref() {
                match remove_if_empty(store, &ids.resolve(project_id)?) {
                    Ok(true) => info!(project = project_id, "last task done, project removed"),
                    Ok(false) => {}
                    Err(e) => warn!(project = project_id, error = %e, "empty project cleanup failed"),
                }
            }
            Ok(Reply::Done)
        });

        let op = self.ops.begin(OpKind::CompleteTask, &completion.task.id);
        if !self.worker.submit(op, completion.token.clone(), call) {
            warn!(op, "remote worker gone, completion not saved");
            self.ops.settle(
                op,
                OpOutcome::Reverted {
                    reason: "background worker stopped".to_string(),
                },
            );
            self.put_back(completion);
            return false;
        }
        self.pending.insert(op, completion);
        true
    }

    /// Fold finished completions in. Returns the tasks whose delete failed;
    /// they are back at the front of their bucket.
    pub fn poll(&mut self) -> Vec<FocusTask> {
        let mut returned = Vec::new();
        while let Some(event) = self.worker.try_next() {
            let (op, result) = match event {
                WorkerEvent::Retrying { op, attempt } => {
                    self.ops.settle(op, OpOutcome::Retrying { attempt });
                    continue;
                }
                WorkerEvent::Finished { op, result } => (op, result),
            };
            let Some(completion) = self.pending.remove(&op) else {
                self.ops.settle(op, OpOutcome::Discarded);
                continue;
            };
            if completion.token.is_cancelled() {
                self.ops.settle(op, OpOutcome::Discarded);
                continue;
            }
            self.ops.settle(op, OpOutcome::of(&result));
            if let Err(e) = result {
                warn!(task = %completion.task.id, error = %e, "completion reverted");
                returned.push(completion.task.clone());
                self.put_back(completion);
            }
        }
        returned
    }

    fn put_back(&mut self, completion: PendingCompletion) {
        let PendingCompletion {
            task,
            bucket,
            today_index,
            ..
        } = completion;
        if let Some(i) = today_index {
            let at = i.min(self.today_ids.len());
            self.today_ids.insert(at, task.id.clone());
        }
        let home = match &bucket {
            None => Some(0),
            Some(id) => self
                .buckets
                .iter()
                .position(|b| b.project_id.as_deref() == Some(id.as_str())),
        };
        match home.and_then(|i| self.buckets.get_mut(i)) {
            Some(queue) => queue.restore_front(task),
            None => {
                let mut queue = FocusQueue::new(&task.project_name, bucket, Vec::new());
                queue.admit(task);
                self.buckets.push(queue);
            }
        }
    }

    /// Add a task to Today, or send it back to its project bucket.
    /// Returns whether the task is now in Today.
    pub fn toggle_today(&mut self, task_id: &str) -> Option<bool> {
        let (from, task) = self
            .buckets
            .iter_mut()
            .enumerate()
            .find_map(|(i, b)| b.withdraw(task_id).map(|t| (i, t)))?;

        if from == 0 {
            self.today_ids.retain(|id| id != task_id);
            let home = self
                .buckets
                .iter()
                .position(|b| b.project_id.is_some() && b.project_id == task.project_id);
            match home {
                Some(i) => self.buckets[i].admit(task),
                None => {
                    let mut bucket = FocusQueue::new(&task.project_name, task.project_id.clone(), Vec::new());
                    bucket.admit(task);
                    self.buckets.push(bucket);
                }
            }
            Some(false)
        } else {
            self.today_ids.push(task.id.clone());
            self.buckets[0].admit(task);
            if self.buckets[from].started_with() == 0 {
                self.buckets.remove(from);
                self.clamp_selection();
            }
            Some(true)
        }
    }
}

/// Delete a project that has no task rows left. Returns whether it went.
fn remove_if_empty(store: &dyn RowStore, project_id: &str) -> Result<bool, StoreError> {
    let rows = store.select(&Query::table(TABLE_TASKS).eq("project_id", project_id))?;
    if !rows.is_empty() {
        return Ok(false);
    }
    store.delete(TABLE_PROJECTS, &[Filter::eq("id", project_id)])?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Priority;
    use crate::store::{Capability, MemoryStore, SlowStore};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::thread;
    use std::time::{Duration, Instant};

    fn task(id: &str) -> FocusTask {
        FocusTask {
            id: id.to_string(),
            title: format!("Task {}", id),
            project_name: "Garden".to_string(),
            project_id: Some("p1".to_string()),
            duration_minutes: DEFAULT_DURATION_MINUTES,
            core: false,
            difficulty: Difficulty::Medium,
            insight: None,
        }
    }

    fn ids(queue: &FocusQueue) -> Vec<&str> {
        queue.tasks().map(|t| t.id.as_str()).collect()
    }

    #[test]
    fn test_empty_bucket_shows_empty_not_completed() {
        let mut queue = FocusQueue::new("Today", None, Vec::new());
        assert_eq!(queue.view(), BucketView::Empty);
        queue.drag(150.0);
        assert_eq!(queue.release(), SwipeOutcome::Empty);
        assert_eq!(queue.view(), BucketView::Empty);
    }

    #[test]
    fn test_bucket_completed_after_all_removed() {
        let mut queue = FocusQueue::new("Garden", None, vec![task("a"), task("b"), task("c")]);
        assert_eq!(queue.view(), BucketView::Active);
        for _ in 0..3 {
            queue.drag(SWIPE_THRESHOLD);
            assert!(matches!(queue.release(), SwipeOutcome::Completed(_)));
        }
        assert_eq!(queue.remaining(), 0);
        assert_eq!(queue.view(), BucketView::Completed);
    }

    #[test]
    fn test_swipe_left_cycles_to_back() {
        let mut queue = FocusQueue::new("Garden", None, vec![task("a"), task("b"), task("c")]);
        queue.drag(-60.0);
        queue.drag(-60.0);
        assert_eq!(queue.release(), SwipeOutcome::Cycled);
        assert_eq!(ids(&queue), vec!["b", "c", "a"]);
    }

    #[test]
    fn test_short_drag_snaps_back() {
        let mut queue = FocusQueue::new("Garden", None, vec![task("a"), task("b")]);
        queue.drag(99.0);
        assert_eq!(queue.release(), SwipeOutcome::SnappedBack);
        assert_eq!(queue.offset(), 0.0);
        assert_eq!(ids(&queue), vec!["a", "b"]);

        queue.drag(60.0);
        queue.drag(-60.0);
        assert_eq!(queue.release(), SwipeOutcome::SnappedBack);
    }

    #[test]
    fn test_withdraw_does_not_count_as_completion() {
        let mut queue = FocusQueue::new("Today", None, vec![task("a")]);
        assert!(queue.withdraw("a").is_some());
        assert_eq!(queue.view(), BucketView::Empty);
    }

    #[test]
    fn test_focus_task_from_step() {
        let project = Project::new("p1".into(), "Garden".into(), "lime".into());
        let mut step = Step::new("s1".into(), "Water".into());
        step.priority = Priority::High;
        step.description = Some("mornings are best".into());

        let task = FocusTask::from_step(&step, &project);
        assert_eq!(task.project_name, "Garden");
        assert_eq!(task.duration_minutes, 25);
        assert_eq!(task.difficulty, Difficulty::High);
        assert_eq!(task.insight.as_deref(), Some("mornings are best"));
        assert!(!task.core);
    }

    #[test]
    fn test_build_buckets_today_first() {
        let mut garden = Project::new("p1".into(), "Garden".into(), "lime".into());
        garden.steps = vec![
            Step::new("s1".into(), "Water".into()),
            Step::new("s2".into(), "Weed".into()),
        ];
        let mut done = Step::new("s3".into(), "Plant".into());
        done.done = true;
        garden.steps.push(done);
        let mut taxes = Project::new("p2".into(), "Taxes".into(), "sky".into());
        taxes.steps = vec![Step::new("t1".into(), "File".into())];
        let empty = Project::new("p3".into(), "Idle".into(), "rose".into());

        let today = vec!["t1".to_string(), "gone".to_string()];
        let (buckets, kept) = build_buckets(&[garden, taxes, empty], &today);
        let names: Vec<&str> = buckets.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["Today", "Garden"]);
        assert_eq!(ids(&buckets[0]), vec!["t1"]);
        assert_eq!(ids(&buckets[1]), vec!["s1", "s2"]);
        assert_eq!(kept, vec!["t1".to_string()]);
    }

    fn seed(store: &dyn RowStore) {
        for (id, name, pos) in [("p1", "Garden", 0), ("p2", "Taxes", 1)] {
            store
                .insert(TABLE_PROJECTS, json!({"id": id, "user_id": "u1", "name": name, "position": pos}))
                .unwrap();
        }
        for (id, project, status, pos) in [
            ("s1", "p1", "todo", 0),
            ("s2", "p1", "todo", 1),
            ("t1", "p2", "todo", 0),
            ("t2", "p2", "done", 1),
        ] {
            store
                .insert(
                    TABLE_TASKS,
                    json!({"id": id, "user_id": "u1", "project_id": project, "title": id, "status": status, "position": pos}),
                )
                .unwrap();
        }
    }

    fn loaded(store: Arc<dyn RowStore>) -> FocusController {
        let mut controller = FocusController::new(
            store,
            Arc::new(Schema::new(Capability::Positioned)),
            Vec::new(),
        );
        controller.set_user(Some("u1".to_string()));
        controller.load().unwrap();
        controller
    }

    fn seeded() -> (Arc<MemoryStore>, FocusController) {
        let store = Arc::new(MemoryStore::new());
        seed(store.as_ref());
        let controller = loaded(Arc::clone(&store) as Arc<dyn RowStore>);
        (store, controller)
    }

    /// Poll until every completion has landed or been put back
    fn settle(c: &mut FocusController) -> Vec<FocusTask> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut returned = Vec::new();
        loop {
            returned.extend(c.poll());
            if c.is_idle() || Instant::now() > deadline {
                return returned;
            }
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_completing_last_task_removes_project() {
        let (store, mut c) = seeded();
        c.selected = 1; // Garden
        assert!(matches!(c.complete_front(), SwipeOutcome::Completed(_)));
        settle(&mut c);
        assert_eq!(store.rows(TABLE_PROJECTS).len(), 2);

        assert!(matches!(c.complete_front(), SwipeOutcome::Completed(_)));
        assert_eq!(c.current().unwrap().view(), BucketView::Completed);
        settle(&mut c);
        let projects: Vec<String> = store
            .rows(TABLE_PROJECTS)
            .iter()
            .map(|r| r["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(projects, vec!["p2".to_string()]);
    }

    #[test]
    fn test_completion_returns_before_the_delete_lands() {
        let store = Arc::new(SlowStore::new(Duration::from_millis(300)));
        seed(&store.inner);
        let mut c = loaded(Arc::clone(&store) as Arc<dyn RowStore>);
        c.selected = 1;

        let started = Instant::now();
        assert!(matches!(c.complete_front(), SwipeOutcome::Completed(_)));
        assert!(started.elapsed() < Duration::from_millis(150));
        assert_eq!(ids(c.current().unwrap()), vec!["s2"]);
        assert_eq!(store.inner.rows(TABLE_TASKS).len(), 4);

        assert!(settle(&mut c).is_empty());
        assert_eq!(store.inner.rows(TABLE_TASKS).len(), 3);
    }

    #[test]
    fn test_project_with_done_tasks_is_kept() {
        let (store, mut c) = seeded();
        c.selected = 2; // Taxes: t1 open, t2 done
        assert_eq!(c.current().unwrap().name, "Taxes");
        assert!(matches!(c.complete_front(), SwipeOutcome::Completed(_)));
        settle(&mut c);
        assert_eq!(store.rows(TABLE_PROJECTS).len(), 2);
    }

    #[test]
    fn test_cycle_is_local_only() {
        let (store, mut c) = seeded();
        let before = store.operations().len();
        c.selected = 1;
        assert_eq!(c.cycle_front(), SwipeOutcome::Cycled);
        assert_eq!(ids(c.current().unwrap()), vec!["s2", "s1"]);
        assert!(c.is_idle());
        assert_eq!(store.operations().len(), before);
    }

    #[test]
    fn test_failed_completion_puts_task_back() {
        let (store, mut c) = seeded();
        c.selected = 1;
        store.fail_next(
            "delete",
            TABLE_TASKS,
            StoreError::Status {
                status: 403,
                code: None,
                message: "denied".into(),
            },
        );
        assert!(matches!(c.complete_front(), SwipeOutcome::Completed(_)));
        assert_eq!(ids(c.current().unwrap()), vec!["s2"]);

        let returned = settle(&mut c);
        assert_eq!(returned.len(), 1);
        assert_eq!(returned[0].id, "s1");
        assert_eq!(ids(c.current().unwrap()), vec!["s1", "s2"]);
        assert!(matches!(c.ops.iter().next_back().unwrap().outcome, OpOutcome::Reverted { .. }));
        assert_eq!(store.rows(TABLE_PROJECTS).len(), 2);
    }

    #[test]
    fn test_failed_today_completion_keeps_today_pick() {
        let (store, mut c) = seeded();
        c.toggle_today("s2");
        c.selected = 0;
        store.fail_next("delete", TABLE_TASKS, StoreError::Transport("unreachable".into()));
        store.fail_next("delete", TABLE_TASKS, StoreError::Transport("unreachable".into()));
        store.fail_next("delete", TABLE_TASKS, StoreError::Transport("unreachable".into()));

        assert!(matches!(c.complete_front(), SwipeOutcome::Completed(_)));
        assert!(c.today_ids().is_empty());
        settle(&mut c);
        assert_eq!(ids(&c.buckets[0]), vec!["s2"]);
        assert_eq!(c.today_ids(), &["s2".to_string()]);
        assert_eq!(c.buckets[0].view(), BucketView::Active);
    }

    #[test]
    fn test_toggle_today_moves_between_buckets() {
        let (_store, mut c) = seeded();
        assert_eq!(c.buckets[0].view(), BucketView::Empty);

        assert_eq!(c.toggle_today("t1"), Some(true));
        assert_eq!(ids(&c.buckets[0]), vec!["t1"]);
        assert_eq!(c.today_ids(), &["t1".to_string()]);
        // Taxes had only t1 open
        let names: Vec<&str> = c.buckets.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["Today", "Garden"]);

        assert_eq!(c.toggle_today("t1"), Some(false));
        assert!(c.today_ids().is_empty());
        assert_eq!(c.buckets[0].view(), BucketView::Empty);
        let names: Vec<&str> = c.buckets.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["Today", "Garden", "Taxes"]);

        assert_eq!(c.toggle_today("missing"), None);
    }

    #[test]
    fn test_today_selection_survives_reload() {
        let (store, mut c) = seeded();
        c.toggle_today("s2");

        let mut reloaded = FocusController::new(
            store as Arc<dyn RowStore>,
            Arc::new(Schema::new(Capability::Positioned)),
            c.today_ids().to_vec(),
        );
        reloaded.set_user(Some("u1".to_string()));
        reloaded.load().unwrap();
        assert_eq!(ids(&reloaded.buckets[0]), vec!["s2"]);
        assert_eq!(ids(&reloaded.buckets[1]), vec!["s1"]);
    }
}
