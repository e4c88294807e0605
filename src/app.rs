use crate::analysis::AnalysisClient;
use crate::auth::{AuthBackend, AuthEvent, AuthStore};
use crate::controllers::{
    BucketView, CaptureController, CapturePhase, FocusController, OpKind, OpOutcome,
    ProjectsController, SwipeOutcome,
};
use crate::domain::{Screen, UiMode};
use crate::notifications::notify_task_done;
use crate::persistence::{save_metadata, AppMetadata};
use crate::store::{RowStore, Schema};
use anyhow::Result;
use std::path::PathBuf;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Drag added to the focus card per arrow key press
pub const DRAG_STEP: f32 = 25.0;

/// Status line for a change the store refused
fn revert_message(kind: OpKind) -> &'static str {
    match kind {
        OpKind::CreateProject | OpKind::CreateStep | OpKind::RenameProject | OpKind::RenameStep => {
            "Could not save the change"
        }
        OpKind::ToggleStep => "Could not update the step",
        OpKind::DeleteProject | OpKind::DeleteStep => "Could not delete",
        OpKind::RestoreProject | OpKind::RestoreStep => "Could not restore",
        OpKind::Reorder => "Could not save the new order",
        OpKind::CompleteTask => "Could not complete the task",
    }
}

/// What the title form will do on submit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormPurpose {
    NewProject,
    NewStep { project_id: String },
    RenameProject { id: String },
    RenameStep { id: String },
}

/// Single-line title input
#[derive(Debug, Clone)]
pub struct InputFormState {
    pub purpose: FormPurpose,
    pub title: String,
}

impl InputFormState {
    pub fn heading(&self) -> &'static str {
        match self.purpose {
            FormPurpose::NewProject => " New Project ",
            FormPurpose::NewStep { .. } => " New Step ",
            FormPurpose::RenameProject { .. } => " Rename Project ",
            FormPurpose::RenameStep { .. } => " Rename Step ",
        }
    }
}

/// Sign-in / sign-up form
#[derive(Debug, Clone, Default)]
pub struct LoginFormState {
    pub email: String,
    pub password: String,
    pub editing_field: usize, // 0 = email, 1 = password
    pub sign_up: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub text: String,
    pub is_error: bool,
}

/// Remote collaborators the app is wired to
pub struct Services {
    pub store: Arc<dyn RowStore>,
    pub schema: Arc<Schema>,
    pub auth: Arc<dyn AuthBackend>,
    pub analysis: Arc<AnalysisClient>,
}

/// Main application state
pub struct AppState {
    pub screen: Screen,
    pub ui_mode: UiMode,
    pub auth: AuthStore,
    auth_events: Receiver<AuthEvent>,
    store: Arc<dyn RowStore>,
    pub capture: CaptureController,
    pub projects: ProjectsController,
    pub focus: FocusController,
    pub input_form: Option<InputFormState>,
    pub login_form: Option<LoginFormState>,
    pub status: Option<StatusMessage>,
    pub needs_save: bool,
    pub offline: bool,
    meta_path: Option<PathBuf>,
    projects_stale: bool,
    focus_stale: bool,
}

impl AppState {
    pub fn new(services: Services, metadata: AppMetadata, meta_path: Option<PathBuf>) -> Self {
        let Services {
            store,
            schema,
            auth,
            analysis,
        } = services;

        let mut auth = AuthStore::new(auth);
        let auth_events = auth.subscribe();

        Self {
            screen: metadata.last_screen,
            ui_mode: UiMode::Normal,
            auth,
            auth_events,
            capture: CaptureController::new(analysis, Arc::clone(&store), Arc::clone(&schema)),
            projects: ProjectsController::new(Arc::clone(&store), Arc::clone(&schema)),
            focus: FocusController::new(Arc::clone(&store), schema, metadata.today_task_ids),
            store,
            input_form: None,
            login_form: None,
            status: None,
            needs_save: false,
            offline: false,
            meta_path,
            projects_stale: false,
            focus_stale: false,
        }
    }

    /// Restore the previous session (bounded by `wait`) and load its data
    pub fn start(&mut self, wait: Duration) {
        self.auth.initialize(wait);
        self.handle_auth_events();
    }

    pub fn set_status(&mut self, text: impl Into<String>) {
        self.status = Some(StatusMessage {
            text: text.into(),
            is_error: false,
        });
    }

    pub fn set_error(&mut self, text: impl Into<String>) {
        self.status = Some(StatusMessage {
            text: text.into(),
            is_error: true,
        });
    }

    pub fn user_label(&self) -> String {
        match self.auth.user() {
            Some(user) => user.email.clone().unwrap_or_else(|| user.id.clone()),
            None if self.auth.is_loading() => "checking session…".to_string(),
            None => "signed out".to_string(),
        }
    }

    fn handle_auth_events(&mut self) {
        while let Ok(event) = self.auth_events.try_recv() {
            match event {
                AuthEvent::SignedIn(user) => {
                    let token = self.auth.session().map(|s| s.access_token.clone());
                    self.store.set_access_token(token);
                    self.projects.set_user(Some(user.id.clone()));
                    self.focus.set_user(Some(user.id.clone()));
                    self.reload();
                    let label = user.email.unwrap_or(user.id);
                    self.set_status(format!("Signed in as {}", label));
                }
                AuthEvent::SignedOut => {
                    self.store.set_access_token(None);
                    self.projects.set_user(None);
                    self.focus.set_user(None);
                    self.capture.cancel();
                    self.set_status("Signed out");
                }
                AuthEvent::InitialTimeout => {
                    self.set_error("Session check timed out, continuing signed out");
                }
            }
        }
    }

    /// Reload projects from the store and rebuild the focus buckets
    pub fn reload(&mut self) {
        match self.projects.load() {
            Ok(()) => {
                self.focus.rebuild(&self.projects.projects);
                self.projects_stale = false;
                self.focus_stale = false;
            }
            Err(e) => {
                warn!(error = %e, "reload failed");
                self.set_error(format!("Could not load projects: {}", e));
            }
        }
    }

    // Screens

    pub fn switch_screen(&mut self, screen: Screen) {
        if screen == self.screen {
            return;
        }
        if self.screen == Screen::Projects {
            self.projects.cancel_drag();
        }
        if self.screen == Screen::Capture && self.capture.is_busy() {
            self.capture.cancel();
            self.set_status("Capture cancelled");
        }

        match screen {
            Screen::Projects if self.projects_stale => self.reload(),
            Screen::Focus if self.focus_stale => {
                self.focus.rebuild(&self.projects.projects);
                self.focus_stale = false;
            }
            _ => {}
        }
        self.screen = screen;
        self.needs_save = true;
    }

    pub fn next_screen(&mut self) {
        self.switch_screen(self.screen.next());
    }

    pub fn prev_screen(&mut self) {
        self.switch_screen(self.screen.prev());
    }

    pub fn open_help(&mut self) {
        self.ui_mode = UiMode::Help;
    }

    pub fn close_help(&mut self) {
        self.ui_mode = UiMode::Normal;
    }

    // Auth

    pub fn open_login(&mut self, sign_up: bool) {
        self.login_form = Some(LoginFormState {
            sign_up,
            ..Default::default()
        });
        self.ui_mode = UiMode::LoginForm;
    }

    pub fn cancel_login(&mut self) {
        self.login_form = None;
        self.ui_mode = UiMode::Normal;
    }

    /// Submit the login form; the form stays open with the error on failure
    pub fn submit_login(&mut self) {
        let Some(form) = self.login_form.clone() else {
            return;
        };
        let result = if form.sign_up {
            self.auth
                .sign_up(&form.email, &form.password)
                .map(|user| user.is_some())
        } else {
            self.auth.sign_in(&form.email, &form.password).map(|_| true)
        };
        match result {
            Ok(signed_in) => {
                self.login_form = None;
                self.ui_mode = UiMode::Normal;
                self.handle_auth_events();
                if !signed_in {
                    self.set_status("Account created, confirm your email then sign in");
                }
            }
            Err(e) => {
                warn!(error = %e, "sign-in failed");
                if let Some(form) = self.login_form.as_mut() {
                    form.error = Some(e.to_string());
                    form.password.clear();
                }
            }
        }
    }

    pub fn sign_out(&mut self) {
        let result = self.auth.sign_out();
        self.handle_auth_events();
        if let Err(e) = result {
            self.set_error(format!("Signed out locally; remote sign-out failed: {}", e));
        }
    }

    fn require_user(&mut self) -> Option<String> {
        let user = self.auth.user().map(|u| u.id.clone());
        if user.is_none() {
            self.set_error("Sign in first (L)");
        }
        user
    }

    // Capture

    pub fn start_editing_transcript(&mut self) {
        if matches!(self.capture.phase(), CapturePhase::Done(_) | CapturePhase::Failed(_)) {
            self.capture.reset();
        }
        if !self.capture.is_busy() {
            self.ui_mode = UiMode::EditingTranscript;
        }
    }

    pub fn submit_capture(&mut self) {
        if self.capture.submit() {
            self.set_status("Analysing…");
        } else if self.capture.transcript.trim().is_empty() {
            self.set_error("Nothing to analyse yet");
        }
    }

    pub fn confirm_capture(&mut self) {
        let Some(user_id) = self.require_user() else {
            return;
        };
        let first_position = self.projects.next_position();
        if self.capture.confirm(&user_id, first_position) {
            self.set_status("Saving…");
        }
    }

    pub fn discard_capture(&mut self) {
        self.capture.cancel();
    }

    // Projects

    pub fn start_new_project(&mut self) {
        self.open_form(FormPurpose::NewProject, String::new());
    }

    pub fn start_new_step(&mut self) {
        let Some(project) = self.projects.selected_project() else {
            self.set_error("Select a project first");
            return;
        };
        let project_id = project.id.clone();
        self.open_form(FormPurpose::NewStep { project_id }, String::new());
    }

    pub fn start_rename(&mut self) {
        if let Some(step) = self.projects.selected_step() {
            let (id, title) = (step.id.clone(), step.title.clone());
            self.open_form(FormPurpose::RenameStep { id }, title);
        } else if let Some(project) = self.projects.selected_project() {
            let (id, title) = (project.id.clone(), project.title.clone());
            self.open_form(FormPurpose::RenameProject { id }, title);
        }
    }

    fn open_form(&mut self, purpose: FormPurpose, title: String) {
        self.input_form = Some(InputFormState { purpose, title });
        self.ui_mode = UiMode::TitleInput;
    }

    pub fn cancel_input_form(&mut self) {
        self.input_form = None;
        self.ui_mode = UiMode::Normal;
    }

    pub fn submit_input_form(&mut self) {
        let Some(form) = self.input_form.take() else {
            return;
        };
        self.ui_mode = UiMode::Normal;
        let title = form.title.trim().to_string();
        if title.is_empty() {
            self.set_error("Title cannot be empty");
            return;
        }

        let ok = match &form.purpose {
            FormPurpose::NewProject => self.projects.create_project(&title).is_some(),
            FormPurpose::NewStep { project_id } => {
                self.projects.create_step(project_id, &title).is_some()
            }
            FormPurpose::RenameProject { id } => self.projects.rename_project(id, &title),
            FormPurpose::RenameStep { id } => self.projects.rename_step(id, &title),
        };
        self.after_mutation(ok, "Could not save the change");
    }

    pub fn toggle_selected_step(&mut self) {
        let Some(id) = self.projects.selected_step().map(|s| s.id.clone()) else {
            return;
        };
        let ok = self.projects.toggle_step_done(&id);
        self.after_mutation(ok, "Could not update the step");
    }

    pub fn delete_selected(&mut self) {
        let now = Instant::now();
        let ok = if let Some(id) = self.projects.selected_step().map(|s| s.id.clone()) {
            self.projects.delete_step(&id, now)
        } else if let Some(id) = self.projects.selected_project().map(|p| p.id.clone()) {
            self.projects.delete_project(&id, now)
        } else {
            return;
        };
        self.after_mutation(ok, "Could not delete");
        if ok {
            self.set_status("Deleting…");
        }
    }

    pub fn undo_delete(&mut self) {
        if self.projects.undo_delete(Instant::now()) {
            self.after_mutation(true, "");
            self.set_status("Restored");
        } else {
            self.set_error("Nothing to undo");
        }
    }

    /// Move the selected row one place in one gesture
    pub fn nudge_selected(&mut self, delta: i32) {
        if self.projects.begin_drag() {
            let moved = self.projects.drag_by(delta);
            let ok = self.projects.end_drag();
            if moved {
                self.after_mutation(ok, "Could not save the new order");
            }
        }
    }

    pub fn drop_dragged(&mut self) {
        let ok = self.projects.end_drag();
        self.after_mutation(ok, "Could not save the new order");
    }

    /// Any project or focus write still on its way to the store
    pub fn is_syncing(&self) -> bool {
        !self.projects.is_idle() || !self.focus.is_idle()
    }

    pub fn is_retrying(&self) -> bool {
        self.projects.ops.is_retrying() || self.focus.ops.is_retrying()
    }

    /// Surface writes that landed or were refused since the last tick
    fn fold_remote_results(&mut self) {
        for settled in self.projects.poll() {
            match &settled.outcome {
                OpOutcome::Reverted { reason } => {
                    self.set_error(format!("{}: {}", revert_message(settled.kind), reason));
                }
                OpOutcome::Applied => {
                    self.focus_stale = true;
                    if matches!(settled.kind, OpKind::DeleteProject | OpKind::DeleteStep) {
                        self.set_status("Deleted. Press u to undo");
                    }
                }
                _ => {}
            }
        }
        for task in self.focus.poll() {
            self.projects_stale = true;
            self.needs_save = true;
            self.set_error(format!("Could not complete \"{}\", it is back in the queue", task.title));
        }
    }

    fn after_mutation(&mut self, ok: bool, failure: &str) {
        if ok {
            self.focus_stale = true;
        } else {
            self.set_error(failure.to_string());
        }
    }

    // Focus

    pub fn focus_drag(&mut self, dx: f32) {
        self.focus.drag(dx);
    }

    pub fn focus_release(&mut self) {
        let outcome = self.focus.release();
        self.after_swipe(outcome);
    }

    pub fn focus_complete(&mut self) {
        let outcome = self.focus.complete_front();
        self.after_swipe(outcome);
    }

    pub fn focus_cycle(&mut self) {
        let outcome = self.focus.cycle_front();
        self.after_swipe(outcome);
    }

    fn after_swipe(&mut self, outcome: SwipeOutcome) {
        match outcome {
            SwipeOutcome::Completed(task) => {
                info!(task = %task.id, "focus task completed");
                self.projects_stale = true;
                self.needs_save = true;
                let finished = self.focus.current().map(|b| b.view()) == Some(BucketView::Completed);
                notify_task_done(&task.title, finished);
                if finished {
                    self.set_status(format!("Done: {}. Bucket cleared!", task.title));
                } else {
                    self.set_status(format!("Done: {}", task.title));
                }
            }
            SwipeOutcome::Cycled => self.set_status("Moved to the back"),
            SwipeOutcome::SnappedBack | SwipeOutcome::Empty => {}
        }
    }

    pub fn toggle_today(&mut self) {
        let Some(id) = self
            .focus
            .current()
            .and_then(|b| b.front())
            .map(|t| t.id.clone())
        else {
            return;
        };
        match self.focus.toggle_today(&id) {
            Some(true) => self.set_status("Added to Today"),
            Some(false) => self.set_status("Removed from Today"),
            None => return,
        }
        self.needs_save = true;
    }

    // Timers

    pub fn tick(&mut self) {
        self.auth.poll();
        self.handle_auth_events();

        if self.capture.poll() {
            match self.capture.phase().clone() {
                CapturePhase::Review(review) => {
                    self.set_status(format!(
                        "Found {} projects and {} tasks. y to save, n to discard",
                        review.plan.projects.len(),
                        review.plan.tasks.len() + review.plan.unresolved.len()
                    ));
                }
                CapturePhase::Done(summary) => {
                    let mut text = format!(
                        "Saved {} projects and {} tasks",
                        summary.project_ids.len(),
                        summary.task_ids.len()
                    );
                    if summary.unresolved > 0 {
                        text.push_str(&format!(" ({} tasks had no matching project)", summary.unresolved));
                    }
                    self.set_status(text);
                    self.projects_stale = true;
                    self.focus_stale = true;
                    if self.screen != Screen::Capture {
                        self.reload();
                    }
                }
                CapturePhase::Failed(reason) => self.set_error(format!("Capture failed: {}", reason)),
                _ => {}
            }
        }

        self.fold_remote_results();
        self.projects.tick(Instant::now());
    }

    pub fn save(&mut self) -> Result<()> {
        if let Some(path) = &self.meta_path {
            let metadata = AppMetadata {
                last_screen: self.screen,
                today_task_ids: self.focus.today_ids().to_vec(),
            };
            save_metadata(path, &metadata)?;
        }
        self.needs_save = false;
        Ok(())
    }
}
