use crate::app::{AppState, DRAG_STEP};
use crate::controllers::CapturePhase;
use crate::domain::{Screen, UiMode};
use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::env;
use std::fs;
use std::process::Command;
use tempfile::NamedTempFile;

/// Handle keyboard input events
pub fn handle_key(app: &mut AppState, key: KeyEvent) -> Result<bool> {
    match app.ui_mode {
        UiMode::Normal => handle_normal_mode(app, key),
        UiMode::EditingTranscript => handle_transcript_mode(app, key),
        UiMode::TitleInput => handle_title_form_mode(app, key),
        UiMode::LoginForm => handle_login_form_mode(app, key),
        UiMode::Help => {
            app.close_help();
            Ok(false)
        }
    }
}

/// Keys shared by every screen in normal mode
fn handle_normal_mode(app: &mut AppState, key: KeyEvent) -> Result<bool> {
    match key.code {
        KeyCode::Char('q') | KeyCode::Char('Q') => return Ok(true),
        KeyCode::Tab => app.next_screen(),
        KeyCode::BackTab => app.prev_screen(),
        KeyCode::Char('1') => app.switch_screen(Screen::Capture),
        KeyCode::Char('2') => app.switch_screen(Screen::Projects),
        KeyCode::Char('3') => app.switch_screen(Screen::Focus),
        KeyCode::Char('?') => app.open_help(),
        KeyCode::Char('L') => app.open_login(false),
        KeyCode::Char('S') => app.open_login(true),
        KeyCode::Char('O') => app.sign_out(),
        _ => match app.screen {
            Screen::Capture => handle_capture_keys(app, key)?,
            Screen::Projects => handle_projects_keys(app, key),
            Screen::Focus => handle_focus_keys(app, key),
        },
    }
    Ok(false)
}

/// Whether `key` hands the terminal to `$EDITOR`; the caller leaves raw
/// mode around `handle_key` when it does
pub fn opens_external_editor(app: &AppState, key: KeyEvent) -> bool {
    app.ui_mode == UiMode::Normal
        && app.screen == Screen::Capture
        && key.code == KeyCode::Char('e')
        && transcript_editable(app)
}

fn transcript_editable(app: &AppState) -> bool {
    matches!(
        app.capture.phase(),
        CapturePhase::Editing | CapturePhase::Failed(_)
    )
}

fn handle_capture_keys(app: &mut AppState, key: KeyEvent) -> Result<()> {
    let in_review = matches!(app.capture.phase(), CapturePhase::Review(_));
    match key.code {
        KeyCode::Char('i') if !in_review => app.start_editing_transcript(),
        KeyCode::Char('e') if transcript_editable(app) => {
            edit_transcript_external(app)?;
        }
        KeyCode::Char('s') | KeyCode::Enter if !in_review => app.submit_capture(),
        KeyCode::Char('y') if in_review => app.confirm_capture(),
        KeyCode::Char('n') if in_review => {
            app.discard_capture();
            app.set_status("Analysis discarded");
        }
        KeyCode::Esc if app.capture.is_busy() => {
            app.discard_capture();
            app.set_status("Capture cancelled");
        }
        _ => {}
    }
    Ok(())
}

fn handle_projects_keys(app: &mut AppState, key: KeyEvent) {
    let shift = key.modifiers.contains(KeyModifiers::SHIFT);

    // While a row is picked up only movement keys apply
    if app.projects.is_dragging() {
        match key.code {
            KeyCode::Up => {
                app.projects.drag_by(-1);
            }
            KeyCode::Down => {
                app.projects.drag_by(1);
            }
            KeyCode::Enter | KeyCode::Char('m') => app.drop_dragged(),
            KeyCode::Esc => app.projects.cancel_drag(),
            _ => {}
        }
        return;
    }

    match key.code {
        KeyCode::Up if shift => app.nudge_selected(-1),
        KeyCode::Down if shift => app.nudge_selected(1),
        KeyCode::Up | KeyCode::Char('k') => app.projects.select_up(),
        KeyCode::Down | KeyCode::Char('j') => app.projects.select_down(),
        KeyCode::Char('a') => app.start_new_project(),
        KeyCode::Char('A') => app.start_new_step(),
        KeyCode::Char('e') | KeyCode::Char('E') => app.start_rename(),
        KeyCode::Char(' ') | KeyCode::Enter => app.toggle_selected_step(),
        KeyCode::Char('x') | KeyCode::Char('X') | KeyCode::Delete => app.delete_selected(),
        KeyCode::Char('u') | KeyCode::Char('U') => app.undo_delete(),
        KeyCode::Char('m') => {
            app.projects.begin_drag();
        }
        KeyCode::Char('r') => app.reload(),
        _ => {}
    }
}

fn handle_focus_keys(app: &mut AppState, key: KeyEvent) {
    match key.code {
        KeyCode::Left | KeyCode::Char('h') => app.focus_drag(-DRAG_STEP),
        KeyCode::Right | KeyCode::Char('l') => app.focus_drag(DRAG_STEP),
        KeyCode::Enter | KeyCode::Char(' ') => app.focus_release(),
        KeyCode::Char('d') | KeyCode::Char('D') => app.focus_complete(),
        KeyCode::Char('c') | KeyCode::Char('C') => app.focus_cycle(),
        KeyCode::Char('t') | KeyCode::Char('T') => app.toggle_today(),
        KeyCode::Down | KeyCode::Char(']') => app.focus.next_bucket(),
        KeyCode::Up | KeyCode::Char('[') => app.focus.prev_bucket(),
        _ => {}
    }
}

/// Inline transcript editing
fn handle_transcript_mode(app: &mut AppState, key: KeyEvent) -> Result<bool> {
    match key.code {
        KeyCode::Esc => app.ui_mode = UiMode::Normal,
        KeyCode::Enter => app.capture.transcript.push('\n'),
        KeyCode::Backspace => {
            app.capture.transcript.pop();
        }
        KeyCode::Char(c) => app.capture.transcript.push(c),
        _ => {}
    }
    Ok(false)
}

/// Handle keys in the title form (new/rename project or step)
fn handle_title_form_mode(app: &mut AppState, key: KeyEvent) -> Result<bool> {
    match key.code {
        KeyCode::Enter => app.submit_input_form(),
        KeyCode::Esc => app.cancel_input_form(),
        KeyCode::Backspace => {
            if let Some(form) = app.input_form.as_mut() {
                form.title.pop();
            }
        }
        KeyCode::Char(c) => {
            if let Some(form) = app.input_form.as_mut() {
                form.title.push(c);
            }
        }
        _ => {}
    }
    Ok(false)
}

fn handle_login_form_mode(app: &mut AppState, key: KeyEvent) -> Result<bool> {
    match key.code {
        KeyCode::Enter => app.submit_login(),
        KeyCode::Esc => app.cancel_login(),
        KeyCode::Tab | KeyCode::BackTab | KeyCode::Up | KeyCode::Down => {
            if let Some(form) = app.login_form.as_mut() {
                form.editing_field = 1 - form.editing_field.min(1);
            }
        }
        KeyCode::Backspace => {
            if let Some(form) = app.login_form.as_mut() {
                if form.editing_field == 0 {
                    form.email.pop();
                } else {
                    form.password.pop();
                }
            }
        }
        KeyCode::Char(c) => {
            if let Some(form) = app.login_form.as_mut() {
                if form.editing_field == 0 {
                    form.email.push(c);
                } else {
                    form.password.push(c);
                }
            }
        }
        _ => {}
    }
    Ok(false)
}

/// Edit the transcript using external $EDITOR
pub fn edit_transcript_external(app: &mut AppState) -> Result<()> {
    // Get editor from environment, default to vi
    let editor = env::var("EDITOR").unwrap_or_else(|_| {
        if cfg!(windows) {
            "notepad".to_string()
        } else {
            "vi".to_string()
        }
    });

    let mut temp_file = NamedTempFile::new()?;
    std::io::Write::write_all(&mut temp_file, app.capture.transcript.as_bytes())?;
    let temp_path = temp_file.into_temp_path();

    // The main loop leaves raw mode around this call
    let status = Command::new(&editor).arg(&temp_path).status()?;

    if status.success() {
        app.capture.transcript = fs::read_to_string(&temp_path)?;
    } else {
        app.set_error(format!("{} exited with {}", editor, status));
    }
    Ok(())
}
