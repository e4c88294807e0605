pub mod capture_pane;
pub mod focus_pane;
pub mod input_form;
pub mod keybindings;
pub mod layout;
pub mod modal;
pub mod projects_pane;
pub mod status_bar;
pub mod styles;

use crate::app::AppState;
use crate::domain::{Screen, UiMode};
use capture_pane::render_capture_pane;
use focus_pane::render_focus_pane;
use input_form::render_input_form;
use keybindings::render_keybindings;
use layout::create_layout;
use modal::{render_help_modal, render_login_form, render_undo_toast};
use projects_pane::render_projects_pane;
use ratatui::Frame;
use status_bar::{render_status, render_tabs};

/// Main render function - draws the entire UI
pub fn render(f: &mut Frame, app: &AppState) {
    let size = f.size();
    let layout = create_layout(size);

    render_keybindings(f, app, layout.keybindings_area);
    render_tabs(f, app, layout.tabs_area);

    match app.screen {
        Screen::Capture => render_capture_pane(f, app, layout.body_area),
        Screen::Projects => {
            render_projects_pane(f, app, layout.body_area);
            render_undo_toast(f, app, layout.body_area);
        }
        Screen::Focus => render_focus_pane(f, app, layout.body_area),
    }

    render_status(f, app, layout.status_area);

    if app.input_form.is_some() {
        render_input_form(f, app, size);
    }
    if app.login_form.is_some() {
        render_login_form(f, app, size);
    }
    if app.ui_mode == UiMode::Help {
        render_help_modal(f, app, size);
    }
}
