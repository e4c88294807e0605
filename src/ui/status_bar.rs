use crate::app::AppState;
use crate::domain::Screen;
use crate::ui::styles::{active_tab_style, default_style, error_style, hint_style};
use ratatui::{
    layout::Rect,
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

/// Render the screen tabs with the signed-in user on the right
pub fn render_tabs(f: &mut Frame, app: &AppState, area: Rect) {
    let mut spans = Vec::new();
    for (i, screen) in Screen::all().iter().enumerate() {
        let label = format!(" {} {} ", i + 1, screen.name());
        if *screen == app.screen {
            spans.push(Span::styled(label, active_tab_style()));
        } else {
            spans.push(Span::styled(label, default_style()));
        }
        spans.push(Span::raw(" "));
    }

    let mut user = format!("  {}", app.user_label());
    if app.offline {
        user.push_str(" (offline)");
    }
    if app.is_retrying() {
        user.push_str("  retrying…");
    } else if app.is_syncing() {
        user.push_str("  saving…");
    }
    spans.push(Span::styled(user, hint_style()));

    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// Render the last status message
pub fn render_status(f: &mut Frame, app: &AppState, area: Rect) {
    let line = match &app.status {
        Some(status) if status.is_error => Line::from(Span::styled(format!(" {}", status.text), error_style())),
        Some(status) => Line::from(Span::styled(format!(" {}", status.text), default_style())),
        None => Line::raw(""),
    };
    f.render_widget(Paragraph::new(line), area);
}
