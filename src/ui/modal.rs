use crate::app::AppState;
use crate::controllers::Removed;
use crate::domain::UiMode;
use crate::ui::{
    layout::{create_modal_area, toast_area},
    styles::{error_style, modal_bg_style, modal_title_style},
};
use ratatui::{
    layout::Rect,
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};
use std::time::Instant;

/// Render the sign-in / sign-up form
pub fn render_login_form(f: &mut Frame, app: &AppState, area: Rect) {
    let Some(form) = &app.login_form else {
        return;
    };
    let modal_area = create_modal_area(area);
    f.render_widget(Clear, modal_area);

    let cursor = |field: usize| {
        if form.editing_field == field {
            Span::styled("█", modal_title_style())
        } else {
            Span::raw("")
        }
    };
    let masked = "•".repeat(form.password.chars().count());

    let mut lines = vec![
        Line::raw(""),
        Line::raw("Email:"),
        Line::from(vec![
            Span::raw("> "),
            Span::styled(form.email.as_str(), modal_title_style()),
            cursor(0),
        ]),
        Line::raw(""),
        Line::raw("Password:"),
        Line::from(vec![
            Span::raw("> "),
            Span::styled(masked, modal_title_style()),
            cursor(1),
        ]),
        Line::raw(""),
    ];
    if let Some(error) = &form.error {
        lines.push(Line::styled(error.as_str(), error_style()));
        lines.push(Line::raw(""));
    }
    lines.push(Line::raw("Tab to switch fields  ·  Enter to submit  ·  Esc to cancel"));

    let title = if form.sign_up { " Create Account " } else { " Sign In " };
    let paragraph = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(Span::styled(title, modal_title_style()))
                .style(modal_bg_style()),
        )
        .wrap(Wrap { trim: false });
    f.render_widget(paragraph, modal_area);
}

/// Render the help overlay
pub fn render_help_modal(f: &mut Frame, app: &AppState, area: Rect) {
    if app.ui_mode != UiMode::Help {
        return;
    }
    let modal_area = create_modal_area(area);
    f.render_widget(Clear, modal_area);

    let entry = |key: &'static str, text: &'static str| {
        Line::from(vec![
            Span::styled(format!("  {:<8}", key), modal_title_style()),
            Span::raw(text),
        ])
    };
    let lines = vec![
        entry("Tab 1-3", "switch screen"),
        entry("L / S", "sign in / create account"),
        entry("O", "sign out"),
        entry("i e s", "capture: type, editor, analyse"),
        entry("y n", "capture: save or discard the analysis"),
        entry("a A e", "projects: add project, add step, rename"),
        entry("x u", "projects: delete, undo (4 seconds)"),
        entry("m", "projects: pick up and move with ↑/↓"),
        entry("← → d c", "focus: swipe, done, later"),
        entry("t", "focus: plan for today"),
        entry("q", "quit"),
    ];

    let paragraph = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(Span::styled(" Help ", modal_title_style()))
                .style(modal_bg_style()),
        )
        .wrap(Wrap { trim: false });
    f.render_widget(paragraph, modal_area);
}

/// Render the undo notice while a delete can still be undone
pub fn render_undo_toast(f: &mut Frame, app: &AppState, area: Rect) {
    let now = Instant::now();
    let Some(remaining) = app.projects.undo.remaining(now) else {
        return;
    };
    let Some(record) = app.projects.undo.peek() else {
        return;
    };
    let what = match &record.item {
        Removed::Project(project) => project.title.as_str(),
        Removed::Step(step) => step.title.as_str(),
    };

    let toast = toast_area(area);
    f.render_widget(Clear, toast);
    let line = Line::from(vec![
        Span::raw(format!(" Deleted \"{}\" ", what)),
        Span::styled(format!("u undo ({}s)", remaining.as_secs() + 1), modal_title_style()),
    ]);
    let paragraph = Paragraph::new(line).block(
        Block::default()
            .borders(Borders::ALL)
            .style(modal_bg_style()),
    );
    f.render_widget(paragraph, toast);
}
