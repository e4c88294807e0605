use crate::domain::Difficulty;
use ratatui::style::{Color, Modifier, Style};

/// Default text style
pub fn default_style() -> Style {
    Style::default().fg(Color::White)
}

/// Selected row highlight style
pub fn selected_style() -> Style {
    Style::default()
        .fg(Color::Black)
        .bg(Color::LightCyan)
        .add_modifier(Modifier::BOLD)
}

/// Row being dragged
pub fn dragging_style() -> Style {
    Style::default()
        .fg(Color::Black)
        .bg(Color::Yellow)
        .add_modifier(Modifier::BOLD)
}

/// Tree connector style (for steps)
pub fn tree_style() -> Style {
    Style::default().fg(Color::DarkGray)
}

/// Title style for panes
pub fn title_style() -> Style {
    Style::default()
        .fg(Color::Cyan)
        .add_modifier(Modifier::BOLD)
}

/// Border style
pub fn border_style() -> Style {
    Style::default().fg(Color::Gray)
}

/// Active tab in the screen bar
pub fn active_tab_style() -> Style {
    Style::default()
        .fg(Color::Black)
        .bg(Color::Cyan)
        .add_modifier(Modifier::BOLD)
}

/// Modal background style
pub fn modal_bg_style() -> Style {
    Style::default().bg(Color::DarkGray).fg(Color::White)
}

/// Modal title style
pub fn modal_title_style() -> Style {
    Style::default()
        .fg(Color::Yellow)
        .add_modifier(Modifier::BOLD)
}

/// Keybinding hint style
pub fn hint_style() -> Style {
    Style::default().fg(Color::DarkGray)
}

/// Error message style
pub fn error_style() -> Style {
    Style::default()
        .fg(Color::Red)
        .add_modifier(Modifier::BOLD)
}

/// Done/completed step style
pub fn done_style() -> Style {
    Style::default()
        .fg(Color::Green)
        .add_modifier(Modifier::CROSSED_OUT)
}

/// Insight and other secondary text
pub fn muted_style() -> Style {
    Style::default()
        .fg(Color::Gray)
        .add_modifier(Modifier::ITALIC)
}

/// Terminal colour for a palette tag
pub fn tag_color(tag: &str) -> Color {
    match tag {
        "coral" => Color::LightRed,
        "amber" => Color::Yellow,
        "lime" => Color::LightGreen,
        "teal" => Color::Cyan,
        "sky" => Color::LightBlue,
        "violet" => Color::Magenta,
        "rose" => Color::LightMagenta,
        _ => Color::White,
    }
}

pub fn project_style(tag: &str) -> Style {
    Style::default()
        .fg(tag_color(tag))
        .add_modifier(Modifier::BOLD)
}

pub fn difficulty_style(difficulty: Difficulty) -> Style {
    match difficulty {
        Difficulty::Low => Style::default().fg(Color::Green),
        Difficulty::Medium => Style::default().fg(Color::Yellow),
        Difficulty::High => Style::default().fg(Color::Red),
    }
}
