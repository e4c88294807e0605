use ratatui::layout::{Constraint, Direction, Layout, Rect};

/// Main layout structure
pub struct MainLayout {
    pub keybindings_area: Rect,
    pub tabs_area: Rect,
    pub body_area: Rect,
    pub status_area: Rect,
}

/// Create the main layout
/// - Top bar: keybindings (1 row)
/// - Tab bar: screens and signed-in user (1 row)
/// - Body: the current screen
/// - Bottom: status line (1 row)
pub fn create_layout(area: Rect) -> MainLayout {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Keybindings bar
            Constraint::Length(1), // Tabs
            Constraint::Min(0),    // Screen body
            Constraint::Length(1), // Status line
        ])
        .split(area);

    MainLayout {
        keybindings_area: chunks[0],
        tabs_area: chunks[1],
        body_area: chunks[2],
        status_area: chunks[3],
    }
}

/// Split a body into a main area and a narrow side panel
pub fn split_side(area: Rect, side_percent: u16) -> (Rect, Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(100 - side_percent),
            Constraint::Percentage(side_percent),
        ])
        .split(area);
    (chunks[0], chunks[1])
}

/// Create a centered modal area
pub fn create_modal_area(area: Rect) -> Rect {
    let vertical_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(25),
            Constraint::Length(14),
            Constraint::Percentage(25),
        ])
        .split(area);

    let horizontal_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(20),
            Constraint::Percentage(60),
            Constraint::Percentage(20),
        ])
        .split(vertical_chunks[1]);

    horizontal_chunks[1]
}

/// A one-line strip at the bottom of `area`, for transient notices
pub fn toast_area(area: Rect) -> Rect {
    let height = 3.min(area.height);
    let width = 44.min(area.width);
    Rect::new(
        area.x + area.width.saturating_sub(width + 1),
        area.y + area.height.saturating_sub(height + 1),
        width,
        height,
    )
}
