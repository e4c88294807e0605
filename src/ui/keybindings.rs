use crate::app::AppState;
use crate::controllers::CapturePhase;
use crate::domain::{Screen, UiMode};
use crate::ui::styles::hint_style;
use ratatui::{layout::Rect, text::Line, widgets::Paragraph, Frame};

/// Key hints for the current screen and mode
pub fn hints(app: &AppState) -> &'static str {
    match app.ui_mode {
        UiMode::EditingTranscript => " type your thoughts   Enter newline   Esc done",
        UiMode::TitleInput => " type a title   Enter save   Esc cancel",
        UiMode::LoginForm => " Tab switch field   Enter submit   Esc cancel",
        UiMode::Help => " any key closes help",
        UiMode::Normal => match app.screen {
            Screen::Capture => match app.capture.phase() {
                CapturePhase::Review(_) => " y save   n discard   Tab screens   ? help   q quit",
                CapturePhase::Analyzing | CapturePhase::Applying => " Esc cancel   Tab screens   q quit",
                _ => " i type   e editor   s analyse   Tab screens   L sign in   ? help   q quit",
            },
            Screen::Projects if app.projects.is_dragging() => {
                " ↑/↓ move   Enter drop   Esc cancel"
            }
            Screen::Projects => {
                " ↑/↓ select   a project   A step   e rename   Space done   x delete   u undo   m move   Tab screens   q quit"
            }
            Screen::Focus => {
                " ←/→ swipe   Enter release   d done   c later   t today   ↑/↓ bucket   Tab screens   q quit"
            }
        },
    }
}

/// Render the keybindings hint bar
pub fn render_keybindings(f: &mut Frame, app: &AppState, area: Rect) {
    let paragraph = Paragraph::new(Line::raw(hints(app))).style(hint_style());
    f.render_widget(paragraph, area);
}
