use crate::app::AppState;
use crate::controllers::{BucketView, FocusQueue, SWIPE_THRESHOLD};
use crate::ui::layout::split_side;
use crate::ui::styles::{
    border_style, default_style, difficulty_style, done_style, hint_style, modal_title_style,
    muted_style, selected_style, title_style,
};
use ratatui::{
    layout::Rect,
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
    Frame,
};

/// Render the focus screen: bucket list and the front card
pub fn render_focus_pane(f: &mut Frame, app: &AppState, area: Rect) {
    let (card_area, buckets_area) = split_side(area, 30);
    render_buckets(f, app, buckets_area);

    let lines = match app.focus.current() {
        Some(bucket) => card_lines(bucket),
        None => vec![Line::styled("Nothing to focus on.", hint_style())],
    };
    let title = app
        .focus
        .current()
        .map(|b| format!(" {} ", b.name))
        .unwrap_or_else(|| " Focus ".to_string());
    let paragraph = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(border_style())
                .title(Span::styled(title, title_style())),
        )
        .wrap(Wrap { trim: false });
    f.render_widget(paragraph, card_area);
}

fn render_buckets(f: &mut Frame, app: &AppState, area: Rect) {
    let items: Vec<ListItem> = app
        .focus
        .buckets
        .iter()
        .enumerate()
        .map(|(idx, bucket)| {
            let label = format!("{}  {}/{}", bucket.name, bucket.remaining(), bucket.started_with());
            let style = if idx == app.focus.selected {
                selected_style()
            } else if bucket.view() == BucketView::Completed {
                done_style()
            } else {
                default_style()
            };
            ListItem::new(Line::raw(label)).style(style)
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(border_style())
            .title(Span::styled(" Buckets ", title_style())),
    );
    f.render_widget(list, area);
}

/// Swipe meter: where the accumulated drag sits between the two thresholds
pub fn swipe_meter(offset: f32, width: usize) -> String {
    let half = (width / 2).max(1);
    let ratio = (offset / SWIPE_THRESHOLD).clamp(-1.0, 1.0);
    let marker = half as i64 + (ratio * half as f32).round() as i64;
    (0..=half * 2)
        .map(|i| {
            if i as i64 == marker {
                '◆'
            } else if i == 0 {
                '◀'
            } else if i == half * 2 {
                '▶'
            } else {
                '─'
            }
        })
        .collect()
}

fn card_lines(bucket: &FocusQueue) -> Vec<Line<'static>> {
    match bucket.view() {
        BucketView::Empty => vec![
            Line::raw(""),
            Line::styled("Nothing here yet.", hint_style()),
            Line::styled("Press t on a task in another bucket to plan it for today.", hint_style()),
        ],
        BucketView::Completed => vec![
            Line::raw(""),
            Line::styled(
                format!("All {} done. Well played!", bucket.started_with()),
                done_style(),
            ),
        ],
        BucketView::Active => {
            let Some(task) = bucket.front() else {
                return Vec::new();
            };
            let mut lines = vec![
                Line::raw(""),
                Line::styled(task.title.clone(), modal_title_style()),
                Line::from(vec![
                    Span::styled(task.project_name.clone(), default_style()),
                    Span::raw("  ·  "),
                    Span::raw(format!("{} min", task.duration_minutes)),
                    Span::raw("  ·  "),
                    Span::styled(task.difficulty.label().to_string(), difficulty_style(task.difficulty)),
                ]),
            ];
            if task.core {
                lines.push(Line::styled("core task", title_style()));
            }
            if let Some(insight) = &task.insight {
                lines.push(Line::raw(""));
                lines.push(Line::styled(insight.clone(), muted_style()));
            }
            lines.push(Line::raw(""));
            lines.push(Line::raw(format!("later {} done", swipe_meter(bucket.offset(), 20))));
            lines.push(Line::styled(
                format!("{} left in this bucket", bucket.remaining()),
                hint_style(),
            ));
            lines
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swipe_meter_marker_position() {
        assert_eq!(swipe_meter(0.0, 4), "◀─◆─▶");
        assert_eq!(swipe_meter(SWIPE_THRESHOLD * 2.0, 4), "◀───◆");
        assert_eq!(swipe_meter(-SWIPE_THRESHOLD, 4), "◆───▶");
    }

    #[test]
    fn test_card_for_empty_bucket() {
        let bucket = FocusQueue::new("Today", None, Vec::new());
        let text = format!("{:?}", card_lines(&bucket));
        assert!(text.contains("Nothing here yet"));
    }
}
