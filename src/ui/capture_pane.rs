use crate::app::AppState;
use crate::controllers::{CapturePhase, Review};
use crate::domain::UiMode;
use crate::ui::layout::split_side;
use crate::ui::styles::{
    border_style, default_style, error_style, hint_style, modal_title_style, muted_style,
    title_style, tree_style,
};
use ratatui::{
    layout::Rect,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

/// Render the capture screen: transcript on the left, analysis on the right
pub fn render_capture_pane(f: &mut Frame, app: &AppState, area: Rect) {
    let (transcript_area, result_area) = split_side(area, 45);
    render_transcript(f, app, transcript_area);
    render_result(f, app, result_area);
}

fn render_transcript(f: &mut Frame, app: &AppState, area: Rect) {
    let editing = app.ui_mode == UiMode::EditingTranscript;
    let mut lines: Vec<Line> = if app.capture.transcript.is_empty() && !editing {
        vec![Line::styled(
            "What's on your mind? Press i to type, e to open your editor.",
            hint_style(),
        )]
    } else {
        app.capture
            .transcript
            .split('\n')
            .map(|l| Line::raw(l.to_string()))
            .collect()
    };
    if editing {
        match lines.last_mut() {
            Some(last) => last.spans.push(Span::styled("█", modal_title_style())),
            None => lines.push(Line::styled("█", modal_title_style())),
        }
    }

    let title = if editing { " Brain dump (editing) " } else { " Brain dump " };
    let paragraph = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(border_style())
                .title(Span::styled(title, title_style())),
        )
        .wrap(Wrap { trim: false });
    f.render_widget(paragraph, area);
}

fn render_result(f: &mut Frame, app: &AppState, area: Rect) {
    let lines = match app.capture.phase() {
        CapturePhase::Editing => vec![Line::styled(
            "Press s to turn the brain dump into projects and tasks.",
            hint_style(),
        )],
        CapturePhase::Analyzing => vec![Line::raw("Analysing…")],
        CapturePhase::Applying => vec![Line::raw("Saving…")],
        CapturePhase::Review(review) => review_lines(review),
        CapturePhase::Done(summary) => {
            let mut lines = vec![Line::styled(
                format!(
                    "Saved {} projects and {} tasks.",
                    summary.project_ids.len(),
                    summary.task_ids.len()
                ),
                title_style(),
            )];
            if summary.unresolved > 0 {
                lines.push(Line::styled(
                    format!("{} tasks named a project that was not in the batch.", summary.unresolved),
                    muted_style(),
                ));
            }
            lines.push(Line::raw(""));
            lines.push(Line::styled("Press i to start a new capture.", hint_style()));
            lines
        }
        CapturePhase::Failed(reason) => vec![
            Line::styled("Nothing was saved.", error_style()),
            Line::raw(reason.clone()),
        ],
    };

    let paragraph = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(border_style())
                .title(Span::styled(
                    format!(" Analysis ({}) ", app.capture.phase().label()),
                    title_style(),
                )),
        )
        .wrap(Wrap { trim: false });
    f.render_widget(paragraph, area);
}

/// Projects with their tasks, then leftovers and insights
pub fn review_lines(review: &Review) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    for planned in &review.plan.projects {
        lines.push(Line::styled(planned.project.name.clone(), modal_title_style()));
        for task in review.plan.tasks_for(planned.key) {
            lines.push(Line::from(vec![
                Span::styled("  └─ ", tree_style()),
                Span::styled(task.task.title.clone(), default_style()),
                Span::styled(format!(" [{}]", task.task.priority.as_str()), hint_style()),
            ]));
        }
    }
    if !review.plan.unresolved.is_empty() {
        lines.push(Line::raw(""));
        lines.push(Line::styled("Not linked to any project:", error_style()));
        for task in &review.plan.unresolved {
            lines.push(Line::raw(format!("  · {} ({})", task.title, task.project_name)));
        }
    }

    let insights = &review.plan.insights;
    for (label, items) in [
        ("Dreams", &insights.dreams),
        ("Difficulties", &insights.difficulties),
        ("Goals", &insights.goals),
    ] {
        if items.is_empty() {
            continue;
        }
        lines.push(Line::raw(""));
        lines.push(Line::styled(label, title_style()));
        for item in items {
            lines.push(Line::styled(format!("  · {}", item), muted_style()));
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::BatchPlan;
    use crate::domain::AnalysisResult;

    #[test]
    fn test_review_lines_list_fallback_batch() {
        let result = AnalysisResult::fallback();
        let review = Review {
            plan: BatchPlan::from_result(&result),
            result,
        };
        let text = format!("{:?}", review_lines(&review));
        assert!(text.contains("Captured thoughts"));
        assert!(text.contains("Review what you captured"));
        assert!(!text.contains("Not linked"));
    }
}
