use crate::app::AppState;
use crate::controllers::FlatRow;
use crate::domain::{Project, Step};
use crate::ui::styles::{
    border_style, default_style, done_style, dragging_style, hint_style, project_style,
    selected_style, title_style, tree_style,
};
use ratatui::{
    layout::Rect,
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
    Frame,
};

/// Tree connector for a step row
fn tree_connector(is_last: bool) -> &'static str {
    if is_last {
        "└─"
    } else {
        "├─"
    }
}

/// Render the projects screen: every project followed by its steps
pub fn render_projects_pane(f: &mut Frame, app: &AppState, area: Rect) {
    let controller = &app.projects;
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style())
        .title(Span::styled(
            format!(" Projects ({}) ", controller.projects.len()),
            title_style(),
        ));

    if controller.projects.is_empty() {
        let text = if controller.user_id().is_some() {
            "No projects yet. Press a to add one, or capture a brain dump."
        } else {
            "Sign in (L) to see your projects."
        };
        f.render_widget(Paragraph::new(Line::styled(text, hint_style())).block(block), area);
        return;
    }

    let rows = controller.flat_rows();
    let items: Vec<ListItem> = rows
        .iter()
        .enumerate()
        .map(|(idx, row)| {
            let line = row_line(&controller.projects, *row);
            let style = if idx != controller.selected_index {
                default_style()
            } else if controller.is_dragging() {
                dragging_style()
            } else {
                selected_style()
            };
            ListItem::new(line).style(style)
        })
        .collect();

    let mut state = ListState::default().with_selected(Some(controller.selected_index));
    f.render_stateful_widget(List::new(items).block(block), area, &mut state);
}

fn row_line(projects: &[Project], row: FlatRow) -> Line<'static> {
    let project = &projects[row.project];
    match row.step {
        None => project_line(project),
        Some(index) => step_line(&project.steps[index], index + 1 == project.steps.len()),
    }
}

/// Format: ● Garden  2/5
fn project_line(project: &Project) -> Line<'static> {
    let done = project.steps.iter().filter(|s| s.done).count();
    Line::from(vec![
        Span::styled("● ".to_string(), project_style(&project.color)),
        Span::styled(project.title.clone(), project_style(&project.color)),
        Span::styled(format!("  {}/{}", done, project.steps.len()), hint_style()),
    ])
}

/// Format:    ├─ [x] Buy seeds
fn step_line(step: &Step, is_last: bool) -> Line<'static> {
    let mut spans = vec![
        Span::styled("   ".to_string(), tree_style()),
        Span::styled(tree_connector(is_last).to_string(), tree_style()),
        Span::raw(" ".to_string()),
    ];
    if step.done {
        spans.push(Span::raw("[x] ".to_string()));
        spans.push(Span::styled(step.title.clone(), done_style()));
    } else {
        spans.push(Span::raw("[ ] ".to_string()));
        spans.push(Span::raw(step.title.clone()));
    }
    Line::from(spans)
}
