use super::enums::{Priority, STATUS_DONE};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// Colour tags cycled over projects that have no stored colour
pub const PALETTE: &[&str] = &["coral", "amber", "lime", "teal", "sky", "violet", "rose"];

/// Row id as stored: text ids and bigint ids both occur
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(serde_json::Number),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(s) => s,
            RawId::Number(n) => n.to_string(),
        }
    }
}

fn id_text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    RawId::deserialize(d).map(String::from)
}

fn opt_id_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Option::<RawId>::deserialize(d).map(|raw| raw.map(String::from))
}

/// Row shape of the `projects` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRow {
    #[serde(deserialize_with = "id_text")]
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub position: Option<i64>,
}

/// Row shape of the `tasks` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRow {
    #[serde(deserialize_with = "id_text")]
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "opt_id_text")]
    pub project_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub position: Option<i64>,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    #[serde(default)]
    pub is_core: Option<bool>,
}

impl TaskRow {
    pub fn is_done(&self) -> bool {
        self.status.as_deref() == Some(STATUS_DONE)
    }
}

/// A step (task) owned by exactly one project
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub id: String,
    pub title: String,
    pub done: bool,
    pub position: Option<i64>,
    pub priority: Priority,
    pub description: Option<String>,
    pub duration_minutes: Option<u32>,
    pub core: bool,
}

impl Step {
    pub fn new(id: String, title: String) -> Self {
        Self {
            id,
            title,
            done: false,
            position: None,
            priority: Priority::Medium,
            description: None,
            duration_minutes: None,
            core: false,
        }
    }

    pub fn from_row(row: TaskRow) -> Self {
        let done = row.is_done();
        Self {
            id: row.id,
            title: row.title,
            done,
            position: row.position,
            priority: row
                .priority
                .as_deref()
                .map(Priority::parse_lossy)
                .unwrap_or(Priority::Medium),
            description: row.description.filter(|d| !d.trim().is_empty()),
            duration_minutes: row.duration_minutes,
            core: row.is_core.unwrap_or(false),
        }
    }
}

/// A project with its ordered steps
#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    pub id: String,
    pub title: String,
    pub color: String,
    pub steps: Vec<Step>,
    pub position: Option<i64>,
}

impl Project {
    pub fn new(id: String, title: String, color: String) -> Self {
        Self {
            id,
            title,
            color,
            steps: Vec::new(),
            position: None,
        }
    }

    pub fn remaining_steps(&self) -> impl Iterator<Item = &Step> {
        self.steps.iter().filter(|s| !s.done)
    }

    pub fn step_index(&self, step_id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id == step_id)
    }
}

/// Colour for the project at `index` when the row carries none
pub fn palette_color(index: usize) -> String {
    PALETTE[index % PALETTE.len()].to_string()
}

/// Build projects from rows, attaching each task to its project by id.
///
/// Rows are expected in display order already; steps are stably sorted by
/// position, with unpositioned steps after positioned ones. Tasks whose
/// project is unknown are dropped.
pub fn assemble_projects(project_rows: Vec<ProjectRow>, task_rows: Vec<TaskRow>) -> Vec<Project> {
    let mut by_project: HashMap<String, Vec<Step>> = HashMap::new();
    for row in task_rows {
        if let Some(pid) = row.project_id.clone() {
            by_project.entry(pid).or_default().push(Step::from_row(row));
        }
    }

    project_rows
        .into_iter()
        .enumerate()
        .map(|(index, row)| {
            let mut steps = by_project.remove(&row.id).unwrap_or_default();
            steps.sort_by_key(|s| (s.position.is_none(), s.position.unwrap_or(0)));
            Project {
                color: row.color.unwrap_or_else(|| palette_color(index)),
                id: row.id,
                title: row.name,
                steps,
                position: row.position,
            }
        })
        .collect()
}
