use super::enums::{Priority, ProjectStatus};
use crate::error::AnalysisError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A project proposed by the LLM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedProject {
    pub name: String,
    pub description: String,
    pub status: ProjectStatus,
}

/// A task proposed by the LLM, linked to a project by name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedTask {
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub project_name: String,
}

/// Free-text reflections extracted from a transcript
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Insights {
    pub dreams: Vec<String>,
    pub difficulties: Vec<String>,
    pub goals: Vec<String>,
}

impl Insights {
    pub fn is_empty(&self) -> bool {
        self.dreams.is_empty() && self.difficulties.is_empty() && self.goals.is_empty()
    }
}

/// Structured output of one transcript analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub projects: Vec<GeneratedProject>,
    pub tasks: Vec<GeneratedTask>,
    pub insights: Insights,
}

pub const FALLBACK_PROJECT: &str = "Captured thoughts";
pub const FALLBACK_TASK: &str = "Review what you captured";

impl AnalysisResult {
    /// Canned result used whenever analysis fails
    pub fn fallback() -> Self {
        Self {
            projects: vec![GeneratedProject {
                name: FALLBACK_PROJECT.to_string(),
                description: "Ideas from your latest capture".to_string(),
                status: ProjectStatus::Active,
            }],
            tasks: vec![GeneratedTask {
                title: FALLBACK_TASK.to_string(),
                description: "Go through the capture and turn it into concrete steps".to_string(),
                priority: Priority::Medium,
                project_name: FALLBACK_PROJECT.to_string(),
            }],
            insights: Insights::default(),
        }
    }

    pub fn is_fallback(&self) -> bool {
        *self == Self::fallback()
    }

    /// Read the LLM's JSON object into a result.
    ///
    /// `projects`, `tasks` and `insights` must all be present; entries inside
    /// them are read leniently (missing strings become empty, unknown enum
    /// values take their defaults, entries without a name/title are skipped).
    pub fn from_json(value: &Value) -> Result<Self, AnalysisError> {
        let obj = value.as_object().ok_or(AnalysisError::Schema("projects"))?;
        let projects = obj
            .get("projects")
            .and_then(Value::as_array)
            .ok_or(AnalysisError::Schema("projects"))?;
        let tasks = obj
            .get("tasks")
            .and_then(Value::as_array)
            .ok_or(AnalysisError::Schema("tasks"))?;
        let insights = obj
            .get("insights")
            .and_then(Value::as_object)
            .ok_or(AnalysisError::Schema("insights"))?;

        let projects = projects
            .iter()
            .filter_map(|p| {
                let name = str_field(p, "name");
                if name.is_empty() {
                    return None;
                }
                Some(GeneratedProject {
                    name,
                    description: str_field(p, "description"),
                    status: ProjectStatus::parse_lossy(&str_field(p, "status")),
                })
            })
            .collect();

        let tasks = tasks
            .iter()
            .filter_map(|t| {
                let title = str_field(t, "title");
                if title.is_empty() {
                    return None;
                }
                Some(GeneratedTask {
                    title,
                    description: str_field(t, "description"),
                    priority: Priority::parse_lossy(&str_field(t, "priority")),
                    project_name: str_field(t, "project_name"),
                })
            })
            .collect();

        let list = |key: &str| -> Vec<String> {
            insights
                .get(key)
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default()
        };

        Ok(Self {
            projects,
            tasks,
            insights: Insights {
                dreams: list("dreams"),
                difficulties: list("difficulties"),
                goals: list("goals"),
            },
        })
    }
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}
