use serde::{Deserialize, Serialize};

/// Top-level screens, in tab order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Screen {
    Capture,
    Projects,
    Focus,
}

impl Screen {
    pub fn name(&self) -> &'static str {
        match self {
            Screen::Capture => "Capture",
            Screen::Projects => "Projects",
            Screen::Focus => "Focus",
        }
    }

    pub fn all() -> &'static [Screen] {
        &[Screen::Capture, Screen::Projects, Screen::Focus]
    }

    pub fn next(&self) -> Screen {
        match self {
            Screen::Capture => Screen::Projects,
            Screen::Projects => Screen::Focus,
            Screen::Focus => Screen::Capture,
        }
    }

    pub fn prev(&self) -> Screen {
        match self {
            Screen::Capture => Screen::Focus,
            Screen::Projects => Screen::Capture,
            Screen::Focus => Screen::Projects,
        }
    }
}

/// UI mode for the application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiMode {
    Normal,
    EditingTranscript,
    TitleInput,
    LoginForm,
    Help,
}

/// Task priority as stored remotely and produced by the LLM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    /// Parse a priority, treating anything unrecognised as medium
    pub fn parse_lossy(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "low" => Priority::Low,
            "high" => Priority::High,
            _ => Priority::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

/// Difficulty shown on a focus card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difficulty {
    Low,
    Medium,
    High,
}

impl From<Priority> for Difficulty {
    fn from(p: Priority) -> Self {
        match p {
            Priority::Low => Difficulty::Low,
            Priority::Medium => Difficulty::Medium,
            Priority::High => Difficulty::High,
        }
    }
}

impl Difficulty {
    pub fn label(&self) -> &'static str {
        match self {
            Difficulty::Low => "easy",
            Difficulty::Medium => "medium",
            Difficulty::High => "hard",
        }
    }
}

/// Lifecycle status of a project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Active,
    Archived,
    Completed,
}

impl ProjectStatus {
    /// Parse a status, treating anything unrecognised as active
    pub fn parse_lossy(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "archived" => ProjectStatus::Archived,
            "completed" => ProjectStatus::Completed,
            _ => ProjectStatus::Active,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Active => "active",
            ProjectStatus::Archived => "archived",
            ProjectStatus::Completed => "completed",
        }
    }
}

/// Status column values for task rows
pub const STATUS_TODO: &str = "todo";
pub const STATUS_DONE: &str = "done";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_parse_lossy() {
        assert_eq!(Priority::parse_lossy("HIGH"), Priority::High);
        assert_eq!(Priority::parse_lossy(" low "), Priority::Low);
        assert_eq!(Priority::parse_lossy("urgent"), Priority::Medium);
        assert_eq!(Priority::parse_lossy(""), Priority::Medium);
    }

    #[test]
    fn test_project_status_parse_lossy() {
        assert_eq!(ProjectStatus::parse_lossy("archived"), ProjectStatus::Archived);
        assert_eq!(ProjectStatus::parse_lossy("Completed"), ProjectStatus::Completed);
        assert_eq!(ProjectStatus::parse_lossy("paused"), ProjectStatus::Active);
    }

    #[test]
    fn test_screen_cycle() {
        for screen in Screen::all() {
            assert_eq!(screen.next().prev(), *screen);
        }
        assert_eq!(Screen::Focus.next(), Screen::Capture);
    }

    #[test]
    fn test_difficulty_from_priority() {
        assert_eq!(Difficulty::from(Priority::High), Difficulty::High);
        assert_eq!(Difficulty::from(Priority::Low).label(), "easy");
    }
}
