pub mod analysis;
pub mod enums;
pub mod project;

pub use analysis::{AnalysisResult, GeneratedProject, GeneratedTask, Insights};
pub use enums::{Difficulty, Priority, ProjectStatus, Screen, UiMode, STATUS_DONE, STATUS_TODO};
pub use project::{assemble_projects, palette_color, Project, ProjectRow, Step, TaskRow};
