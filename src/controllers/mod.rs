pub mod capture;
pub mod focus;
pub mod ops;
pub mod projects;
pub mod reorder;
pub mod undo;

pub use capture::{CaptureController, CapturePhase, Review};
pub use focus::{BucketView, FocusController, FocusQueue, SwipeOutcome, SWIPE_THRESHOLD};
pub use ops::{OpKind, OpOutcome};
pub use projects::{FlatRow, ProjectsController, Removed};
