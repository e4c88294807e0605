pub mod batch;
pub mod client;

pub use batch::{apply_batch, BatchPlan, BatchSummary};
pub use client::AnalysisClient;
