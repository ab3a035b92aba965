//! Public types for the talkwalk API.

mod completion;
mod findings;
mod summary;
mod task;

pub use completion::{Completion, CompletionRequest, TokenUsage};
pub use findings::{CompanyAnalysis, CompanyFindings, DocumentReference};
pub use summary::{ExcludedCompany, RunSummary};
pub use task::{TaskCategory, TaskParams, TaskSpec};
