//! Registration: input validation and the approval workflow.

pub mod validation;
mod workflow;

pub use validation::ValidationError;
pub use workflow::{
    normalize_submission, ApproveOutcome, ApprovedEntry, ClientInfo, DirectoryStatus,
    ReApproveOutcome, RejectOutcome, Submission, Workflow, WorkflowError,
    DEFAULT_REJECTION_REASON, TAKEN_OVER_NOTE,
};
