mod progress;
mod service;
mod timer;
mod workflow;

// Public API of the session subsystem.
pub use crate::error::SessionError;
pub use progress::{SessionOutcome, SessionProgress};
pub use service::ExamSession;
pub use workflow::{AnswerOutcome, ExamWorkflow};
