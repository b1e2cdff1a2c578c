#![forbid(unsafe_code)]

pub mod catalog_http;
pub mod error;
pub mod sessions;

pub use exam_core::Clock;
pub use sessions as session;

pub use catalog_http::{HttpCatalog, HttpCatalogConfig};
pub use error::{CatalogHttpError, SessionError};

pub use sessions::{AnswerOutcome, ExamSession, ExamWorkflow, SessionOutcome, SessionProgress};
