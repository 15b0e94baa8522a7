pub mod error;
pub mod ithenticate;
pub mod traits;

pub use error::{Result, SimilarityError};
pub use ithenticate::IthenticateClient;
pub use traits::{SimilarityService, SourceRecord, SubmissionReport, SubmissionState};
