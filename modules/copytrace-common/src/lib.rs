pub mod config;
pub mod error;
pub mod locale;
pub mod types;

pub use config::{Config, Tuning};
pub use error::CopytraceError;
pub use locale::Locale;
pub use types::*;
