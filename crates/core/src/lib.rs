pub mod config;
pub mod errors;
pub mod logging;
pub mod models;
pub mod traits;

pub use config::{LauncherDefaults, SubmitPacing};
pub use errors::*;
pub use logging::{init_logging, LogLevel, OutputFormat};
pub use models::{
    BatchState, DerivedInfo, JobBatch, RunConfig, RunContext, SubmissionReport, SubmissionResult,
};
pub use traits::JobScheduler;
