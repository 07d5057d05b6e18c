pub mod append;
pub mod config;
pub mod dead_letter;
pub mod error;
pub mod ingest;
pub mod metrics;

pub use append::AppendEngine;
pub use config::IngestConfig;
pub use dead_letter::{DeadLetter, PayloadEncoding};
pub use error::{AppendError, EnvelopeError, PipelineError};
pub use ingest::{spawn_ingest, EnvelopeOutcome, Ingest};
