//! Job orchestration for Assay.
//!
//! Runs stored analyses as ordered lists of external step programs over a
//! per-job artifact directory, tracks every run in SQLite, and packs finished
//! workspaces into streamed zip archives.

pub mod archive;
pub mod directory;
pub mod error;
pub mod executor;
pub mod runner;
pub mod settings;
pub mod store;
pub mod types;
pub mod workflow;

pub use archive::{ArchiveBuilder, ArchiveStream, write_archive};
pub use directory::ArtifactStore;
pub use error::{JobError, Result};
pub use executor::{ExecutorConfig, Interpreters, StepError, StepExecutor, StepReport};
pub use runner::{PipelineRunner, TriggeredJob};
pub use settings::AnalysisSettings;
pub use store::{JobOutcome, JobStore};
pub use types::{AnalysisDefinition, JobRecord, JobStatus, new_id, parse_id};
pub use workflow::{StepDescriptor, StepKind, Workflow, parse_steps, parse_workflow};
