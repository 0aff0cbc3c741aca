//! # Trueno-Track: Embedded Experiment Tracking Core
//!
//! Trueno-Track lets a training job record its configuration, numeric
//! progress, produced files, and descriptive labels against a durable,
//! queryable history - without the training code being tracking-aware.
//!
//! ## Design
//!
//! - **Buffered facts**: `log_param`/`log_metric`/`set_tag` are local,
//!   non-blocking appends; the network is touched only at close, one batch
//!   per fact kind.
//! - **Guaranteed closure**: a run opened through [`RunContext::scope`]
//!   reaches a terminal state (`Finished` or `Failed`) exactly once, however
//!   control leaves the block.
//! - **Pluggable backends**: in-memory, local file store, or a remote HTTP
//!   service (`http` feature), selected by a tracking URI.
//! - **Explicit autologging**: [`Autolog`] wraps the training call at the
//!   call site; instrumentation failures are swallowed into a warning tag,
//!   never thrown past the job.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use trueno_track::client::TrackingUri;
//! use trueno_track::{ExperimentRegistry, RunContext};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = TrackingUri::from_env()?.connect()?;
//! let registry = ExperimentRegistry::new(Arc::clone(&client));
//! let experiment = registry.resolve_or_create("Wine")?;
//!
//! let mut ctx = RunContext::new(client);
//! let trained = ctx.scope::<_, trueno_track::Error, _>(&experiment, |run| {
//!     run.log_param("max_depth", 2i64)?;
//!     run.log_metric("accuracy", 0.94, 0)?;
//!     Ok("fitted-model")
//! });
//! assert!(trained.is_ok());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod autolog;
pub mod buffer;
pub mod client;
pub mod context;
pub mod error;
pub mod record;
pub mod registry;
pub mod staging;

pub use autolog::{Autolog, HyperParams, AUTOLOG_WARNING_TAG, ELAPSED_METRIC};
pub use buffer::FactBuffer;
pub use context::{
    RunContext, RunOutcome, ScopeError, CODE_VERSION_TAG, FAILURE_REASON_TAG, RUN_NAME_TAG,
};
pub use error::{Error, FactKind, Result};
pub use registry::ExperimentRegistry;
pub use staging::ArtifactStage;
