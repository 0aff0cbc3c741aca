//! Automatic capture of params and metrics around a training call.
//!
//! The interceptor is an explicit wrapper applied at the call site - a
//! composable function, not a runtime patch on someone else's library.
//! It records the training configuration before the call and timing (plus
//! optional evaluation scores) after it.
//!
//! The one inviolable rule: instrumentation must never break the job it
//! observes. Every introspection or scoring failure - an `Err`, a panic,
//! a closed run - is caught, recorded under [`AUTOLOG_WARNING_TAG`], and
//! swallowed. The training call's return value and errors pass through
//! untouched.

use crate::context::RunContext;
use crate::record::ParamValue;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;
use tracing::warn;

/// Tag collecting autolog-internal failures, so they surface in the run's
/// metadata instead of in the training job's control flow.
pub const AUTOLOG_WARNING_TAG: &str = "autolog_warning";

/// Metric key for the training call's elapsed wall-clock time.
pub const ELAPSED_METRIC: &str = "fit.elapsed_seconds";

/// An explicit, enumerated snapshot of a training configuration.
///
/// This is the typed replacement for "log whatever kwargs happen to exist":
/// implementors enumerate their recognized scalar fields in [`params`], and
/// route anything that is not a recognized hyperparameter through
/// [`extra_tags`]. Nothing is silently accepted as arbitrary state.
///
/// [`params`]: HyperParams::params
/// [`extra_tags`]: HyperParams::extra_tags
pub trait HyperParams {
    /// The recognized scalar hyperparameters, one param per field.
    fn params(&self) -> Vec<(String, ParamValue)>;

    /// Anything descriptive that is not a hyperparameter (freeform labels,
    /// notes). Logged as tags.
    fn extra_tags(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}

/// Wraps a fit-like training boundary over an open [`RunContext`].
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use trueno_track::client::TrackingUri;
/// use trueno_track::record::ParamValue;
/// use trueno_track::{Autolog, ExperimentRegistry, HyperParams, RunContext, RunOutcome};
///
/// struct ForestConfig {
///     max_depth: u32,
///     n_estimators: u32,
/// }
///
/// impl HyperParams for ForestConfig {
///     fn params(&self) -> Vec<(String, ParamValue)> {
///         vec![
///             ("max_depth".to_string(), self.max_depth.into()),
///             ("n_estimators".to_string(), self.n_estimators.into()),
///         ]
///     }
/// }
///
/// # fn example() -> trueno_track::Result<()> {
/// let client = TrackingUri::Memory.connect()?;
/// let registry = ExperimentRegistry::new(Arc::clone(&client));
/// let experiment = registry.resolve_or_create("Wine")?;
///
/// let mut ctx = RunContext::new(client);
/// ctx.open(&experiment)?;
///
/// let config = ForestConfig { max_depth: 2, n_estimators: 8 };
/// let fitted: Result<Vec<f64>, std::io::Error> =
///     Autolog::new(&mut ctx).fit(&config, || Ok(vec![0.1, 0.9]));
/// assert!(fitted.is_ok());
///
/// ctx.close(RunOutcome::Success)?;
/// # Ok(())
/// # }
/// ```
pub struct Autolog<'a> {
    ctx: &'a mut RunContext,
}

impl<'a> Autolog<'a> {
    /// Attach the interceptor to a run context.
    #[must_use]
    pub fn new(ctx: &'a mut RunContext) -> Self {
        Self { ctx }
    }

    /// Run the training call with config capture and timing.
    ///
    /// The configuration's scalars are logged as params before the call and
    /// its elapsed wall-clock time as [`ELAPSED_METRIC`] after it. The
    /// closure's result is returned exactly as produced.
    pub fn fit<C, T, E, F>(&mut self, config: &C, train: F) -> std::result::Result<T, E>
    where
        C: HyperParams,
        F: FnOnce() -> std::result::Result<T, E>,
    {
        self.capture_config(config);

        let started = Instant::now();
        let result = train();
        let elapsed = started.elapsed().as_secs_f64();

        if let Err(e) = self.ctx.log_metric(ELAPSED_METRIC, elapsed, 0) {
            self.note_warning(&format!("elapsed metric not recorded: {e}"));
        }
        result
    }

    /// Like [`fit`], plus an evaluation step over the fitted value: the
    /// scoring closure's `(key, value)` pairs are logged as metrics at
    /// step 0. Scoring runs only on success, and a scoring failure (Err-free
    /// by signature, but panics count) never reaches the caller.
    ///
    /// [`fit`]: Autolog::fit
    pub fn fit_scored<C, T, E, F, S>(
        &mut self,
        config: &C,
        train: F,
        score: S,
    ) -> std::result::Result<T, E>
    where
        C: HyperParams,
        F: FnOnce() -> std::result::Result<T, E>,
        S: FnOnce(&T) -> Vec<(String, f64)>,
    {
        let result = self.fit(config, train);
        if let Ok(fitted) = &result {
            match catch_unwind(AssertUnwindSafe(|| score(fitted))) {
                Ok(scores) => {
                    for (key, value) in scores {
                        if let Err(e) = self.ctx.log_metric(key, value, 0) {
                            self.note_warning(&format!("score metric not recorded: {e}"));
                        }
                    }
                }
                Err(panic) => {
                    self.note_warning(&format!(
                        "evaluation step panicked: {}",
                        panic_message(panic.as_ref())
                    ));
                }
            }
        }
        result
    }

    fn capture_config<C: HyperParams>(&mut self, config: &C) {
        match catch_unwind(AssertUnwindSafe(|| config.params())) {
            Ok(params) => {
                for (key, value) in params {
                    if let Err(e) = self.ctx.log_param(key, value) {
                        self.note_warning(&format!("param not recorded: {e}"));
                    }
                }
            }
            Err(panic) => {
                self.note_warning(&format!(
                    "config introspection panicked: {}",
                    panic_message(panic.as_ref())
                ));
            }
        }

        match catch_unwind(AssertUnwindSafe(|| config.extra_tags())) {
            Ok(tags) => {
                for (key, value) in tags {
                    if let Err(e) = self.ctx.set_tag(key, value) {
                        self.note_warning(&format!("tag not recorded: {e}"));
                    }
                }
            }
            Err(panic) => {
                self.note_warning(&format!(
                    "extra tag introspection panicked: {}",
                    panic_message(panic.as_ref())
                ));
            }
        }
    }

    fn note_warning(&mut self, message: &str) {
        warn!(message, "autolog failure swallowed");
        // If the tag cannot be recorded either, the tracing line is all that remains.
        let _ = self.ctx.set_tag(AUTOLOG_WARNING_TAG, message);
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "opaque panic payload".to_string()
    }
}
