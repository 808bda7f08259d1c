//! Process-wide entry points over a singleton runtime.
//!
//! Hosts that want the classic load-submit-receive-destroy surface use
//! this module instead of owning an [`InferenceRuntime`] directly. The
//! singleton is constructed on first [`initialization`] and owns a
//! dedicated Tokio runtime, so every function here is synchronous and
//! callable from any thread; concurrent producers and consumers are
//! fine.
//!
//! Each function records its failure in a last-error slot readable
//! through [`error_message`]; an `Ok` return is the equivalent of the
//! conventional zero status code.

use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::engine::EngineFactory;
use crate::error::{Result, RuntimeError, SendError};
use crate::runtime::InferenceRuntime;
use crate::tensor::TensorBundle;

struct GlobalState {
    tokio: tokio::runtime::Runtime,
    runtime: Option<Arc<InferenceRuntime>>,
    last_error: String,
}

static STATE: OnceLock<Mutex<GlobalState>> = OnceLock::new();

fn state() -> Result<&'static Mutex<GlobalState>> {
    STATE.get().ok_or(RuntimeError::ModelLoadFailed {
        reason: "runtime environment is not initialized".into(),
    })
}

fn remember(error: &dyn std::fmt::Display) {
    if let Some(state) = STATE.get() {
        state.lock().unwrap().last_error = error.to_string();
    }
}

/// Prepare the runtime environment and the logging sink.
///
/// Idempotent: repeated calls after a successful one are no-ops.
pub fn initialization() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();

    if STATE.get().is_some() {
        debug!("runtime environment already initialized");
        return Ok(());
    }

    let tokio = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("axon-runtime")
        .build()
        .map_err(|err| RuntimeError::AllocationFailed(format!("tokio runtime: {err}")))?;

    let _ = STATE.set(Mutex::new(GlobalState {
        tokio,
        runtime: None,
        last_error: String::new(),
    }));
    info!("runtime environment initialized");
    Ok(())
}

/// [`initialization`] with host-supplied key/value arguments.
///
/// No keys are recognized today; each is logged and ignored so newer
/// hosts keep working against this runtime.
pub fn initialization_with_args(args: &[(&str, &str)]) -> Result<()> {
    initialization()?;
    for (key, value) in args {
        debug!(key, value, "ignoring unrecognized initialization argument");
    }
    Ok(())
}

/// Load a model through `factory` and start the pipeline.
pub fn model_loading(path: impl AsRef<Path>, factory: &dyn EngineFactory) -> Result<()> {
    let state = state()?;
    let mut guard = state.lock().unwrap();
    if guard.runtime.is_some() {
        let error = RuntimeError::ModelLoadFailed {
            reason: "a model is already loaded".into(),
        };
        guard.last_error = error.to_string();
        return Err(error);
    }

    let loaded = {
        let _enter = guard.tokio.enter();
        InferenceRuntime::load_model(path, factory)
    };
    match loaded {
        Ok(runtime) => {
            guard.runtime = Some(Arc::new(runtime));
            guard.last_error.clear();
            Ok(())
        }
        Err(error) => {
            guard.last_error = error.to_string();
            Err(error)
        }
    }
}

fn active_runtime() -> Result<(Arc<InferenceRuntime>, tokio::runtime::Handle)> {
    let state = state()?;
    let guard = state.lock().unwrap();
    match &guard.runtime {
        Some(runtime) => Ok((runtime.clone(), guard.tokio.handle().clone())),
        None => Err(RuntimeError::ModelLoadFailed {
            reason: "no model is loaded".into(),
        }),
    }
}

/// Submit one input bundle. On failure the bundle rides back inside the
/// error and remains the caller's to free.
pub fn send_input(input: TensorBundle) -> std::result::Result<(), SendError> {
    let (runtime, handle) = match active_runtime() {
        Ok(active) => active,
        Err(error) => {
            remember(&error);
            return Err(SendError::new(input, error));
        }
    };
    let result = handle.block_on(runtime.send_input(input));
    if let Err(err) = &result {
        remember(err);
    }
    result
}

/// Retrieve the next completed bundle, waiting up to `timeout`.
pub fn receive_output(timeout: Duration) -> Result<TensorBundle> {
    let (runtime, handle) = match active_runtime() {
        Ok(active) => active,
        Err(error) => {
            remember(&error);
            return Err(error);
        }
    };
    let result = handle.block_on(runtime.receive_output(timeout));
    if let Err(err) = &result {
        remember(err);
    }
    result
}

/// Orderly shutdown of the loaded pipeline.
///
/// Safe to call without a loaded model and safe to call twice.
pub fn destruction() -> Result<()> {
    let state = state()?;
    let (runtime, handle) = {
        let mut guard = state.lock().unwrap();
        (guard.runtime.take(), guard.tokio.handle().clone())
    };
    if let Some(runtime) = runtime {
        if let Err(error) = handle.block_on(runtime.shutdown()) {
            remember(&error);
            return Err(error);
        }
    }
    info!("runtime environment destroyed");
    Ok(())
}

/// Human-readable message for the last failure, empty when none.
pub fn error_message() -> String {
    STATE
        .get()
        .map(|state| state.lock().unwrap().last_error.clone())
        .unwrap_or_default()
}

/// Version of this runtime library.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Name of this runtime library.
pub fn name() -> &'static str {
    "axon"
}
