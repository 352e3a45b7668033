mod abortable_task;
pub mod task;
pub mod unblock;

use std::sync::OnceLock;

use tokio::runtime::{Handle, Runtime};
use tracing::debug;

pub use abortable_task::AbortableTask;

pub(crate) static TOKIO: OnceLock<Handle> = OnceLock::new();
static OWNED_RUNTIME: OnceLock<Runtime> = OnceLock::new();

/// Capture the runtime used for background tasks
///
/// Uses the current runtime when called from inside one, otherwise builds a
/// multi threaded runtime owned by this crate for the life of the process.
pub fn init() {
    if is_tokio_initialized() {
        return;
    }

    if let Ok(handle) = Handle::try_current() {
        let _ = TOKIO.set(handle);
        return;
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            tracing::error!("unable to build tokio runtime: {error}");
            return;
        }
    };

    debug!("started owned tokio runtime");
    let handle = runtime.handle().clone();
    let _ = OWNED_RUNTIME.set(runtime);
    let _ = TOKIO.set(handle);
}

pub fn is_tokio_initialized() -> bool {
    TOKIO.get().is_some()
}
