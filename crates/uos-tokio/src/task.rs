use std::future::Future;

use tokio::{runtime::Handle, task::JoinHandle};

use crate::TOKIO;

/// The runtime of the caller wins over the global one, so tasks spawned from
/// inside an async context stay on that context's runtime
fn handle() -> Handle {
    Handle::try_current().ok().or_else(|| TOKIO.get().cloned()).expect(
        "tokio runtime not initialized, call uos_tokio::init first or spawn from inside a runtime",
    )
}

pub fn spawn<T>(task: T) -> JoinHandle<T::Output>
where
    T: Future + Send + 'static,
    T::Output: Send + 'static,
{
    handle().spawn(task)
}

pub fn spawn_blocking<F, R>(f: F) -> JoinHandle<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    handle().spawn_blocking(f)
}
