use tokio::task::JoinError;

/// Run a blocking closure on the blocking pool and wait for it
pub async fn run_blocking<F, R>(f: F) -> Result<R, JoinError>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    crate::task::spawn_blocking(f).await
}
