use tracing_subscriber::{EnvFilter, fmt};

const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber, filtered by `RUST_LOG`
///
/// Safe to call more than once, only the first call installs anything.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    if fmt().with_env_filter(filter).with_target(true).try_init().is_ok() {
        tracing::debug!("logging initialized");
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_init_twice() {
        super::init();
        super::init();
    }
}
