pub mod address;
pub mod animated_qr;
pub mod config;
pub mod manager;
pub mod multi_frame;
pub mod payload_reader;
pub mod qr_image;
pub mod qr_scanner;
pub mod scan;
pub mod uos;

pub(crate) mod logging;

use std::sync::Once;

uniffi::setup_scaffolding!();

static INIT: Once = Once::new();

/// One time setup, call before using any manager
#[uniffi::export]
pub fn init_core() {
    INIT.call_once(|| {
        logging::init();
        uos_tokio::init();

        #[cfg(debug_assertions)]
        spawn_deadlock_checker();
    });
}

/// Background thread which checks for deadlocks every 10s
#[cfg(debug_assertions)]
fn spawn_deadlock_checker() {
    std::thread::spawn(move || {
        loop {
            std::thread::sleep(std::time::Duration::from_secs(10));
            let deadlocks = parking_lot::deadlock::check_deadlock();
            if deadlocks.is_empty() {
                continue;
            }

            tracing::error!("{} deadlocks detected", deadlocks.len());
            for (i, threads) in deadlocks.iter().enumerate() {
                tracing::error!("deadlock #{i}");
                for thread in threads {
                    tracing::error!("thread id {:#?}", thread.thread_id());
                    tracing::error!("{:#?}", thread.backtrace());
                }
            }
        }
    });
}
