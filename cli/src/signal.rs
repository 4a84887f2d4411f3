//! Ctrl-C handling.
//!
//! The first interrupt cancels the invocation's token: in-flight parts stop
//! at their next checkpoint and polling ends as an unknown outcome. A second
//! interrupt exits immediately.

use std::process;
use std::thread;

use ads_core::CancelToken;
use log::{debug, warn};

const EXIT_INTERRUPTED: i32 = 130;

pub fn install(cancel: CancelToken) {
    let spawned = thread::Builder::new()
        .name("ctrl-c".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(runtime) => runtime,
                Err(e) => {
                    debug!("no runtime for the Ctrl-C listener: {e}");
                    return;
                }
            };
            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
                warn!("interrupted; cancelling (press Ctrl-C again to abort)");
                cancel.cancel();
                if tokio::signal::ctrl_c().await.is_ok() {
                    process::exit(EXIT_INTERRUPTED);
                }
            });
        });
    if let Err(e) = spawned {
        debug!("could not start the Ctrl-C listener: {e}");
    }
}
