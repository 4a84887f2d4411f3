//! Logger setup.
//!
//! `RUST_LOG` is honored. Without it the CLI logs warnings only, or
//! everything down to debug under `--debug`.

use env_logger::Env;

pub fn init(debug: bool) {
    let default = if debug { "debug" } else { "warn" };
    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or(default));
    if debug {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.format_timestamp_millis();
    // A logger may already be installed when running under a test harness.
    let _ = builder.try_init();
}
