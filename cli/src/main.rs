//! `linkedin-ads`: command-line client for LinkedIn's Rest.li Marketing API.
//!
//! Exit codes: 0 on success, 1 on failure, 2 on usage errors, 3 when an
//! upload's processing outcome is unknown (poll timeout or interrupt).

mod args;
mod commands;
mod config;
mod logging;
mod output;
mod signal;

use std::process;

use ads_core::error::EXIT_FAILURE;
use ads_core::format;
use ads_core::{CancelToken, Catalog};

fn main() {
    let catalog = match Catalog::builtin() {
        Ok(catalog) => catalog,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(EXIT_FAILURE);
        }
    };

    let matches = args::build_command(&catalog).get_matches();
    let global = match args::global_args(&matches) {
        Ok(global) => global,
        Err(e) => e.exit(),
    };
    logging::init(global.debug);

    let cancel = CancelToken::new();
    signal::install(cancel.clone());

    let mode = global.output_mode();
    let code = match commands::run(&catalog, &global, &matches, cancel) {
        Ok(text) => match output::emit(&text) {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("error: writing output: {e}");
                EXIT_FAILURE
            }
        },
        Err(err) => {
            eprintln!("{}", format::render_error(&err, mode));
            err.exit_code()
        }
    };
    process::exit(code);
}
