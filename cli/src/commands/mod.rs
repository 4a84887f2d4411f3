//! Command dispatch. Each command returns the text to print on stdout.

mod discover;
mod operation;
mod raw;
mod upload;

use clap::{ArgMatches, FromArgMatches};
use serde_json::{Map, Value};

use ads_core::{CancelToken, Catalog, Dispatcher, Error, MediaKind, Result};

use crate::args::{self, DescribeArgs, GlobalArgs, OperationArgs, RawArgs, UploadArgs};
use crate::config;

pub fn run(
    catalog: &Catalog,
    global: &GlobalArgs,
    matches: &ArgMatches,
    cancel: CancelToken,
) -> Result<String> {
    let mode = global.output_mode();
    let Some((name, sub)) = matches.subcommand() else {
        return Err(Error::Catalog("no command given".to_string()));
    };

    match name {
        "list" => Ok(discover::list(catalog)),
        "describe" => {
            let args = DescribeArgs::from_arg_matches(sub).map_err(usage)?;
            discover::describe(catalog, &args)
        }
        "raw" => {
            let args = RawArgs::from_arg_matches(sub).map_err(usage)?;
            raw::run(&connect(global, cancel)?, &args, mode)
        }
        resource => {
            let Some((op_name, op_matches)) = sub.subcommand() else {
                return Err(Error::Catalog(format!("{resource} needs an operation")));
            };
            if op_name == "upload" {
                let kind: MediaKind = resource.parse()?;
                let args = UploadArgs::from_arg_matches(op_matches).map_err(usage)?;
                return upload::run(&connect(global, cancel)?, kind, &args, mode);
            }
            let op = catalog.operation(resource, op_name)?;
            let args = OperationArgs::from_arg_matches(op_matches).map_err(usage)?;
            let flagged = args::param_values(op, op_matches);
            operation::run(&connect(global, cancel)?, resource, op, &args, flagged, mode)
        }
    }
}

fn connect(global: &GlobalArgs, cancel: CancelToken) -> Result<Dispatcher> {
    Ok(Dispatcher::connect(config::client_config(global))?.with_cancel(cancel))
}

fn usage(err: clap::Error) -> Error {
    Error::Configuration(err.to_string())
}

/// Parse a `--params`/`--query` style flag. It must hold a JSON object.
fn json_object(flag: &str, text: Option<&str>) -> Result<Map<String, Value>> {
    let Some(text) = text else {
        return Ok(Map::new());
    };
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(Error::Encoding(format!("{flag} must be a JSON object"))),
        Err(e) => Err(Error::Encoding(format!("{flag} is not valid JSON: {e}"))),
    }
}
