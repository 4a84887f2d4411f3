use serde_json::Value;

use ads_core::format::{self, OutputMode};
use ads_core::{Dispatcher, Error, HttpMethod, ParamValue, Result};

use super::json_object;
use crate::args::RawArgs;

pub fn run(dispatcher: &Dispatcher, args: &RawArgs, mode: OutputMode) -> Result<String> {
    let method = HttpMethod::parse(&args.method)
        .ok_or_else(|| Error::Configuration(format!("unsupported HTTP method {}", args.method)))?;

    let query = json_object("--query", args.query.as_deref())?
        .iter()
        .map(|(name, value)| {
            ParamValue::from_json(value)
                .map(|encoded| (name.clone(), encoded))
                .map_err(|e| Error::Encoding(format!("{name}: {e}")))
        })
        .collect::<Result<Vec<_>>>()?;

    let body = match args.body.as_deref() {
        None => None,
        Some(_) if method.is_query_only() => {
            return Err(Error::Configuration(format!("{method} requests take no --body")));
        }
        Some(text) => Some(
            serde_json::from_str::<Value>(text)
                .map_err(|e| Error::Encoding(format!("--body is not valid JSON: {e}")))?,
        ),
    };

    let request = dispatcher.plan(method, &args.path, &query, body.as_ref(), &[])?;
    let response = dispatcher.execute(&request)?;
    Ok(format::render(&response, mode))
}
