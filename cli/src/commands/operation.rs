use log::debug;
use serde_json::{Map, Value};

use ads_core::format::{self, OutputMode};
use ads_core::{Dispatcher, Operation, OperationCall, Result};

use super::json_object;
use crate::args::{param_flag, OperationArgs};

pub fn run(
    dispatcher: &Dispatcher,
    resource: &str,
    op: &Operation,
    args: &OperationArgs,
    flagged: Map<String, Value>,
    mode: OutputMode,
) -> Result<String> {
    let mut params = json_object("--params", args.params.as_deref())?;
    for (name, value) in flagged {
        if params.insert(name.clone(), value).is_some() {
            debug!("--{} overrides {name} from --params", param_flag(&name));
        }
    }
    let call = OperationCall {
        id: args.id.clone(),
        params,
        fields: args.fields.clone(),
    };
    let request = dispatcher.plan_operation(resource, op, &call)?;
    debug!("{resource} {}: {} {}", op.name, request.method, request.url);

    if args.all {
        let collected = dispatcher.paginate(request, args.max_pages as usize, args.max_items)?;
        return Ok(format::render_value(&collected, mode));
    }
    let response = dispatcher.execute(&request)?;
    Ok(format::render(&response, mode))
}
