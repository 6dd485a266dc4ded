use std::sync::Arc;

use clap::Args;
use closelink_core::domain::operation::{Operation, OperationRequest, Resource};
use closelink_crm::Executor;
use serde_json::Value;

use super::{close_client, load_config, runtime, CommandResult, EXIT_INPUT};

const COMMAND: &str = "invoke";

#[derive(Debug, Clone, Args)]
pub struct InvokeArgs {
    #[arg(help = "Resource name, e.g. lead, opportunityStatus, customActivity")]
    pub resource: String,
    #[arg(help = "Operation name, e.g. create, get, find, update, delete, list")]
    pub operation: String,
    #[arg(
        long,
        default_value = "{}",
        help = "Parameters as a JSON object, or an array of objects to run a batch"
    )]
    pub params: String,
    #[arg(long, help = "Record per-item failures in the output instead of aborting the batch")]
    pub continue_on_fail: bool,
}

pub fn run(args: InvokeArgs) -> CommandResult {
    let requests = match build_requests(&args) {
        Ok(requests) => requests,
        Err(message) => return CommandResult::failure(COMMAND, "invalid_input", message, EXIT_INPUT),
    };

    let config = match load_config(COMMAND) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let client = match close_client(COMMAND, &config) {
        Ok(client) => client,
        Err(result) => return result,
    };
    let runtime = match runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let executor = Executor::new(Arc::new(client));
    let result = runtime.block_on(executor.run_batch(&requests, args.continue_on_fail));

    match result {
        Ok(records) => CommandResult::success_with_data(
            COMMAND,
            format!("{} {} returned {} record(s)", args.resource, args.operation, records.len()),
            Value::Array(records),
        ),
        Err(error) => CommandResult::crm_failure(COMMAND, &error),
    }
}

fn build_requests(args: &InvokeArgs) -> Result<Vec<OperationRequest>, String> {
    let resource = Resource::parse(&args.resource)
        .ok_or_else(|| format!("unknown resource `{}`", args.resource))?;
    let operation = Operation::parse(&args.operation)
        .ok_or_else(|| format!("unknown operation `{}`", args.operation))?;

    let params: Value = serde_json::from_str(&args.params)
        .map_err(|error| format!("--params is not valid JSON: {error}"))?;
    let items = match params {
        Value::Array(items) => items,
        single @ Value::Object(_) => vec![single],
        _ => return Err("--params must be a JSON object or an array of objects".to_string()),
    };
    if items.is_empty() {
        return Err("--params contains no items".to_string());
    }

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(_) => Ok(OperationRequest::new(resource, operation, item)),
            _ => Err(format!("--params item {index} is not a JSON object")),
        })
        .collect()
}
