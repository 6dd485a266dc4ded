use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::Args;
use closelink_core::webhook::TriggerObject;
use closelink_crm::Poller;
use serde_json::Value;

use super::{close_client, load_config, runtime, state, CommandResult, EXIT_INPUT};

const COMMAND: &str = "poll";

#[derive(Debug, Clone, Args)]
pub struct PollArgs {
    #[arg(long, help = "Trigger object to poll, e.g. lead, task, customActivity")]
    pub object: String,
    #[arg(long, help = "JSON file holding the last poll timestamp")]
    pub state: PathBuf,
}

pub fn run(args: PollArgs) -> CommandResult {
    let Some(object) = TriggerObject::parse(&args.object) else {
        return CommandResult::failure(
            COMMAND,
            "invalid_input",
            format!("unknown trigger object `{}`", args.object),
            EXIT_INPUT,
        );
    };

    let mut stored = match state::load(COMMAND, &args.state) {
        Ok(stored) => stored,
        Err(result) => return result,
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

    let poller = Poller::new(Arc::new(client));
    let seeded = stored.last_polled_timestamp.is_none();
    let records = match runtime.block_on(poller.poll(&mut stored, object, Utc::now())) {
        Ok(records) => records,
        Err(error) => return CommandResult::crm_failure(COMMAND, &error),
    };
    if let Err(result) = state::save(COMMAND, &args.state, &stored) {
        return result;
    }

    let message = if seeded {
        format!("first poll for {}; starting point recorded", object.as_str())
    } else {
        format!("{} new {} record(s)", records.len(), object.as_str())
    };
    CommandResult::success_with_data(COMMAND, message, Value::Array(records))
}
