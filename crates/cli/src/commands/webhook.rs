use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Subcommand};
use closelink_core::config::AppConfig;
use closelink_core::webhook::{TriggerAction, TriggerObject};
use closelink_crm::SubscriptionManager;
use serde_json::json;

use super::{close_client, load_config, runtime, state, CommandResult, EXIT_INPUT};

#[derive(Debug, Clone, Subcommand)]
pub enum WebhookCommand {
    #[command(about = "Register a Close webhook for a trigger and store its id and key")]
    Subscribe(SubscribeArgs),
    #[command(about = "Report whether the stored webhook still exists in Close")]
    Check(StateArgs),
    #[command(about = "Delete the stored webhook from Close and clear local state")]
    Unsubscribe(StateArgs),
}

#[derive(Debug, Clone, Args)]
pub struct StateArgs {
    #[arg(long, help = "JSON file holding the webhook id and signature key")]
    pub state: PathBuf,
}

#[derive(Debug, Clone, Args)]
pub struct SubscribeArgs {
    #[arg(long, help = "JSON file holding the webhook id and signature key")]
    pub state: PathBuf,
    #[arg(long, help = "Trigger object, e.g. lead, opportunity, task")]
    pub object: String,
    #[arg(long, value_delimiter = ',', help = "Comma-separated actions, e.g. created,status_change")]
    pub actions: Vec<String>,
    #[arg(long, help = "Public receiver URL; defaults to webhook.public_url")]
    pub url: Option<String>,
}

pub fn run(command: WebhookCommand) -> CommandResult {
    match command {
        WebhookCommand::Subscribe(args) => subscribe(args),
        WebhookCommand::Check(args) => check(args),
        WebhookCommand::Unsubscribe(args) => unsubscribe(args),
    }
}

struct Context {
    config: AppConfig,
    manager: SubscriptionManager,
    runtime: tokio::runtime::Runtime,
}

fn context(command: &str) -> Result<Context, CommandResult> {
    let config = load_config(command)?;
    let client = close_client(command, &config)?;
    let runtime = runtime(command)?;
    Ok(Context { config, manager: SubscriptionManager::new(Arc::new(client)), runtime })
}

fn subscribe(args: SubscribeArgs) -> CommandResult {
    const COMMAND: &str = "webhook subscribe";

    let (object, actions) = match parse_trigger(&args.object, &args.actions) {
        Ok(parsed) => parsed,
        Err(message) => return CommandResult::failure(COMMAND, "invalid_input", message, EXIT_INPUT),
    };
    let mut stored = match state::load(COMMAND, &args.state) {
        Ok(stored) => stored,
        Err(result) => return result,
    };
    let context = match context(COMMAND) {
        Ok(context) => context,
        Err(result) => return result,
    };

    let url = args.url.or_else(|| context.config.webhook.public_url.clone()).unwrap_or_default();
    let created =
        context.runtime.block_on(context.manager.create(&mut stored, &url, object, &actions));
    let subscription = match created {
        Ok(subscription) => subscription,
        Err(error) => return CommandResult::crm_failure(COMMAND, &error),
    };
    if let Err(result) = state::save(COMMAND, &args.state, &stored) {
        return result;
    }

    CommandResult::success_with_data(
        COMMAND,
        format!("subscribed to {} events", object.as_str()),
        json!({ "webhook_id": subscription.id, "url": url }),
    )
}

fn check(args: StateArgs) -> CommandResult {
    const COMMAND: &str = "webhook check";

    let stored = match state::load(COMMAND, &args.state) {
        Ok(stored) => stored,
        Err(result) => return result,
    };
    if !stored.is_subscribed() {
        return CommandResult::success_with_data(
            COMMAND,
            "no webhook stored",
            json!({ "subscribed": false }),
        );
    }
    let context = match context(COMMAND) {
        Ok(context) => context,
        Err(result) => return result,
    };

    let exists = context.runtime.block_on(context.manager.check_exists(&stored));
    let message = if exists { "webhook is active" } else { "stored webhook was not found in Close" };
    CommandResult::success_with_data(
        COMMAND,
        message,
        json!({ "subscribed": exists, "webhook_id": stored.webhook_id }),
    )
}

fn unsubscribe(args: StateArgs) -> CommandResult {
    const COMMAND: &str = "webhook unsubscribe";

    let mut stored = match state::load(COMMAND, &args.state) {
        Ok(stored) => stored,
        Err(result) => return result,
    };
    if !stored.is_subscribed() {
        return CommandResult::success(COMMAND, "no webhook stored; nothing to delete");
    }
    let context = match context(COMMAND) {
        Ok(context) => context,
        Err(result) => return result,
    };

    let deleted = context.runtime.block_on(context.manager.delete(&mut stored));
    if let Err(error) = deleted {
        return CommandResult::crm_failure(COMMAND, &error);
    }
    if let Err(result) = state::save(COMMAND, &args.state, &stored) {
        return result;
    }
    CommandResult::success(COMMAND, "webhook deleted")
}

fn parse_trigger(object: &str, actions: &[String]) -> Result<(TriggerObject, Vec<TriggerAction>), String> {
    let object =
        TriggerObject::parse(object).ok_or_else(|| format!("unknown trigger object `{object}`"))?;
    let actions = actions
        .iter()
        .filter(|action| !action.trim().is_empty())
        .map(|action| {
            TriggerAction::parse(action).ok_or_else(|| format!("unknown trigger action `{action}`"))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok((object, actions))
}
