pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

use commands::invoke::InvokeArgs;
use commands::poll::PollArgs;
use commands::render_html::RenderHtmlArgs;
use commands::webhook::WebhookCommand;

#[derive(Debug, Parser)]
#[command(
    name = "closelink",
    about = "Closelink operator CLI",
    long_about = "Inspect configuration, check Close credentials, run CRM operations, and manage webhook subscriptions.",
    after_help = "Examples:\n  closelink doctor --json\n  closelink invoke lead find --params '{\"filters\":{\"query\":\"acme\"}}'\n  closelink webhook subscribe --state state.json --object lead --actions created,status_change"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config and check the Close credential")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Run one CRM operation, or a batch of them, and print the records")]
    Invoke(InvokeArgs),
    #[command(about = "Convert plain text to the HTML accepted by note bodies")]
    RenderHtml(RenderHtmlArgs),
    #[command(subcommand, about = "Manage the Close webhook subscription for a trigger")]
    Webhook(WebhookCommand),
    #[command(about = "Run one polling cycle for a trigger object")]
    Poll(PollArgs),
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Invoke(args) => commands::invoke::run(args),
        Command::RenderHtml(args) => commands::render_html::run(args),
        Command::Webhook(command) => commands::webhook::run(command),
        Command::Poll(args) => commands::poll::run(args),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
