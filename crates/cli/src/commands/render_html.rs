use std::io::Read;

use clap::Args;
use closelink_core::richtext::plain_text_to_html;
use serde_json::json;

use super::{CommandResult, EXIT_INPUT};

const COMMAND: &str = "render-html";

#[derive(Debug, Clone, Args)]
pub struct RenderHtmlArgs {
    #[arg(long, help = "Plain text to convert; read from stdin when omitted")]
    pub text: Option<String>,
}

pub fn run(args: RenderHtmlArgs) -> CommandResult {
    let text = match args.text {
        Some(text) => text,
        None => {
            let mut buffer = String::new();
            if let Err(error) = std::io::stdin().read_to_string(&mut buffer) {
                return CommandResult::failure(
                    COMMAND,
                    "invalid_input",
                    format!("could not read stdin: {error}"),
                    EXIT_INPUT,
                );
            }
            buffer
        }
    };

    render(&text)
}

pub fn render(text: &str) -> CommandResult {
    let html = plain_text_to_html(text);
    CommandResult::success_with_data(COMMAND, "converted plain text to HTML", json!({ "html": html }))
}
