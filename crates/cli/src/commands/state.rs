//! The CLI plays host for webhook and polling commands: their state lives
//! in a JSON file passed with `--state`.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use closelink_core::domain::state::StaticState;

use super::{CommandResult, EXIT_STATE};

pub fn load(command: &str, path: &Path) -> Result<StaticState, CommandResult> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(StaticState::default()),
        Err(error) => {
            return Err(state_failure(command, path, format!("could not read state: {error}")))
        }
    };
    if raw.trim().is_empty() {
        return Ok(StaticState::default());
    }

    serde_json::from_str(&raw)
        .map_err(|error| state_failure(command, path, format!("state is not valid JSON: {error}")))
}

pub fn save(command: &str, path: &Path, state: &StaticState) -> Result<(), CommandResult> {
    let serialized = serde_json::to_string_pretty(state)
        .map_err(|error| state_failure(command, path, format!("could not encode state: {error}")))?;

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|error| {
            state_failure(command, path, format!("could not create state directory: {error}"))
        })?;
    }
    fs::write(path, serialized)
        .map_err(|error| state_failure(command, path, format!("could not write state: {error}")))
}

fn state_failure(command: &str, path: &Path, message: String) -> CommandResult {
    CommandResult::failure(command, "state_file", format!("{}: {message}", path.display()), EXIT_STATE)
}
