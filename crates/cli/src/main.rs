use std::process::ExitCode;

fn main() -> ExitCode {
    closelink_cli::run()
}
