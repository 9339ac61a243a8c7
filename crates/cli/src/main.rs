use std::process::ExitCode;

fn main() -> ExitCode {
    proptalk_cli::run()
}
