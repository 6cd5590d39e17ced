use std::process::ExitCode;

fn main() -> ExitCode {
    hrflow_cli::run()
}
