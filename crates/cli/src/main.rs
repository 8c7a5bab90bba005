use std::process::ExitCode;

fn main() -> ExitCode {
    overtime_cli::run()
}
