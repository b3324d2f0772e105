use std::process::ExitCode;

fn main() -> ExitCode {
    feedstock_cli::run()
}
