use std::process::ExitCode;

fn main() -> ExitCode {
    benefitflow_cli::run()
}
