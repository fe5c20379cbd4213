use std::process::ExitCode;

fn main() -> ExitCode {
    melodex_cli::run()
}
