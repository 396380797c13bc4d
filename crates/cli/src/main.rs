use std::process::ExitCode;

fn main() -> ExitCode {
    devolucion_cli::run()
}
