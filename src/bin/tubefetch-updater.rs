// Installer helper: applies a staged update after the app has exited

use std::process::ExitCode;
use tubefetch_lib::logging::init_console_logging;
use tubefetch_lib::update::helper::{run_from_args, SETTLE_DELAY};

fn main() -> ExitCode {
    init_console_logging();
    ExitCode::from(run_from_args(std::env::args_os().skip(1), SETTLE_DELAY))
}
