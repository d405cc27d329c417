use std::{env, io, process::ExitCode};

fn main() -> ExitCode {
    link::signal::ignore_sigpipe();
    let stop = link::signal::install_shutdown_handler();

    let mut stderr = io::stderr().lock();
    let status = daemon::run_with_factory(env::args_os(), &mut stderr, Box::new(daemon::native::CephClientFactory), stop);
    daemon::exit_code_from(status)
}
