//! Process entry point: parse CLI flags, install logging and signal
//! handlers, optionally daemonize, write the PID file, then hand off to the
//! session state machine.
use std::io::Write;

use log::{error, info};

use m20d::config;
use m20d::session::{exit_code, Runner};
use m20d::signals::SignalFlags;

fn main() {
    let config = config::parse(std::env::args());
    m20d::logging::init(&config.log_name, config.log_level, config.log_destination);

    if config.daemonize {
        if let Err(e) = daemonize() {
            eprintln!("fork failure while daemonizing: {}", e);
            std::process::exit(exit_code::OPTION_ERROR);
        }
    }

    if let Some(pid_file) = &config.pid_file {
        if let Err(e) = write_pid_file(pid_file) {
            error!("could not write pid file {}: {}", pid_file.display(), e);
            std::process::exit(exit_code::OPTION_ERROR);
        }
    }

    let signals = match SignalFlags::install() {
        Ok(flags) => flags,
        Err(e) => {
            error!("could not install signal handlers: {}", e);
            std::process::exit(exit_code::OPTION_ERROR);
        }
    };

    info!("m20d starting on {}", config.device);
    let runner = Runner::new(config, signals);
    let code = runner.run();
    std::process::exit(code);
}

/// Double-forks into the background the way a traditional Unix daemon
/// does, letting the parent exit once the grandchild is running detached
/// from its controlling terminal.
fn daemonize() -> Result<(), nix::Error> {
    use nix::unistd::{fork, setsid, ForkResult};

    match unsafe { fork() }? {
        ForkResult::Parent { .. } => std::process::exit(exit_code::NORMAL),
        ForkResult::Child => {}
    }
    setsid()?;
    match unsafe { fork() }? {
        ForkResult::Parent { .. } => std::process::exit(exit_code::NORMAL),
        ForkResult::Child => {}
    }
    Ok(())
}

fn write_pid_file(path: &std::path::Path) -> std::io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    writeln!(file, "{}", std::process::id())
}
