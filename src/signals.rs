//! Signal handling (spec component K). Handlers touch only atomic flags;
//! all actual work happens at the top of the session loop (spec §9's
//! "Global mutable state" redesign note).
//!
//! Grounded in the `signal-hook` crate's `flag::register` API, as used by
//! `DaSigg-srcpd_rust`, plus `nix::sys::signal::signal` for the
//! ignore-only `SIGCHLD`/`SIGPIPE` handling `m20d.c`'s `main()` installs.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nix::sys::signal::{self, SigHandler, Signal};
use signal_hook::consts::{SIGINT, SIGTERM, SIGUSR1};
use signal_hook::flag;

use crate::errors::GatewayResult;

/// Shared shutdown/stats-dump request flags, set from signal handlers and
/// observed at the top of each session-loop iteration.
#[derive(Clone)]
pub struct SignalFlags {
    pub shutdown_requested: Arc<AtomicBool>,
    pub dump_stats_requested: Arc<AtomicBool>,
}

impl SignalFlags {
    /// Registers `SIGINT`/`SIGTERM` to set the shutdown flag, `SIGUSR1` to
    /// set the stats-dump flag, and ignores `SIGCHLD`/`SIGPIPE` (so a
    /// detached MT handler never becomes a zombie and a closed transport
    /// never raises `SIGPIPE`).
    pub fn install() -> GatewayResult<SignalFlags> {
        let shutdown_requested = Arc::new(AtomicBool::new(false));
        let dump_stats_requested = Arc::new(AtomicBool::new(false));

        flag::register(SIGINT, shutdown_requested.clone())?;
        flag::register(SIGTERM, shutdown_requested.clone())?;
        flag::register(SIGUSR1, dump_stats_requested.clone())?;

        unsafe {
            signal::signal(Signal::SIGCHLD, SigHandler::SigIgn)?;
            signal::signal(Signal::SIGPIPE, SigHandler::SigIgn)?;
        }

        Ok(SignalFlags { shutdown_requested, dump_stats_requested })
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::Relaxed)
    }

    /// Returns `true` (at most once per signal) and clears the flag.
    pub fn take_dump_stats_requested(&self) -> bool {
        self.dump_stats_requested.swap(false, Ordering::Relaxed)
    }
}
