//! Command-line configuration (spec component N / §6).
//!
//! Grounded in `clap`'s builder API the way `ruediger-smser` uses it:
//! short-only flags, no long-option aliases, matching spec §6's flag list
//! exactly rather than clap's usual derive-macro long-flag defaults.
use std::path::PathBuf;

use clap::{value_parser, Arg, ArgAction, Command};

/// One of the eight syslog-style severities spec §6 allows for `-e`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Emerg,
    Alert,
    Crit,
    Err,
    Warning,
    Notice,
    Info,
    Debug,
}

impl std::str::FromStr for LogLevel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use LogLevel::*;
        Ok(match s {
            "emerg" => Emerg,
            "alert" => Alert,
            "crit" => Crit,
            "err" => Err,
            "warning" => Warning,
            "notice" => Notice,
            "info" => Info,
            "debug" => Debug,
            other => return Err(format!("unknown log level: {}", other)),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogDestination {
    Stderr,
    Syslog,
}

impl std::str::FromStr for LogDestination {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stderr" => Ok(LogDestination::Stderr),
            "syslog" => Ok(LogDestination::Syslog),
            other => Err(format!("unknown log destination: {}", other)),
        }
    }
}

/// Parsed configuration, one field per CLI flag in spec §6.
#[derive(Debug, Clone)]
pub struct Config {
    pub device: String,
    pub baud: u32,
    pub pin: Option<String>,
    pub log_name: String,
    pub pid_file: Option<PathBuf>,
    pub cmd_timeout_ms: u64,
    pub poll_interval_s: u64,
    pub reconnect_delay_s: u64,
    pub spool_dir: PathBuf,
    pub handler_path: PathBuf,
    pub log_level: LogLevel,
    pub log_destination: LogDestination,
    pub initial_retry_s: u64,
    pub retry_multiplier: f64,
    pub max_retries: u32,
    pub daemonize: bool,
    pub trace: bool,
}

/// Parses `argv`, exiting the process (via clap's built-in help/error
/// printer) on `-?`/`-h`/invalid values, per spec §6's "Invalid values exit
/// nonzero with a help dump."
pub fn parse(argv: impl IntoIterator<Item = String>) -> Config {
    let matches = build_command().get_matches_from(argv);

    Config {
        device: matches.get_one::<String>("device").unwrap().clone(),
        baud: *matches.get_one::<u32>("baud").unwrap(),
        pin: matches.get_one::<String>("pin").cloned(),
        log_name: matches.get_one::<String>("logname").cloned().unwrap_or_else(|| "m20d".to_owned()),
        pid_file: matches.get_one::<String>("pidfile").map(PathBuf::from),
        cmd_timeout_ms: *matches.get_one::<u64>("cmd_timeout").unwrap(),
        poll_interval_s: *matches.get_one::<u64>("poll_interval").unwrap(),
        reconnect_delay_s: *matches.get_one::<u64>("reconnect_delay").unwrap(),
        spool_dir: matches.get_one::<String>("spool_dir").map(PathBuf::from).unwrap(),
        handler_path: matches.get_one::<String>("handler").map(PathBuf::from).unwrap(),
        log_level: *matches.get_one::<LogLevel>("log_level").unwrap(),
        log_destination: *matches.get_one::<LogDestination>("log_dest").unwrap(),
        initial_retry_s: *matches.get_one::<u64>("initial_retry").unwrap(),
        retry_multiplier: *matches.get_one::<f64>("retry_mult").unwrap(),
        max_retries: *matches.get_one::<u32>("max_retries").unwrap(),
        daemonize: matches.get_flag("daemonize"),
        trace: matches.get_flag("trace"),
    }
}

fn build_command() -> Command {
    Command::new("m20d")
        .disable_help_flag(true)
        .disable_version_flag(true)
        .arg(Arg::new("help").short('?').alias_short('h').action(ArgAction::Help))
        .arg(Arg::new("device").short('d').required(true))
        .arg(Arg::new("baud").short('b').value_parser(value_parser!(u32)).default_value("9600"))
        .arg(Arg::new("pin").short('p'))
        .arg(Arg::new("logname").short('n'))
        .arg(Arg::new("pidfile").short('x'))
        .arg(Arg::new("cmd_timeout").short('t').value_parser(value_parser!(u64)).default_value("3000"))
        .arg(Arg::new("poll_interval").short('i').value_parser(value_parser!(u64)).default_value("60"))
        .arg(Arg::new("reconnect_delay").short('l').value_parser(value_parser!(u64)).default_value("30"))
        .arg(Arg::new("spool_dir").short('s').required(true))
        .arg(Arg::new("handler").short('a').required(true))
        .arg(Arg::new("log_level").short('e').value_parser(value_parser!(LogLevel)).default_value("info"))
        .arg(Arg::new("log_dest").short('o').value_parser(value_parser!(LogDestination)).default_value("stderr"))
        .arg(Arg::new("initial_retry").short('1').value_parser(value_parser!(u64)).default_value("60"))
        .arg(Arg::new("retry_mult").short('2').value_parser(value_parser!(f64)).default_value("2.0"))
        .arg(Arg::new("max_retries").short('3').value_parser(value_parser!(u32)).default_value("5"))
        .arg(Arg::new("daemonize").short('f').action(ArgAction::SetTrue))
        .arg(Arg::new("trace").short('r').action(ArgAction::SetTrue))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_required_flags() {
        let cfg = parse(
            ["m20d", "-d", "/dev/ttyUSB0", "-s", "/var/spool/m20d", "-a", "/usr/libexec/m20d-handler"]
                .iter()
                .map(|s| s.to_string()),
        );
        assert_eq!(cfg.device, "/dev/ttyUSB0");
        assert_eq!(cfg.baud, 9600);
        assert_eq!(cfg.retry_multiplier, 2.0);
        assert!(!cfg.daemonize);
    }

    #[test]
    fn log_level_from_str() {
        assert_eq!("debug".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert!("bogus".parse::<LogLevel>().is_err());
    }
}
