//! Command line argument parsing

use clap::{Args, Parser, Subcommand};
use std::io::IsTerminal;
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "bspctl")]
#[command(about = "🛰️ Discover controllers on the local network and roll out firmware to them")]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Decrease logging verbosity (only errors)
    #[arg(short = 'q', long = "quiet", global = true)]
    pub quiet: bool,

    /// Log as JSON lines on stderr
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Configuration file (default: <config dir>/bspctl/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Continuously discover controllers on the network.
    ///
    /// Prints each discovered host once, as it appears. With --json the
    /// full list is printed as a JSON array every time a host is found.
    Discover {
        /// Stop after this many seconds; runs until interrupted when omitted
        #[arg(long)]
        timeout: Option<u64>,
        /// Print every snapshot as a JSON array
        #[arg(long)]
        json: bool,
    },
    /// Install new firmware on one or more controllers
    Install(InstallArgs),
}

#[derive(Args, Clone, Debug)]
pub struct InstallArgs {
    /// Firmware image to upload
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Limit number of targets worked on at the same time
    #[arg(long)]
    pub concurrency_limit: Option<usize>,

    #[command(flatten)]
    pub targets: TargetArgs,

    #[command(flatten)]
    pub login: LoginArgs,
}

/// Which controllers to operate on
#[derive(Args, Clone, Debug, Default)]
#[group(required = true, multiple = false)]
pub struct TargetSelection {
    /// Hostname(s) or address(es) of the target(s)
    #[arg(short = 't', long = "target", value_delimiter = ',')]
    pub target: Vec<String>,

    /// First answering target; for networks with exactly one controller
    #[arg(long)]
    pub target_any: bool,

    /// Every target found within --target-timeout
    #[arg(long)]
    pub target_all: bool,
}

#[derive(Args, Clone, Debug)]
pub struct TargetArgs {
    #[command(flatten)]
    pub selection: TargetSelection,

    /// Discovery time for --target-any and --target-all, in seconds
    #[arg(long, value_name = "SECS")]
    pub target_timeout: Option<u64>,
}

#[derive(Args, Clone, Debug)]
pub struct LoginArgs {
    /// Login user
    #[arg(short = 'u', long)]
    pub username: Option<String>,

    /// Login password
    #[arg(short = 'p', long, default_value = "admin")]
    pub password: String,

    /// Do not verify connection certificates
    #[arg(long)]
    pub insecure: bool,

    /// Ask for another password when one is rejected [default: true on a terminal]
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub interactive: Option<bool>,
}

impl LoginArgs {
    /// Whether a rejected password may be re-prompted
    pub fn prompts(&self) -> bool {
        self.interactive
            .unwrap_or_else(|| std::io::stdin().is_terminal())
    }
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_with_targets() {
        let cli = Cli::try_parse_from([
            "bspctl", "install", "fw.raucb", "-t", "a.local,b.local", "-t", "c.local", "-u",
            "service",
        ])
        .unwrap();

        let Commands::Install(args) = cli.command else {
            panic!("expected install");
        };
        assert_eq!(args.targets.selection.target, vec!["a.local", "b.local", "c.local"]);
        assert_eq!(args.login.username.as_deref(), Some("service"));
        assert_eq!(args.login.password, "admin");
    }

    #[test]
    fn test_target_flags_are_exclusive() {
        assert!(
            Cli::try_parse_from(["bspctl", "install", "fw", "--target-any", "--target-all"])
                .is_err()
        );
        assert!(Cli::try_parse_from(["bspctl", "install", "fw", "-t", "a", "--target-all"]).is_err());
        assert!(Cli::try_parse_from(["bspctl", "install", "fw"]).is_err());
    }

    #[test]
    fn test_interactive_flag() {
        let parse = |extra: &[&str]| {
            let mut argv = vec!["bspctl", "install", "fw", "-t", "a"];
            argv.extend_from_slice(extra);
            let Commands::Install(args) = Cli::try_parse_from(argv).unwrap().command else {
                panic!("expected install");
            };
            args.login.interactive
        };

        assert_eq!(parse(&[]), None);
        assert_eq!(parse(&["--interactive"]), Some(true));
        assert_eq!(parse(&["--interactive=false"]), Some(false));
    }

    #[test]
    fn test_discover_flags() {
        let cli = Cli::try_parse_from(["bspctl", "-v", "discover", "--timeout", "5", "--json"]).unwrap();
        assert_eq!(cli.verbose, 1);
        assert!(matches!(
            cli.command,
            Commands::Discover {
                timeout: Some(5),
                json: true
            }
        ));
    }
}
