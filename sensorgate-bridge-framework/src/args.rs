//! CLI argument parsing for bridges.

use std::path::PathBuf;

use clap::Args;

/// Default configuration file name.
pub const DEFAULT_CONFIG: &str = "sensorgate.json5";

/// Common CLI arguments for all bridges.
///
/// Flatten into a bridge's own `Parser` to add bridge-specific flags.
#[derive(Args, Debug, Clone)]
pub struct BridgeArgs {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct Cli {
        #[command(flatten)]
        bridge: BridgeArgs,
    }

    #[test]
    fn test_args_default_config() {
        let cli = Cli::try_parse_from(["sensorgate-bridge"]).unwrap();
        assert_eq!(cli.bridge.config, PathBuf::from(DEFAULT_CONFIG));
        assert_eq!(cli.bridge.log_level, None);
    }

    #[test]
    fn test_args_overrides() {
        let cli = Cli::try_parse_from([
            "sensorgate-bridge",
            "--config",
            "/etc/sensorgate/bridge.json5",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(
            cli.bridge.config,
            PathBuf::from("/etc/sensorgate/bridge.json5")
        );
        assert_eq!(cli.bridge.log_level.as_deref(), Some("debug"));
    }
}
