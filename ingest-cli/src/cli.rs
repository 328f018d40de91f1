use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "ingestd",
    about = "Supervise transcoders that turn live upstream channels into HLS",
    version
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Configuration file path
    #[arg(short, long, global = true, env = "INGESTD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Supervise the channels listed in a channel file until interrupted
    Run {
        /// Channel file (TOML with [[channels]], or JSON)
        #[arg(short = 'f', long)]
        channels: PathBuf,

        /// Seconds between channel file polls (overrides the config file)
        #[arg(long)]
        poll_interval: Option<u64>,
    },

    /// List the channels a provider offers
    Catalog {
        /// Provider type (m3u, xtream, direct)
        #[arg(short, long)]
        provider: String,

        /// Provider settings as key=value (e.g. url=..., host=..., username=...)
        #[arg(short = 's', long = "set", value_parser = parse_key_value)]
        settings: Vec<(String, String)>,

        /// Output format
        #[arg(short, long, default_value = "pretty")]
        output: OutputFormat,

        /// Only check that the provider is reachable
        #[arg(long)]
        check: bool,
    },

    /// Replace the segment key of a channel
    ///
    /// A running daemon picks the new key up the next time the channel's
    /// transcoder is relaunched.
    RotateKey {
        /// Channel slug
        slug: String,
    },

    /// Print the transcoder arguments for a channel without running anything
    Args {
        /// Channel file (TOML with [[channels]], or JSON)
        #[arg(short = 'f', long)]
        channels: PathBuf,

        /// Channel slug
        slug: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum OutputFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// Pretty JSON
    Json,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{s}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err("empty key".to_string());
    }
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("url=http://a/b?c=d").unwrap(),
            ("url".to_string(), "http://a/b?c=d".to_string())
        );
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
    }

    #[test]
    fn test_catalog_args() {
        let args = Args::parse_from([
            "ingestd", "catalog", "-p", "m3u", "-s", "url=http://lists/tv.m3u", "-o", "json",
        ]);
        match args.command {
            Commands::Catalog {
                provider,
                settings,
                output,
                check,
            } => {
                assert_eq!(provider, "m3u");
                assert_eq!(settings.len(), 1);
                assert!(matches!(output, OutputFormat::Json));
                assert!(!check);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
