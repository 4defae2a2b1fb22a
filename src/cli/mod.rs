//! Command line interface for StreamGoo.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser, ValueEnum};

use crate::config::Config;
use crate::error::Result;
use crate::goo::GooType;

/// StreamGoo - RTP/TS relay that adds goo to your streams
#[derive(Parser, Debug)]
#[command(
    name = "streamgoo",
    author,
    version,
    about = "Relay an RTP/MPEG-TS multicast while injecting controllable impairments",
    long_about = r#"
StreamGoo relays a multicast transport stream and, on demand, mangles it:

  0  single bit error        4  drop packet
  1  single byte increment   5  out of order packet
  2  zero whole packet       6  jitter
  3  random fill packet      7  transport error indicator

With a goo factor of 0 it is a plain RTP relay. While running, hit any key to
pause or resume the goo, and 'q' to quit.

EXAMPLE:
  streamgoo -m 239.1.1.1 -g 1234 -n 239.1.1.2 -h 1234 -f 50 -d 2000 -p 5000
"#,
    disable_help_flag = true
)]
pub struct Cli {
    /// IP address of the adapter to listen for the multicast on
    #[arg(short = 'a', long, alias = "adapter-address")]
    pub adapter: Option<Ipv4Addr>,

    /// IP address of the adapter to write the goo'd stream to
    #[arg(short = 'b', long, alias = "outputadapter")]
    pub output_adapter: Option<Ipv4Addr>,

    /// Input multicast address to read from
    #[arg(
        short = 'm',
        long,
        alias = "multicastaddress",
        required_unless_present_any = ["config", "print_config"]
    )]
    pub multicast_address: Option<Ipv4Addr>,

    /// Input multicast group port to read from
    #[arg(
        short = 'g',
        long,
        alias = "mulicastgroup",
        required_unless_present_any = ["config", "print_config"]
    )]
    pub multicast_group: Option<u16>,

    /// Output address to write the goo'd stream to
    #[arg(
        short = 'n',
        long,
        alias = "outputaddress",
        required_unless_present_any = ["config", "print_config"]
    )]
    pub output_address: Option<Ipv4Addr>,

    /// Output multicast group or UDP port to write the goo'd stream to
    #[arg(
        short = 'h',
        long,
        alias = "outputport",
        required_unless_present_any = ["config", "print_config"]
    )]
    pub output_port: Option<u16>,

    /// Chances in 10,000 of adding goo to a packet [default: 0]
    #[arg(short = 'f', long, alias = "goofactor", value_parser = clap::value_parser!(u32).range(0..=10_000))]
    pub goo_factor: Option<u32>,

    /// Pause between goo windows in milliseconds [default: 0]
    #[arg(short = 'p', long, alias = "goopause")]
    pub goo_pause: Option<u64>,

    /// Length of each goo window in milliseconds [default: 1000]
    #[arg(short = 'd', long, alias = "gooduration")]
    pub goo_duration: Option<u64>,

    /// Force one goo type (name or code 0-7) instead of rolling per window
    #[arg(short = 't', long, alias = "gootype")]
    pub goo_type: Option<GooType>,

    /// Print nothing to the console
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Print per-packet detail
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Record the output stream (%T = time, %D = date)
    #[arg(short = 'r', long)]
    pub record: Option<PathBuf>,

    /// Un-goo'd startup period in milliseconds [default: 10000]
    #[arg(short = 'w', long)]
    pub warmup: Option<u64>,

    /// Configuration file (TOML); command line values take precedence
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Print an example configuration file and exit
    #[arg(long)]
    pub print_config: bool,

    /// Log output format
    #[arg(long, default_value = "text")]
    pub log_format: LogFormat,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Print help
    #[arg(long, action = ArgAction::Help)]
    pub help: Option<bool>,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

impl Cli {
    /// Build the effective configuration: file first, then command line overrides.
    pub fn into_config(self) -> Result<Config> {
        let mut config = match self.config {
            Some(ref path) => Config::load(path)?,
            None => Config::default(),
        };

        if self.adapter.is_some() {
            config.input.adapter = self.adapter;
        }
        if self.multicast_address.is_some() {
            config.input.multicast_address = self.multicast_address;
        }
        if let Some(port) = self.multicast_group {
            config.input.multicast_port = port;
        }
        if self.output_adapter.is_some() {
            config.output.adapter = self.output_adapter;
        }
        if self.output_address.is_some() {
            config.output.address = self.output_address;
        }
        if let Some(port) = self.output_port {
            config.output.port = port;
        }

        if let Some(factor) = self.goo_factor {
            config.goo.factor = factor;
        }
        if let Some(ms) = self.goo_pause {
            config.goo.pause = Duration::from_millis(ms);
        }
        if let Some(ms) = self.goo_duration {
            config.goo.duration = Duration::from_millis(ms);
        }
        if self.goo_type.is_some() {
            config.goo.goo_type = self.goo_type;
        }
        if let Some(ms) = self.warmup {
            config.goo.warmup = Duration::from_millis(ms);
        }

        if self.record.is_some() {
            config.record.file = self.record;
        }

        config.logging.quiet |= self.quiet;
        config.logging.verbose |= self.verbose;
        config.logging.color &= !self.no_color;
        if self.log_format == LogFormat::Json {
            config.logging.format = "json".into();
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> std::result::Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("streamgoo").chain(args.iter().copied()))
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_short_flags() {
        let cli = parse(&[
            "-m", "239.1.1.1", "-g", "1234", "-n", "239.1.1.2", "-h", "5678", "-f", "50", "-t",
            "7", "-w", "0", "-q",
        ])
        .unwrap();
        let config = cli.into_config().unwrap();

        assert_eq!(config.input.multicast_address, Some(Ipv4Addr::new(239, 1, 1, 1)));
        assert_eq!(config.input.multicast_port, 1234);
        assert_eq!(config.output.port, 5678);
        assert_eq!(config.goo.factor, 50);
        assert_eq!(config.goo.goo_type, Some(GooType::TransportError));
        assert_eq!(config.goo.warmup, Duration::ZERO);
        assert_eq!(config.goo.duration, Duration::from_millis(1000));
        assert!(config.logging.quiet);
    }

    #[test]
    fn test_missing_required_argument() {
        assert!(parse(&["-m", "239.1.1.1", "-g", "1234", "-n", "239.1.1.2"]).is_err());
    }

    #[test]
    fn test_invalid_address_rejected() {
        assert!(parse(&["-m", "not-an-ip", "-g", "1", "-n", "239.1.1.2", "-h", "2"]).is_err());
    }

    #[test]
    fn test_factor_out_of_range() {
        assert!(parse(&[
            "-m", "239.1.1.1", "-g", "1", "-n", "239.1.1.2", "-h", "2", "-f", "10001"
        ])
        .is_err());
    }

    #[test]
    fn test_zero_port_fails_validation() {
        let cli = parse(&["-m", "239.1.1.1", "-g", "0", "-n", "239.1.1.2", "-h", "2"]).unwrap();
        assert!(cli.into_config().unwrap_err().is_config_error());
    }

    #[test]
    fn test_named_goo_type() {
        let cli = parse(&[
            "-m", "239.1.1.1", "-g", "1", "-n", "239.1.1.2", "-h", "2", "--goo-type", "reorder",
        ])
        .unwrap();
        assert_eq!(cli.goo_type, Some(GooType::Reorder));
    }

    #[test]
    fn test_print_config_needs_no_addresses() {
        let cli = parse(&["--print-config"]).unwrap();
        assert!(cli.print_config);
    }

    #[test]
    fn test_config_file_with_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("goo.toml");
        std::fs::write(
            &path,
            r#"
            [input]
            multicast_address = "239.9.9.9"
            multicast_port = 9000

            [output]
            address = "239.9.9.10"
            port = 9001

            [goo]
            factor = 10
            "#,
        )
        .unwrap();

        let cli = parse(&["-c", path.to_str().unwrap(), "-f", "20"]).unwrap();
        let config = cli.into_config().unwrap();
        assert_eq!(config.goo.factor, 20);
        assert_eq!(config.output.port, 9001);
    }
}
