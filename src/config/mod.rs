//! Configuration management for StreamGoo.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::goo::{GooType, FACTOR_SCALE};

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Ingress stream.
    #[serde(default)]
    pub input: InputConfig,

    /// Egress destination.
    #[serde(default)]
    pub output: OutputConfig,

    /// Impairment settings.
    #[serde(default)]
    pub goo: GooConfig,

    /// Recording settings.
    #[serde(default)]
    pub record: RecordConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("Failed to read config: {e}")))?;

        toml::from_str(&content).map_err(|e| Error::Config(format!("Failed to parse config: {e}")))
    }

    /// Save configuration to file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path.as_ref(), self.to_toml()?)
            .map_err(|e| Error::Config(format!("Failed to write config: {e}")))?;

        Ok(())
    }

    /// Serialize to TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {e}")))
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.input.multicast_address.is_none() {
            return Err(Error::InvalidConfig("input multicast address is required".into()));
        }
        if self.input.multicast_port == 0 {
            return Err(Error::InvalidConfig("input multicast port is required".into()));
        }
        if self.output.address.is_none() {
            return Err(Error::InvalidConfig("output address is required".into()));
        }
        if self.output.port == 0 {
            return Err(Error::InvalidConfig("output port is required".into()));
        }
        if self.goo.factor > FACTOR_SCALE {
            return Err(Error::InvalidConfig(format!(
                "goo factor {} exceeds {FACTOR_SCALE}",
                self.goo.factor
            )));
        }
        if self.goo.duration.is_zero() && self.goo.factor > 0 {
            return Err(Error::InvalidConfig("goo duration must be non-zero".into()));
        }
        if let Some(ref path) = self.record.file {
            if path.file_stem().is_none() {
                return Err(Error::InvalidConfig(format!(
                    "record path has no file name: {}",
                    path.display()
                )));
            }
        }

        Ok(())
    }

    /// Create example configuration.
    pub fn example() -> Self {
        Self {
            input: InputConfig {
                adapter: Some(Ipv4Addr::new(192, 168, 1, 10)),
                multicast_address: Some(Ipv4Addr::new(239, 1, 1, 1)),
                multicast_port: 1234,
                ..Default::default()
            },
            output: OutputConfig {
                address: Some(Ipv4Addr::new(239, 1, 1, 2)),
                port: 1234,
                ..Default::default()
            },
            goo: GooConfig {
                factor: 100,
                pause: Duration::from_secs(5),
                goo_type: Some(GooType::TransportError),
                ..Default::default()
            },
            record: RecordConfig {
                file: Some(PathBuf::from("recordings/goo-%D-%T")),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

/// Ingress configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Local adapter address used to join the group (any if unset).
    pub adapter: Option<Ipv4Addr>,

    /// Multicast group (or unicast address) to read from.
    pub multicast_address: Option<Ipv4Addr>,

    /// UDP port of the group.
    #[serde(default)]
    pub multicast_port: u16,

    /// Socket receive buffer size in bytes.
    #[serde(default = "default_recv_buffer")]
    pub recv_buffer_size: usize,
}

fn default_recv_buffer() -> usize {
    256 * 1024
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            adapter: None,
            multicast_address: None,
            multicast_port: 0,
            recv_buffer_size: default_recv_buffer(),
        }
    }
}

impl InputConfig {
    /// Address the ingress socket binds to.
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, self.multicast_port))
    }

    /// Adapter used for the group join.
    pub fn interface(&self) -> Ipv4Addr {
        self.adapter.unwrap_or(Ipv4Addr::UNSPECIFIED)
    }
}

/// Egress configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Local adapter address to send from (any if unset).
    pub adapter: Option<Ipv4Addr>,

    /// Destination multicast group or unicast address.
    pub address: Option<Ipv4Addr>,

    /// Destination UDP port.
    #[serde(default)]
    pub port: u16,

    /// Multicast TTL.
    #[serde(default = "default_ttl")]
    pub multicast_ttl: u32,

    /// Deliver our own multicast output to local listeners.
    #[serde(default = "default_loop")]
    pub multicast_loop: bool,
}

fn default_ttl() -> u32 {
    1
}
fn default_loop() -> bool {
    true
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            adapter: None,
            address: None,
            port: 0,
            multicast_ttl: default_ttl(),
            multicast_loop: default_loop(),
        }
    }
}

impl OutputConfig {
    /// Destination socket address, if configured.
    pub fn destination(&self) -> Option<SocketAddr> {
        self.address
            .map(|ip| SocketAddr::V4(SocketAddrV4::new(ip, self.port)))
    }

    /// Address the egress socket binds to.
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(
            self.adapter.unwrap_or(Ipv4Addr::UNSPECIFIED),
            0,
        ))
    }
}

/// Impairment configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GooConfig {
    /// Chance in 10,000 that an eligible packet is corrupted.
    #[serde(default)]
    pub factor: u32,

    /// Pause between active windows.
    #[serde(default, with = "humantime_serde")]
    pub pause: Duration,

    /// Length of each active window.
    #[serde(default = "default_duration", with = "humantime_serde")]
    pub duration: Duration,

    /// Fixed variant; rolled at random per window when unset.
    #[serde(default)]
    pub goo_type: Option<GooType>,

    /// Un-goo'd startup period.
    #[serde(default = "default_warmup", with = "humantime_serde")]
    pub warmup: Duration,
}

fn default_duration() -> Duration {
    Duration::from_millis(1000)
}
fn default_warmup() -> Duration {
    Duration::from_millis(10_000)
}

impl Default for GooConfig {
    fn default() -> Self {
        Self {
            factor: 0,
            pause: Duration::ZERO,
            duration: default_duration(),
            goo_type: None,
            warmup: default_warmup(),
        }
    }
}

/// Recording configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordConfig {
    /// Path template (`%T` = time, `%D` = date) for the `.ts` and `.txt` files.
    pub file: Option<PathBuf>,

    /// Framing header stripped from each datagram before it is written.
    #[serde(default = "default_header_len")]
    pub header_len: usize,
}

fn default_header_len() -> usize {
    crate::RTP_HEADER_SIZE
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            file: None,
            header_len: default_header_len(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text or json).
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Enable colored output.
    #[serde(default = "default_color")]
    pub color: bool,

    /// Print nothing to the console.
    #[serde(default)]
    pub quiet: bool,

    /// Emit per-packet detail.
    #[serde(default)]
    pub verbose: bool,
}

fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "text".into()
}
fn default_color() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            color: default_color(),
            quiet: false,
            verbose: false,
        }
    }
}

impl LoggingConfig {
    /// Filter directive after applying the quiet/verbose switches.
    pub fn effective_level(&self) -> &str {
        if self.quiet {
            "off"
        } else if self.verbose {
            "debug"
        } else {
            &self.level
        }
    }
}

/// Initialize logging.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = if config.quiet {
        EnvFilter::new("off")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.effective_level()))
    };

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.format == "json" {
        subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| Error::Config(format!("Failed to init logging: {e}")))?;
    } else {
        subscriber
            .with(fmt::layer().with_ansi(config.color).with_target(false))
            .try_init()
            .map_err(|e| Error::Config(format!("Failed to init logging: {e}")))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> Config {
        let mut config = Config::default();
        config.input.multicast_address = Some(Ipv4Addr::new(239, 0, 0, 1));
        config.input.multicast_port = 1234;
        config.output.address = Some(Ipv4Addr::new(239, 0, 0, 2));
        config.output.port = 5678;
        config
    }

    #[test]
    fn test_defaults_match_operator_expectations() {
        let goo = GooConfig::default();
        assert_eq!(goo.factor, 0);
        assert_eq!(goo.pause, Duration::ZERO);
        assert_eq!(goo.duration, Duration::from_millis(1000));
        assert_eq!(goo.warmup, Duration::from_millis(10_000));
        assert!(goo.goo_type.is_none());
        assert_eq!(RecordConfig::default().header_len, 12);
    }

    #[test]
    fn test_validate_required_fields() {
        assert!(minimal().validate().is_ok());

        let mut config = minimal();
        config.input.multicast_address = None;
        assert!(config.validate().is_err());

        let mut config = minimal();
        config.output.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_factor_range() {
        let mut config = minimal();
        config.goo.factor = FACTOR_SCALE;
        assert!(config.validate().is_ok());
        config.goo.factor = FACTOR_SCALE + 1;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_toml_roundtrip_example() {
        let example = Config::example();
        let text = example.to_toml().unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.goo, example.goo);
        assert_eq!(parsed.output.destination(), example.output.destination());
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("streamgoo.toml");

        let mut config = minimal();
        config.goo.factor = 75;
        config.goo.goo_type = Some(GooType::Jitter);
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.goo, config.goo);
        assert_eq!(loaded.input.bind_addr(), config.input.bind_addr());
        assert_eq!(loaded.output.destination(), config.output.destination());
    }

    #[test]
    fn test_parse_partial_toml() {
        let parsed: Config = toml::from_str(
            r#"
            [input]
            multicast_address = "239.5.5.5"
            multicast_port = 5000

            [output]
            address = "127.0.0.1"
            port = 6000

            [goo]
            factor = 10000
            goo_type = "reorder"
            pause = "250ms"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.goo.goo_type, Some(GooType::Reorder));
        assert_eq!(parsed.goo.pause, Duration::from_millis(250));
        assert_eq!(parsed.goo.duration, Duration::from_secs(1));
        assert_eq!(parsed.input.recv_buffer_size, 256 * 1024);
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn test_effective_log_level() {
        let mut logging = LoggingConfig::default();
        assert_eq!(logging.effective_level(), "info");
        logging.verbose = true;
        assert_eq!(logging.effective_level(), "debug");
        logging.quiet = true;
        assert_eq!(logging.effective_level(), "off");
    }
}
