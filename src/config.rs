//! Daemon Configuration
//!
//! Command-line options for `netsysctrld`, parsed by hand:
//!
//! ```text
//! -h, --host <HOST>             Host to bind to (default: 0.0.0.0)
//! -p, --port <PORT>             Port to listen on (default: 5000)
//! -a, --audio-control <NAME>    Mixer control to adjust (default: Master)
//!     --mixer <PROGRAM>         Mixer program (default: amixer)
//! -g, --gpio-pin <NAME:NUMBER>  Register an output pin (repeatable)
//! -l, --gpio-init-low           Export all pins and drive them low at startup
//!     --gpio-root <DIR>         sysfs GPIO root (default: /sys/class/gpio)
//! -v, --version                 Print version information
//!     --help                    Print help
//! ```

use crate::subsystems::{GpioConfig, GpioConfigError, NamedPin, VolumeConfig, VolumeConfigError};
use crate::{DEFAULT_HOST, DEFAULT_PORT};
use std::path::PathBuf;
use thiserror::Error;

/// Daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Volume subsystem settings
    pub volume: VolumeConfig,
    /// GPIO subsystem settings
    pub gpio: GpioConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            volume: VolumeConfig::default(),
            gpio: GpioConfig::default(),
        }
    }
}

/// What the process should do after parsing its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigAction {
    Run(DaemonConfig),
    Help,
    Version,
}

/// Errors from command-line parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} requires a value")]
    MissingValue(String),

    #[error("invalid port number: {0}")]
    InvalidPort(String),

    #[error("unknown argument: {0}")]
    UnknownArgument(String),

    #[error(transparent)]
    Volume(#[from] VolumeConfigError),

    #[error(transparent)]
    Gpio(#[from] GpioConfigError),
}

impl DaemonConfig {
    /// Parses configuration from the process arguments.
    pub fn from_env() -> Result<ConfigAction, ConfigError> {
        Self::from_args(std::env::args().skip(1))
    }

    /// Parses configuration from `args`, excluding the program name.
    pub fn from_args<I>(args: I) -> Result<ConfigAction, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut config = DaemonConfig::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            let mut value = || args.next().ok_or_else(|| ConfigError::MissingValue(arg.clone()));

            match arg.as_str() {
                "--host" | "-h" => config.host = value()?,
                "--port" | "-p" => {
                    let port = value()?;
                    config.port = port.parse().map_err(|_| ConfigError::InvalidPort(port))?;
                }
                "--audio-control" | "-a" => config.volume.audio_control = value()?,
                "--mixer" => config.volume.mixer_program = PathBuf::from(value()?),
                "--gpio-pin" | "-g" => {
                    let pin: NamedPin = value()?.parse()?;
                    config.gpio.pins.push(pin);
                }
                "--gpio-init-low" | "-l" => config.gpio.init_output_low = true,
                "--gpio-root" => config.gpio.sysfs_root = PathBuf::from(value()?),
                "--help" => return Ok(ConfigAction::Help),
                "--version" | "-v" => return Ok(ConfigAction::Version),
                _ => return Err(ConfigError::UnknownArgument(arg.clone())),
            }
        }

        config.volume.validate()?;
        config.gpio.validate()?;

        Ok(ConfigAction::Run(config))
    }

    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
