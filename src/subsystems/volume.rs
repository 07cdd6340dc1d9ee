//! Audio Volume Control
//!
//! Sets the system output volume by invoking a mixer program, by default
//! `amixer set <control> <percent>% -M`.
//!
//! ## Concurrency
//!
//! Concurrent `VOLUME` commands are serialized: the setter lock is held for
//! the mixer invocation and the update of the stored level, so the stored
//! level always matches the last mixer call that succeeded. Readers of the
//! stored level never wait on the mixer.

use crate::commands::{CommandDescriptor, CommandError, CommandTable, HandlerResult, TableError};
use crate::protocol::NO_PARAM;
use std::num::IntErrorKind;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::{Mutex, RwLock};
use thiserror::Error;
use tracing::{debug, info};

/// The command clients send to change the volume
pub const VOLUME_COMMAND: &str = "VOLUME";

/// Mixer control used when none is configured
pub const DEFAULT_AUDIO_CONTROL: &str = "Master";

/// Mixer program used when none is configured
pub const DEFAULT_MIXER_PROGRAM: &str = "amixer";

/// Highest accepted volume percentage
pub const MAX_VOLUME: u8 = 100;

/// Heading of the volume table in the HELP listing
pub const TABLE_TITLE: &str = "SYSTEM UTILS COMMANDS";

/// Configuration for [`VolumeControl`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeConfig {
    /// Name of the mixer control to adjust (e.g. `Master`, `PCM`)
    pub audio_control: String,
    /// Program invoked to change the volume
    pub mixer_program: PathBuf,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            audio_control: DEFAULT_AUDIO_CONTROL.to_string(),
            mixer_program: PathBuf::from(DEFAULT_MIXER_PROGRAM),
        }
    }
}

impl VolumeConfig {
    /// Checks that the configuration can drive a mixer.
    pub fn validate(&self) -> Result<(), VolumeConfigError> {
        if self.audio_control.trim().is_empty() {
            return Err(VolumeConfigError::EmptyControlName);
        }
        if self.mixer_program.as_os_str().is_empty() {
            return Err(VolumeConfigError::EmptyMixerProgram);
        }
        Ok(())
    }
}

/// Errors in a [`VolumeConfig`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VolumeConfigError {
    #[error("audio control name must not be empty")]
    EmptyControlName,

    #[error("mixer program must not be empty")]
    EmptyMixerProgram,
}

/// Controls the system output volume.
#[derive(Debug)]
pub struct VolumeControl {
    config: VolumeConfig,

    /// Serializes mixer invocations
    setter: Mutex<()>,

    /// Last level applied successfully; unknown until the first set
    level: RwLock<Option<u8>>,
}

impl VolumeControl {
    /// Creates a volume control from a validated configuration.
    pub fn new(config: VolumeConfig) -> Result<Self, VolumeConfigError> {
        config.validate()?;

        Ok(Self {
            config,
            setter: Mutex::new(()),
            level: RwLock::new(None),
        })
    }

    /// The configuration this control was built with.
    pub fn config(&self) -> &VolumeConfig {
        &self.config
    }

    /// Returns the last volume set through this control, if any.
    pub fn volume(&self) -> Option<u8> {
        *self.level.read().unwrap()
    }

    /// Sets the system volume to `percent`.
    ///
    /// Values above [`MAX_VOLUME`] are rejected with
    /// [`CommandError::InvalidParameter`]. A mixer that cannot be started or
    /// exits unsuccessfully is reported as a fault, and the stored level is
    /// left unchanged.
    pub fn set_volume(&self, percent: u8) -> Result<(), CommandError> {
        if percent > MAX_VOLUME {
            return Err(CommandError::invalid_parameter(format!(
                "System volume cannot be greater than {}%",
                MAX_VOLUME
            )));
        }

        let _guard = self.setter.lock().unwrap();

        debug!(
            program = %self.config.mixer_program.display(),
            control = %self.config.audio_control,
            percent,
            "Running mixer"
        );

        let status = Command::new(&self.config.mixer_program)
            .arg("set")
            .arg(&self.config.audio_control)
            .arg(format!("{}%", percent))
            .arg("-M")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;

        if !status.success() {
            return Err(CommandError::Subsystem(format!(
                "{} exited with {}",
                self.config.mixer_program.display(),
                status
            )));
        }

        *self.level.write().unwrap() = Some(percent);
        info!(percent, control = %self.config.audio_control, "System volume set");
        Ok(())
    }

    /// The volume command table.
    pub fn command_table() -> Result<CommandTable<Self>, TableError> {
        CommandTable::new(
            TABLE_TITLE,
            vec![CommandDescriptor::new(
                VOLUME_COMMAND,
                handle_set_volume,
                "Sets the system volume. Specify as a percentage.",
            )],
        )
    }
}

/// VOLUME=<percent>
fn handle_set_volume(param: &str, _response: &mut String, volume: &VolumeControl) -> HandlerResult {
    let percent = parse_percentage(param)?;
    volume.set_volume(percent)
}

/// Parses a whole-number percentage in `0..=100`.
fn parse_percentage(param: &str) -> Result<u8, CommandError> {
    if param == NO_PARAM {
        return Err(CommandError::invalid_parameter(format!(
            "{} requires a percentage, e.g. {}=50",
            VOLUME_COMMAND, VOLUME_COMMAND
        )));
    }

    let value: i64 = match param.parse() {
        Ok(value) => value,
        Err(e) if *e.kind() == IntErrorKind::PosOverflow => i64::MAX,
        Err(e) if *e.kind() == IntErrorKind::NegOverflow => i64::MIN,
        Err(_) => {
            return Err(CommandError::invalid_parameter(format!(
                "'{}' is not a whole-number percentage",
                param
            )))
        }
    };

    if value < 0 {
        return Err(CommandError::invalid_parameter(
            "System volume cannot be less than 0%",
        ));
    }

    match u8::try_from(value) {
        Ok(percent) if percent <= MAX_VOLUME => Ok(percent),
        _ => Err(CommandError::invalid_parameter(format!(
            "System volume cannot be greater than {}%",
            MAX_VOLUME
        ))),
    }
}
