//! GPIO Pin Control
//!
//! Drives named output pins through the Linux sysfs GPIO interface:
//!
//! ```text
//! <root>/export               write the pin number to export it
//! <root>/gpio<N>/direction    write "out"
//! <root>/gpio<N>/value        write "0" or "1"
//! ```
//!
//! Pins are registered by name at startup. Clients address them by name,
//! e.g. `SET_PIN=fan:1`.

use crate::commands::{CommandDescriptor, CommandError, CommandTable, HandlerResult, TableError};
use std::collections::HashSet;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info};

/// Default location of the sysfs GPIO interface
pub const DEFAULT_SYSFS_ROOT: &str = "/sys/class/gpio";

/// Heading of the GPIO table in the HELP listing
pub const TABLE_TITLE: &str = "GPIO COMMANDS";

const OUTPUT_DIRECTION: &str = "out";

/// Output level of a pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputState {
    Low,
    High,
}

impl OutputState {
    /// The value written to the sysfs `value` file.
    pub fn as_str(self) -> &'static str {
        match self {
            OutputState::Low => "0",
            OutputState::High => "1",
        }
    }
}

impl fmt::Display for OutputState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputState::Low => f.write_str("low"),
            OutputState::High => f.write_str("high"),
        }
    }
}

/// A pin number registered under a client-facing name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedPin {
    pub name: String,
    pub number: u16,
}

impl NamedPin {
    pub fn new(name: impl Into<String>, number: u16) -> Self {
        Self {
            name: name.into(),
            number,
        }
    }
}

impl FromStr for NamedPin {
    type Err = GpioConfigError;

    /// Parses `name:number`, the form used on the command line.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || GpioConfigError::InvalidPinSpec(s.to_string());

        let (name, number) = s.split_once(':').ok_or_else(invalid)?;
        let number: u16 = number.parse().map_err(|_| invalid())?;
        if name.is_empty() {
            return Err(invalid());
        }

        Ok(NamedPin::new(name, number))
    }
}

/// Configuration for [`GpioController`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpioConfig {
    /// Pins in registration order
    pub pins: Vec<NamedPin>,
    /// Root of the sysfs GPIO tree
    pub sysfs_root: PathBuf,
    /// Export every pin and drive it low at startup
    pub init_output_low: bool,
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            pins: Vec::new(),
            sysfs_root: PathBuf::from(DEFAULT_SYSFS_ROOT),
            init_output_low: false,
        }
    }
}

impl GpioConfig {
    /// Checks pin names for uniqueness and addressability.
    ///
    /// Names must be non-empty ASCII alphanumerics so that `name:state`
    /// passes the command grammar.
    pub fn validate(&self) -> Result<(), GpioConfigError> {
        let mut seen = HashSet::with_capacity(self.pins.len());

        for pin in &self.pins {
            if pin.name.is_empty() || !pin.name.bytes().all(|b| b.is_ascii_alphanumeric()) {
                return Err(GpioConfigError::InvalidPinName(pin.name.clone()));
            }
            if !seen.insert(pin.name.as_str()) {
                return Err(GpioConfigError::DuplicatePinName(pin.name.clone()));
            }
        }

        Ok(())
    }
}

/// Errors in a GPIO configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GpioConfigError {
    #[error("pin with name '{0}' already provided; pin names must be unique")]
    DuplicatePinName(String),

    #[error("pin name '{0}' must be non-empty and contain only letters and digits")]
    InvalidPinName(String),

    #[error("invalid pin '{0}'; expected name:number")]
    InvalidPinSpec(String),
}

/// Controls a fixed set of named output pins.
#[derive(Debug)]
pub struct GpioController {
    pins: Vec<NamedPin>,
    sysfs_root: PathBuf,
}

impl GpioController {
    /// Creates a controller from a validated configuration.
    ///
    /// Does not touch the filesystem; see
    /// [`initialize_output_low`](Self::initialize_output_low).
    pub fn new(config: GpioConfig) -> Result<Self, GpioConfigError> {
        config.validate()?;

        Ok(Self {
            pins: config.pins,
            sysfs_root: config.sysfs_root,
        })
    }

    /// Registered pins in registration order.
    pub fn pins(&self) -> &[NamedPin] {
        &self.pins
    }

    /// Looks up a pin by name.
    pub fn pin(&self, name: &str) -> Option<&NamedPin> {
        self.pins.iter().find(|p| p.name == name)
    }

    /// Exports every pin, sets it to output, and drives it low.
    pub fn initialize_output_low(&self) -> io::Result<()> {
        for pin in &self.pins {
            write_sysfs(&self.sysfs_root.join("export"), &pin.number.to_string())?;
            write_sysfs(&self.direction_path(pin.number), OUTPUT_DIRECTION)?;
            write_sysfs(&self.value_path(pin.number), OutputState::Low.as_str())?;
            info!(name = %pin.name, number = pin.number, "Exported pin as output low");
        }
        Ok(())
    }

    /// Drives the named pin to `state`.
    ///
    /// Unknown names are rejected with [`CommandError::InvalidParameter`].
    pub fn set_pin(&self, name: &str, state: OutputState) -> Result<(), CommandError> {
        let pin = self
            .pin(name)
            .ok_or_else(|| CommandError::invalid_parameter(format!("Pin: {} not registered", name)))?;

        write_sysfs(&self.value_path(pin.number), state.as_str())?;
        info!(name = %pin.name, number = pin.number, %state, "Pin output set");
        Ok(())
    }

    /// Drives every registered pin low, returning the names in order.
    pub fn set_all_low(&self) -> io::Result<Vec<&str>> {
        let mut names = Vec::with_capacity(self.pins.len());
        for pin in &self.pins {
            write_sysfs(&self.value_path(pin.number), OutputState::Low.as_str())?;
            names.push(pin.name.as_str());
        }
        info!(count = names.len(), "All pins set low");
        Ok(names)
    }

    fn direction_path(&self, number: u16) -> PathBuf {
        self.sysfs_root
            .join(format!("gpio{}", number))
            .join("direction")
    }

    fn value_path(&self, number: u16) -> PathBuf {
        self.sysfs_root.join(format!("gpio{}", number)).join("value")
    }

    /// The GPIO command table.
    pub fn command_table() -> Result<CommandTable<Self>, TableError> {
        CommandTable::new(
            TABLE_TITLE,
            vec![
                CommandDescriptor::new(
                    "GPIO_PINS",
                    handle_pin_mapping,
                    "Lists registered pins as name:number",
                ),
                CommandDescriptor::new(
                    "SET_PIN",
                    handle_set_pin,
                    "Sets a pin's output. Specify as pinName:0 (low) or pinName:1 (high).",
                ),
                CommandDescriptor::new(
                    "ALL_PINS_LOW",
                    handle_all_low,
                    "Sets every registered pin to output low",
                ),
            ],
        )
    }
}

fn write_sysfs(path: &Path, value: &str) -> io::Result<()> {
    debug!(path = %path.display(), value, "Writing sysfs attribute");
    std::fs::write(path, value)
}

/// Parses `pinName:0` or `pinName:1`.
fn parse_pin_state(param: &str) -> Result<(&str, OutputState), CommandError> {
    let malformed = || {
        CommandError::invalid_parameter(format!(
            "Syntax err: {}; It must have the form \"pinName:0(off/low) or 1(on/high)\"",
            param
        ))
    };

    let (name, value) = param.split_once(':').ok_or_else(malformed)?;
    let state = match value {
        "0" => OutputState::Low,
        "1" => OutputState::High,
        _ => return Err(malformed()),
    };

    Ok((name, state))
}

/// GPIO_PINS
fn handle_pin_mapping(_param: &str, response: &mut String, gpio: &GpioController) -> HandlerResult {
    response.push('\n');
    for pin in gpio.pins() {
        response.push_str(&format!("{}:{}\n", pin.name, pin.number));
    }
    Ok(())
}

/// SET_PIN=<name>:<0|1>
fn handle_set_pin(param: &str, _response: &mut String, gpio: &GpioController) -> HandlerResult {
    let (name, state) = parse_pin_state(param)?;
    gpio.set_pin(name, state)
}

/// ALL_PINS_LOW
fn handle_all_low(_param: &str, response: &mut String, gpio: &GpioController) -> HandlerResult {
    let names = gpio.set_all_low()?;
    response.push('\n');
    for name in names {
        response.push_str(&format!("Pin: {} low\n", name));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Builds a fake sysfs tree with a directory per pin.
    fn fake_sysfs(pins: &[NamedPin]) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("export"), "").unwrap();
        for pin in pins {
            let pin_dir = dir.path().join(format!("gpio{}", pin.number));
            std::fs::create_dir(&pin_dir).unwrap();
            std::fs::write(pin_dir.join("direction"), "in").unwrap();
            std::fs::write(pin_dir.join("value"), "1").unwrap();
        }
        dir
    }

    fn controller() -> (GpioController, TempDir) {
        let pins = vec![NamedPin::new("fan", 17), NamedPin::new("lamp", 27)];
        let dir = fake_sysfs(&pins);
        let gpio = GpioController::new(GpioConfig {
            pins,
            sysfs_root: dir.path().to_path_buf(),
            init_output_low: false,
        })
        .unwrap();
        (gpio, dir)
    }

    fn read(dir: &TempDir, relative: &str) -> String {
        std::fs::read_to_string(dir.path().join(relative)).unwrap()
    }

    fn message(err: CommandError) -> String {
        match err {
            CommandError::InvalidParameter(msg) => msg,
            other => panic!("expected invalid parameter, got {:?}", other),
        }
    }

    #[test]
    fn test_named_pin_from_str() {
        assert_eq!("fan:17".parse::<NamedPin>().unwrap(), NamedPin::new("fan", 17));
        assert!("fan".parse::<NamedPin>().is_err());
        assert!(":17".parse::<NamedPin>().is_err());
        assert!("fan:x".parse::<NamedPin>().is_err());
        assert!("fan:70000".parse::<NamedPin>().is_err());
    }

    #[test]
    fn test_config_rejects_duplicates() {
        let config = GpioConfig {
            pins: vec![NamedPin::new("fan", 17), NamedPin::new("fan", 18)],
            ..GpioConfig::default()
        };
        assert_eq!(
            GpioController::new(config).unwrap_err(),
            GpioConfigError::DuplicatePinName("fan".to_string())
        );
    }

    #[test]
    fn test_config_rejects_unaddressable_names() {
        for name in ["", "fan_1", "fan:1", "fan.a"] {
            let config = GpioConfig {
                pins: vec![NamedPin::new(name, 17)],
                ..GpioConfig::default()
            };
            assert!(
                matches!(config.validate(), Err(GpioConfigError::InvalidPinName(_))),
                "name {:?}",
                name
            );
        }
    }

    #[test]
    fn test_parse_pin_state() {
        assert_eq!(parse_pin_state("fan:0").unwrap(), ("fan", OutputState::Low));
        assert_eq!(parse_pin_state("fan:1").unwrap(), ("fan", OutputState::High));

        for bad in ["fan:2", "fan", "fan:", "fan:1:1", "fan:1.0", "default", "fan:-1"] {
            let msg = message(parse_pin_state(bad).unwrap_err());
            assert!(msg.starts_with("Syntax err:"), "param {:?}: {}", bad, msg);
        }
    }

    #[test]
    fn test_set_pin_writes_value() {
        let (gpio, dir) = controller();

        gpio.set_pin("lamp", OutputState::Low).unwrap();
        assert_eq!(read(&dir, "gpio27/value"), "0");

        gpio.set_pin("lamp", OutputState::High).unwrap();
        assert_eq!(read(&dir, "gpio27/value"), "1");
        assert_eq!(read(&dir, "gpio17/value"), "1");
    }

    #[test]
    fn test_set_unknown_pin() {
        let (gpio, _dir) = controller();
        let msg = message(gpio.set_pin("heater", OutputState::High).unwrap_err());
        assert_eq!(msg, "Pin: heater not registered");
    }

    #[test]
    fn test_all_low() {
        let (gpio, dir) = controller();
        let mut out = String::new();
        handle_all_low("default", &mut out, &gpio).unwrap();

        assert_eq!(out, "\nPin: fan low\nPin: lamp low\n");
        assert_eq!(read(&dir, "gpio17/value"), "0");
        assert_eq!(read(&dir, "gpio27/value"), "0");
    }

    #[test]
    fn test_pin_mapping() {
        let (gpio, _dir) = controller();
        let mut out = String::new();
        handle_pin_mapping("default", &mut out, &gpio).unwrap();
        assert_eq!(out, "\nfan:17\nlamp:27\n");
    }

    #[test]
    fn test_initialize_output_low() {
        let (gpio, dir) = controller();
        gpio.initialize_output_low().unwrap();

        // export is rewritten per pin; the last write wins on a plain file
        assert_eq!(read(&dir, "export"), "27");
        assert_eq!(read(&dir, "gpio17/direction"), "out");
        assert_eq!(read(&dir, "gpio17/value"), "0");
        assert_eq!(read(&dir, "gpio27/direction"), "out");
        assert_eq!(read(&dir, "gpio27/value"), "0");
    }

    #[test]
    fn test_missing_sysfs_is_io_fault() {
        let gpio = GpioController::new(GpioConfig {
            pins: vec![NamedPin::new("fan", 17)],
            sysfs_root: PathBuf::from("/nonexistent/netsysctrl-gpio"),
            init_output_low: false,
        })
        .unwrap();

        let err = gpio.set_pin("fan", OutputState::High).unwrap_err();
        assert!(matches!(err, CommandError::Io(_)));
    }
}
