//! Controlled Subsystems
//!
//! Each subsystem owns its own state and synchronization and publishes a
//! command table whose handlers the dispatcher binds to a shared instance.
//!
//! - `volume`: audio output volume via a mixer program
//! - `server`: listener address and connected clients
//! - `gpio`: named output pins via sysfs

pub mod gpio;
pub mod server;
pub mod volume;

pub use gpio::{GpioConfig, GpioConfigError, GpioController, NamedPin, OutputState};
pub use server::{ClientRegistration, ServerInfo};
pub use volume::{VolumeConfig, VolumeConfigError, VolumeControl};
