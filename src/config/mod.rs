// (c) 2024 Ross Younger
//! # 📖 Configuration management
//!
//! A simulated camera obtains its configuration from the following sources, in order of increasing priority:
//! 1. Hard-wired defaults ([`SimulatorConfiguration::system_default`])
//! 2. A TOML configuration file, if the application supplies one
//! 3. Environment variables prefixed `SIMCAM_`, e.g. `SIMCAM_CONNECTION_SPEED=instant`.
//!    Nested fields use a double underscore, e.g. `SIMCAM_CUSTOM_LATENCY__LARGE=0.25`.
//! 4. Anything the embedding application merges in programmatically
//!
//! ## File format
//!
//! ```toml
//! model = "Simulated Camera"
//! connection_speed = "fast"          # slow, fast, instant or custom
//! exposure_property_type = "stepped" # enumerated or stepped
//! live_view_frames = ["frames/0001.jpg", "frames/0002.jpg"]
//! storage_root = "/path/to/card"
//! file_system_access = "exclusive"   # alongside or exclusive
//!
//! [authentication]
//! type = "four-digit-code"           # none, pair-on-device, username-password or four-digit-code
//! code = "1234"
//! ```
//!
//! Enumerated option values are case insensitive.

mod error;
pub use error::ConfigFileError;

mod latency;
pub use latency::{ConnectionSpeed, LatencyModel, OperationSize};

mod manager;
pub use manager::{ENV_PREFIX, Manager};

mod structure;
pub use structure::{
    Authentication, CameraTransport, ExposurePropertyType, FileSystemAccess,
    SimulatorConfiguration,
};

mod sysdefault;
use sysdefault::SystemDefault;
