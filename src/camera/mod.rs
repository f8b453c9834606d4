//! The simulated camera and its session state
// (c) 2024 Ross Younger

use std::{
    fmt,
    sync::{Arc, Mutex},
};

use tokio::sync::watch;
use tracing::debug;

use crate::{
    CameraError,
    category::{self, CommandCategorySet},
    codec::{ImageCodec, StandardCodec},
    config::{CameraTransport, LatencyModel, SimulatorConfiguration},
    live_view::LiveViewStreamer,
    property::{Property, PropertyCategory, PropertyIdentifier, PropertyRegistry},
    storage::FileStorage,
    transfer::TransferHandlers,
    util::lock,
};

mod auth;
pub use auth::{
    AuthenticationContext, AuthenticationEvent, AuthenticationKind, AuthenticationRound,
};

mod modes;
mod session;
pub use session::{
    ConnectFlags, ConnectionWarning, ConnectionWarningCategory, ConnectionWarningKind,
};

mod shooting;

/// The state of a camera's connection
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, Hash, strum::Display, strum::IntoStaticStr,
)]
pub enum ConnectionState {
    /// Not connected
    #[default]
    NotConnected,
    /// A connection is being established
    Connecting,
    /// Connected and ready
    Connected,
    /// The connection is being closed
    Disconnecting,
}

/// A snapshot of the connection, as published to watchers
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectionStatus {
    /// The connection state
    pub state: ConnectionState,
    /// Set when the client asks to disconnect, and cleared by the next connection attempt.
    /// A transition to `NotConnected` with this flag clear means the connection was lost.
    pub disconnection_was_expected: bool,
}

/// Information about the connected camera
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Manufacturer name
    pub manufacturer: String,
    /// Model name
    pub model: String,
    /// Firmware version
    pub version: String,
    /// Unique identifier
    pub identifier: String,
}

/// Quick-access device state. Never held across an await.
#[derive(Debug, Default)]
pub(crate) struct DeviceState {
    pub(crate) categories: CommandCategorySet,
    pub(crate) recording: Option<tokio::time::Instant>,
    pub(crate) storage: Option<FileStorage>,
}

/// Everything shared between a [`Camera`] handle and the objects it hands out
pub(crate) struct Shared {
    pub(crate) config: SimulatorConfiguration,
    pub(crate) latency: LatencyModel,
    pub(crate) codec: Arc<dyn ImageCodec>,
    pub(crate) client_name: String,
    pub(crate) transport: CameraTransport,
    /// Serializes structural transitions: connect, disconnect, category switches, property commits
    pub(crate) transitions: tokio::sync::Mutex<()>,
    pub(crate) state: Mutex<DeviceState>,
    pub(crate) status: watch::Sender<ConnectionStatus>,
    pub(crate) properties: PropertyRegistry,
    pub(crate) live_view: LiveViewStreamer,
    pub(crate) transfer_handlers: TransferHandlers,
}

impl fmt::Debug for Shared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shared")
            .field("identifier", &self.config.identifier)
            .field("status", &*self.status.borrow())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Shared {
    pub(crate) fn connection_state(&self) -> ConnectionState {
        self.status.borrow().state
    }

    pub(crate) fn set_connection_state(&self, state: ConnectionState) {
        debug!("connection state -> {state}");
        self.status.send_modify(|s| s.state = state);
    }

    /// Moves from `NotConnected` to `Connecting`, returning false if the camera was in any other
    /// state. Concurrent callers cannot both succeed.
    pub(crate) fn begin_connecting(&self) -> bool {
        let claimed = self.status.send_if_modified(|s| {
            if s.state != ConnectionState::NotConnected {
                return false;
            }
            s.state = ConnectionState::Connecting;
            s.disconnection_was_expected = false;
            true
        });
        if claimed {
            debug!("connection state -> {}", ConnectionState::Connecting);
        }
        claimed
    }

    pub(crate) fn expect_disconnection(&self) {
        self.status.send_modify(|s| s.disconnection_was_expected = true);
    }

    pub(crate) fn current_categories(&self) -> CommandCategorySet {
        lock(&self.state).categories
    }

    pub(crate) fn require_connected(&self) -> Result<(), CameraError> {
        if self.connection_state() == ConnectionState::Connected {
            Ok(())
        } else {
            Err(CameraError::NotConnected)
        }
    }

    /// Checks the camera is connected and in at least one of the given categories
    pub(crate) fn require_categories(&self, any_of: CommandCategorySet) -> Result<(), CameraError> {
        self.require_connected()?;
        if self.current_categories().intersects(any_of) {
            Ok(())
        } else {
            Err(CameraError::IncorrectCommandCategory)
        }
    }

    pub(crate) fn storage_configured(&self) -> bool {
        self.config.storage_root.is_some()
    }

    pub(crate) fn supported_combinations(&self) -> Vec<CommandCategorySet> {
        category::supported_combinations(self.storage_configured(), self.config.file_system_access)
    }
}

/// A simulated camera.
///
/// This is a cheap handle: clones refer to the same camera.
/// All methods must be called from within a tokio runtime.
#[derive(Clone)]
pub struct Camera {
    shared: Arc<Shared>,
}

impl fmt::Debug for Camera {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Camera").field(&self.shared).finish()
    }
}

impl Camera {
    /// Creates a camera with the default image codec
    #[must_use]
    pub fn new(config: SimulatorConfiguration) -> Self {
        Self::with_codec(config, Arc::new(StandardCodec))
    }

    /// Creates a camera with a custom image codec
    #[must_use]
    pub fn with_codec(config: SimulatorConfiguration, codec: Arc<dyn ImageCodec>) -> Self {
        let transport = config
            .transports
            .first()
            .copied()
            .unwrap_or(CameraTransport::Network);
        Self::build(config, codec, String::new(), transport)
    }

    pub(crate) fn build(
        config: SimulatorConfiguration,
        codec: Arc<dyn ImageCodec>,
        client_name: String,
        transport: CameraTransport,
    ) -> Self {
        let latency = config.latency();
        let (status, _) = watch::channel(ConnectionStatus::default());
        let shared = Arc::new_cyclic(|weak| Shared {
            properties: PropertyRegistry::new(weak.clone(), config.exposure_property_type),
            live_view: LiveViewStreamer::default(),
            transfer_handlers: TransferHandlers::default(),
            config,
            latency,
            codec,
            client_name,
            transport,
            transitions: tokio::sync::Mutex::new(()),
            state: Mutex::new(DeviceState::default()),
            status,
        });
        Self { shared }
    }

    /// The camera's unique identifier
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.shared.config.identifier
    }

    /// The camera's name, as a user would recognise it
    #[must_use]
    pub fn friendly_display_name(&self) -> String {
        format!(
            "{} {}",
            self.shared.config.manufacturer, self.shared.config.model
        )
    }

    /// The transport the camera was found on
    #[must_use]
    pub fn transport(&self) -> CameraTransport {
        self.shared.transport
    }

    /// The name of the client application that discovered the camera, if any
    #[must_use]
    pub fn client_name(&self) -> &str {
        &self.shared.client_name
    }

    /// The configuration the camera was created with
    #[must_use]
    pub fn configuration(&self) -> &SimulatorConfiguration {
        &self.shared.config
    }

    /// The current connection state
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.shared.connection_state()
    }

    /// Whether the camera is connected
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    /// Subscribes to connection state changes
    #[must_use]
    pub fn watch_connection_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status.subscribe()
    }

    /// Device information, available while connected
    #[must_use]
    pub fn device_info(&self) -> Option<DeviceInfo> {
        self.is_connected().then(|| DeviceInfo {
            manufacturer: self.shared.config.manufacturer.clone(),
            model: self.shared.config.model.clone(),
            version: "1.0".into(),
            identifier: self.shared.config.identifier.clone(),
        })
    }

    /// The property for an identifier.
    ///
    /// Repeated calls with the same identifier return the same property object.
    #[must_use]
    pub fn property(&self, identifier: PropertyIdentifier) -> Property {
        self.shared.properties.property(identifier)
    }

    /// Properties in a category that currently have a value
    #[must_use]
    pub fn populated_properties(&self, category: PropertyCategory) -> Vec<Property> {
        self.shared.properties.populated(category)
    }

    /// The camera's storage devices. Empty unless connected with storage configured.
    #[must_use]
    pub fn storage_devices(&self) -> Vec<FileStorage> {
        lock(&self.shared.state).storage.iter().cloned().collect()
    }

    /// Whether two handles refer to the same camera
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.shared, &b.shared)
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }
}
