//! Connecting and disconnecting
// (c) 2024 Ross Younger

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{AuthenticationEvent, Camera, ConnectionState};
use crate::{
    CameraError,
    category::{self, CommandCategorySet},
    config::OperationSize,
    storage::FileStorage,
    util::lock,
};

/// Options for [`Camera::connect`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConnectFlags {
    /// Ask the camera to set its clock from the host's
    pub sync_camera_clock_to_system_clock: bool,
}

/// Broad groupings of connection warnings
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display)]
pub enum ConnectionWarningCategory {
    /// Warnings about things the camera could not do on connection
    Misc,
}

/// Things that went less than perfectly during a successful connection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display)]
pub enum ConnectionWarningKind {
    /// The camera cannot set its clock from the host
    ClockSyncNotSupported,
}

/// A non-fatal issue reported by a successful connection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionWarning {
    /// What happened
    pub kind: ConnectionWarningKind,
    /// How it is classified
    pub category: ConnectionWarningCategory,
}

/// Number of small operations the camera takes to report its initial properties
const PROPERTY_LOAD_OPERATIONS: u32 = 20;

impl Camera {
    /// Connects to the camera.
    ///
    /// If the camera requires authentication, the client is prompted through `auth_events`.
    /// Connecting a camera that is not disconnected succeeds immediately and changes nothing.
    ///
    /// # Errors
    /// * `CancelledByUser` if the client cancelled authentication,
    ///   or a disconnect overtook the attempt
    /// * `AuthenticationFailed` if the client ran out of authentication attempts
    pub async fn connect(
        &self,
        flags: ConnectFlags,
        auth_events: mpsc::UnboundedSender<AuthenticationEvent>,
    ) -> Result<Vec<ConnectionWarning>, CameraError> {
        let shared = &self.shared;
        if !shared.begin_connecting() {
            debug!(
                "connect requested while {}; nothing to do",
                shared.connection_state()
            );
            return Ok(Vec::new());
        }
        let _guard = shared.transitions.lock().await;
        if shared.connection_state() != ConnectionState::Connecting {
            // A disconnect got in first
            debug!("connection attempt abandoned");
            return Err(CameraError::CancelledByUser);
        }

        info!("connecting to {}", self.friendly_display_name());
        if let Err(e) = shared.authenticate(&auth_events).await {
            warn!("connection to {} failed: {e}", self.identifier());
            shared.set_connection_state(ConnectionState::NotConnected);
            return Err(e);
        }

        shared
            .latency
            .wait_multiple(OperationSize::Small, PROPERTY_LOAD_OPERATIONS)
            .await;
        shared.properties.seed();

        let storage = match &shared.config.storage_root {
            Some(root) => Some(FileStorage::open(Arc::downgrade(shared), root.clone()).await),
            None => None,
        };
        {
            let mut state = lock(&shared.state);
            state.categories = category::initial_categories(
                shared.storage_configured(),
                shared.config.file_system_access,
            );
            state.storage = storage;
            debug!("initial command categories {}", state.categories);
        }
        shared.set_connection_state(ConnectionState::Connected);
        info!("connected to {}", self.friendly_display_name());

        let mut warnings = Vec::new();
        if flags.sync_camera_clock_to_system_clock {
            warnings.push(ConnectionWarning {
                kind: ConnectionWarningKind::ClockSyncNotSupported,
                category: ConnectionWarningCategory::Misc,
            });
        }
        Ok(warnings)
    }

    /// Disconnects from the camera.
    ///
    /// Live view is ended and any video recording stopped before the connection closes.
    /// [`ConnectionStatus::disconnection_was_expected`](super::ConnectionStatus) is set before the
    /// camera leaves the connected state, and stays set until the next connection attempt.
    ///
    /// Disconnecting a camera that is not connected succeeds immediately.
    pub async fn disconnect(&self) -> Result<(), CameraError> {
        let shared = &self.shared;
        let _guard = shared.transitions.lock().await;
        if shared.connection_state() == ConnectionState::NotConnected {
            return Ok(());
        }

        info!("disconnecting from {}", self.friendly_display_name());
        shared.set_connection_state(ConnectionState::Disconnecting);
        let _ = shared.live_view.terminate();
        shared.expect_disconnection();

        shared.latency.wait(OperationSize::Medium).await;
        shared.stop_recording();
        {
            let mut state = lock(&shared.state);
            state.categories = CommandCategorySet::empty();
            state.storage = None;
        }
        shared.properties.reset();
        shared.set_connection_state(ConnectionState::NotConnected);
        info!("disconnected from {}", self.identifier());
        Ok(())
    }
}
