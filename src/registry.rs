//! Discovery of simulated cameras
// (c) 2024 Ross Younger
//!
//! A [`SimulatorRegistry`] stands in for the discovery layer of a camera SDK.
//! It is an ordinary value owned by the application; there is no process-wide state.
//! While discovery runs, it "finds" one simulated camera built from its configuration,
//! and loses sight of it again when that camera disconnects or discovery stops.

use std::{
    fmt,
    sync::{Arc, Mutex, Weak},
    time::Duration,
};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument as _, debug, info, info_span};

use crate::{
    Camera,
    camera::ConnectionState,
    codec::{ImageCodec, StandardCodec},
    config::{CameraTransport, SimulatorConfiguration},
    util::lock,
};

/// How long discovery takes to find the simulated camera
pub const DISCOVERY_DELAY: Duration = Duration::from_secs(1);

/// Which transports to search
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, strum::Display)]
pub enum DiscoveryMode {
    /// Network cameras only
    NetworkOnly,
    /// USB cameras only
    UsbOnly,
    /// Both
    #[default]
    NetworkAndUsb,
}

impl DiscoveryMode {
    /// The transport a camera found in this mode appears on, if it can be found at all
    fn transport(self, available: &[CameraTransport]) -> Option<CameraTransport> {
        match self {
            Self::NetworkOnly => available
                .contains(&CameraTransport::Network)
                .then_some(CameraTransport::Network),
            Self::UsbOnly => available
                .contains(&CameraTransport::Usb)
                .then_some(CameraTransport::Usb),
            Self::NetworkAndUsb => Some(CameraTransport::Network),
        }
    }
}

/// Changes in the set of visible cameras
#[derive(Debug, Clone)]
pub enum DiscoveryEvent {
    /// A camera has appeared
    Discovered(Camera),
    /// A camera is no longer visible
    LostSightOf(Camera),
}

#[derive(Debug, Default)]
struct DiscoveryState {
    run: Option<CancellationToken>,
    camera: Option<Camera>,
    events: Option<mpsc::UnboundedSender<DiscoveryEvent>>,
}

struct RegistryInner {
    config: Mutex<SimulatorConfiguration>,
    codec: Arc<dyn ImageCodec>,
    discovery: Mutex<DiscoveryState>,
}

/// Finds simulated cameras
#[derive(Clone)]
pub struct SimulatorRegistry {
    inner: Arc<RegistryInner>,
}

impl fmt::Debug for SimulatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulatorRegistry")
            .field("discovery", &self.inner.discovery)
            .finish_non_exhaustive()
    }
}

impl SimulatorRegistry {
    /// Creates a registry whose cameras use the default image codec
    #[must_use]
    pub fn new(config: SimulatorConfiguration) -> Self {
        Self::with_codec(config, Arc::new(StandardCodec))
    }

    /// Creates a registry whose cameras use a custom image codec
    #[must_use]
    pub fn with_codec(config: SimulatorConfiguration, codec: Arc<dyn ImageCodec>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                config: Mutex::new(config),
                codec,
                discovery: Mutex::new(DiscoveryState::default()),
            }),
        }
    }

    /// Replaces the configuration. Cameras already found keep the configuration they were built with.
    pub fn apply_configuration(&self, config: SimulatorConfiguration) {
        *lock(&self.inner.config) = config;
    }

    /// The configuration new cameras will be built with
    #[must_use]
    pub fn configuration(&self) -> SimulatorConfiguration {
        lock(&self.inner.config).clone()
    }

    /// Starts looking for cameras. Events are sent to `events` until discovery stops.
    ///
    /// After [`DISCOVERY_DELAY`] the simulated camera is found, provided the configured
    /// transports allow it in this mode. Restarting discovery abandons the previous run.
    pub fn start_discovery(
        &self,
        mode: DiscoveryMode,
        client_name: impl Into<String>,
        events: mpsc::UnboundedSender<DiscoveryEvent>,
    ) {
        self.stop_discovery();
        let run = CancellationToken::new();
        {
            let mut state = lock(&self.inner.discovery);
            state.run = Some(run.clone());
            state.events = Some(events);
        }
        info!("starting discovery ({mode})");
        let _ = tokio::spawn(
            discover(Arc::downgrade(&self.inner), mode, client_name.into(), run)
                .instrument(info_span!("DISCOVERY")),
        );
    }

    /// Stops discovery. Any visible camera is lost sight of.
    pub fn stop_discovery(&self) {
        let (camera, events) = {
            let mut state = lock(&self.inner.discovery);
            if let Some(run) = state.run.take() {
                run.cancel();
            }
            (state.camera.take(), state.events.take())
        };
        if let (Some(camera), Some(events)) = (camera, events) {
            debug!("discovery stopped; losing sight of {}", camera.identifier());
            let _ = events.send(DiscoveryEvent::LostSightOf(camera));
        }
    }

    /// Whether discovery is running
    #[must_use]
    pub fn is_discovering(&self) -> bool {
        lock(&self.inner.discovery).run.is_some()
    }

    /// The cameras currently visible
    #[must_use]
    pub fn visible_cameras(&self) -> Vec<Camera> {
        lock(&self.inner.discovery).camera.iter().cloned().collect()
    }
}

impl RegistryInner {
    fn found(&self, run: &CancellationToken, camera: &Camera) -> bool {
        let mut state = lock(&self.discovery);
        if run.is_cancelled() {
            return false;
        }
        state.camera = Some(camera.clone());
        if let Some(events) = &state.events {
            let _ = events.send(DiscoveryEvent::Discovered(camera.clone()));
        }
        true
    }

    fn lost(&self, camera: &Camera) {
        let mut state = lock(&self.discovery);
        if state
            .camera
            .as_ref()
            .is_some_and(|c| Camera::ptr_eq(c, camera))
        {
            state.camera = None;
            if let Some(events) = &state.events {
                let _ = events.send(DiscoveryEvent::LostSightOf(camera.clone()));
            }
        }
    }
}

async fn discover(
    registry: Weak<RegistryInner>,
    mode: DiscoveryMode,
    client_name: String,
    run: CancellationToken,
) {
    tokio::select! {
        () = run.cancelled() => return,
        () = tokio::time::sleep(DISCOVERY_DELAY) => (),
    }
    let Some(inner) = registry.upgrade() else {
        return;
    };
    let config = lock(&inner.config).clone();
    let Some(transport) = mode.transport(&config.transports) else {
        debug!("no simulated camera visible in mode {mode}");
        return;
    };
    let camera = Camera::build(config, Arc::clone(&inner.codec), client_name, transport);
    if !inner.found(&run, &camera) {
        return;
    }
    info!("discovered {} via {transport}", camera.identifier());
    drop(inner);
    forget_on_disconnect(registry, camera, run).await;
}

/// Loses sight of a camera once it has connected and then disconnected
async fn forget_on_disconnect(
    registry: Weak<RegistryInner>,
    camera: Camera,
    run: CancellationToken,
) {
    let mut status = camera.watch_connection_status();
    let mut was_connected = false;
    loop {
        tokio::select! {
            () = run.cancelled() => return,
            changed = status.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
        // Intermediate states may be coalesced; a disconnect leaves its flag set until the next attempt
        let current = *status.borrow_and_update();
        match current.state {
            ConnectionState::Connected | ConnectionState::Disconnecting => was_connected = true,
            ConnectionState::NotConnected
                if was_connected || current.disconnection_was_expected =>
            {
                break;
            }
            _ => (),
        }
    }
    if let Some(inner) = registry.upgrade() {
        debug!("{} disconnected; forgetting it", camera.identifier());
        inner.lost(&camera);
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod test {
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use tokio::sync::mpsc;

    use super::{DiscoveryEvent, DiscoveryMode, SimulatorRegistry};
    use crate::{
        camera::{ConnectFlags, test_support::config},
        config::{CameraTransport, FileSystemAccess, SimulatorConfiguration},
    };

    #[rstest]
    #[case(DiscoveryMode::NetworkOnly, &[CameraTransport::Usb], None)]
    #[case(DiscoveryMode::NetworkOnly, &[CameraTransport::Network], Some(CameraTransport::Network))]
    #[case(
        DiscoveryMode::UsbOnly,
        &[CameraTransport::Network, CameraTransport::Usb],
        Some(CameraTransport::Usb)
    )]
    #[case(DiscoveryMode::NetworkAndUsb, &[CameraTransport::Usb], Some(CameraTransport::Network))]
    fn transports(
        #[case] mode: DiscoveryMode,
        #[case] available: &[CameraTransport],
        #[case] expected: Option<CameraTransport>,
    ) {
        assert_eq!(mode.transport(available), expected);
    }

    #[tokio::test(start_paused = true)]
    async fn discovers_then_forgets_on_disconnect() {
        let registry = SimulatorRegistry::new(config(None, FileSystemAccess::Alongside));
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.start_discovery(DiscoveryMode::NetworkAndUsb, "tests", tx);
        assert!(registry.is_discovering());
        assert!(registry.visible_cameras().is_empty());

        let DiscoveryEvent::Discovered(camera) = rx.recv().await.unwrap() else {
            panic!("expected a camera");
        };
        assert_eq!(camera.client_name(), "tests");
        assert_eq!(camera.transport(), CameraTransport::Network);
        assert_eq!(registry.visible_cameras().len(), 1);

        let (auth, _auth_rx) = mpsc::unbounded_channel();
        let _ = camera.connect(ConnectFlags::default(), auth).await.unwrap();
        camera.disconnect().await.unwrap();
        let DiscoveryEvent::LostSightOf(lost) = rx.recv().await.unwrap() else {
            panic!("expected loss");
        };
        assert!(crate::Camera::ptr_eq(&lost, &camera));
        assert!(registry.visible_cameras().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_before_found() {
        let registry = SimulatorRegistry::new(SimulatorConfiguration {
            transports: vec![CameraTransport::Usb],
            ..config(None, FileSystemAccess::Alongside)
        });
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.start_discovery(DiscoveryMode::UsbOnly, "tests", tx);
        registry.stop_discovery();
        assert!(!registry.is_discovering());
        tokio::time::sleep(super::DISCOVERY_DELAY * 2).await;
        assert!(registry.visible_cameras().is_empty());
        // The sender was dropped by stop_discovery and nothing was ever sent
        assert!(rx.recv().await.is_none());
    }
}
