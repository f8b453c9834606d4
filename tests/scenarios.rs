//! End-to-end sessions against the public API
// (c) 2024 Ross Younger

use std::{
    path::Path,
    sync::{Arc, Mutex},
};

use pretty_assertions::assert_eq;
use tokio::sync::mpsc;

use simcam::{
    Camera, CameraError, CommandCategorySet as C, ConnectionState, PropertyIdentifier,
    SimulatorConfiguration, SimulatorRegistry,
    camera::{AuthenticationEvent, ConnectFlags},
    config::{Authentication, ConnectionSpeed, FileSystemAccess},
    property::AutoExposureMode,
    registry::{DiscoveryEvent, DiscoveryMode},
    storage::ChunkInstruction,
    transfer::{Representations, TransferState},
};

fn configuration(storage: Option<&Path>) -> SimulatorConfiguration {
    SimulatorConfiguration {
        authentication: Authentication::None,
        connection_speed: ConnectionSpeed::Fast,
        storage_root: storage.map(Path::to_path_buf),
        file_system_access: FileSystemAccess::Alongside,
        ..SimulatorConfiguration::system_default().clone()
    }
}

async fn connect(camera: &Camera) {
    let (tx, _rx) = mpsc::unbounded_channel();
    let warnings = camera.connect(ConnectFlags::default(), tx).await.unwrap();
    assert!(warnings.is_empty());
}

#[tokio::test(start_paused = true)]
async fn connect_with_storage_alongside() {
    let card = tempfile::tempdir().unwrap();
    let camera = Camera::new(configuration(Some(card.path())));
    connect(&camera).await;
    assert_eq!(camera.connection_state(), ConnectionState::Connected);
    assert_eq!(
        camera.current_command_categories(),
        C::STILLS_SHOOTING | C::FILESYSTEM_ACCESS
    );
    assert_eq!(camera.storage_devices().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn property_change_refused_outside_shooting() {
    let card = tempfile::tempdir().unwrap();
    let camera = Camera::new(SimulatorConfiguration {
        file_system_access: FileSystemAccess::Exclusive,
        ..configuration(Some(card.path()))
    });
    connect(&camera).await;
    camera
        .property(PropertyIdentifier::AutoExposureMode)
        .set_value(AutoExposureMode::AperturePriority.into())
        .await
        .unwrap();
    let aperture = camera.property(PropertyIdentifier::Aperture);
    let before = aperture.current_value();
    let wanted = aperture.valid_settable_values().last().cloned().unwrap();

    camera
        .set_current_command_categories(C::FILESYSTEM_ACCESS)
        .await
        .unwrap();
    assert_eq!(
        aperture.set_value(wanted).await,
        Err(CameraError::IncorrectCommandCategory)
    );
    assert_eq!(aperture.current_value(), before);
}

#[tokio::test(start_paused = true)]
async fn program_mode_hides_aperture_and_shutter() {
    let camera = Camera::new(configuration(None));
    connect(&camera).await;
    let mode = camera.property(PropertyIdentifier::AutoExposureMode);
    mode.set_value(AutoExposureMode::FullyManual.into())
        .await
        .unwrap();
    mode.set_value(AutoExposureMode::ProgramAuto.into())
        .await
        .unwrap();
    for id in [PropertyIdentifier::Aperture, PropertyIdentifier::ShutterSpeed] {
        let p = camera.property(id);
        assert!(p.valid_settable_values().is_empty(), "{id}");
        assert_eq!(p.current_value(), None, "{id}");
    }
}

#[tokio::test(start_paused = true)]
async fn cancelled_stream_completes_once() {
    let card = tempfile::tempdir().unwrap();
    std::fs::write(card.path().join("empty.jpg"), b"").unwrap();
    let camera = Camera::new(configuration(Some(card.path())));
    connect(&camera).await;
    let root = camera.storage_devices()[0].root_folder().clone();
    let children = root.load_children().await.unwrap();
    assert_eq!(children.len(), 1);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let chunks = Arc::new(Mutex::new(Vec::new()));
    let chunks2 = chunks.clone();
    let _progress = children[0].stream_item(
        |_| (),
        move |_, chunk, ()| {
            chunks2.lock().unwrap().push(chunk.len());
            ChunkInstruction::Cancel
        },
        move |_, error, ()| tx.send(error).unwrap(),
    );
    assert_eq!(rx.recv().await, Some(Some(CameraError::CancelledByUser)));
    assert_eq!(rx.recv().await, None);
    assert_eq!(*chunks.lock().unwrap(), vec![0]);
}

#[tokio::test(start_paused = true)]
async fn shot_preview_transfers_once() {
    let frames = tempfile::tempdir().unwrap();
    let frame = frames.path().join("frame.jpg");
    image::RgbImage::new(16, 12).save(&frame).unwrap();
    let camera = Camera::new(SimulatorConfiguration {
        live_view_frames: vec![frame],
        ..configuration(None)
    });
    connect(&camera).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _token = camera.add_transfer_handler(move |transfer| {
        let _ = tx.send(transfer.clone());
    });
    camera.invoke_one_shot_shutter().await.unwrap();
    let transfer = rx.recv().await.unwrap();
    assert_eq!(transfer.state(), TransferState::NotStarted);

    let result = transfer
        .execute_transfer(Representations::PREVIEW)
        .await
        .unwrap();
    assert!(!result.generate_data(Representations::PREVIEW).unwrap().is_empty());
    assert_eq!(transfer.state(), TransferState::Complete);
    assert_eq!(
        transfer
            .execute_transfer(Representations::PREVIEW)
            .await
            .unwrap_err(),
        CameraError::NotAvailable
    );
    assert_eq!(transfer.state(), TransferState::Complete);
}

#[tokio::test(start_paused = true)]
async fn discover_authenticate_and_disconnect() {
    let registry = SimulatorRegistry::new(SimulatorConfiguration {
        authentication: Authentication::FourDigitCode {
            code: "2468".into(),
        },
        ..configuration(None)
    });
    let (tx, mut discovered) = mpsc::unbounded_channel();
    registry.start_discovery(DiscoveryMode::NetworkOnly, "scenario tests", tx);
    let Some(DiscoveryEvent::Discovered(camera)) = discovered.recv().await else {
        panic!("no camera found");
    };

    let (auth_tx, mut auth_rx) = mpsc::unbounded_channel();
    let responder = tokio::spawn(async move {
        while let Some(event) = auth_rx.recv().await {
            if let AuthenticationEvent::Requested(context) = event {
                context.submit_code("2468");
            }
        }
    });
    let _ = camera
        .connect(ConnectFlags::default(), auth_tx)
        .await
        .unwrap();
    assert!(camera.is_connected());
    responder.await.unwrap();

    let status = camera.watch_connection_status();
    camera.disconnect().await.unwrap();
    assert!(status.borrow().disconnection_was_expected);
    let Some(DiscoveryEvent::LostSightOf(lost)) = discovered.recv().await else {
        panic!("camera not forgotten");
    };
    assert!(Camera::ptr_eq(&lost, &camera));
    assert!(registry.visible_cameras().is_empty());
}
