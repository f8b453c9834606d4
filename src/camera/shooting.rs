//! Focus, shutter and video recording
// (c) 2024 Ross Younger

use std::time::Duration;

use tracing::{debug, info};

use super::{Camera, Shared};
use crate::{
    CameraError, category::CommandCategorySet, config::OperationSize, transfer, util::lock,
};

impl Shared {
    pub(crate) fn is_recording(&self) -> bool {
        lock(&self.state).recording.is_some()
    }

    pub(crate) fn stop_recording(&self) {
        if let Some(started) = lock(&self.state).recording.take() {
            info!(
                "video recording stopped after {}s",
                started.elapsed().as_secs()
            );
        }
    }
}

impl Camera {
    fn require_stills(&self) -> Result<(), CameraError> {
        self.shared
            .require_categories(CommandCategorySet::STILLS_SHOOTING)
    }

    /// Starts autofocus, as by half-pressing the shutter button
    ///
    /// # Errors
    /// `NotConnected`, or `IncorrectCommandCategory` unless in stills shooting
    pub async fn engage_auto_focus(&self) -> Result<(), CameraError> {
        self.require_stills()?;
        debug!("engage autofocus");
        self.shared.latency.wait(OperationSize::Large).await;
        Ok(())
    }

    /// Releases autofocus
    ///
    /// # Errors
    /// `NotConnected`, or `IncorrectCommandCategory` unless in stills shooting
    pub async fn disengage_auto_focus(&self) -> Result<(), CameraError> {
        self.require_stills()?;
        debug!("disengage autofocus");
        self.shared.latency.wait(OperationSize::Small).await;
        Ok(())
    }

    /// Presses the shutter button
    ///
    /// # Errors
    /// `NotConnected`, or `IncorrectCommandCategory` unless in stills shooting
    pub async fn engage_shutter(&self) -> Result<(), CameraError> {
        self.require_stills()?;
        debug!("engage shutter");
        self.shared.latency.wait(OperationSize::Large).await;
        Ok(())
    }

    /// Releases the shutter button, completing a shot.
    ///
    /// Shortly afterwards, registered transfer handlers are offered a preview of the shot.
    ///
    /// # Errors
    /// `NotConnected`, or `IncorrectCommandCategory` unless in stills shooting
    pub async fn disengage_shutter(&self) -> Result<(), CameraError> {
        self.require_stills()?;
        debug!("disengage shutter");
        self.shared.latency.wait(OperationSize::Small).await;
        transfer::schedule_shot_preview(&self.shared);
        Ok(())
    }

    /// Focuses and takes a shot in one operation.
    ///
    /// Shortly afterwards, registered transfer handlers are offered a preview of the shot.
    ///
    /// # Errors
    /// `NotConnected`, or `IncorrectCommandCategory` unless in stills shooting
    pub async fn invoke_one_shot_shutter(&self) -> Result<(), CameraError> {
        self.require_stills()?;
        debug!("one-shot shutter");
        self.shared.latency.wait(OperationSize::Large).await;
        transfer::schedule_shot_preview(&self.shared);
        Ok(())
    }

    /// Starts recording video
    ///
    /// # Errors
    /// * `NotConnected`, or `IncorrectCommandCategory` unless in video recording
    /// * `VideoRecordingInProgress` if already recording
    pub async fn start_video_recording(&self) -> Result<(), CameraError> {
        let shared = &self.shared;
        let _guard = shared.transitions.lock().await;
        shared.require_categories(CommandCategorySet::VIDEO_RECORDING)?;
        if shared.is_recording() {
            return Err(CameraError::VideoRecordingInProgress);
        }
        shared.latency.wait(OperationSize::Large).await;
        lock(&shared.state).recording = Some(tokio::time::Instant::now());
        info!("video recording started");
        Ok(())
    }

    /// Stops recording video
    ///
    /// # Errors
    /// * `NotConnected`, or `IncorrectCommandCategory` unless in video recording
    /// * `NotAvailable` if not recording
    pub async fn end_video_recording(&self) -> Result<(), CameraError> {
        let shared = &self.shared;
        let _guard = shared.transitions.lock().await;
        shared.require_categories(CommandCategorySet::VIDEO_RECORDING)?;
        if !shared.is_recording() {
            return Err(CameraError::NotAvailable);
        }
        shared.latency.wait(OperationSize::Large).await;
        shared.stop_recording();
        Ok(())
    }

    /// Whether a video recording is in progress
    #[must_use]
    pub fn is_video_recording(&self) -> bool {
        self.shared.is_recording()
    }

    /// How long the current video recording has been running, in whole seconds
    #[must_use]
    pub fn video_recording_timer(&self) -> Option<Duration> {
        lock(&self.shared.state)
            .recording
            .map(|started| Duration::from_secs(started.elapsed().as_secs()))
    }

    /// Asks the camera to set its clock.
    ///
    /// The simulated camera has no clock to set, so beyond the usual delay this does nothing.
    ///
    /// # Errors
    /// `NotConnected`
    pub async fn update_clock(&self, time: std::time::SystemTime) -> Result<(), CameraError> {
        self.shared.require_connected()?;
        debug!("update clock to {time:?}");
        self.shared.latency.wait(OperationSize::Medium).await;
        Ok(())
    }
}
