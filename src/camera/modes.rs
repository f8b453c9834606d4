//! Command category negotiation
// (c) 2024 Ross Younger

use tracing::{debug, info};

use super::Camera;
use crate::{CameraError, category::CommandCategorySet, config::OperationSize, util::lock};

impl Camera {
    /// The category combinations this camera can be switched into
    #[must_use]
    pub fn supported_command_category_combinations(&self) -> Vec<CommandCategorySet> {
        self.shared.supported_combinations()
    }

    /// Whether `categories` is exactly one of the supported combinations
    #[must_use]
    pub fn supports_command_categories(&self, categories: CommandCategorySet) -> bool {
        self.shared.supported_combinations().contains(&categories)
    }

    /// The categories the camera is currently in. Empty unless connected.
    #[must_use]
    pub fn current_command_categories(&self) -> CommandCategorySet {
        self.shared.current_categories()
    }

    /// Whether the current categories include all of `categories`
    #[must_use]
    pub fn current_command_categories_contains(&self, categories: CommandCategorySet) -> bool {
        self.shared.current_categories().contains(categories)
    }

    /// Switches the camera into a supported combination of categories.
    ///
    /// Anything the new combination does not allow is shut down first: a video recording
    /// stops if video is being left, and live view ends if shooting is being left altogether.
    /// The new categories only become visible once that has happened.
    ///
    /// # Errors
    /// * `NotConnected` if the camera is not connected
    /// * `IncorrectCommandCategory` if `requested` is not a supported combination
    pub async fn set_current_command_categories(
        &self,
        requested: CommandCategorySet,
    ) -> Result<(), CameraError> {
        let shared = &self.shared;
        let _guard = shared.transitions.lock().await;
        shared.require_connected()?;
        if !self.supports_command_categories(requested) {
            debug!("rejecting unsupported categories {requested}");
            return Err(CameraError::IncorrectCommandCategory);
        }
        let current = shared.current_categories();
        if current == requested {
            return Ok(());
        }

        info!("switching command categories from {current} to {requested}");
        if shared.is_recording() && !requested.contains(CommandCategorySet::VIDEO_RECORDING) {
            shared.latency.wait(OperationSize::Small).await;
            shared.stop_recording();
        }
        if !requested.allows_shooting() && shared.live_view.terminate() {
            debug!("live view ended by category switch");
        }
        shared.latency.wait(OperationSize::Large).await;
        lock(&shared.state).categories = requested;
        Ok(())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod test {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use crate::{
        Camera, CameraError, CommandCategorySet as C,
        camera::test_support::{config, connected},
        codec::fixtures::write_jpeg,
        config::{FileSystemAccess, SimulatorConfiguration},
        live_view::{FrameReadySignal, LiveViewOptions, LiveViewState, LiveViewTermination},
    };

    #[tokio::test(start_paused = true)]
    async fn switch_requires_connection() {
        let camera = Camera::new(config(None, FileSystemAccess::Alongside));
        assert_eq!(
            camera.set_current_command_categories(C::VIDEO_RECORDING).await,
            Err(CameraError::NotConnected)
        );
    }

    #[rstest]
    #[case(C::STILLS_SHOOTING | C::FILESYSTEM_ACCESS)]
    #[case(C::FILESYSTEM_ACCESS)]
    #[case(C::all())]
    #[tokio::test(start_paused = true)]
    async fn unsupported_combinations_are_rejected(#[case] requested: C) {
        let camera = connected(config(None, FileSystemAccess::Alongside)).await;
        assert_eq!(
            camera.set_current_command_categories(requested).await,
            Err(CameraError::IncorrectCommandCategory)
        );
        assert_eq!(camera.current_command_categories(), C::STILLS_SHOOTING);
    }

    #[tokio::test(start_paused = true)]
    async fn switch_lands_exactly_on_request() {
        let dir = tempfile::tempdir().unwrap();
        let camera = connected(config(Some(dir.path()), FileSystemAccess::Exclusive)).await;
        assert_eq!(camera.current_command_categories(), C::STILLS_SHOOTING);
        for requested in camera.supported_command_category_combinations() {
            camera
                .set_current_command_categories(requested)
                .await
                .unwrap();
            assert_eq!(camera.current_command_categories(), requested);
        }
        assert!(camera.current_command_categories_contains(C::FILESYSTEM_ACCESS));
        assert!(!camera.current_command_categories_contains(C::STILLS_SHOOTING));
    }

    #[tokio::test(start_paused = true)]
    async fn leaving_video_stops_recording() {
        let camera = connected(config(None, FileSystemAccess::Alongside)).await;
        camera
            .set_current_command_categories(C::VIDEO_RECORDING)
            .await
            .unwrap();
        camera.start_video_recording().await.unwrap();
        assert!(camera.is_video_recording());
        camera
            .set_current_command_categories(C::STILLS_SHOOTING)
            .await
            .unwrap();
        assert!(!camera.is_video_recording());
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_finishes_before_new_categories_appear() {
        let frames = tempfile::tempdir().unwrap();
        let frame = frames.path().join("frame.jpg");
        write_jpeg(&frame, 32, 24);
        let storage = tempfile::tempdir().unwrap();
        let camera = connected(SimulatorConfiguration {
            live_view_frames: vec![frame],
            ..config(Some(storage.path()), FileSystemAccess::Exclusive)
        })
        .await;
        camera
            .set_current_command_categories(C::VIDEO_RECORDING)
            .await
            .unwrap();
        camera.start_video_recording().await.unwrap();

        // What the stream's owner sees at the moment it is told the stream has ended
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (seen2, observed) = (seen.clone(), camera.clone());
        camera.begin_live_view_stream(
            |_, signal: FrameReadySignal| signal.ready(),
            LiveViewOptions::default(),
            move |why, _| {
                seen2.lock().unwrap().push((
                    why,
                    observed.is_video_recording(),
                    observed.current_command_categories(),
                ));
            },
        );
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(camera.live_view_state(), LiveViewState::Streaming);

        camera
            .set_current_command_categories(C::FILESYSTEM_ACCESS)
            .await
            .unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(LiveViewTermination::EndedNormally, false, C::VIDEO_RECORDING)]
        );
        assert_eq!(camera.current_command_categories(), C::FILESYSTEM_ACCESS);
        assert!(!camera.is_video_recording());
    }
}
