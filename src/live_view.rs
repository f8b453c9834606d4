//! Live view streaming
// (c) 2024 Ross Younger
//!
//! Live view frames are pulled, not pushed. Each frame is delivered together with a
//! [`FrameReadySignal`]; the next frame is produced only after the consumer fires it.
//! Timer ticks that arrive while a frame is outstanding are dropped, so a slow consumer sees a
//! lower frame rate and never a backlog.

use std::{
    fmt,
    path::Path,
    sync::{
        Arc, Mutex, Weak,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::SystemTime,
};

use anyhow::Context as _;
use bytes::Bytes;
use image::DynamicImage;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument as _, debug, debug_span, info, trace, warn};

use crate::{
    Camera, CameraError,
    camera::Shared,
    codec::ImageCodec,
    config::OperationSize,
    util::lock,
};

/// Options affecting how live view frames are produced
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LiveViewOptions {
    /// Deliver only the encoded frame, without a decoded image
    pub skip_image_decoding: bool,
}

/// Why a live view stream stopped (or never started)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display)]
pub enum LiveViewTermination {
    /// The stream was ended by the client, a category switch or disconnection
    EndedNormally,
    /// A stream was already running; the request was ignored
    AlreadyStreaming,
    /// The stream could not be started
    Failed,
}

/// The lifecycle of the live view stream
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, strum::Display)]
pub enum LiveViewState {
    /// No stream
    #[default]
    Idle,
    /// A stream has been requested and is loading
    Starting,
    /// Frames are being delivered
    Streaming,
}

/// Orientation of the camera when a frame was captured
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum FrameOrientation {
    Landscape,
    PortraitLeft,
    PortraitRight,
    LandscapeUpsideDown,
}

/// Pixel dimensions
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

/// A rectangle within a frame, in pixels
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// A single live view frame
#[derive(Clone)]
pub struct LiveViewFrame {
    /// When the frame was produced
    pub produced_at: SystemTime,
    /// Camera orientation
    pub orientation: FrameOrientation,
    /// The JPEG-encoded frame
    pub raw_data: Bytes,
    /// Size of the frame
    pub size: FrameSize,
    /// The part of the sensor the frame shows; always the full frame here
    pub crop_rect: CropRect,
    /// Aspect ratio of the sensor
    pub aspect: FrameSize,
    /// The decoded frame, unless decoding was skipped (or failed)
    pub decoded_image: Option<Arc<DynamicImage>>,
}

impl fmt::Debug for LiveViewFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveViewFrame")
            .field("produced_at", &self.produced_at)
            .field("orientation", &self.orientation)
            .field("raw_data", &self.raw_data.len())
            .field("size", &self.size)
            .field("decoded", &self.decoded_image.is_some())
            .finish_non_exhaustive()
    }
}

/// Tells the camera the consumer is ready for another frame.
///
/// Fire it exactly once per delivered frame.
/// A signal that is dropped without firing stalls the stream.
#[derive(Debug)]
pub struct FrameReadySignal {
    flag: Arc<AtomicBool>,
}

impl FrameReadySignal {
    /// Requests the next frame
    pub fn ready(self) {
        self.flag.store(true, Ordering::Release);
    }
}

type TerminationHandler = Box<dyn FnOnce(LiveViewTermination, Option<CameraError>) + Send>;

struct ActiveStream {
    id: u64,
    streaming: bool,
    cancel: CancellationToken,
    on_terminate: TerminationHandler,
}

#[derive(Default)]
struct StreamerState {
    active: Option<ActiveStream>,
    options: LiveViewOptions,
}

/// Owns the camera's live view stream, if any
#[derive(Default)]
pub(crate) struct LiveViewStreamer {
    state: Mutex<StreamerState>,
    next_id: AtomicU64,
    /// Held for the duration of each frame delivery
    delivering: Mutex<()>,
}

impl fmt::Debug for LiveViewStreamer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveViewStreamer")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl LiveViewStreamer {
    pub(crate) fn state(&self) -> LiveViewState {
        match &lock(&self.state).active {
            None => LiveViewState::Idle,
            Some(a) if a.streaming => LiveViewState::Streaming,
            Some(_) => LiveViewState::Starting,
        }
    }

    fn options(&self) -> LiveViewOptions {
        lock(&self.state).options
    }

    /// Registers a new stream. Returns the handler back if one is already running.
    fn register(
        &self,
        options: LiveViewOptions,
        cancel: CancellationToken,
        on_terminate: TerminationHandler,
    ) -> Result<u64, TerminationHandler> {
        let mut state = lock(&self.state);
        if state.active.is_some() {
            return Err(on_terminate);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        state.options = options;
        state.active = Some(ActiveStream {
            id,
            streaming: false,
            cancel,
            on_terminate,
        });
        Ok(id)
    }

    fn mark_streaming(&self, id: u64) -> bool {
        match lock(&self.state).active.as_mut() {
            Some(a) if a.id == id => {
                a.streaming = true;
                true
            }
            _ => false,
        }
    }

    /// Ends stream `id` with a failure, unless it has already been replaced or ended
    fn fail(&self, id: u64, error: CameraError) {
        let ended = {
            let mut state = lock(&self.state);
            match &state.active {
                Some(a) if a.id == id => state.active.take(),
                _ => None,
            }
        };
        if let Some(stream) = ended {
            warn!("live view failed: {error}");
            (stream.on_terminate)(LiveViewTermination::Failed, Some(error));
        }
    }

    /// Stops the current stream, if any, reporting normal termination.
    /// Returns whether there was a stream to stop.
    pub(crate) fn terminate(&self) -> bool {
        let ended = lock(&self.state).active.take();
        match ended {
            Some(stream) => {
                stream.cancel.cancel();
                // Any delivery already under way completes before the owner hears of the end
                drop(lock(&self.delivering));
                info!("live view ended");
                (stream.on_terminate)(LiveViewTermination::EndedNormally, None);
                true
            }
            None => false,
        }
    }
}

/// An encoded frame image, ready to be turned into frames
#[derive(Clone, Debug)]
struct FrameSource {
    data: Bytes,
    size: FrameSize,
}

fn load_frame_source(codec: &dyn ImageCodec, path: &Path) -> anyhow::Result<FrameSource> {
    let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let (width, height) = codec.dimensions(&data)?;
    Ok(FrameSource {
        data: Bytes::from(data),
        size: FrameSize { width, height },
    })
}

async fn load_frame_sources(shared: &Shared) -> Vec<FrameSource> {
    let paths = shared.config.live_view_frames.clone();
    let codec = Arc::clone(&shared.codec);
    let loaded = tokio::task::spawn_blocking(move || {
        paths
            .iter()
            .filter_map(|path| match load_frame_source(codec.as_ref(), path) {
                Ok(source) => Some(source),
                Err(e) => {
                    warn!("skipping live view frame {}: {e:#}", path.display());
                    None
                }
            })
            .collect::<Vec<_>>()
    })
    .await;
    loaded.unwrap_or_default()
}

fn build_frame(
    codec: &dyn ImageCodec,
    source: FrameSource,
    options: LiveViewOptions,
) -> LiveViewFrame {
    let decoded_image = if options.skip_image_decoding {
        None
    } else {
        match codec.decode(&source.data) {
            Ok(image) => Some(Arc::new(image)),
            Err(e) => {
                warn!("live view frame failed to decode: {e:#}");
                None
            }
        }
    };
    LiveViewFrame {
        produced_at: SystemTime::now(),
        orientation: FrameOrientation::Landscape,
        raw_data: source.data,
        size: source.size,
        crop_rect: CropRect {
            x: 0,
            y: 0,
            width: source.size.width,
            height: source.size.height,
        },
        aspect: source.size,
        decoded_image,
    }
}

async fn run_stream<D>(
    session: Weak<Shared>,
    id: u64,
    cancel: CancellationToken,
    mut delivery: D,
) where
    D: FnMut(LiveViewFrame, FrameReadySignal) + Send + 'static,
{
    let Some(shared) = session.upgrade() else {
        return;
    };
    let sources = load_frame_sources(&shared).await;
    shared.latency.wait(OperationSize::Large).await;
    if cancel.is_cancelled() {
        return;
    }
    if sources.is_empty() {
        shared.live_view.fail(id, CameraError::InvalidInput);
        return;
    }
    if !shared.live_view.mark_streaming(id) {
        return;
    }
    let codec = Arc::clone(&shared.codec);
    let mut ticker = tokio::time::interval(shared.config.live_view_frame_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    drop(shared);
    info!("live view streaming {} frame source(s)", sources.len());

    let ready = Arc::new(AtomicBool::new(true));
    let mut next = 0usize;
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => (),
        }
        if !ready.swap(false, Ordering::AcqRel) {
            trace!("live view consumer busy; dropping tick");
            continue;
        }
        let Some(options) = session.upgrade().map(|s| s.live_view.options()) else {
            break;
        };
        let source = sources[next % sources.len()].clone();
        next = next.wrapping_add(1);
        let codec = Arc::clone(&codec);
        let built =
            tokio::task::spawn_blocking(move || build_frame(codec.as_ref(), source, options)).await;
        let frame = match built {
            Ok(frame) => frame,
            Err(e) => {
                warn!("live view frame construction failed: {e}");
                ready.store(true, Ordering::Release);
                continue;
            }
        };
        let Some(shared) = session.upgrade() else {
            break;
        };
        {
            let _delivering = lock(&shared.live_view.delivering);
            if cancel.is_cancelled() {
                break;
            }
            delivery(
                frame,
                FrameReadySignal {
                    flag: Arc::clone(&ready),
                },
            );
        }
    }
    debug!("live view task {id} finished");
}

impl Camera {
    /// Starts streaming live view frames.
    ///
    /// `delivery` is called with each frame and a [`FrameReadySignal`] which must be fired to
    /// receive the next one. `on_terminate` is called exactly once, when the stream ends or if it
    /// cannot start. Returns immediately; frames arrive on a background task.
    ///
    /// Streaming requires the stills shooting or video recording category. If that is not the case
    /// the stream fails with `IncorrectCommandCategory`; if no frame images can be loaded, it fails
    /// with `InvalidInput`. Asking for a second stream while one is running reports
    /// [`LiveViewTermination::AlreadyStreaming`] and leaves the first undisturbed.
    pub fn begin_live_view_stream<D, T>(
        &self,
        delivery: D,
        options: LiveViewOptions,
        on_terminate: T,
    ) where
        D: FnMut(LiveViewFrame, FrameReadySignal) + Send + 'static,
        T: FnOnce(LiveViewTermination, Option<CameraError>) + Send + 'static,
    {
        let shared = self.shared();
        if !shared.current_categories().allows_shooting() {
            on_terminate(
                LiveViewTermination::Failed,
                Some(CameraError::IncorrectCommandCategory),
            );
            return;
        }
        let cancel = CancellationToken::new();
        match shared
            .live_view
            .register(options, cancel.clone(), Box::new(on_terminate))
        {
            Ok(id) => {
                debug!("starting live view stream {id}");
                let _ = tokio::spawn(
                    run_stream(Arc::downgrade(shared), id, cancel, delivery)
                        .instrument(debug_span!("LIVE_VIEW", id)),
                );
            }
            Err(on_terminate) => {
                debug!("live view already running");
                on_terminate(LiveViewTermination::AlreadyStreaming, None);
            }
        }
    }

    /// Ends the live view stream. Does nothing if there is no stream.
    pub async fn end_live_view_stream(&self) {
        let shared = self.shared();
        let _guard = shared.transitions.lock().await;
        if shared.live_view.state() == LiveViewState::Idle {
            return;
        }
        shared.latency.wait(OperationSize::Large).await;
        let _ = shared.live_view.terminate();
    }

    /// The state of the live view stream
    #[must_use]
    pub fn live_view_state(&self) -> LiveViewState {
        self.shared().live_view.state()
    }

    /// Changes the live view options. They apply from the next frame produced.
    pub fn apply_live_view_options(&self, options: LiveViewOptions) {
        lock(&self.shared().live_view.state).options = options;
    }

    /// The live view options currently in force
    #[must_use]
    pub fn live_view_options(&self) -> LiveViewOptions {
        self.shared().live_view.options()
    }

    /// Moves the live view zoom centre.
    ///
    /// # Errors
    /// Always `NotAvailable`; the simulated camera cannot zoom.
    pub fn set_live_view_zoom_center(&self, x: u32, y: u32) -> Result<(), CameraError> {
        debug!("{}: zoom centre ({x}, {y}) not supported", self.identifier());
        Err(CameraError::NotAvailable)
    }

    /// Crops the live view.
    ///
    /// # Errors
    /// Always `NotAvailable`; the simulated camera cannot crop.
    pub fn set_live_view_crop(&self, crop: CropRect) -> Result<(), CameraError> {
        debug!("{}: crop {crop:?} not supported", self.identifier());
        Err(CameraError::NotAvailable)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod test {
    use std::{
        sync::{
            Arc, Mutex,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use pretty_assertions::assert_eq;
    use tokio::sync::mpsc;

    use super::{
        FrameReadySignal, LiveViewFrame, LiveViewOptions, LiveViewState, LiveViewTermination,
    };
    use crate::{
        Camera, CameraError, CommandCategorySet as C,
        camera::test_support::{config, connected},
        codec::fixtures::write_jpeg,
        config::{ConnectionSpeed, FileSystemAccess, SimulatorConfiguration},
    };

    type Terminations = Arc<Mutex<Vec<(LiveViewTermination, Option<CameraError>)>>>;

    fn recorder() -> (
        Terminations,
        impl FnOnce(LiveViewTermination, Option<CameraError>) + Send + 'static,
    ) {
        let log = Terminations::default();
        let log2 = log.clone();
        (log, move |t, e| log2.lock().unwrap().push((t, e)))
    }

    fn with_frames(dir: &tempfile::TempDir, count: usize) -> SimulatorConfiguration {
        let frames = (0..count)
            .map(|i| {
                let path = dir.path().join(format!("frame{i}.jpg"));
                write_jpeg(&path, 32, 24);
                path
            })
            .collect();
        SimulatorConfiguration {
            live_view_frames: frames,
            ..config(None, FileSystemAccess::Alongside)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn needs_shooting_category() {
        let dir = tempfile::tempdir().unwrap();
        let camera = Camera::new(with_frames(&dir, 1));
        let (log, on_terminate) = recorder();
        camera.begin_live_view_stream(|_, _| (), LiveViewOptions::default(), on_terminate);
        assert_eq!(
            *log.lock().unwrap(),
            vec![(
                LiveViewTermination::Failed,
                Some(CameraError::IncorrectCommandCategory)
            )]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn no_frames_fails_with_invalid_input() {
        let camera = connected(config(None, FileSystemAccess::Alongside)).await;
        let (log, on_terminate) = recorder();
        camera.begin_live_view_stream(|_, _| (), LiveViewOptions::default(), on_terminate);
        assert_eq!(camera.live_view_state(), LiveViewState::Starting);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(
            *log.lock().unwrap(),
            vec![(LiveViewTermination::Failed, Some(CameraError::InvalidInput))]
        );
        assert_eq!(camera.live_view_state(), LiveViewState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn second_stream_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let camera = connected(with_frames(&dir, 1)).await;
        let (first, on_terminate) = recorder();
        camera.begin_live_view_stream(
            |_, s: FrameReadySignal| s.ready(),
            LiveViewOptions::default(),
            on_terminate,
        );
        let (second, on_terminate) = recorder();
        camera.begin_live_view_stream(|_, _| (), LiveViewOptions::default(), on_terminate);
        assert_eq!(
            *second.lock().unwrap(),
            vec![(LiveViewTermination::AlreadyStreaming, None)]
        );
        assert!(first.lock().unwrap().is_empty());

        camera.end_live_view_stream().await;
        camera.end_live_view_stream().await;
        assert_eq!(
            *first.lock().unwrap(),
            vec![(LiveViewTermination::EndedNormally, None)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn slow_consumer_gets_one_frame_at_a_time() {
        let dir = tempfile::tempdir().unwrap();
        let camera = connected(with_frames(&dir, 2)).await;
        let (tx, mut rx) = mpsc::unbounded_channel::<(LiveViewFrame, FrameReadySignal)>();
        let (_log, on_terminate) = recorder();
        camera.begin_live_view_stream(
            move |frame, signal| {
                let _ = tx.send((frame, signal));
            },
            LiveViewOptions::default(),
            on_terminate,
        );

        let (frame, signal) = rx.recv().await.unwrap();
        assert_eq!(camera.live_view_state(), LiveViewState::Streaming);
        assert_eq!((frame.size.width, frame.size.height), (32, 24));
        assert!(frame.decoded_image.is_some());

        // Many ticks pass; nothing more arrives until we signal
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());

        camera.apply_live_view_options(LiveViewOptions {
            skip_image_decoding: true,
        });
        signal.ready();
        let (frame, _signal) = rx.recv().await.unwrap();
        assert!(frame.decoded_image.is_none());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
        camera.end_live_view_stream().await;
    }

    #[tokio::test(start_paused = true)]
    async fn ending_stops_deliveries() {
        let dir = tempfile::tempdir().unwrap();
        let camera = connected(with_frames(&dir, 1)).await;
        let delivered = Arc::new(AtomicUsize::new(0));
        let counter = delivered.clone();
        let (log, on_terminate) = recorder();
        camera.begin_live_view_stream(
            move |_, signal| {
                let _ = counter.fetch_add(1, Ordering::SeqCst);
                signal.ready();
            },
            LiveViewOptions::default(),
            on_terminate,
        );
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(delivered.load(Ordering::SeqCst) > 0);
        camera.end_live_view_stream().await;
        let after = delivered.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(delivered.load(Ordering::SeqCst), after);
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn termination_waits_for_a_delivery_in_progress() {
        let dir = tempfile::tempdir().unwrap();
        let camera = connected(SimulatorConfiguration {
            connection_speed: ConnectionSpeed::Instant,
            ..with_frames(&dir, 1)
        })
        .await;
        let events = Arc::new(Mutex::new(Vec::new()));
        let (delivered, ended) = (events.clone(), events.clone());
        let (started_tx, mut started) = mpsc::unbounded_channel();
        camera.begin_live_view_stream(
            move |_, signal: FrameReadySignal| {
                delivered.lock().unwrap().push("frame begins");
                let _ = started_tx.send(());
                std::thread::sleep(Duration::from_millis(200));
                delivered.lock().unwrap().push("frame ends");
                signal.ready();
            },
            LiveViewOptions::default(),
            move |_, _| ended.lock().unwrap().push("terminated"),
        );
        started.recv().await.unwrap();
        camera.end_live_view_stream().await;
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(
            *events.lock().unwrap(),
            vec!["frame begins", "frame ends", "terminated"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn leaving_shooting_ends_stream() {
        let dir = tempfile::tempdir().unwrap();
        let storage = tempfile::tempdir().unwrap();
        let camera = connected(SimulatorConfiguration {
            storage_root: Some(storage.path().to_path_buf()),
            file_system_access: FileSystemAccess::Exclusive,
            ..with_frames(&dir, 1)
        })
        .await;
        let (log, on_terminate) = recorder();
        camera.begin_live_view_stream(
            |_, s: FrameReadySignal| s.ready(),
            LiveViewOptions::default(),
            on_terminate,
        );
        camera
            .set_current_command_categories(C::FILESYSTEM_ACCESS)
            .await
            .unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec![(LiveViewTermination::EndedNormally, None)]
        );
        assert_eq!(camera.live_view_state(), LiveViewState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn zoom_and_crop_are_unavailable() {
        let camera = connected(config(None, FileSystemAccess::Alongside)).await;
        assert_eq!(
            camera.set_live_view_zoom_center(10, 10),
            Err(CameraError::NotAvailable)
        );
    }
}
