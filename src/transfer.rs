//! Camera-initiated transfers
// (c) 2024 Ross Younger
//!
//! After a shot, a real camera may offer the host a one-off chance to fetch the image.
//! The simulated camera does the same: shortly after each shot, every registered handler
//! is offered a [`CameraInitiatedTransfer`] carrying a JPEG preview.

use std::{
    fmt,
    path::Path,
    sync::{
        Arc, Mutex, Weak,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use bitflags::bitflags;
use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::{Camera, CameraError, camera::Shared, config::OperationSize, util::lock};

/// How long after a shot its preview is offered
pub const SHOT_PREVIEW_DELAY: Duration = Duration::from_secs(1);

bitflags! {
    /// The forms in which a transferred image can be delivered
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Representations: u8 {
        /// A JPEG preview
        const PREVIEW = 1;
        /// The original file, as stored on the card
        const ORIGINAL = 1 << 1;
    }
}

/// Progress of a [`CameraInitiatedTransfer`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, strum::Display)]
pub enum TransferState {
    /// Waiting for the host to execute it
    #[default]
    NotStarted,
    /// Being transferred
    InProgress,
    /// Finished; it cannot be executed again
    Complete,
}

struct TransferInner {
    session: Weak<Shared>,
    file_name: String,
    available: Representations,
    data: Bytes,
    state: Mutex<TransferState>,
}

/// A one-shot offer from the camera to send an image to the host.
///
/// Clones refer to the same offer.
#[derive(Clone)]
pub struct CameraInitiatedTransfer {
    inner: Arc<TransferInner>,
}

impl fmt::Debug for CameraInitiatedTransfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CameraInitiatedTransfer")
            .field("file_name", &self.inner.file_name)
            .field("available", &self.inner.available)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl CameraInitiatedTransfer {
    pub(crate) fn new(session: Weak<Shared>, file_name: String, data: Bytes) -> Self {
        Self {
            inner: Arc::new(TransferInner {
                session,
                file_name,
                available: Representations::PREVIEW,
                data,
                state: Mutex::new(TransferState::NotStarted),
            }),
        }
    }

    /// The representations that may be requested
    #[must_use]
    pub fn available_representations(&self) -> Representations {
        self.inner.available
    }

    /// Whether the host is the only place the image will be stored. Always false here.
    #[must_use]
    pub fn is_only_destination(&self) -> bool {
        false
    }

    /// The camera's name for the image
    #[must_use]
    pub fn file_name_hint(&self) -> &str {
        &self.inner.file_name
    }

    /// The transfer's progress
    #[must_use]
    pub fn state(&self) -> TransferState {
        *lock(&self.inner.state)
    }

    /// Performs the transfer. This may only be done once.
    ///
    /// # Errors
    /// * `NotConnected` if the camera has gone away
    /// * `NotAvailable` if the transfer has already been executed, or if `representations`
    ///   asks for something not on offer
    pub async fn execute_transfer(
        &self,
        representations: Representations,
    ) -> Result<TransferResult, CameraError> {
        let shared = self
            .inner
            .session
            .upgrade()
            .ok_or(CameraError::NotConnected)?;
        {
            let mut state = lock(&self.inner.state);
            if *state != TransferState::NotStarted {
                debug!("{}: transfer already {}", self.inner.file_name, *state);
                return Err(CameraError::NotAvailable);
            }
            if representations.is_empty() || !self.inner.available.contains(representations) {
                return Err(CameraError::NotAvailable);
            }
            *state = TransferState::InProgress;
        }
        shared.latency.wait(OperationSize::Large).await;
        *lock(&self.inner.state) = TransferState::Complete;
        info!("{}: transfer complete", self.inner.file_name);
        Ok(TransferResult {
            file_name: self.inner.file_name.clone(),
            representations,
            data: self.inner.data.clone(),
        })
    }
}

/// The outcome of a completed [`CameraInitiatedTransfer`]
#[derive(Clone)]
pub struct TransferResult {
    file_name: String,
    representations: Representations,
    data: Bytes,
}

impl fmt::Debug for TransferResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferResult")
            .field("file_name", &self.file_name)
            .field("representations", &self.representations)
            .field("data", &self.data.len())
            .finish()
    }
}

impl TransferResult {
    /// The representations that were transferred
    #[must_use]
    pub fn representations(&self) -> Representations {
        self.representations
    }

    /// The camera's name for the image
    #[must_use]
    pub fn file_name_hint(&self) -> &str {
        &self.file_name
    }

    /// File extension to use when saving
    #[must_use]
    pub fn suggested_file_extension(&self) -> &'static str {
        "JPG"
    }

    /// Uniform type identifier of the data
    #[must_use]
    pub fn uti(&self) -> &'static str {
        "public.jpeg"
    }

    fn check(&self, representation: Representations) -> Result<(), CameraError> {
        if representation == Representations::PREVIEW
            && self.representations.contains(representation)
        {
            Ok(())
        } else {
            Err(CameraError::InvalidInput)
        }
    }

    /// The data of one representation
    ///
    /// # Errors
    /// `InvalidInput` unless `representation` is the preview, and it was transferred
    pub fn generate_data(&self, representation: Representations) -> Result<Bytes, CameraError> {
        self.check(representation)?;
        Ok(self.data.clone())
    }

    /// Saves one representation to a file, creating parent directories as needed
    ///
    /// # Errors
    /// * `InvalidInput` unless `representation` is the preview, and it was transferred
    /// * `NotAvailable` if the file cannot be written
    pub async fn write_to(
        &self,
        path: &Path,
        representation: Representations,
    ) -> Result<(), CameraError> {
        self.check(representation)?;
        let write = async {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(path, &self.data).await
        };
        write.await.map_err(|e| {
            warn!("writing {}: {e}", path.display());
            CameraError::NotAvailable
        })
    }
}

type Handler = Arc<dyn Fn(&CameraInitiatedTransfer) + Send + Sync>;

/// Identifies a registered transfer handler
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TransferHandlerToken(u64);

/// The transfer handlers registered on a camera
#[derive(Default)]
pub(crate) struct TransferHandlers {
    handlers: Mutex<Vec<(u64, Handler)>>,
    next_id: AtomicU64,
}

impl fmt::Debug for TransferHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferHandlers")
            .field("count", &lock(&self.handlers).len())
            .finish_non_exhaustive()
    }
}

impl TransferHandlers {
    fn add(&self, handler: Handler) -> TransferHandlerToken {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.handlers).push((id, handler));
        TransferHandlerToken(id)
    }

    fn remove(&self, token: TransferHandlerToken) -> bool {
        let mut handlers = lock(&self.handlers);
        let before = handlers.len();
        handlers.retain(|(id, _)| *id != token.0);
        handlers.len() != before
    }

    /// Offers a transfer to every handler registered when the offer is made
    fn offer(&self, transfer: &CameraInitiatedTransfer) {
        let snapshot: Vec<Handler> = lock(&self.handlers)
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();
        debug!("offering {transfer:?} to {} handler(s)", snapshot.len());
        for handler in snapshot {
            handler(transfer);
        }
    }
}

/// Offers a preview of the shot just taken, after [`SHOT_PREVIEW_DELAY`].
///
/// The preview image is the first live view frame. Nothing is offered if there are no handlers,
/// no frames are configured, or the camera disconnects in the meantime.
pub(crate) fn schedule_shot_preview(shared: &Arc<Shared>) {
    let Some(path) = shared.config.live_view_frames.first().cloned() else {
        debug!("no live view frames configured; no shot preview");
        return;
    };
    let session = Arc::downgrade(shared);
    let _ = tokio::spawn(async move {
        tokio::time::sleep(SHOT_PREVIEW_DELAY).await;
        let data = match tokio::fs::read(&path).await {
            Ok(data) => Bytes::from(data),
            Err(e) => {
                warn!("reading shot preview {}: {e}", path.display());
                return;
            }
        };
        let Some(shared) = session.upgrade() else {
            return;
        };
        if shared.require_connected().is_err() {
            return;
        }
        let file_name = path
            .file_name()
            .map_or_else(|| "IMG_0001.JPG".into(), |n| n.to_string_lossy().into_owned());
        let transfer = CameraInitiatedTransfer::new(Arc::downgrade(&shared), file_name, data);
        shared.transfer_handlers.offer(&transfer);
    });
}

impl Camera {
    /// Registers a handler to be offered camera-initiated transfers
    pub fn add_transfer_handler<F>(&self, handler: F) -> TransferHandlerToken
    where
        F: Fn(&CameraInitiatedTransfer) + Send + Sync + 'static,
    {
        self.shared().transfer_handlers.add(Arc::new(handler))
    }

    /// Removes a transfer handler. Returns whether it was registered.
    pub fn remove_transfer_handler(&self, token: TransferHandlerToken) -> bool {
        self.shared().transfer_handlers.remove(token)
    }
}
