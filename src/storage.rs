//! Simulated storage cards, backed by a local directory
// (c) 2024 Ross Younger

use std::{
    fmt, io,
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex, Weak,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::SystemTime,
};

use tokio::{fs::File, io::AsyncReadExt as _};
use tracing::{Instrument as _, debug, trace, trace_span, warn};

use crate::{
    CameraError,
    camera::Shared,
    category::CommandCategorySet,
    codec::ImageMetadata,
    config::OperationSize,
    util::lock,
};

/// Size of each chunk delivered by [`FileSystemItem::stream_item`]
pub const STREAM_CHUNK_SIZE: usize = 1024 * 1024;

/// Longest side of thumbnails produced by [`FileSystemItem::fetch_thumbnail`]
pub const THUMBNAIL_MAX_DIMENSION: u32 = 300;

/// Longest side of previews produced by [`FileSystemItem::fetch_preview`]
pub const PREVIEW_MAX_DIMENSION: u32 = 1200;

const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "crw", "raw", "cr2", "cr3", "nef", "nrw", "arw", "orf", "rw2", "raf",
];
const VIDEO_EXTENSIONS: &[&str] = &["mov", "mp4", "m4v", "mkv"];

/// A storage card in the simulated camera
#[derive(Clone)]
pub struct FileStorage {
    root: FileSystemItem,
    writable: bool,
}

impl fmt::Debug for FileStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileStorage")
            .field("root", &self.root.path())
            .field("writable", &self.writable)
            .finish()
    }
}

impl FileStorage {
    pub(crate) async fn open(session: Weak<Shared>, root: PathBuf) -> Self {
        let metadata = tokio::fs::metadata(&root).await;
        if let Err(e) = &metadata {
            warn!("storage root {} is not readable: {e}", root.display());
        }
        let metadata = metadata.ok();
        let writable = metadata
            .as_ref()
            .is_some_and(|m| !m.permissions().readonly());
        let root = FileSystemItem::new(
            session,
            root,
            String::new(),
            true,
            0,
            metadata.and_then(|m| m.modified().ok()),
        );
        Self { root, writable }
    }

    /// The root folder of the card
    #[must_use]
    pub fn root_folder(&self) -> &FileSystemItem {
        &self.root
    }

    /// A user-visible name for the card
    #[must_use]
    pub fn display_name(&self) -> &'static str {
        "Storage"
    }

    /// A user-visible description of the card
    #[must_use]
    pub fn description(&self) -> String {
        format!("Simulated storage at {}", self.root.path().display())
    }

    /// Whether the backing directory could be written to
    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.writable
    }
}

/// What [`FileSystemItem::stream_item`] should do after delivering a chunk
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChunkInstruction {
    /// Deliver the next chunk
    Continue,
    /// Stop streaming; the transfer completes with `CancelledByUser`
    Cancel,
}

#[derive(Debug)]
struct ProgressInner {
    total: u64,
    completed: AtomicU64,
    finished: AtomicBool,
}

/// Tracks a streaming operation. Clones refer to the same operation.
#[derive(Clone, Debug)]
pub struct TransferProgress {
    inner: Arc<ProgressInner>,
}

impl TransferProgress {
    fn new(total: u64) -> Self {
        Self {
            inner: Arc::new(ProgressInner {
                total,
                completed: AtomicU64::new(0),
                finished: AtomicBool::new(false),
            }),
        }
    }

    /// The size of the item being streamed
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.inner.total
    }

    /// Bytes delivered so far
    #[must_use]
    pub fn completed_bytes(&self) -> u64 {
        self.inner.completed.load(Ordering::Acquire)
    }

    /// Whether the operation has completed, successfully or otherwise
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.inner.finished.load(Ordering::Acquire)
    }

    fn add(&self, bytes: usize) {
        let _ = self
            .inner
            .completed
            .fetch_add(bytes as u64, Ordering::AcqRel);
    }

    fn finish(&self) {
        self.inner.finished.store(true, Ordering::Release);
    }
}

struct ItemInner {
    session: Weak<Shared>,
    path: PathBuf,
    name: String,
    is_folder: bool,
    size: u64,
    modified: Option<SystemTime>,
    children: Mutex<Option<Vec<FileSystemItem>>>,
}

/// A file or folder on a storage card. Clones refer to the same item.
#[derive(Clone)]
pub struct FileSystemItem {
    inner: Arc<ItemInner>,
}

impl fmt::Debug for FileSystemItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSystemItem")
            .field("path", &self.inner.path)
            .field("is_folder", &self.inner.is_folder)
            .field("size", &self.inner.size)
            .finish_non_exhaustive()
    }
}

fn has_extension_in(name: &str, list: &[&str]) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| list.iter().any(|known| known.eq_ignore_ascii_case(e)))
}

/// Reads until `buf` is full or the file ends
async fn read_chunk(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]).await? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

impl FileSystemItem {
    fn new(
        session: Weak<Shared>,
        path: PathBuf,
        name: String,
        is_folder: bool,
        size: u64,
        modified: Option<SystemTime>,
    ) -> Self {
        Self {
            inner: Arc::new(ItemInner {
                session,
                path,
                name,
                is_folder,
                size,
                modified,
                children: Mutex::new(None),
            }),
        }
    }

    /// The item's file name. Empty for a root folder.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Where the item lives on the host
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Whether this is a folder
    #[must_use]
    pub fn is_folder(&self) -> bool {
        self.inner.is_folder
    }

    /// Size in bytes (zero for folders)
    #[must_use]
    pub fn size(&self) -> u64 {
        self.inner.size
    }

    /// Last modification time, if known
    #[must_use]
    pub fn modified(&self) -> Option<SystemTime> {
        self.inner.modified
    }

    /// Whether the item is protected against deletion. Simulated items never are.
    #[must_use]
    pub fn is_protected(&self) -> bool {
        false
    }

    /// Whether metadata has been loaded. Simulated items always have it.
    #[must_use]
    pub fn metadata_loaded(&self) -> bool {
        true
    }

    /// Whether a folder's children have been loaded
    #[must_use]
    pub fn children_loaded(&self) -> bool {
        lock(&self.inner.children).is_some()
    }

    /// A folder's children, if loaded
    #[must_use]
    pub fn children(&self) -> Option<Vec<FileSystemItem>> {
        lock(&self.inner.children).clone()
    }

    /// Whether the item looks like a still image, by its extension
    #[must_use]
    pub fn is_known_image_type(&self) -> bool {
        !self.inner.is_folder && has_extension_in(&self.inner.name, IMAGE_EXTENSIONS)
    }

    /// Whether the item looks like a video, by its extension
    #[must_use]
    pub fn is_known_video_type(&self) -> bool {
        !self.inner.is_folder && has_extension_in(&self.inner.name, VIDEO_EXTENSIONS)
    }

    /// Checks the camera is connected with filesystem access
    fn session(&self) -> Result<Arc<Shared>, CameraError> {
        let shared = self
            .inner
            .session
            .upgrade()
            .ok_or(CameraError::NotConnected)?;
        shared.require_categories(CommandCategorySet::FILESYSTEM_ACCESS)?;
        Ok(shared)
    }

    /// Loads a folder's children.
    ///
    /// Hidden entries are skipped. Once loaded, children are not re-read.
    ///
    /// # Errors
    /// * `NotConnected`, or `IncorrectCommandCategory` without filesystem access
    /// * `NotAvailable` if this is not a folder
    /// * `DeviceBusy` if the backing directory cannot be read
    pub async fn load_children(&self) -> Result<Vec<FileSystemItem>, CameraError> {
        let shared = self.session()?;
        if !self.inner.is_folder {
            return Err(CameraError::NotAvailable);
        }
        if let Some(children) = self.children() {
            return Ok(children);
        }
        shared.latency.wait(OperationSize::Medium).await;
        let children = self.read_children().await.map_err(|e| {
            warn!("reading {}: {e}", self.inner.path.display());
            CameraError::DeviceBusy
        })?;
        debug!(
            "{}: loaded {} item(s)",
            self.inner.path.display(),
            children.len()
        );
        // A concurrent load may have got there first; its result stands
        Ok(lock(&self.inner.children).get_or_insert(children).clone())
    }

    async fn read_children(&self) -> io::Result<Vec<FileSystemItem>> {
        let mut entries = tokio::fs::read_dir(&self.inner.path).await?;
        let mut children = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            let metadata = entry.metadata().await?;
            children.push(FileSystemItem::new(
                self.inner.session.clone(),
                entry.path(),
                name,
                metadata.is_dir(),
                if metadata.is_dir() { 0 } else { metadata.len() },
                metadata.modified().ok(),
            ));
        }
        children.sort_by(|a, b| a.inner.name.cmp(&b.inner.name));
        Ok(children)
    }

    /// Loads the item's metadata. This always succeeds immediately, as metadata is read with the item.
    pub fn load_metadata(&self) -> Result<(), CameraError> {
        trace!("{}: metadata already loaded", self.inner.path.display());
        Ok(())
    }

    /// Streams the item's contents in chunks of [`STREAM_CHUNK_SIZE`] bytes.
    ///
    /// Returns immediately. On a background task, `preflight` is called once to create a context;
    /// then `chunk_delivery` receives each chunk (which may be empty) and decides whether to continue;
    /// finally `complete` is called exactly once, with an error if streaming failed or was cancelled.
    /// Consumers should discard partial output when `complete` reports an error.
    ///
    /// Errors reported to `complete`:
    /// * `NotConnected`, or `IncorrectCommandCategory` without filesystem access
    /// * `NotAvailable` for folders and unreadable files
    /// * `CancelledByUser` if `chunk_delivery` returned [`ChunkInstruction::Cancel`]
    pub fn stream_item<C, P, D, F>(
        &self,
        preflight: P,
        mut chunk_delivery: D,
        complete: F,
    ) -> TransferProgress
    where
        C: Send + 'static,
        P: FnOnce(&FileSystemItem) -> C + Send + 'static,
        D: FnMut(&FileSystemItem, &[u8], &mut C) -> ChunkInstruction + Send + 'static,
        F: FnOnce(&FileSystemItem, Option<CameraError>, C) + Send + 'static,
    {
        let progress = TransferProgress::new(self.inner.size);
        let item = self.clone();
        let task_progress = progress.clone();
        let span = trace_span!("STREAM", item = self.inner.name);
        let _ = tokio::spawn(
            async move {
                let mut context = preflight(&item);
                let result = item
                    .stream_chunks(&task_progress, &mut chunk_delivery, &mut context)
                    .await;
                if let Err(e) = &result {
                    debug!("{}: streaming ended: {e}", item.inner.path.display());
                }
                task_progress.finish();
                complete(&item, result.err(), context);
            }
            .instrument(span),
        );
        progress
    }

    async fn stream_chunks<C, D>(
        &self,
        progress: &TransferProgress,
        chunk_delivery: &mut D,
        context: &mut C,
    ) -> Result<(), CameraError>
    where
        D: FnMut(&FileSystemItem, &[u8], &mut C) -> ChunkInstruction,
    {
        let shared = self.session()?;
        if self.inner.is_folder {
            return Err(CameraError::NotAvailable);
        }
        let mut file = File::open(&self.inner.path).await.map_err(|e| {
            warn!("opening {}: {e}", self.inner.path.display());
            CameraError::NotAvailable
        })?;
        let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
        loop {
            shared.latency.wait(OperationSize::Large).await;
            shared.require_connected()?;
            let n = read_chunk(&mut file, &mut buf).await.map_err(|e| {
                warn!("reading {}: {e}", self.inner.path.display());
                CameraError::NotAvailable
            })?;
            progress.add(n);
            trace!("{}: delivering {n} bytes", self.inner.path.display());
            if chunk_delivery(self, &buf[..n], context) == ChunkInstruction::Cancel {
                return Err(CameraError::CancelledByUser);
            }
            if n < STREAM_CHUNK_SIZE {
                shared.latency.wait(OperationSize::Small).await;
                return Ok(());
            }
        }
    }

    async fn render(
        &self,
        max_dimension: u32,
        failure: CameraError,
    ) -> Result<Vec<u8>, CameraError> {
        let shared = self.session()?;
        if self.inner.is_folder {
            return Err(CameraError::NotAvailable);
        }
        shared.latency.wait(OperationSize::Medium).await;
        let data = tokio::fs::read(&self.inner.path)
            .await
            .map_err(|_| CameraError::NotAvailable)?;
        let codec = Arc::clone(&shared.codec);
        tokio::task::spawn_blocking(move || codec.thumbnail(&data, max_dimension))
            .await
            .map_err(|_| failure)?
            .map_err(|e| {
                debug!("{}: {e:#}", self.inner.path.display());
                failure
            })
    }

    /// Produces a JPEG thumbnail of an image
    ///
    /// # Errors
    /// * `NotConnected`, or `IncorrectCommandCategory` without filesystem access
    /// * `NotAvailable` for folders and unreadable files
    /// * `NoThumbnail` if the item is not an image the codec understands
    pub async fn fetch_thumbnail(&self) -> Result<Vec<u8>, CameraError> {
        self.render(THUMBNAIL_MAX_DIMENSION, CameraError::NoThumbnail)
            .await
    }

    /// Produces a screen-sized JPEG preview of an image
    ///
    /// # Errors
    /// As for [`fetch_thumbnail`](Self::fetch_thumbnail)
    pub async fn fetch_preview(&self) -> Result<Vec<u8>, CameraError> {
        self.render(PREVIEW_MAX_DIMENSION, CameraError::NoThumbnail)
            .await
    }

    /// Reads basic image metadata
    ///
    /// # Errors
    /// * `NotConnected`, or `IncorrectCommandCategory` without filesystem access
    /// * `NotAvailable` for folders and unreadable files
    /// * `NoMetadata` if the item is not an image the codec understands
    pub async fn fetch_metadata(&self) -> Result<ImageMetadata, CameraError> {
        let shared = self.session()?;
        if self.inner.is_folder {
            return Err(CameraError::NotAvailable);
        }
        shared.latency.wait(OperationSize::Small).await;
        let data = tokio::fs::read(&self.inner.path)
            .await
            .map_err(|_| CameraError::NotAvailable)?;
        let codec = Arc::clone(&shared.codec);
        tokio::task::spawn_blocking(move || codec.metadata(&data))
            .await
            .map_err(|_| CameraError::NoMetadata)?
            .map_err(|_| CameraError::NoMetadata)
    }

    /// Deletes the item from the card.
    ///
    /// # Errors
    /// Always `NotAvailable`; simulated storage is read-only.
    pub fn remove_from_device(&self) -> Result<(), CameraError> {
        debug!("{}: refusing to delete", self.inner.path.display());
        Err(CameraError::NotAvailable)
    }
}
