//! File transfer coordinator.
//!
//! Upload state machine per file:
//!
//! ```text
//! Queued ──turn──> RequestingSlot ──slot──> Transferring ──done──> Completed
//!    │                   │                       │
//!    └───────────────────┴───────────┬───────────┘
//!                                    ↓
//!                                 Failed
//! ```
//!
//! Completed and failed tasks are removed immediately; the terminal state is
//! only observable on the task returned to the caller.
//!
//! At most one slot request is on the wire. Slot replies carry no reliable
//! correlation (the file name echo is optional and storage keys may be
//! opaque), so every reply belongs to the single request in flight. Other
//! files wait in `Queued` and the next request goes out once the current
//! slot is bound or its upload fails.
//!
//! Download locations are cached per storage key with at most one resolution
//! request in flight per key.

use std::{
    collections::{HashMap, HashSet},
    fmt,
};

use parley_proto::{ClientFrame, FileRef, FileUploaded, UploadRequest, UploadSlot};

use crate::error::TransferError;

/// Largest accepted upload.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Uploads allowed in flight at once.
pub const DEFAULT_MAX_CONCURRENT_UPLOADS: usize = 5;

/// Transfer limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferConfig {
    /// Size limit in bytes
    pub max_file_size: u64,
    /// Concurrency limit
    pub max_concurrent_uploads: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_concurrent_uploads: DEFAULT_MAX_CONCURRENT_UPLOADS,
        }
    }
}

/// Local identifier of an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UploadId(pub u64);

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Upload lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadState {
    /// Waiting for another file's slot request to be answered
    Queued,
    /// Waiting for the server to issue a destination
    RequestingSlot,
    /// Bytes are being written
    Transferring,
    /// Written and announced
    Completed,
    /// Abandoned; nothing was announced
    Failed,
}

/// One in-flight upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTask {
    /// Local id
    pub id: UploadId,
    /// Driver handle for reading the file
    pub source: String,
    /// File name
    pub filename: String,
    /// MIME type derived from the extension
    pub content_type: String,
    /// Size in bytes
    pub size: u64,
    /// Destination, once issued
    pub slot: Option<UploadSlot>,
    /// 0-100, never decreases
    pub progress: u8,
    /// Lifecycle state
    pub state: UploadState,
}

/// Outcome of asking to open a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadStep {
    /// Location already cached
    Ready(String),
    /// Send this request and wait
    Request(ClientFrame),
    /// A request for this key is already in flight
    Pending,
}

/// Upload and download bookkeeping for one session.
#[derive(Debug, Clone, Default)]
pub struct TransferCoordinator {
    config: TransferConfig,
    next_id: u64,
    uploads: Vec<UploadTask>,
    locations: HashMap<String, String>,
    resolving: HashSet<String>,
    /// Keys the user asked to open, waiting on resolution
    wanted: HashSet<String>,
}

impl TransferCoordinator {
    /// Create an empty coordinator.
    pub fn new(config: TransferConfig) -> Self {
        Self { config, ..Self::default() }
    }

    /// Uploads in flight, oldest first.
    pub fn uploads(&self) -> &[UploadTask] {
        &self.uploads
    }

    /// Cached download location for a key.
    pub fn location(&self, key: &str) -> Option<&str> {
        self.locations.get(key).map(String::as_str)
    }

    /// Whether a resolution request for `key` is in flight.
    pub fn is_resolving(&self, key: &str) -> bool {
        self.resolving.contains(key)
    }

    /// Start an upload. Returns the slot request to send now, or `None` if
    /// the file was queued behind a request already in flight.
    ///
    /// # Errors
    ///
    /// - `TransferError::TooLarge` above the size limit
    /// - `TransferError::TooManyUploads` at the concurrency limit
    pub fn request_upload(
        &mut self,
        source: String,
        filename: String,
        size: u64,
    ) -> Result<(UploadId, Option<ClientFrame>), TransferError> {
        if size > self.config.max_file_size {
            return Err(TransferError::TooLarge { filename, size, max: self.config.max_file_size });
        }
        if self.uploads.len() >= self.config.max_concurrent_uploads {
            return Err(TransferError::TooManyUploads { max: self.config.max_concurrent_uploads });
        }

        self.next_id += 1;
        let id = UploadId(self.next_id);
        let content_type = content_type_for(&filename);

        tracing::debug!(%id, %filename, size, "upload queued");
        self.uploads.push(UploadTask {
            id,
            source,
            filename,
            content_type,
            size,
            slot: None,
            progress: 0,
            state: UploadState::Queued,
        });

        Ok((id, self.next_request()))
    }

    /// Upload whose slot request is on the wire.
    pub fn requesting(&self) -> Option<&UploadTask> {
        self.uploads.iter().find(|t| t.state == UploadState::RequestingSlot)
    }

    /// Bind an issued slot to the request in flight. Returns the bound task
    /// and the next slot request to send, if a file was queued.
    ///
    /// # Errors
    ///
    /// - `TransferError::UnmatchedSlot` if nothing is requesting a slot, or
    ///   the echoed file name belongs to a different file
    pub fn slot_received(
        &mut self,
        slot: UploadSlot,
    ) -> Result<(UploadTask, Option<ClientFrame>), TransferError> {
        let Some(task) = self.uploads.iter_mut().find(|t| t.state == UploadState::RequestingSlot)
        else {
            return Err(TransferError::UnmatchedSlot { key: slot.key });
        };
        if slot.filename.as_deref().is_some_and(|name| name != task.filename) {
            return Err(TransferError::UnmatchedSlot { key: slot.key });
        }

        tracing::debug!(id = %task.id, key = %slot.key, filename = %task.filename, "upload slot bound");
        task.slot = Some(slot);
        task.state = UploadState::Transferring;
        let bound = task.clone();

        Ok((bound, self.next_request()))
    }

    /// Promote the oldest queued upload if no slot request is in flight.
    fn next_request(&mut self) -> Option<ClientFrame> {
        if self.requesting().is_some() {
            return None;
        }
        let task = self.uploads.iter_mut().find(|t| t.state == UploadState::Queued)?;
        task.state = UploadState::RequestingSlot;
        tracing::debug!(id = %task.id, filename = %task.filename, "requesting upload slot");
        Some(ClientFrame::RequestUploadUrl(UploadRequest {
            filename: task.filename.clone(),
            content_type: task.content_type.clone(),
        }))
    }

    /// Record progress. Returns the new percentage if it increased.
    pub fn progress(&mut self, id: UploadId, sent: u64, total: u64) -> Option<u8> {
        let task = self.uploads.iter_mut().find(|t| t.id == id)?;
        if task.state != UploadState::Transferring || total == 0 {
            return None;
        }

        let percent = (sent.min(total).saturating_mul(100) / total) as u8;
        if percent <= task.progress {
            return None;
        }
        task.progress = percent;
        Some(percent)
    }

    /// Finish an upload and produce its announcement.
    ///
    /// # Errors
    ///
    /// - `TransferError::UnknownUpload` if `id` is not in flight
    /// - `TransferError::NoDestination` if no slot was bound yet
    pub fn complete(&mut self, id: UploadId) -> Result<(UploadTask, FileUploaded), TransferError> {
        let index = self
            .uploads
            .iter()
            .position(|t| t.id == id)
            .ok_or(TransferError::UnknownUpload(id))?;

        let Some(slot) = self.uploads[index].slot.clone() else {
            return Err(TransferError::NoDestination(id));
        };

        let mut task = self.uploads.remove(index);
        task.progress = 100;
        task.state = UploadState::Completed;

        let announce = FileUploaded {
            file_url: slot.file_url,
            filename: task.filename.clone(),
            key: slot.key,
            extension: extension_of(&task.filename).unwrap_or_default(),
            size: task.size,
            content_type: task.content_type.clone(),
        };
        Ok((task, announce))
    }

    /// Abandon an upload. Returns the task and, if it was holding the slot
    /// request, the request for the next queued file.
    ///
    /// # Errors
    ///
    /// - `TransferError::UnknownUpload` if `id` is not in flight
    pub fn fail(&mut self, id: UploadId) -> Result<(UploadTask, Option<ClientFrame>), TransferError> {
        let index = self
            .uploads
            .iter()
            .position(|t| t.id == id)
            .ok_or(TransferError::UnknownUpload(id))?;

        let mut task = self.uploads.remove(index);
        task.state = UploadState::Failed;
        Ok((task, self.next_request()))
    }

    /// Request a location for a file seen in the log, unless cached or
    /// already being resolved.
    pub fn resolve(&mut self, key: &str) -> Option<ClientFrame> {
        if self.locations.contains_key(key) || !self.resolving.insert(key.to_string()) {
            return None;
        }
        Some(ClientFrame::RequestDownloadUrl(FileRef { key: key.to_string() }))
    }

    /// The user asked to open a file.
    pub fn request_download(&mut self, key: &str) -> DownloadStep {
        if let Some(url) = self.locations.get(key) {
            return DownloadStep::Ready(url.clone());
        }
        self.wanted.insert(key.to_string());
        match self.resolve(key) {
            Some(frame) => DownloadStep::Request(frame),
            None => DownloadStep::Pending,
        }
    }

    /// Cache a resolved location. Returns whether the user was waiting on it.
    pub fn download_resolved(&mut self, key: String, url: String) -> bool {
        self.resolving.remove(&key);
        let wanted = self.wanted.remove(&key);
        self.locations.insert(key, url);
        wanted
    }

    /// Drop everything known about a deleted file.
    pub fn forget(&mut self, key: &str) {
        self.locations.remove(key);
        self.resolving.remove(key);
        self.wanted.remove(key);
    }

    /// The channel dropped.
    ///
    /// Slot and resolution requests will never be answered on a new channel:
    /// uploads without a slot fail, queued ones included, and resolution
    /// bookkeeping is cleared. Transfers already writing continue. Returns
    /// the failed tasks.
    pub fn channel_lost(&mut self) -> Vec<UploadTask> {
        self.resolving.clear();
        self.wanted.clear();

        let (failed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.uploads)
            .into_iter()
            .partition(|t| matches!(t.state, UploadState::Queued | UploadState::RequestingSlot));
        self.uploads = kept;

        failed
            .into_iter()
            .map(|mut t| {
                t.state = UploadState::Failed;
                t
            })
            .collect()
    }
}

/// Lowercase extension without the dot.
pub fn extension_of(filename: &str) -> Option<String> {
    let (stem, ext) = filename.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// MIME type guessed from the file extension.
pub fn content_type_for(filename: &str) -> String {
    mime_guess::from_path(filename).first_or_octet_stream().essence_str().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(key: &str, filename: Option<&str>) -> UploadSlot {
        UploadSlot {
            presigned_url: format!("https://put/{key}"),
            file_url: format!("https://get/{key}"),
            key: key.into(),
            filename: filename.map(Into::into),
        }
    }

    #[test]
    fn oversized_files_are_rejected_before_requesting() {
        let mut t = TransferCoordinator::new(TransferConfig::default());
        let err = t.request_upload("/tmp/big".into(), "big.iso".into(), 11 * 1024 * 1024);
        assert!(matches!(err, Err(TransferError::TooLarge { .. })));
        assert!(t.uploads().is_empty());
    }

    #[test]
    fn concurrency_is_bounded() {
        let config = TransferConfig { max_concurrent_uploads: 1, ..TransferConfig::default() };
        let mut t = TransferCoordinator::new(config);
        t.request_upload("a".into(), "a.png".into(), 1).unwrap();
        assert_eq!(
            t.request_upload("b".into(), "b.png".into(), 1).unwrap_err(),
            TransferError::TooManyUploads { max: 1 }
        );
    }

    #[test]
    fn one_slot_request_in_flight() {
        let mut t = TransferCoordinator::new(TransferConfig::default());
        let (a, first) = t.request_upload("a".into(), "a.png".into(), 1).unwrap();
        let (b, second) = t.request_upload("b".into(), "b.pdf".into(), 1).unwrap();

        assert!(matches!(first, Some(ClientFrame::RequestUploadUrl(ref r)) if r.filename == "a.png"));
        assert_eq!(second, None);
        assert_eq!(t.requesting().unwrap().id, a);
        assert_eq!(t.uploads()[1].state, UploadState::Queued);

        let (bound, next) = t.slot_received(slot("uploads/0f9c2e", None)).unwrap();
        assert_eq!(bound.id, a);
        assert_eq!(bound.source, "a");
        assert!(matches!(next, Some(ClientFrame::RequestUploadUrl(ref r)) if r.filename == "b.pdf"));
        assert_eq!(t.requesting().unwrap().id, b);
    }

    #[test]
    fn opaque_slots_bind_to_their_own_request() {
        let mut t = TransferCoordinator::new(TransferConfig::default());
        t.request_upload("/tmp/a.png".into(), "a.png".into(), 1).unwrap();
        t.request_upload("/tmp/b.pdf".into(), "b.pdf".into(), 1).unwrap();

        let (first, _) = t.slot_received(slot("uploads/7d1a", None)).unwrap();
        let (second, next) = t.slot_received(slot("uploads/0f9c2e", None)).unwrap();
        assert_eq!(first.source, "/tmp/a.png");
        assert_eq!(second.source, "/tmp/b.pdf");
        assert_eq!(second.slot.unwrap().key, "uploads/0f9c2e");
        assert_eq!(next, None);
    }

    #[test]
    fn failing_the_requester_releases_the_queue() {
        let mut t = TransferCoordinator::new(TransferConfig::default());
        let (a, _) = t.request_upload("a".into(), "a.png".into(), 1).unwrap();
        let (b, _) = t.request_upload("b".into(), "b.pdf".into(), 1).unwrap();

        let (failed, next) = t.fail(a).unwrap();
        assert_eq!(failed.state, UploadState::Failed);
        assert!(matches!(next, Some(ClientFrame::RequestUploadUrl(ref r)) if r.filename == "b.pdf"));
        assert_eq!(t.requesting().unwrap().id, b);
    }

    #[test]
    fn mismatched_echo_is_rejected() {
        let mut t = TransferCoordinator::new(TransferConfig::default());
        t.request_upload("a".into(), "a.png".into(), 1).unwrap();
        assert!(matches!(
            t.slot_received(slot("k", Some("b.pdf"))),
            Err(TransferError::UnmatchedSlot { .. })
        ));
        assert_eq!(t.uploads()[0].state, UploadState::RequestingSlot);
    }

    #[test]
    fn unmatched_slot_is_an_error() {
        let mut t = TransferCoordinator::new(TransferConfig::default());
        assert!(matches!(
            t.slot_received(slot("k", Some("x.png"))),
            Err(TransferError::UnmatchedSlot { .. })
        ));
    }

    #[test]
    fn progress_never_decreases() {
        let mut t = TransferCoordinator::new(TransferConfig::default());
        let (id, _) = t.request_upload("a".into(), "a.png".into(), 100).unwrap();
        assert_eq!(t.progress(id, 10, 100), None, "no progress before slot");

        t.slot_received(slot("k-a.png", Some("a.png"))).unwrap();
        assert_eq!(t.progress(id, 50, 100), Some(50));
        assert_eq!(t.progress(id, 40, 100), None);
        assert_eq!(t.progress(id, 500, 100), Some(100));
    }

    #[test]
    fn completion_announces_structured_key() {
        let mut t = TransferCoordinator::new(TransferConfig::default());
        let (id, _) = t.request_upload("/tmp/Photo.PNG".into(), "Photo.PNG".into(), 3).unwrap();
        t.slot_received(slot("k1", Some("Photo.PNG"))).unwrap();

        let (task, announce) = t.complete(id).unwrap();
        assert_eq!(task.state, UploadState::Completed);
        assert_eq!(announce.key, "k1");
        assert_eq!(announce.extension, "png");
        assert_eq!(announce.content_type, "image/png");
        assert!(t.uploads().is_empty());
    }

    #[test]
    fn completing_without_slot_fails() {
        let mut t = TransferCoordinator::new(TransferConfig::default());
        let (id, _) = t.request_upload("a".into(), "a.png".into(), 1).unwrap();
        assert_eq!(t.complete(id).unwrap_err(), TransferError::NoDestination(id));
    }

    #[test]
    fn one_resolution_in_flight_per_key() {
        let mut t = TransferCoordinator::new(TransferConfig::default());
        assert!(t.resolve("k").is_some());
        assert!(t.resolve("k").is_none());
        assert_eq!(t.request_download("k"), DownloadStep::Pending);

        assert!(t.download_resolved("k".into(), "https://dl/k".into()));
        assert!(t.resolve("k").is_none());
        assert_eq!(t.request_download("k"), DownloadStep::Ready("https://dl/k".into()));
    }

    #[test]
    fn channel_loss_fails_uploads_without_slot() {
        let mut t = TransferCoordinator::new(TransferConfig::default());
        let (a, _) = t.request_upload("a".into(), "a.png".into(), 1).unwrap();
        t.request_upload("b".into(), "b.pdf".into(), 1).unwrap();
        t.request_upload("c".into(), "c.txt".into(), 1).unwrap();
        t.slot_received(slot("k-a.png", Some("a.png"))).unwrap();

        let failed = t.channel_lost();
        let names: Vec<_> = failed.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(names, ["b.pdf", "c.txt"]);
        assert_eq!(t.uploads().len(), 1);
        assert_eq!(t.uploads()[0].id, a);
    }

    #[test]
    fn extensions_and_content_types() {
        assert_eq!(extension_of("report.final.PDF"), Some("pdf".into()));
        assert_eq!(extension_of(".bashrc"), None);
        assert_eq!(extension_of("README"), None);
        assert_eq!(content_type_for("a.jpeg"), "image/jpeg");
        assert_eq!(content_type_for("Photo.PNG"), "image/png");
        assert_eq!(content_type_for("clip.webm"), "video/webm");
        assert_eq!(content_type_for("notes.txt"), "text/plain");
        assert_eq!(content_type_for("a.unknown"), "application/octet-stream");
    }
}
