//! Batch download list and its executor.
//!
//! Entries are grouped by connection-reuse key, each group is downloaded sequentially
//! over a single reused connection while groups proceed in parallel, bounded by a
//! global worker cap.

use std::path::Path;
use std::sync::Arc;
use std::{io, mem};

use indexmap::IndexMap;
use sha1::{Digest, Sha1};

use reqwest::{Client, StatusCode};

use tokio::io::AsyncWriteExt;
use tokio::task::JoinSet;
use tokio::sync::mpsc;

use crate::task::{Event, Watcher};


/// Bounded number of host groups downloading at the same time.
const CONCURRENT_HOSTS: usize = 8;

/// Total number of attempts for an entry that fails verification.
const ATTEMPT_COUNT: usize = 3;

/// A single pending download, with optional expected size and SHA-1 used to verify the
/// downloaded content before it is moved to its final path.
#[derive(Debug)]
pub struct Entry {
    url: Box<str>,
    file: Box<Path>,
    size: Option<u32>,
    sha1: Option<[u8; 20]>,
    name: Box<str>,
}

impl Entry {

    /// Create a new entry, its display name defaults to the URL.
    pub fn new(url: impl Into<Box<str>>, file: impl Into<Box<Path>>) -> Self {
        let url = url.into();
        Self {
            name: Box::from(&*url),
            url,
            file: file.into(),
            size: None,
            sha1: None,
        }
    }

    /// Create an entry from the download information of a metadata document.
    pub fn from_download(download: &crate::standard::serde::Download, file: impl Into<Box<Path>>) -> Self {
        Self::new(download.url.as_str(), file)
            .with_size(download.size)
            .with_sha1(download.sha1.as_ref().map(|sha1| sha1.0))
    }

    pub fn with_size(mut self, size: Option<u32>) -> Self {
        self.size = size;
        self
    }

    pub fn with_sha1(mut self, sha1: Option<[u8; 20]>) -> Self {
        self.sha1 = sha1;
        self
    }

    /// Set the display name used by progress events and errors.
    pub fn with_name(mut self, name: impl Into<Box<str>>) -> Self {
        self.name = name.into();
        self
    }

    #[inline]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[inline]
    pub fn file(&self) -> &Path {
        &self.file
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

}

/// A finalize callback, ran after every entry of the list has been verified.
pub type Callback = Box<dyn FnOnce() -> Result<(), crate::Error>>;

/// A list of pending downloads, grouped by connection-reuse key, with finalize
/// callbacks ran in registration order after every entry has been downloaded.
///
/// The list is filled by planning tasks and fully drained when downloaded, the same
/// instance can be reused for successive phases.
#[derive(Default)]
pub struct DownloadList {
    buckets: IndexMap<String, Vec<Entry>>,
    callbacks: Vec<Callback>,
    count: u32,
    size: u32,
}

impl DownloadList {

    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of pending entries.
    #[inline]
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Sum of the known expected sizes of pending entries.
    #[inline]
    pub fn size(&self) -> u32 {
        self.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Queue an entry, grouping it under its connection-reuse key.
    pub fn push(&mut self, entry: Entry) -> Result<(), crate::http::Error> {
        let key = crate::http::host_key(&entry.url)?;
        self.count += 1;
        self.size += entry.size.unwrap_or(0);
        self.buckets.entry(key).or_default().push(entry);
        Ok(())
    }

    /// Register a finalize callback, ran after all entries have been downloaded, in
    /// registration order.
    pub fn push_callback(&mut self, callback: Callback) {
        self.callbacks.push(callback);
    }

    /// Download and drain every pending entry, then run the finalize callbacks. On
    /// error the remaining entries and callbacks are dropped with the error returned.
    pub fn download(&mut self, watcher: &mut dyn Watcher) -> Result<(), crate::Error> {

        let buckets = mem::take(&mut self.buckets);
        let callbacks = mem::take(&mut self.callbacks);
        let count = mem::take(&mut self.count);
        let size = mem::take(&mut self.size);

        if !buckets.is_empty() {
            watcher.on_event(Event::DownloadStarted { count, size });
            let buckets = buckets.into_values().collect::<Vec<_>>();
            crate::http::sync(download_all(buckets, watcher))?;
        }

        // Callbacks run serialized on this thread, only once everything is verified.
        for callback in callbacks {
            callback()?;
        }

        if count != 0 {
            watcher.on_event(Event::DownloadCompleted {});
        }

        Ok(())

    }

}

/// State of an entry that failed to download, it also acts as a standard error type.
#[derive(thiserror::Error, Debug)]
#[error("{name}: {kind}")]
pub struct EntryError {
    name: Box<str>,
    url: Box<str>,
    file: Box<Path>,
    kind: EntryErrorKind,
}

impl EntryError {

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[inline]
    pub fn file(&self) -> &Path {
        &self.file
    }

    #[inline]
    pub fn kind(&self) -> &EntryErrorKind {
        &self.kind
    }

}

#[derive(thiserror::Error, Debug)]
pub enum EntryErrorKind {
    /// Size of the fully downloaded entry differs from the expected size.
    #[error("invalid size")]
    InvalidSize,
    /// SHA-1 of the fully downloaded entry differs from the expected SHA-1.
    #[error("invalid sha1")]
    InvalidSha1,
    /// Unexpected HTTP status code while requesting the entry.
    #[error("invalid status: {0}")]
    InvalidStatus(u16),
    /// I/O error while writing the local file.
    #[error("io: {0}")]
    Io(#[source] io::Error),
    /// Transport-level request error.
    #[error("request: {0}")]
    Request(#[source] reqwest::Error),
}

/// Progress messages sent by workers, serialized to the watcher on the caller task.
#[derive(Debug)]
enum Message {
    Started { bucket: usize, index: usize },
    Advanced { bucket: usize, index: usize, delta: u32 },
    Completed { bucket: usize, index: usize },
    Failed { bucket: usize, index: usize },
}

async fn download_all(
    buckets: Vec<Vec<Entry>>,
    watcher: &mut dyn Watcher,
) -> Result<(), EntryError> {

    let buckets = Arc::new(buckets);
    let (tx, mut rx) = mpsc::channel(CONCURRENT_HOSTS * 2);

    let mut workers = JoinSet::new();
    let mut next_bucket = 0usize;
    let mut remaining = buckets.len();
    let mut failure = None::<(usize, usize, EntryErrorKind)>;

    while remaining != 0 {

        while workers.len() < CONCURRENT_HOSTS && next_bucket < buckets.len() {
            workers.spawn(download_bucket(Arc::clone(&buckets), next_bucket, tx.clone()));
            next_bucket += 1;
        }

        tokio::select! {
            Some(res) = workers.join_next() => {
                remaining -= 1;
                let (bucket, res) = res.expect("worker should not be cancelled nor panicking");
                if let Err((index, kind)) = res {
                    // Workers already started are left to complete, the first failure
                    // is the one reported.
                    if failure.is_none() {
                        failure = Some((bucket, index, kind));
                    }
                }
            }
            Some(message) = rx.recv() => {
                forward_message(&buckets, message, watcher);
            }
            else => continue,
        }

    }

    // All workers joined, drain progress messages still queued.
    drop(tx);
    while let Some(message) = rx.recv().await {
        forward_message(&buckets, message, watcher);
    }

    let mut buckets = Arc::into_inner(buckets).unwrap();
    if let Some((bucket, index, kind)) = failure {
        let entry = buckets[bucket].swap_remove(index);
        return Err(EntryError {
            name: entry.name,
            url: entry.url,
            file: entry.file,
            kind,
        });
    }

    Ok(())

}

fn forward_message(buckets: &[Vec<Entry>], message: Message, watcher: &mut dyn Watcher) {
    match message {
        Message::Started { bucket, index } =>
            watcher.on_event(Event::DownloadEntryStarted {
                name: &buckets[bucket][index].name,
            }),
        Message::Advanced { bucket, index, delta } =>
            watcher.on_event(Event::DownloadEntryProgress {
                name: &buckets[bucket][index].name,
                delta,
            }),
        Message::Completed { bucket, index } =>
            watcher.on_event(Event::DownloadEntryCompleted {
                name: &buckets[bucket][index].name,
            }),
        Message::Failed { bucket, index } =>
            watcher.on_event(Event::DownloadEntryFailed {
                name: &buckets[bucket][index].name,
            }),
    }
}

/// Download every entry of a single bucket, in order, stopping at the first entry that
/// persistently fails.
async fn download_bucket(
    buckets: Arc<Vec<Vec<Entry>>>,
    bucket: usize,
    tx: mpsc::Sender<Message>,
) -> (usize, Result<(), (usize, EntryErrorKind)>) {

    // Each worker owns its client, so the host's connection is never shared with
    // another worker and sequential requests reuse it through the idle pool.
    let client = match crate::http::builder().pool_max_idle_per_host(1).build() {
        Ok(client) => client,
        Err(e) => return (bucket, Err((0, EntryErrorKind::Request(e)))),
    };

    for (index, entry) in buckets[bucket].iter().enumerate() {

        let _ = tx.send(Message::Started { bucket, index }).await;

        let mut attempt = 1;
        let res = loop {
            match download_entry(&client, entry, bucket, index, &tx).await {
                Ok(()) => break Ok(()),
                Err(kind) if attempt < ATTEMPT_COUNT && kind_is_retryable(&kind) => {
                    attempt += 1;
                }
                Err(kind) => break Err(kind),
            }
        };

        match res {
            Ok(()) => {
                let _ = tx.send(Message::Completed { bucket, index }).await;
            }
            Err(kind) => {
                let _ = tx.send(Message::Failed { bucket, index }).await;
                return (bucket, Err((index, kind)));
            }
        }

    }

    (bucket, Ok(()))

}

/// Verification failures and server errors are worth retrying on the same entry,
/// client errors (including the 404 used by installer probing) are terminal.
fn kind_is_retryable(kind: &EntryErrorKind) -> bool {
    match kind {
        EntryErrorKind::InvalidSize |
        EntryErrorKind::InvalidSha1 => true,
        EntryErrorKind::InvalidStatus(status) => *status >= 500,
        _ => false,
    }
}

async fn download_entry(
    client: &Client,
    entry: &Entry,
    bucket: usize,
    index: usize,
    tx: &mpsc::Sender<Message>,
) -> Result<(), EntryErrorKind> {

    let mut res = client.get(&*entry.url).send().await
        .map_err(EntryErrorKind::Request)?;

    if res.status() != StatusCode::OK {
        return Err(EntryErrorKind::InvalidStatus(res.status().as_u16()));
    }

    if let Some(parent) = entry.file.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(EntryErrorKind::Io)?;
    }

    // Stream to a part file, hashing and counting on the fly, the final path only
    // appears once fully verified.
    let part_file = crate::path::with_suffix(&entry.file, ".part");
    let mut dst = tokio::fs::File::create(&part_file).await.map_err(EntryErrorKind::Io)?;

    let mut size = 0u64;
    let mut digest = Sha1::new();

    while let Some(chunk) = res.chunk().await.map_err(EntryErrorKind::Request)? {
        dst.write_all(&chunk).await.map_err(EntryErrorKind::Io)?;
        digest.update(&chunk);
        size += chunk.len() as u64;
        let _ = tx.send(Message::Advanced { bucket, index, delta: chunk.len() as u32 }).await;
    }

    dst.flush().await.map_err(EntryErrorKind::Io)?;
    drop(dst);

    if let Some(expected_size) = entry.size {
        if size != expected_size as u64 {
            return Err(EntryErrorKind::InvalidSize);
        }
    }

    let sha1: [u8; 20] = digest.finalize().into();
    if let Some(expected_sha1) = &entry.sha1 {
        if *expected_sha1 != sha1 {
            return Err(EntryErrorKind::InvalidSha1);
        }
    }

    tokio::fs::rename(&part_file, &*entry.file).await.map_err(EntryErrorKind::Io)?;
    Ok(())

}
