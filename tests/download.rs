//! Download executor behavior against a local mock server.

use std::sync::{Arc, Mutex};

use sha1::{Digest, Sha1};

use oxmc::download::{DownloadList, Entry, EntryErrorKind};
use oxmc::task::{Event, Watcher};


/// Collect a readable trace of download events, progress deltas excluded.
#[derive(Clone, Default)]
struct LogWatcher(Arc<Mutex<Vec<String>>>);

impl LogWatcher {
    fn logs(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl Watcher for LogWatcher {
    fn on_event(&mut self, event: Event) {
        let log = match event {
            Event::DownloadStarted { count, size } => format!("started({count},{size})"),
            Event::DownloadEntryStarted { name } => format!("entry_started({name})"),
            Event::DownloadEntryCompleted { name } => format!("entry_completed({name})"),
            Event::DownloadEntryFailed { name } => format!("entry_failed({name})"),
            Event::DownloadCompleted {} => "completed".to_string(),
            _ => return,
        };
        self.0.lock().unwrap().push(log);
    }
}

fn sha1_of(data: &[u8]) -> [u8; 20] {
    Sha1::digest(data).into()
}

#[test]
fn batch_verify_rename_callbacks() {

    let mut server = mockito::Server::new();
    let m1 = server.mock("GET", "/a").with_body("hello").create();
    let m2 = server.mock("GET", "/b").with_body("world!").create();

    let dir = tempfile::tempdir().unwrap();
    let a_file = dir.path().join("a.bin");
    let b_file = dir.path().join("sub").join("b.bin");

    let mut list = DownloadList::new();

    list.push(Entry::new(format!("{}/a", server.url()), a_file.clone())
        .with_size(Some(5))
        .with_sha1(Some(sha1_of(b"hello")))
        .with_name("a")).unwrap();

    list.push(Entry::new(format!("{}/b", server.url()), b_file.clone())
        .with_name("b")).unwrap();

    assert_eq!(list.count(), 2);
    assert_eq!(list.size(), 5);

    // The callback observes fully downloaded entries.
    let marker_file = dir.path().join("marker");
    {
        let a_file = a_file.clone();
        let marker_file = marker_file.clone();
        list.push_callback(Box::new(move || {
            assert!(a_file.is_file());
            std::fs::write(&marker_file, "ok").unwrap();
            Ok(())
        }));
    }

    let mut watcher = LogWatcher::default();
    list.download(&mut watcher).unwrap();

    m1.assert();
    m2.assert();

    assert!(list.is_empty());
    assert_eq!(std::fs::read(&a_file).unwrap(), b"hello");
    assert_eq!(std::fs::read(&b_file).unwrap(), b"world!");
    assert!(marker_file.is_file());

    // No part file is left behind.
    assert!(!dir.path().join("a.bin.part").exists());

    // Both entries share the host key, so they complete in queue order.
    assert_eq!(watcher.logs(), [
        "started(2,5)",
        "entry_started(a)",
        "entry_completed(a)",
        "entry_started(b)",
        "entry_completed(b)",
        "completed",
    ]);

}

#[test]
fn verification_failure_bounded_retry() {

    let mut server = mockito::Server::new();
    let mock = server.mock("GET", "/corrupt")
        .with_body("not the expected content")
        .expect(3)
        .create();

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("corrupt.bin");

    let mut list = DownloadList::new();
    list.push(Entry::new(format!("{}/corrupt", server.url()), file.clone())
        .with_sha1(Some(sha1_of(b"something else")))
        .with_name("corrupt")).unwrap();

    let mut watcher = LogWatcher::default();
    let res = list.download(&mut watcher);

    // Retried up to three attempts, then surfaced as a download error.
    mock.assert();
    let Err(oxmc::Error::Download(error)) = res else { panic!("expected download error") };
    assert!(matches!(error.kind(), EntryErrorKind::InvalidSha1));
    assert!(!file.exists());

    let logs = watcher.logs();
    assert_eq!(logs.iter().filter(|log| *log == "entry_failed(corrupt)").count(), 1);

}

#[test]
fn not_found_is_terminal() {

    let mut server = mockito::Server::new();
    let mock = server.mock("GET", "/missing")
        .with_status(404)
        .expect(1)
        .create();

    let dir = tempfile::tempdir().unwrap();

    let mut list = DownloadList::new();
    list.push(Entry::new(format!("{}/missing", server.url()), dir.path().join("missing.bin"))
        .with_name("missing")).unwrap();

    let res = list.download(&mut ());

    // A 404 is returned as-is, without retries.
    mock.assert();
    let Err(oxmc::Error::Download(error)) = res else { panic!("expected download error") };
    assert!(matches!(error.kind(), EntryErrorKind::InvalidStatus(404)));

}

#[test]
fn callback_error_aborts() {

    let mut list = DownloadList::new();
    list.push_callback(Box::new(|| Err(oxmc::Error::JarNotFound {})));
    list.push_callback(Box::new(|| panic!("second callback should not run")));

    let res = list.download(&mut ());
    assert!(matches!(res, Err(oxmc::Error::JarNotFound {})));

}

#[test]
fn scheme_discriminates_host_key() {
    let mut list = DownloadList::new();
    let dir = tempfile::tempdir().unwrap();
    assert!(list.push(Entry::new("ftp://example.com/a", dir.path().join("a"))).is_err());
    assert!(list.push(Entry::new("http://example.com/a", dir.path().join("a"))).is_ok());
    assert!(list.push(Entry::new("https://example.com/a", dir.path().join("b"))).is_ok());
    assert_eq!(list.count(), 2);
}
