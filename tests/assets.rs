//! Asset planning and legacy resources mapping.

use serde_json::json;
use sha1::{Digest, Sha1};

use oxmc::standard::{AssetsTask, Context, DownloadTask, Version};
use oxmc::download::DownloadList;
use oxmc::task::{State, Task};


fn hex(data: &[u8]) -> String {
    Sha1::digest(data).iter().map(|b| format!("{b:02x}")).collect()
}

/// Prepare a state with a resolved version referencing the "legacy" asset index.
fn new_state(context: &Context) -> State {

    let mut version = Version::new("1.6.1".to_string(), context.versions_dir.join("1.6.1"));
    version.metadata = json!({
        "id": "1.6.1",
        "assets": "legacy",
        "assetIndex": {
            "id": "legacy",
            "url": "http://127.0.0.1:1/never-fetched.json",
        },
    });

    let mut state = State::new();
    state.insert(context.clone());
    state.insert(DownloadList::new());
    state.insert(version);
    state

}

fn write_index(context: &Context, content_hash: &str) {
    let index_file = context.assets_dir.join("indexes").join("legacy.json");
    std::fs::create_dir_all(index_file.parent().unwrap()).unwrap();
    std::fs::write(&index_file, serde_json::to_vec(&json!({
        "map_to_resources": true,
        "virtual": false,
        "objects": {
            "sounds/a": { "hash": content_hash, "size": 5 },
        },
    })).unwrap()).unwrap();
}

#[test]
fn mapping_copy_and_idempotence() {

    let dir = tempfile::tempdir().unwrap();
    let context = Context::with_work_dir(dir.path().join("main"), dir.path().join("work"));
    std::fs::create_dir_all(&context.work_dir).unwrap();

    let content = b"hello";
    let content_hash = hex(content);
    write_index(&context, &content_hash);

    // Without the object on disk, exactly one entry is planned.
    let mut state = new_state(&context);
    AssetsTask.execute(&mut state, &mut ()).unwrap();
    assert_eq!(state.get::<DownloadList>().unwrap().count(), 1);

    // Materialize the content-addressed object, as the download would have.
    let object_file = context.assets_dir
        .join("objects")
        .join(&content_hash[0..2])
        .join(&content_hash);
    std::fs::create_dir_all(object_file.parent().unwrap()).unwrap();
    std::fs::write(&object_file, content).unwrap();

    // Against a clean cache the planner finds nothing to download, and the finalize
    // callback mirrors the object into the work directory resources.
    let mut state = new_state(&context);
    AssetsTask.execute(&mut state, &mut ()).unwrap();
    assert_eq!(state.get::<DownloadList>().unwrap().count(), 0);
    DownloadTask.execute(&mut state, &mut ()).unwrap();

    let resource_file = context.work_dir.join("resources").join("sounds").join("a");
    assert!(object_file.is_file());
    assert!(resource_file.is_file());
    assert_eq!(std::fs::read(&object_file).unwrap(), std::fs::read(&resource_file).unwrap());

    // No virtual mirror was requested by the index.
    assert!(!context.assets_dir.join("virtual").join("legacy").exists());

    // Existing destinations are not re-copied: a modified resource file survives a
    // second run untouched.
    std::fs::write(&resource_file, b"patched-by-game").unwrap();
    let mut state = new_state(&context);
    AssetsTask.execute(&mut state, &mut ()).unwrap();
    DownloadTask.execute(&mut state, &mut ()).unwrap();
    assert_eq!(std::fs::read(&resource_file).unwrap(), b"patched-by-game");

}

#[test]
fn version_without_assets_is_skipped() {

    let dir = tempfile::tempdir().unwrap();
    let context = Context::new(dir.path());

    let mut version = Version::new("b1.0".to_string(), context.versions_dir.join("b1.0"));
    version.metadata = json!({ "id": "b1.0" });

    let mut state = State::new();
    state.insert(context.clone());
    state.insert(DownloadList::new());
    state.insert(version);

    AssetsTask.execute(&mut state, &mut ()).unwrap();
    assert_eq!(state.get::<DownloadList>().unwrap().count(), 0);

}
