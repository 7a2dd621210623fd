//! Post-processor execution and output verification.

#![cfg(unix)]

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use sha1::{Digest, Sha1};

use oxmc::forge::{ForgeFinalizeTask, PostInfo, PostProcessor};
use oxmc::standard::{Context, Jvm, Version};
use oxmc::task::{Event, State, Task, Watcher};
use oxmc::maven::Gav;


#[derive(Clone, Default)]
struct LogWatcher(Arc<Mutex<Vec<String>>>);

impl Watcher for LogWatcher {
    fn on_event(&mut self, event: Event) {
        let log = match event {
            Event::PostProcessorStarted { task } => format!("processor({task})"),
            Event::PostProcessed {} => "processed".to_string(),
            _ => return,
        };
        self.0.lock().unwrap().push(log);
    }
}

fn hex(data: &[u8]) -> String {
    Sha1::digest(data).iter().map(|b| format!("{b:02x}")).collect()
}

/// Write a minimal processor jar whose manifest declares a main class.
fn write_processor_jar(file: &PathBuf) {
    std::fs::create_dir_all(file.parent().unwrap()).unwrap();
    let mut writer = zip::ZipWriter::new(std::fs::File::create(file).unwrap());
    let options = zip::write::SimpleFileOptions::default();
    writer.start_file("META-INF/MANIFEST.MF", options).unwrap();
    writer.write_all(b"Manifest-Version: 1.0\r\nMain-Class: net.example.Processor\r\n").unwrap();
    writer.finish().unwrap();
}

struct Fixture {
    context: Context,
    tmp_dir: PathBuf,
    out_file: PathBuf,
    processor_gav: Gav,
    processor_jar: PathBuf,
    _dir: tempfile::TempDir,
}

fn fixture() -> Fixture {

    let dir = tempfile::tempdir().unwrap();
    let context = Context::new(dir.path().join("main"));
    std::fs::create_dir_all(&context.work_dir).unwrap();

    // The base game jar must exist, its absolute path seeds MINECRAFT_JAR.
    let version_dir = context.versions_dir.join("forge-1.16.5-36.2.39");
    std::fs::create_dir_all(&version_dir).unwrap();
    std::fs::write(version_dir.join("forge-1.16.5-36.2.39.jar"), b"base jar").unwrap();

    let processor_gav: Gav = "net.minecraftforge:binarypatcher:1.0.0".parse().unwrap();
    let processor_jar = processor_gav.file(&context.libraries_dir);
    write_processor_jar(&processor_jar);

    let tmp_dir = context.gen_bin_dir();
    std::fs::create_dir_all(&tmp_dir).unwrap();

    let out_file = dir.path().join("out.bin");
    std::fs::write(&out_file, b"processor output").unwrap();

    Fixture { context, tmp_dir, out_file, processor_gav, processor_jar, _dir: dir }

}

fn new_state(fixture: &Fixture, expected_sha1: &str) -> State {

    let mut version = Version::new(
        "forge-1.16.5-36.2.39".to_string(),
        fixture.context.versions_dir.join("forge-1.16.5-36.2.39"));
    version.metadata = serde_json::json!({ "id": "forge-1.16.5-36.2.39" });

    let mut variables = HashMap::new();
    variables.insert("OUT".to_string(), fixture.out_file.display().to_string());
    variables.insert("OUT_SHA".to_string(), expected_sha1.to_string());

    let mut libraries = HashMap::new();
    libraries.insert(fixture.processor_gav.clone(), fixture.processor_jar.clone());

    let mut outputs = HashMap::new();
    outputs.insert("{OUT}".to_string(), "{OUT_SHA}".to_string());

    let post = PostInfo {
        tmp_dir: fixture.tmp_dir.clone(),
        variables,
        libraries,
        processors: vec![PostProcessor {
            jar: fixture.processor_gav.clone(),
            classpath: Vec::new(),
            args: vec!["--task".to_string(), "TEST".to_string(), "--output".to_string(), "{OUT}".to_string()],
            outputs,
        }],
    };

    let mut state = State::new();
    state.insert(fixture.context.clone());
    // A no-op executable stands in for the JVM, the processor jars are not run for
    // real in these tests.
    state.insert(Jvm { file: PathBuf::from("true") });
    state.insert(version);
    state.insert(post);
    state

}

#[test]
fn outputs_verified_and_tmp_removed() {

    let fixture = fixture();
    let expected = hex(b"processor output");
    let mut state = new_state(&fixture, &expected);

    let mut watcher = LogWatcher::default();
    ForgeFinalizeTask.execute(&mut state, &mut watcher).unwrap();

    assert_eq!(watcher.0.lock().unwrap().clone(), ["processor(TEST)", "processed"]);
    // The temporary directory is removed once everything has been verified.
    assert!(!fixture.tmp_dir.exists());

}

#[test]
fn corrupt_output_keeps_tmp() {

    let fixture = fixture();
    let expected = hex(b"some other content");
    let mut state = new_state(&fixture, &expected);

    let res = ForgeFinalizeTask.execute(&mut state, &mut ());
    let Err(oxmc::Error::Forge(error)) = res else { panic!("expected forge error") };

    // The message carries both the actual and the expected hashes.
    let message = error.to_string();
    assert!(message.contains(&hex(b"processor output")));
    assert!(message.contains(&expected));

    // Kept for diagnosis.
    assert!(fixture.tmp_dir.exists());

}

#[test]
fn without_post_info_does_nothing() {
    let mut state = State::new();
    ForgeFinalizeTask.execute(&mut state, &mut ()).unwrap();
}
