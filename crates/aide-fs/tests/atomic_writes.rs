//! Concurrency behaviour of workspace writes

use aide_fs::{FileSystem, PathPolicy, Workspace, TEMP_SUFFIX};
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn readers_never_observe_partial_content() {
    let dir = TempDir::new().unwrap();
    let ws = Arc::new(Workspace::open(dir.path(), PathPolicy::default()).unwrap());

    let old = "a".repeat(256 * 1024);
    let new = "b".repeat(256 * 1024);
    ws.write_file("src/big.txt", &old).await.unwrap();

    let writer = {
        let ws = Arc::clone(&ws);
        let (old, new) = (old.clone(), new.clone());
        tokio::spawn(async move {
            for i in 0..20 {
                let body = if i % 2 == 0 { &new } else { &old };
                ws.write_file("src/big.txt", body).await.unwrap();
            }
        })
    };

    let mut readers = Vec::new();
    for _ in 0..4 {
        let ws = Arc::clone(&ws);
        let (old, new) = (old.clone(), new.clone());
        readers.push(tokio::spawn(async move {
            for _ in 0..50 {
                let seen = ws.read_file("src/big.txt").await.unwrap();
                assert!(seen == old || seen == new, "observed torn write");
            }
        }));
    }

    writer.await.unwrap();
    for r in readers {
        r.await.unwrap();
    }

    let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("src"))
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().ends_with(TEMP_SUFFIX))
        .collect();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn metadata_is_stable_without_writes() {
    let dir = TempDir::new().unwrap();
    let ws = Workspace::open(dir.path(), PathPolicy::default()).unwrap();
    ws.write_file("package.json", r#"{"name":"demo"}"#).await.unwrap();

    let first = ws.metadata("package.json").await.unwrap();
    for _ in 0..5 {
        assert_eq!(ws.metadata("package.json").await.unwrap(), first);
    }
    assert_eq!(first.mime_type, "application/json");
}

#[tokio::test]
async fn custom_policy_and_ignored_dirs() {
    let dir = TempDir::new().unwrap();
    let ws = Workspace::open(dir.path(), PathPolicy::new(["lib/", "Cargo.toml"]))
        .unwrap()
        .with_ignored_dirs(["generated"]);

    ws.write_file("lib/a.rs", "fn a() {}").await.unwrap();
    ws.write_file("lib/generated/b.rs", "fn b() {}").await.unwrap();
    ws.write_file("lib/node_modules/c.rs", "fn c() {}").await.unwrap();
    assert!(ws.write_file("src/main.rs", "").await.unwrap_err().is_forbidden());

    let tree = ws.file_tree("", 5).await.unwrap();
    assert!(tree.find("lib/a.rs").is_some());
    assert!(tree.find("lib/generated").is_none());
    assert!(tree.find("lib/node_modules/c.rs").is_some());
}
