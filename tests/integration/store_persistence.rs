//! Sled-backed repositories survive a reopen

use super::test_utils::{commit, cp};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;
use treemover::config::{EngineConfig, StorageBackend};
use treemover::{EditOp, Repository};

fn sled_config(temp_dir: &TempDir) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.storage.backend = StorageBackend::Sled;
    config.storage.path = temp_dir.path().join("store");
    config
}

/// Open again after a close. Sled drops its file lock from a background
/// thread, so the first attempts may still find it held.
fn reopen(config: &EngineConfig) -> Repository {
    let mut attempts = 0;
    loop {
        match Repository::open(config) {
            Ok(repo) => return repo,
            Err(err) if attempts < 20 => {
                attempts += 1;
                eprintln!("reopen attempt {} failed: {}", attempts, err);
                thread::sleep(Duration::from_millis(50));
            }
            Err(err) => panic!("could not reopen store: {}", err),
        }
    }
}

#[test]
fn test_history_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let config = sled_config(&temp_dir);

    let old_max = {
        let repo = Repository::open(&config).unwrap();
        commit(&repo, "", vec![EditOp::mkdir("A"), EditOp::put("A/f", "content")]);
        commit(&repo, "", vec![cp("1", "A", "B")]);
        let old_max = repo.head_snapshot().unwrap().index().max_id().unwrap();
        repo.close().unwrap();
        old_max
    };

    let repo = reopen(&config);
    assert_eq!(repo.head().unwrap(), 2);

    let log: Vec<String> = repo
        .log(2)
        .unwrap()
        .changes
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(log, vec!["A /B (from /A:1)"]);
    assert_eq!(repo.log(1).unwrap().info.log_message.as_deref(), Some("log msg"));

    let head = repo.head_snapshot().unwrap();
    let copied = head.try_resolve(&"B/f".into()).unwrap();
    assert_eq!(head.content_of(copied).unwrap().content(), Some(&b"content"[..]));

    commit(&repo, "", vec![EditOp::mkdir("C")]);
    let fresh = repo
        .head_snapshot()
        .unwrap()
        .try_resolve(&"C".into())
        .unwrap();
    assert!(fresh > old_max);
}

#[test]
fn test_merge_on_persistent_store() {
    let temp_dir = TempDir::new().unwrap();
    let config = sled_config(&temp_dir);
    {
        let repo = Repository::open(&config).unwrap();
        commit(&repo, "", vec![EditOp::mkbranch("trunk"), EditOp::mkdir("branches")]);
        commit(&repo, "", vec![EditOp::branch("trunk", "branches/b")]);
        commit(&repo, "branches/b", vec![EditOp::put("f", "on b")]);
        repo.close().unwrap();
    }

    let repo = reopen(&config);
    let request = treemover::MergeRequest::parse("branches/b", "trunk", "trunk@2").unwrap();
    let outcome = repo.merge(&request).unwrap();
    let commit = outcome.commit.unwrap();
    assert_eq!(commit.revision, 4);
    let lines: Vec<String> = commit.changes.iter().map(ToString::to_string).collect();
    assert_eq!(lines, vec!["A /trunk/f"]);
}
