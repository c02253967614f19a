//! End-to-end transaction behaviour against a real temp workspace

use aide_events::{EventNotifier, EventPayload};
use aide_test_utils::{FaultOp, FaultyFs, TestWorkspace};
use aide_txn::{
    ApplyError, ApplyOptions, ApplyResult, OperationKind, TransactionBackup, TransactionEngine,
    TransactionError, TransactionJournal, TransactionStatus,
};
use aide_types::{CorrelationId, FileChange, MemoryStore, PlanId, Store, TxnId};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn engine_for(tw: &TestWorkspace) -> TransactionEngine {
    TransactionEngine::new(tw.fs(), Arc::new(EventNotifier::default()))
}

fn plan() -> PlanId {
    PlanId::from("plan-1")
}

async fn apply(
    engine: &TransactionEngine,
    changes: &[FileChange],
    options: ApplyOptions,
) -> Result<ApplyResult, TransactionError> {
    engine
        .execute(&plan(), changes, options, &CorrelationId::new())
        .await
}

#[tokio::test]
async fn create_new_file() {
    let tw = TestWorkspace::new();
    let engine = engine_for(&tw);

    let result = apply(
        &engine,
        &[FileChange::create("src/New.ts", "export const x = 1;")],
        ApplyOptions::default(),
    )
    .await
    .unwrap();

    assert!(result.success);
    assert_eq!(result.applied_files, vec!["src/New.ts"]);
    assert!(result.errors.is_empty());
    assert_eq!(result.status, TransactionStatus::Completed);
    assert_eq!(tw.read("src/New.ts").as_deref(), Some("export const x = 1;"));
    assert!(tw.temp_files().is_empty());
}

#[tokio::test]
async fn insert_at_line_keeps_surrounding_lines() {
    let tw = TestWorkspace::new();
    tw.seed("src/a.ts", "line one\nline two\nline three");
    let engine = engine_for(&tw);

    apply(
        &engine,
        &[FileChange::insert_at_line("src/a.ts", 2, "// inserted")],
        ApplyOptions::default(),
    )
    .await
    .unwrap();

    let content = tw.read("src/a.ts").unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines, ["line one", "// inserted", "line two", "line three"]);
}

#[tokio::test]
async fn failed_precondition_rejects_whole_transaction() {
    let tw = TestWorkspace::new();
    tw.seed("src/fileB.ts", "existing b");
    let before = tw.snapshot();
    let engine = engine_for(&tw);

    let err = apply(
        &engine,
        &[
            FileChange::create("src/fileA.ts", "a"),
            FileChange::create("src/fileB.ts", "b"),
        ],
        ApplyOptions::default(),
    )
    .await
    .unwrap_err();

    let journal = engine.journal(err.txn_id()).await;
    let result = ApplyResult::from_error(&err, journal.as_ref());
    assert!(!result.success);
    assert!(result.applied_files.is_empty());
    assert_eq!(result.errors, vec!["src/fileB.ts: File already exists"]);
    assert!(!tw.exists("src/fileA.ts"));
    assert_eq!(tw.snapshot(), before);

    let journal = engine.journal(err.txn_id()).await.unwrap();
    assert_eq!(journal.status, TransactionStatus::Failed);
    assert_eq!(journal.records(OperationKind::Apply).count(), 0);
    assert!(!engine.has_backup(err.txn_id()).await);
}

#[tokio::test]
async fn dry_run_reports_without_touching_disk() {
    let tw = TestWorkspace::new();
    tw.seed("src/exists.ts", "keep");
    let before = tw.snapshot();
    let engine = engine_for(&tw);

    let result = apply(
        &engine,
        &[
            FileChange::create("src/ok.ts", "new"),
            FileChange::create("src/exists.ts", "clobber"),
            FileChange::delete("src/missing.ts"),
        ],
        ApplyOptions::dry_run(),
    )
    .await
    .unwrap();

    assert!(!result.success);
    assert_eq!(
        result.applied_files,
        vec!["src/ok.ts", "src/exists.ts", "src/missing.ts"]
    );
    assert_eq!(
        result.errors,
        vec![
            "src/exists.ts: File already exists",
            "src/missing.ts: File does not exist",
        ]
    );
    assert_eq!(result.status, TransactionStatus::Failed);
    assert_eq!(tw.snapshot(), before);

    let journal = engine.journal(result.transaction_id).await.unwrap();
    assert!(journal.dry_run);
    assert_eq!(journal.records(OperationKind::Backup).count(), 0);
    assert_eq!(journal.records(OperationKind::Rollback).count(), 0);
    assert!(!engine.has_backup(result.transaction_id).await);
}

#[tokio::test]
async fn mid_apply_failure_restores_every_file() {
    let tw = TestWorkspace::new();
    tw.seed("src/a.ts", "a v1")
        .seed("src/b.ts", "b v1")
        .seed("src/old.ts", "moved")
        .seed("src/c.ts", "c v1");
    let before = tw.snapshot();

    let fs = Arc::new(FaultyFs::new(tw.fs()).fail_on(FaultOp::Write, "src/c.ts"));
    let engine = TransactionEngine::new(fs.clone(), Arc::new(EventNotifier::default()));

    let err = apply(
        &engine,
        &[
            FileChange::replace("src/a.ts", "a v2"),
            FileChange::delete("src/b.ts"),
            FileChange::rename("src/old.ts", "src/new.ts"),
            FileChange::create("src/d.ts", "d"),
            FileChange::replace("src/c.ts", "c v2"),
            FileChange::create("src/e.ts", "never written"),
        ],
        ApplyOptions::default(),
    )
    .await
    .unwrap_err();

    match &err {
        TransactionError::FileOperationFailed {
            path,
            rolled_back,
            source,
            ..
        } => {
            assert_eq!(path, "src/c.ts");
            assert!(rolled_back);
            assert!(matches!(source, ApplyError::Fs(_)));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(tw.snapshot(), before);
    assert!(tw.temp_files().is_empty());

    let journal = engine.journal(err.txn_id()).await.unwrap();
    assert_eq!(journal.status, TransactionStatus::RolledBack);
    assert_eq!(journal.records(OperationKind::Apply).filter(|r| r.success).count(), 4);
    // Restoring c hits the same injected write fault; its content never changed.
    assert_eq!(journal.failed_rollbacks(), vec!["src/c.ts"]);
    assert!(journal.unrecoverable.is_empty());

    let result = ApplyResult::from_error(&err, Some(&journal));
    assert_eq!(result.status, TransactionStatus::RolledBack);
    assert!(result.applied_files.is_empty());
}

const PNG_BYTES: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0xFF, 0xFE, 0x00, 0x01];

#[tokio::test]
async fn binary_file_survives_rollback_of_its_rename() {
    let tw = TestWorkspace::new();
    tw.seed_bytes("public/logo.png", &PNG_BYTES).seed("src/c.ts", "c v1");
    let fs = Arc::new(FaultyFs::new(tw.fs()).fail_on(FaultOp::Write, "src/c.ts"));
    let engine = TransactionEngine::new(fs, Arc::new(EventNotifier::default()));

    let err = apply(
        &engine,
        &[
            FileChange::rename("public/logo.png", "public/brand.png"),
            FileChange::replace("src/c.ts", "c v2"),
        ],
        ApplyOptions::default(),
    )
    .await
    .unwrap_err();

    assert_eq!(tw.read_bytes("public/logo.png").unwrap(), PNG_BYTES);
    assert!(!tw.exists("public/brand.png"));
    assert_eq!(tw.read("src/c.ts").as_deref(), Some("c v1"));

    let journal = engine.journal(err.txn_id()).await.unwrap();
    assert_eq!(journal.status, TransactionStatus::RolledBack);
    assert!(journal.records(OperationKind::Backup).all(|r| r.success));
    assert!(journal.unrecoverable.is_empty());
}

#[tokio::test]
async fn rename_without_source_backup_is_moved_back() {
    let tw = TestWorkspace::new();
    tw.seed_bytes("public/logo.png", &PNG_BYTES).seed("src/c.ts", "c v1");
    let fs = Arc::new(
        FaultyFs::new(tw.fs())
            .fail_on(FaultOp::Read, "public/logo.png")
            .fail_on(FaultOp::Write, "src/c.ts"),
    );
    let engine = TransactionEngine::new(fs, Arc::new(EventNotifier::default()));

    let err = apply(
        &engine,
        &[
            FileChange::rename("public/logo.png", "public/brand.png"),
            FileChange::replace("src/c.ts", "c v2"),
        ],
        ApplyOptions::default(),
    )
    .await
    .unwrap_err();

    assert_eq!(tw.read_bytes("public/logo.png").unwrap(), PNG_BYTES);
    assert!(!tw.exists("public/brand.png"));

    let journal = engine.journal(err.txn_id()).await.unwrap();
    let restored: Vec<&str> = journal
        .records(OperationKind::Rollback)
        .filter(|r| r.success)
        .map(|r| r.file.as_str())
        .collect();
    assert_eq!(restored, ["public/logo.png"]);
    assert!(journal.unrecoverable.is_empty());
}

#[tokio::test]
async fn applied_path_without_backup_is_reported_unrecoverable() {
    let tw = TestWorkspace::new();
    tw.seed("src/a.ts", "a v1").seed("src/c.ts", "c v1");
    let fs = Arc::new(
        FaultyFs::new(tw.fs())
            .fail_on(FaultOp::Read, "src/a.ts")
            .fail_on(FaultOp::Write, "src/c.ts"),
    );
    let engine = TransactionEngine::new(fs, Arc::new(EventNotifier::default()));

    let err = apply(
        &engine,
        &[
            FileChange::replace("src/a.ts", "a v2"),
            FileChange::replace("src/c.ts", "c v2"),
        ],
        ApplyOptions::default(),
    )
    .await
    .unwrap_err();

    let journal = engine.journal(err.txn_id()).await.unwrap();
    assert_eq!(journal.status, TransactionStatus::RolledBack);
    assert_eq!(journal.unrecoverable, vec!["src/a.ts"]);
    assert_eq!(tw.read("src/a.ts").as_deref(), Some("a v2"));
}

#[tokio::test]
async fn rollback_leaves_unreached_paths_alone() {
    let tw = TestWorkspace::new();
    tw.seed("src/a.ts", "a v1").seed("src/b.ts", "b v1");
    let fs = Arc::new(FaultyFs::new(tw.fs()).fail_on(FaultOp::Write, "src/a.ts"));
    let engine = TransactionEngine::new(fs.clone(), Arc::new(EventNotifier::default()));

    let err = apply(
        &engine,
        &[
            FileChange::replace("src/a.ts", "a v2"),
            FileChange::replace("src/b.ts", "b v2"),
        ],
        ApplyOptions::default(),
    )
    .await
    .unwrap_err();

    let journal = engine.journal(err.txn_id()).await.unwrap();
    let touched: Vec<&str> = journal
        .records(OperationKind::Rollback)
        .map(|r| r.file.as_str())
        .collect();
    assert_eq!(touched, ["src/a.ts"]);
    assert_eq!(fs.mutations(), 0);
    assert_eq!(tw.read("src/b.ts").as_deref(), Some("b v1"));
}

#[tokio::test]
async fn rollback_order_is_reverse_of_capture() {
    let tw = TestWorkspace::new();
    tw.seed("src/a.ts", "a");
    let fs = Arc::new(FaultyFs::new(tw.fs()).fail_on(FaultOp::Write, "src/z.ts"));
    let engine = TransactionEngine::new(fs, Arc::new(EventNotifier::default()));

    let err = apply(
        &engine,
        &[
            FileChange::replace("src/a.ts", "a2"),
            FileChange::create("src/b.ts", "b"),
            FileChange::create("src/z.ts", "z"),
        ],
        ApplyOptions::default(),
    )
    .await
    .unwrap_err();

    let journal = engine.journal(err.txn_id()).await.unwrap();
    let restored: Vec<&str> = journal
        .records(OperationKind::Rollback)
        .map(|r| r.file.as_str())
        .collect();
    assert_eq!(restored, ["src/z.ts", "src/b.ts", "src/a.ts"]);
}

#[tokio::test]
async fn failure_without_backups_is_not_rolled_back() {
    let tw = TestWorkspace::new();
    tw.seed("src/a.ts", "a v1").seed("src/b.ts", "b v1");
    let fs = Arc::new(FaultyFs::new(tw.fs()).fail_on(FaultOp::Write, "src/b.ts"));
    let engine = TransactionEngine::new(fs, Arc::new(EventNotifier::default()));

    let options = ApplyOptions {
        create_backups: false,
        ..ApplyOptions::default()
    };
    let err = apply(
        &engine,
        &[
            FileChange::replace("src/a.ts", "a v2"),
            FileChange::replace("src/b.ts", "b v2"),
        ],
        options,
    )
    .await
    .unwrap_err();

    assert!(matches!(
        err,
        TransactionError::FileOperationFailed {
            rolled_back: false,
            ..
        }
    ));
    assert_eq!(tw.read("src/a.ts").as_deref(), Some("a v2"));
    assert_eq!(tw.read("src/b.ts").as_deref(), Some("b v1"));

    let journal = engine.journal(err.txn_id()).await.unwrap();
    assert_eq!(journal.status, TransactionStatus::Failed);
    assert_eq!(journal.unrecoverable, vec!["src/b.ts"]);

    let result = ApplyResult::from_error(&err, Some(&journal));
    assert_eq!(result.status, TransactionStatus::Failed);
    assert_eq!(result.applied_files, vec!["src/a.ts"]);

    let rollback = engine.rollback(err.txn_id(), &CorrelationId::new()).await;
    assert!(matches!(rollback, Err(TransactionError::NoBackupFound(_))));
}

#[tokio::test]
async fn failed_backup_then_failed_apply_is_unrecoverable() {
    let tw = TestWorkspace::new();
    tw.seed("src/a.ts", "a v1").seed("src/b.ts", "b v1");
    let fs = Arc::new(
        FaultyFs::new(tw.fs())
            .fail_on(FaultOp::Read, "src/b.ts")
            .fail_on(FaultOp::Write, "src/b.ts"),
    );
    let engine = TransactionEngine::new(fs, Arc::new(EventNotifier::default()));

    let err = apply(
        &engine,
        &[
            FileChange::replace("src/a.ts", "a v2"),
            FileChange::replace("src/b.ts", "b v2"),
        ],
        ApplyOptions::default(),
    )
    .await
    .unwrap_err();

    let journal = engine.journal(err.txn_id()).await.unwrap();
    assert_eq!(journal.status, TransactionStatus::RolledBack);
    assert_eq!(journal.unrecoverable, vec!["src/b.ts"]);
    let failed_backups: Vec<_> = journal
        .records(OperationKind::Backup)
        .filter(|r| !r.success)
        .map(|r| r.file.as_str())
        .collect();
    assert_eq!(failed_backups, ["src/b.ts"]);
    assert_eq!(tw.read("src/a.ts").as_deref(), Some("a v1"));
}

#[tokio::test]
async fn diff_with_content_falls_back_to_replace() {
    let tw = TestWorkspace::new();
    tw.seed("src/a.ts", "old");
    let engine = engine_for(&tw);
    let mut events = engine.notifier().subscribe();

    let change = FileChange::diff("src/a.ts", "not really a diff").with_content("new");
    let result = apply(&engine, &[change], ApplyOptions::default())
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(tw.read("src/a.ts").as_deref(), Some("new"));
    let diff_events: Vec<_> = events
        .drain()
        .into_iter()
        .filter_map(|e| match e.payload {
            EventPayload::DiffValidated {
                file, valid, fallback, ..
            } => Some((file, valid, fallback)),
            _ => None,
        })
        .collect();
    assert_eq!(diff_events, vec![("src/a.ts".to_string(), false, true)]);
}

#[tokio::test]
async fn well_formed_diff_without_content_is_unsupported() {
    let tw = TestWorkspace::new();
    tw.seed("src/a.ts", "one\ntwo").seed("src/b.ts", "b");
    let before = tw.snapshot();
    let engine = engine_for(&tw);

    let err = apply(
        &engine,
        &[
            FileChange::replace("src/b.ts", "b2"),
            FileChange::diff("src/a.ts", "@@ -1,2 +1,2 @@\n one\n-two\n+three\n"),
        ],
        ApplyOptions::default(),
    )
    .await
    .unwrap_err();

    assert_eq!(
        err.messages(),
        vec!["src/a.ts: diff apply method is not supported; provide full content instead"]
    );
    assert_eq!(tw.snapshot(), before);
}

#[tokio::test]
async fn malformed_diff_without_content_fails_validation() {
    let tw = TestWorkspace::new();
    tw.seed("src/a.ts", "one");
    let engine = engine_for(&tw);

    let err = apply(
        &engine,
        &[FileChange::diff("src/a.ts", "garbage")],
        ApplyOptions::default(),
    )
    .await
    .unwrap_err();

    assert_eq!(err.messages(), vec!["src/a.ts: Invalid diff format"]);
}

#[tokio::test]
async fn explicit_rollback_undoes_completed_transaction() {
    let tw = TestWorkspace::new();
    tw.seed("src/a.ts", "a v1");
    let before = tw.snapshot();
    let engine = engine_for(&tw);

    let result = apply(
        &engine,
        &[
            FileChange::replace("src/a.ts", "a v2"),
            FileChange::create("src/b.ts", "b"),
        ],
        ApplyOptions::default(),
    )
    .await
    .unwrap();
    assert!(engine.has_backup(result.transaction_id).await);

    let journal = engine
        .rollback(result.transaction_id, &CorrelationId::new())
        .await
        .unwrap();
    assert_eq!(journal.status, TransactionStatus::RolledBack);
    assert_eq!(journal.records(OperationKind::Rollback).count(), 2);
    assert_eq!(tw.snapshot(), before);

    let again = engine
        .rollback(result.transaction_id, &CorrelationId::new())
        .await;
    assert!(matches!(again, Err(TransactionError::NoBackupFound(_))));
}

#[tokio::test]
async fn rollback_of_unknown_transaction_has_no_backup() {
    let tw = TestWorkspace::new();
    let engine = engine_for(&tw);
    let err = engine
        .rollback(TxnId::new(), &CorrelationId::new())
        .await
        .unwrap_err();
    assert!(matches!(err, TransactionError::NoBackupFound(_)));
}

#[tokio::test]
async fn rollback_requires_a_journal_in_an_undoable_state() {
    let tw = TestWorkspace::new();
    let journals = Arc::new(MemoryStore::<TxnId, TransactionJournal>::new(16));
    let backups = Arc::new(MemoryStore::<TxnId, TransactionBackup>::new(16));
    let engine = engine_for(&tw).with_stores(journals.clone(), backups.clone());

    let txn_id = TxnId::new();
    backups.put(txn_id, TransactionBackup::new(txn_id)).await;
    let missing = engine.rollback(txn_id, &CorrelationId::new()).await;
    assert!(matches!(missing, Err(TransactionError::JournalNotFound(_))));

    let mut journal = TransactionJournal::new(txn_id, plan(), CorrelationId::new());
    journal.transition(TransactionStatus::RolledBack);
    journals.put(txn_id, journal).await;
    let invalid = engine.rollback(txn_id, &CorrelationId::new()).await;
    assert!(matches!(
        invalid,
        Err(TransactionError::InvalidState {
            status: TransactionStatus::RolledBack,
            ..
        })
    ));
}

#[tokio::test]
async fn progress_events_follow_change_order() {
    let tw = TestWorkspace::new();
    let engine = engine_for(&tw);
    let mut events = engine.notifier().subscribe();
    let cid = CorrelationId::resolve(Some("req-42"));

    engine
        .execute(
            &plan(),
            &[
                FileChange::create("src/a.ts", "a"),
                FileChange::create("src/b.ts", "b"),
            ],
            ApplyOptions::default(),
            &cid,
        )
        .await
        .unwrap();

    let progress: Vec<(u8, Option<String>, bool)> = events
        .drain()
        .into_iter()
        .inspect(|e| assert_eq!(e.correlation_id, cid))
        .filter_map(|e| match e.payload {
            EventPayload::ApplyProgress {
                progress,
                current_file,
                completed,
                ..
            } => Some((progress, current_file, completed)),
            _ => None,
        })
        .collect();
    assert_eq!(
        progress,
        vec![
            (0, Some("src/a.ts".to_string()), false),
            (50, Some("src/b.ts".to_string()), false),
            (100, None, true),
        ]
    );
}

#[tokio::test]
async fn disallowed_paths_never_reach_disk() {
    let tw = TestWorkspace::new();
    let before = tw.snapshot();
    let engine = engine_for(&tw);

    let err = apply(
        &engine,
        &[
            FileChange::create("../escape.ts", "x"),
            FileChange::create("secrets/key.pem", "x"),
        ],
        ApplyOptions::default(),
    )
    .await
    .unwrap_err();

    assert_eq!(
        err.messages(),
        vec![
            "../escape.ts: Path not allowed by security policy",
            "secrets/key.pem: Path not allowed by security policy",
        ]
    );
    assert_eq!(tw.snapshot(), before);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_transactions_on_one_file_do_not_lose_updates() {
    let tw = TestWorkspace::new();
    tw.seed("src/log.ts", "// log");
    let engine = Arc::new(engine_for(&tw));

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                engine
                    .execute(
                        &PlanId::from(format!("plan-{i}")),
                        &[FileChange::insert_at_line("src/log.ts", 1, format!("entry {i}"))],
                        ApplyOptions::default(),
                        &CorrelationId::new(),
                    )
                    .await
            })
        })
        .collect();
    for task in tasks {
        assert!(task.await.unwrap().unwrap().success);
    }

    let content = tw.read("src/log.ts").unwrap();
    assert_eq!(content.lines().count(), 17);
    for i in 0..16 {
        assert!(content.lines().any(|l| l == format!("entry {i}")));
    }
    assert!(engine.locks().is_empty());
    assert_eq!(engine.journals().await.len(), 16);
}
