//! End-to-end tests for the Treeline engine
//!
//! Exercises full sessions against a persistent engine: recording history,
//! labeling, time travel, diffing, purging, and reopening from disk.

use std::sync::Arc;
use tempfile::TempDir;
use treeline::{
    DiffKind, EngineError, ManualClock, PathComparisonMode, PathEvent, TreePath, Treeline,
    TreelineBuilder,
};

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

fn open_engine(dir: &TempDir, clock: Arc<ManualClock>) -> Treeline {
    TreelineBuilder::new().clock(clock).open(dir.path()).unwrap()
}

fn p(s: &str) -> TreePath {
    TreePath::new(s)
}

#[test]
fn test_full_session_with_reopen() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(1_000));

    {
        let mut engine = open_engine(&dir, clock.clone());
        engine.begin_change_set();
        engine.create_directory("project").unwrap();
        engine.create_directory("project/src").unwrap();
        engine.create_file("project/src/main.rs", b"fn main() {}").unwrap();
        engine.create_file("project/README.md", b"# project").unwrap();
        engine.end_change_set().unwrap();
        engine.put_label("scaffolding").unwrap();

        clock.set(2_000);
        engine.change_content("project/src/main.rs", b"fn main() { run() }").unwrap();
        engine.close().unwrap();
    }

    clock.set(3_000);
    let engine = open_engine(&dir, clock.clone());
    assert_eq!(engine.history().len(), 2);
    assert_eq!(
        engine.content_bytes(&p("project/src/main.rs")).unwrap(),
        b"fn main() { run() }"
    );

    // The labeled state is reconstructible after a restart
    let labels = engine.labels_for(&p("project/src/main.rs")).unwrap();
    assert_eq!(labels.len(), 3);
    let scaffolding = labels
        .iter()
        .find(|l| l.name() == Some("scaffolding"))
        .unwrap();
    let old = engine.tree_at(scaffolding).unwrap();
    let record = old.entry(&p("project/src/main.rs")).unwrap().to_record();
    assert_eq!(
        record.content().unwrap().bytes(engine.content_store()).unwrap(),
        b"fn main() {}"
    );

    // Diff from the label to the present shows exactly the one edit
    let diff = engine.diff(scaffolding, &labels[0]).unwrap();
    assert_eq!(diff.change_count(), 1);
}

#[test]
fn test_rename_and_move_preserve_identity() {
    init_tracing();
    let clock = Arc::new(ManualClock::new(1_000));
    let mut engine = TreelineBuilder::new().clock(clock.clone()).build_in_memory();

    engine.create_directory("a").unwrap();
    engine.create_directory("b").unwrap();
    engine.create_file("a/notes.txt", b"v1").unwrap();
    let id = engine.entry(&p("a/notes.txt")).unwrap().id();

    clock.set(2_000);
    engine.rename("a/notes.txt", "renamed.txt").unwrap();
    clock.set(3_000);
    engine.move_entry("a/renamed.txt", "b").unwrap();

    let entry = engine.entry(&p("b/renamed.txt")).unwrap();
    assert_eq!(entry.id(), id);
    assert_eq!(entry.timestamp(), 3_000);

    // All three states of the same entry, newest first
    let states = engine.entries_for(&p("b/renamed.txt")).unwrap();
    assert_eq!(states.len(), 3);
    assert_eq!(states[0].name(), "renamed.txt");
    assert_eq!(states[1].name(), "renamed.txt");
    assert_eq!(states[2].name(), "notes.txt");
    assert_eq!(states[2].timestamp(), 1_000);

    // Across the rename, the diff pairs the entry with itself by id
    // instead of reporting a delete plus a create
    let labels = engine.labels_for(&p("b/renamed.txt")).unwrap();
    assert_eq!(labels.len(), 4);
    let diff = engine.diff(&labels[3], &labels[2]).unwrap();
    let kinds = collect_kinds(&diff);
    assert!(kinds.contains(&DiffKind::Modified));
    assert!(!kinds.contains(&DiffKind::Deleted));
    assert!(!kinds.contains(&DiffKind::Created));
}

fn collect_kinds(diff: &treeline::Difference) -> Vec<DiffKind> {
    let mut kinds = vec![diff.kind];
    for child in &diff.children {
        kinds.extend(collect_kinds(child));
    }
    kinds
}

#[test]
fn test_failed_changeset_leaves_no_partial_state() {
    init_tracing();
    let mut engine = TreelineBuilder::new()
        .clock(ManualClock::new(1_000))
        .build_in_memory();
    engine.create_directory("dir").unwrap();

    engine.begin_change_set();
    engine.create_file("dir/ok", b"fine").unwrap();
    // Collides with the file created two lines above
    engine.create_file("dir/ok", b"duplicate").unwrap();
    let err = engine.end_change_set().unwrap_err();
    assert!(matches!(err, EngineError::CommitConflict(_)));

    // Neither change of the failed set is visible anywhere
    assert!(!engine.has_entry(&p("dir/ok")));
    assert_eq!(engine.history().len(), 1);
    assert!(engine.entries_for(&p("dir/ok")).unwrap_err().is_not_found());
}

#[test]
fn test_purge_reclaims_replaced_content() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(1_000));
    let mut engine = open_engine(&dir, clock.clone());

    engine.create_file("log.txt", b"first").unwrap();
    clock.set(2_000);
    engine.change_content("log.txt", b"second").unwrap();
    clock.set(3_000);
    engine.change_content("log.txt", b"third").unwrap();

    let states = engine.entries_for(&p("log.txt")).unwrap();
    assert_eq!(states.len(), 3);
    let first = states[2].content().unwrap().clone();
    let second = states[1].content().unwrap().clone();
    assert!(first.is_available(engine.content_store()));

    // Drop everything before the last change; only the first generation
    // is stranded, the second is still the surviving set's pre-image
    let removed = engine.purge_up_to(3_000).unwrap();
    assert_eq!(removed, 1);
    assert_eq!(engine.history().len(), 1);
    assert!(!first.is_available(engine.content_store()));
    assert!(second.is_available(engine.content_store()));
    assert_eq!(engine.content_bytes(&p("log.txt")).unwrap(), b"third");

    // History that survived the purge still reverts
    engine.revert().unwrap();
    assert_eq!(engine.content_bytes(&p("log.txt")).unwrap(), b"second");
}

#[test]
fn test_delete_and_undelete_subtree() {
    init_tracing();
    let mut engine = TreelineBuilder::new()
        .clock(ManualClock::new(1_000))
        .build_in_memory();

    engine.begin_change_set();
    engine.create_directory("module").unwrap();
    engine.create_file("module/a.rs", b"a").unwrap();
    engine.create_file("module/b.rs", b"b").unwrap();
    engine.end_change_set().unwrap();
    let a_id = engine.entry(&p("module/a.rs")).unwrap().id();

    engine.delete("module").unwrap();
    assert!(!engine.has_entry(&p("module")));

    // Reverting the delete brings the whole subtree back, ids included
    engine.revert().unwrap();
    assert_eq!(engine.entry(&p("module/a.rs")).unwrap().id(), a_id);
    assert_eq!(engine.content_bytes(&p("module/b.rs")).unwrap(), b"b");
}

#[test]
fn test_case_insensitive_engine() {
    init_tracing();
    let mut engine = TreelineBuilder::new()
        .clock(ManualClock::new(1_000))
        .comparison_mode(PathComparisonMode::CaseInsensitive)
        .build_in_memory();

    engine.create_directory("Src").unwrap();
    engine.create_file("Src/Main.RS", b"x").unwrap();

    assert!(engine.has_entry(&p("src/main.rs")));
    let err = engine.create_file("SRC/MAIN.rs", b"y").unwrap_err();
    assert!(matches!(err, EngineError::CommitConflict(_)));

    // History queries resolve case-insensitively too
    assert_eq!(engine.entries_for(&p("src/main.rs")).unwrap().len(), 1);
}

#[test]
fn test_event_stream_builds_history() {
    init_tracing();
    let mut engine = TreelineBuilder::new()
        .clock(ManualClock::new(1_000))
        .build_in_memory();

    let events = vec![
        PathEvent::Created {
            path: p("ws/src/lib.rs"),
            bytes: Some(b"v1".to_vec()),
        },
        PathEvent::ContentChanged {
            path: p("ws/src/lib.rs"),
            bytes: b"v2".to_vec(),
        },
        PathEvent::DirectoryDirty { path: p("ws/target") },
        PathEvent::Deleted { path: p("ws/target") },
        PathEvent::Deleted { path: p("never/seen") },
    ];
    for event in events {
        engine.ingest(event).unwrap();
    }

    assert!(engine.has_entry(&p("ws/src")));
    assert!(!engine.has_entry(&p("ws/target")));
    assert_eq!(engine.content_bytes(&p("ws/src/lib.rs")).unwrap(), b"v2");
    assert_eq!(engine.entries_for(&p("ws/src/lib.rs")).unwrap().len(), 2);
}

#[test]
fn test_oversized_content_is_gated_not_stored() {
    init_tracing();
    let mut engine = TreelineBuilder::new()
        .clock(ManualClock::new(1_000))
        .content_size_limit(8)
        .build_in_memory();

    engine.create_file("huge.bin", &[0u8; 64]).unwrap();
    let entry = engine.entry(&p("huge.bin")).unwrap();
    let content = entry.content().unwrap();
    assert!(content.is_too_long());
    assert_eq!(content.length(engine.content_store()), 0);
    assert_eq!(
        engine.content_bytes(&p("huge.bin")).unwrap(),
        treeline::TOO_LONG_PLACEHOLDER
    );

    // Gated contents never compare equal, so rewrites always show up
    engine.change_content("huge.bin", &[1u8; 64]).unwrap();
    let labels = engine.labels_for(&p("huge.bin")).unwrap();
    let diff = engine.diff(labels.last().unwrap(), &labels[0]).unwrap();
    assert_eq!(diff.change_count(), 1);
}

#[test]
fn test_revert_chain_back_to_empty() {
    init_tracing();
    let mut engine = TreelineBuilder::new()
        .clock(ManualClock::new(1_000))
        .build_in_memory();

    engine.create_directory("a").unwrap();
    engine.create_file("a/f", b"1").unwrap();
    engine.rename("a/f", "g").unwrap();
    engine.delete("a").unwrap();

    while !engine.history().is_empty() {
        engine.revert().unwrap();
    }
    assert!(!engine.has_entry(&p("a")));
    assert_eq!(engine.tree().root().children().count(), 0);
}
