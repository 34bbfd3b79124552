//! Behavioural contracts of the file cache manager.

mod common;

use bankcache_core::cache::RequestStatus;
use bankcache_core::entry::EntryFlags;
use bankcache_core::manifest::{FileNode, PreloadDefinition};
use bankcache_core::{DataScope, EntryStatus};
use bankcache_events::Severity;
use common::{Harness, KIB};

fn definition(name: &str, auto_load: bool, files: &[&str]) -> PreloadDefinition {
    PreloadDefinition {
        name: name.to_string(),
        auto_load,
        files: files.iter().map(|f| FileNode::new(*f)).collect(),
    }
}

#[test]
fn budget_holds_after_every_operation() {
    let mut h = Harness::new(4);
    let ids: Vec<_> = (0..6)
        .map(|i| h.register(&format!("bank{i}.bank"), KIB + 256, DataScope::Global, i % 2 == 0))
        .collect();

    for &id in &ids {
        h.fcm.cache_entry(id, false);
        assert!(h.fcm.current_bytes() <= h.fcm.max_bytes());
        h.complete_all();
        assert!(h.fcm.current_bytes() <= h.fcm.max_bytes());
    }
    for &id in ids.iter().rev() {
        h.fcm.uncache_entry(id, false);
        assert!(h.fcm.current_bytes() <= h.fcm.max_bytes());
    }
    // Only three 1.25 KiB banks fit into 4 KiB at once.
    assert!(h.events.count(Severity::Error) > 0);
}

#[test]
fn uncache_of_not_cached_entry_is_noop_success() {
    let mut h = Harness::new(16);
    let id = h.register("ui.bank", KIB, DataScope::Global, true);
    let before = h.fcm.current_bytes();

    assert!(h.fcm.uncache_entry(id, true));
    assert!(h.fcm.uncache_entry(id, false));
    assert_eq!(h.status(id), EntryStatus::NotCached);
    assert_eq!(h.fcm.current_bytes(), before);
    assert_eq!(h.events.error_count(), 0);
}

#[test]
fn use_count_never_goes_negative() {
    let mut h = Harness::new(16);
    let id = h.register("vo.bank", KIB, DataScope::Global, false);
    h.cache_now(id);
    assert_eq!(h.use_count(id), 1);

    for _ in 0..5 {
        h.fcm.uncache_entry(id, false);
        assert_eq!(h.use_count(id), 0);
    }
    assert!(h.fcm.cache_entry(id, false));
    assert_eq!(h.use_count(id), 1);
}

#[test]
fn eviction_frees_removable_entries_for_new_load() {
    let mut h = Harness::new(150);
    let a = h.register("a.bank", 100 * KIB, DataScope::Global, false);
    let b = h.register("b.bank", 50 * KIB, DataScope::Global, true);
    h.cache_now(a);
    h.cache_now(b);
    // A keeps its payload but has no users left.
    h.fcm.uncache_entry(a, false);
    assert!(
        h.fcm
            .entry(a)
            .unwrap()
            .flags()
            .contains(EntryFlags::REMOVABLE)
    );
    assert_eq!(h.fcm.current_bytes(), 150 * KIB);

    let c = h.register("c.bank", 80 * KIB, DataScope::Global, true);
    assert!(h.fcm.cache_entry(c, false));
    h.complete_all();

    assert_eq!(h.status(a), EntryStatus::NotCached);
    assert_eq!(h.status(b), EntryStatus::Cached);
    assert_eq!(h.status(c), EntryStatus::Cached);
    assert_eq!(h.fcm.current_bytes(), 130 * KIB);
}

#[test]
fn abort_path_logs_no_error() {
    let mut h = Harness::new(16);
    let id = h.register("music.bank", 8 * KIB, DataScope::Global, true);
    assert!(h.fcm.cache_entry(id, false));
    assert_eq!(h.status(id), EntryStatus::Loading);

    assert!(h.fcm.uncache_entry(id, true));
    h.fcm.process_completions();

    let entry = h.fcm.entry(id).unwrap();
    assert_eq!(entry.status(), EntryStatus::NotCached);
    assert!(!entry.holds_block());
    assert_eq!(h.fcm.current_bytes(), 0);
    assert_eq!(h.events.error_count(), 0);
    assert_eq!(h.engine.aborted().len(), 1);
}

#[test]
fn batch_status_aggregates_entry_results() {
    let mut h = Harness::new(64);
    h.add_file("a.bank", KIB);
    h.add_file("b.bank", KIB);

    let partial = h
        .fcm
        .register_preload(
            &definition("partial", true, &["a.bank", "b.bank", "missing.bank"]),
            DataScope::Global,
        )
        .unwrap();
    let failing = h
        .fcm
        .register_preload(
            &definition("failing", true, &["gone1.bank", "gone2.bank", "gone3.bank"]),
            DataScope::Global,
        )
        .unwrap();
    h.add_file("c.bank", KIB);
    h.add_file("d.bank", KIB);
    h.add_file("e.bank", KIB);
    let full = h
        .fcm
        .register_preload(
            &definition("full", true, &["c.bank", "d.bank", "e.bank"]),
            DataScope::Global,
        )
        .unwrap();

    assert_eq!(
        h.fcm.load_request(partial, false, false),
        RequestStatus::PartialSuccess
    );
    assert_eq!(h.fcm.load_request(failing, false, false), RequestStatus::Failure);
    assert_eq!(h.fcm.load_request(full, false, false), RequestStatus::Success);
}

#[test]
fn unload_by_scope_isolates_scopes() {
    let mut h = Harness::new(64);
    let global = h.register("global.bank", KIB, DataScope::Global, true);
    let level = h.register("level.bank", KIB, DataScope::LevelSpecific, true);
    h.cache_now(global);
    h.cache_now(level);

    assert_eq!(
        h.fcm.unload_by_scope(DataScope::LevelSpecific),
        RequestStatus::Success
    );
    assert!(h.fcm.entry(level).is_none());
    assert_eq!(h.status(global), EntryStatus::Cached);

    let level = h.register("level2.bank", KIB, DataScope::LevelSpecific, true);
    h.fcm.unload_by_scope(DataScope::Global);
    assert!(h.fcm.entry(global).is_none());
    assert!(h.fcm.entry(level).is_some());
}

#[test]
fn localized_refresh_restores_use_count() {
    let mut h = Harness::new(64);
    h.engine.set_auto_complete(true);
    h.add_localized_file("english", "vo_intro.bank", 2 * KIB);
    h.add_localized_file("german", "vo_intro.bank", 3 * KIB);
    let id = h
        .fcm
        .register(
            &FileNode::new("vo_intro.bank").localized(),
            DataScope::Global,
            false,
        )
        .unwrap();
    for _ in 0..3 {
        assert!(h.fcm.cache_entry(id, false));
        h.fcm.process_completions();
    }
    assert_eq!(h.use_count(id), 3);

    h.fcm.backend_mut().set_language("german");
    h.fcm.update_localized_entries(true);

    let entry = h.fcm.entry(id).unwrap();
    assert_eq!(entry.status(), EntryStatus::Cached);
    assert_eq!(entry.use_count(), 3);
    assert_eq!(entry.size(), 3 * KIB);
    assert_eq!(h.fcm.current_bytes(), 3 * KIB);
}

#[test]
fn localized_refresh_of_loading_entry_keeps_loading() {
    let mut h = Harness::new(64);
    h.add_localized_file("english", "vo.bank", KIB);
    h.add_localized_file("german", "vo.bank", KIB);
    let id = h
        .fcm
        .register(&FileNode::new("vo.bank").localized(), DataScope::Global, false)
        .unwrap();
    h.fcm.cache_entry(id, false);
    h.fcm.cache_entry(id, false);
    h.fcm.cache_entry(id, false);

    h.fcm.backend_mut().set_language("german");
    h.fcm.update_localized_entries(false);
    assert_eq!(h.status(id), EntryStatus::Loading);
    assert_eq!(h.use_count(id), 3);
}
