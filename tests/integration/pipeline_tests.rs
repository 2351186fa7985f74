//! End-to-end pipeline tests: compare, export, paginate through the workspace

use crate::common::TestFixture;
use keydiff::compare::{Category, JobState};
use keydiff::config::{CategoryCaps, CompareConfig};
use keydiff::store::ResultStore;

#[test]
fn test_full_pipeline_scenario() {
    let fixture = TestFixture::new().unwrap();
    let a = fixture.dataset("a.csv", "k,payload\n1,x\n2,y\n").unwrap();
    let b = fixture.dataset("b.csv", "k,payload\n2,y\n3,z\n").unwrap();

    let runner = fixture.workspace.runner().unwrap();
    let handle = runner
        .spawn_headless(a, b, CompareConfig::new(vec!["k".to_string()]))
        .unwrap();
    let outcome = handle.join().unwrap();

    assert_eq!(outcome.key_counts.matched, 1);
    assert_eq!(outcome.key_counts.only_a, 1);
    assert_eq!(outcome.key_counts.only_b, 1);

    let store = fixture.workspace.store().unwrap();
    let summary = store.get_summary(handle.id()).unwrap();
    assert_eq!(summary.state, JobState::Done);

    let matched = store.get_page(handle.id(), Category::Matched, 0, 10).unwrap();
    assert_eq!(matched, vec![vec!["2".to_string(), "y".to_string()]]);
    let only_b = store.get_page(handle.id(), Category::OnlyB, 0, 10).unwrap();
    assert_eq!(only_b, vec![vec!["3".to_string(), "z".to_string()]]);
}

#[test]
fn test_rerun_produces_identical_counts() {
    let fixture = TestFixture::new().unwrap();
    let a = fixture.numbered_csv("a.csv", 500, 0).unwrap();
    let b = fixture.numbered_csv("b.csv", 500, 250).unwrap();
    let runner = fixture.workspace.runner().unwrap();

    let first = runner
        .spawn_headless(a.clone(), b.clone(), CompareConfig::new(vec!["k".to_string()]))
        .unwrap()
        .join()
        .unwrap();
    let second = runner
        .spawn_headless(a, b, CompareConfig::new(vec!["k".to_string()]))
        .unwrap()
        .join()
        .unwrap();

    assert_eq!(first.key_counts.matched, second.key_counts.matched);
    assert_eq!(first.key_counts.only_a, second.key_counts.only_a);
    assert_eq!(first.key_counts.only_b, second.key_counts.only_b);
    assert_eq!(first.export.matched_rows, second.export.matched_rows);
    assert_eq!(first.export.only_a_rows, second.export.only_a_rows);
    assert_eq!(first.export.only_b_rows, second.export.only_b_rows);
}

#[test]
fn test_chunk_size_does_not_change_results() {
    let fixture = TestFixture::new().unwrap();
    let a = fixture.numbered_csv("a.csv", 230, 0).unwrap();
    let b = fixture.numbered_csv("b.csv", 230, 100).unwrap();
    let runner = fixture.workspace.runner().unwrap();

    let mut outcomes = Vec::new();
    for chunk_size in [1usize, 10, 1000] {
        let mut config = CompareConfig::new(vec!["k".to_string()]);
        config.chunk_size = Some(chunk_size);
        let outcome = runner
            .spawn_headless(a.clone(), b.clone(), config)
            .unwrap()
            .join()
            .unwrap();
        outcomes.push((
            outcome.key_counts.matched,
            outcome.key_counts.only_a,
            outcome.key_counts.only_b,
        ));
    }
    assert_eq!(outcomes[0], outcomes[1]);
    assert_eq!(outcomes[1], outcomes[2]);
    assert_eq!(outcomes[0], (130, 100, 100));
}

#[test]
fn test_category_cap_with_large_match_set() {
    let fixture = TestFixture::new().unwrap();
    let a = fixture.numbered_csv("a.csv", 10_000, 0).unwrap();
    let b = fixture.numbered_csv("b.csv", 10_000, 0).unwrap();
    let runner = fixture.workspace.runner().unwrap();

    let mut config = CompareConfig::new(vec!["k".to_string()]);
    config.export.caps = CategoryCaps {
        matched: Some(100),
        ..Default::default()
    };
    let handle = runner.spawn_headless(a, b, config).unwrap();
    let outcome = handle.join().unwrap();

    // 10,000 true matches, exactly 100 exported, first 100 in scan order
    assert_eq!(outcome.key_counts.matched, 10_000);
    assert_eq!(outcome.export.matched_rows, 100);

    let store = fixture.workspace.store().unwrap();
    let page = store.get_page(handle.id(), Category::Matched, 0, 200).unwrap();
    assert_eq!(page.len(), 100);
    assert_eq!(page[0][0], "0");
    assert_eq!(page[99][0], "99");
}

#[test]
fn test_pagination_round_trip_across_segments() {
    let fixture = TestFixture::new().unwrap();
    let a = fixture.numbered_csv("a.csv", 1_000, 0).unwrap();
    let b = fixture.numbered_csv("b.csv", 10, 5_000).unwrap();
    let runner = fixture.workspace.runner().unwrap();

    let mut config = CompareConfig::new(vec!["k".to_string()]);
    config.export.segment_rows = 64;
    let handle = runner.spawn_headless(a, b, config).unwrap();
    let outcome = handle.join().unwrap();
    assert_eq!(outcome.export.only_a_rows, 1_000);

    let store = fixture.workspace.store().unwrap();
    for page_size in [33usize, 64, 250] {
        let mut seen = std::collections::HashSet::new();
        let mut offset = 0u64;
        loop {
            let page = store
                .get_page(handle.id(), Category::OnlyA, offset, page_size)
                .unwrap();
            if page.is_empty() {
                break;
            }
            offset += page.len() as u64;
            for row in page {
                assert!(seen.insert(row[0].clone()), "duplicate row in pages");
            }
        }
        assert_eq!(seen.len(), 1_000, "page size {}", page_size);
    }
}

#[test]
fn test_cleanup_removes_segments_and_metadata() {
    let fixture = TestFixture::new().unwrap();
    let a = fixture.numbered_csv("a.csv", 100, 0).unwrap();
    let b = fixture.numbered_csv("b.csv", 100, 50).unwrap();
    let runner = fixture.workspace.runner().unwrap();

    let handle = runner
        .spawn_headless(a, b, CompareConfig::new(vec!["k".to_string()]))
        .unwrap();
    handle.join().unwrap();

    assert_eq!(fixture.workspace.list_jobs().unwrap().len(), 1);
    let stats = fixture.workspace.stats().unwrap();
    assert!(stats.segment_count > 0);

    let cleanup = fixture.workspace.cleanup(0).unwrap();
    assert_eq!(cleanup.jobs_removed, 1);
    assert!(fixture.workspace.list_jobs().unwrap().is_empty());
}

#[test]
fn test_job_summary_while_polling() {
    let fixture = TestFixture::new().unwrap();
    let a = fixture.numbered_csv("a.csv", 2_000, 0).unwrap();
    let b = fixture.numbered_csv("b.csv", 2_000, 1_000).unwrap();
    let runner = fixture.workspace.runner().unwrap();

    let handle = runner
        .spawn_headless(a, b, CompareConfig::new(vec!["k".to_string()]))
        .unwrap();

    // Polling is valid at any time; terminal summary must be Done
    let _ = handle.summary().unwrap();
    handle.join().unwrap();
    let summary = handle.summary().unwrap();
    assert_eq!(summary.state, JobState::Done);
    assert_eq!(summary.key_counts.unwrap().matched, 1_000);
}
