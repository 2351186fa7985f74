//! Discovery search over realistic wide datasets

use crate::common::TestFixture;
use keydiff::config::DiscoveryConfig;
use keydiff::discovery::CandidateGenerator;
use keydiff::evaluate::UniquenessEvaluator;
use keydiff::profile::ColumnProfiler;
use std::fmt::Write as _;

/// Wide dataset where (region, seq) is the only unique pair among
/// `columns` mostly-constant columns
fn wide_csv(fixture: &TestFixture, columns: usize, rows: usize) -> keydiff::dataset::Dataset {
    let mut content = String::new();
    content.push_str("region,seq");
    for c in 2..columns {
        write!(content, ",attr{}", c).unwrap();
    }
    content.push('\n');
    for r in 0..rows {
        write!(content, "{},{}", r / 50, r % 50).unwrap();
        for c in 2..columns {
            write!(content, ",v{}", c % 3).unwrap();
        }
        content.push('\n');
    }
    fixture.dataset("wide.csv", &content).unwrap()
}

#[test]
fn test_discovery_finds_composite_key_in_wide_dataset() {
    let fixture = TestFixture::new().unwrap();
    let dataset = wide_csv(&fixture, 80, 500);

    let profile = ColumnProfiler::new(100_000).profile(&dataset).unwrap();
    let config = DiscoveryConfig {
        target_size: 2,
        ..Default::default()
    };
    let generator = CandidateGenerator::new(config, UniquenessEvaluator::new(10_000)).unwrap();
    let found = generator.discover(&dataset, &profile).unwrap();

    assert!(found.search_ran);
    let best = &found.candidates[0];
    assert!(best.is_unique_key, "expected a verified unique key");
    let mut columns = best.columns.clone();
    columns.sort();
    assert_eq!(columns, vec!["region", "seq"]);
    // finalists are verified against the full dataset
    assert!(!best.sampled);
}

#[test]
fn test_evaluation_ceiling_far_below_exhaustive() {
    let fixture = TestFixture::new().unwrap();
    let dataset = wide_csv(&fixture, 300, 100);

    let profile = ColumnProfiler::new(100_000).profile(&dataset).unwrap();
    let budget = 2_000;
    let config = DiscoveryConfig {
        target_size: 5,
        eval_budget: budget,
        ..Default::default()
    };
    let generator = CandidateGenerator::new(config, UniquenessEvaluator::new(10_000)).unwrap();
    let found = generator.discover(&dataset, &profile).unwrap();

    // C(300, 5) is ~2e10; the search must stay within its configured budget
    assert!(found.evaluations <= budget + keydiff::DEFAULT_VERIFY_TOP);
}

#[test]
fn test_must_include_combination_always_reported() {
    let fixture = TestFixture::new().unwrap();
    let dataset = wide_csv(&fixture, 60, 200);

    let profile = ColumnProfiler::new(100_000).profile(&dataset).unwrap();
    let config = DiscoveryConfig {
        target_size: 2,
        include: vec![vec!["attr2".to_string(), "attr3".to_string()]],
        ..Default::default()
    };
    let generator = CandidateGenerator::new(config, UniquenessEvaluator::new(10_000)).unwrap();
    let found = generator.discover(&dataset, &profile).unwrap();

    let requested = found.candidates.iter().any(|c| {
        let mut columns = c.columns.clone();
        columns.sort();
        columns == vec!["attr2", "attr3"]
    });
    assert!(requested, "explicitly requested combination missing");
}

#[test]
fn test_sample_bias_removed_by_full_verification() {
    let fixture = TestFixture::new().unwrap();
    // unique within the first 100 rows, heavily duplicated afterwards
    let mut content = String::from("code\n");
    for i in 0..100 {
        content.push_str(&format!("{}\n", i));
    }
    for _ in 0..400 {
        content.push_str("dup\n");
    }
    let dataset = fixture.dataset("biased.csv", &content).unwrap();

    let profile = ColumnProfiler::new(100_000).profile(&dataset).unwrap();
    let config = DiscoveryConfig {
        target_size: 1,
        trigger_threshold: 1,
        sample_size: 100,
        ..Default::default()
    };
    let generator = CandidateGenerator::new(config, UniquenessEvaluator::new(10_000)).unwrap();
    let found = generator.discover(&dataset, &profile).unwrap();

    let code = &found.candidates[0];
    assert!(!code.sampled);
    assert_eq!(code.total_rows, 500);
    assert!(!code.is_unique_key, "full verification must expose duplicates");
}
