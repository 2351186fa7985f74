//! Edge cases around dataset formats, encodings, and degenerate inputs

use crate::common::TestFixture;
use keydiff::compare::{ComparisonEngine, JobContext};
use keydiff::config::CompareConfig;
use keydiff::dataset::{Dataset, Delimiter};
use keydiff::error::{DatasetSide, KeydiffError};
use keydiff::evaluate::UniquenessEvaluator;

fn engine(keys: &[&str]) -> ComparisonEngine {
    ComparisonEngine::new(CompareConfig::new(keys.iter().map(|s| s.to_string()).collect()))
        .unwrap()
}

#[test]
fn test_pipe_tab_semicolon_space_delimiters() {
    let fixture = TestFixture::new().unwrap();
    let cases = [
        ("pipe.txt", '|', Delimiter::Pipe),
        ("tab.txt", '\t', Delimiter::Tab),
        ("semi.txt", ';', Delimiter::Semicolon),
        ("space.txt", ' ', Delimiter::Space),
    ];
    for (name, sep, delimiter) in cases {
        let path = fixture
            .create_csv(
                name,
                sep,
                &[vec!["k", "v"], vec!["1", "x"], vec!["2", "y"]],
            )
            .unwrap();
        let dataset = Dataset::open(&path, Some(delimiter)).unwrap();
        assert_eq!(dataset.columns, vec!["k", "v"], "{name}");

        let key = UniquenessEvaluator::new(10)
            .evaluate(&dataset, DatasetSide::A, &["k".to_string()], None)
            .unwrap();
        assert_eq!(key.total_rows, 2, "{name}");
        assert!(key.is_unique_key, "{name}");
    }
}

#[test]
fn test_descriptor_delimiter_reused_not_redetected() {
    let fixture = TestFixture::new().unwrap();
    // commas inside fields would fool per-phase re-detection
    let path = fixture
        .create_raw("tricky.psv", "k|note\n1|a,b,c\n2|d,e,f\n")
        .unwrap();
    let dataset = Dataset::open(&path, Some(Delimiter::Pipe)).unwrap();

    let key = UniquenessEvaluator::new(10)
        .evaluate(&dataset, DatasetSide::A, &["note".to_string()], None)
        .unwrap();
    assert_eq!(key.distinct_count, 2);
}

#[test]
fn test_latin1_encoded_fields_decode() {
    let fixture = TestFixture::new().unwrap();
    // "café" and "naïve" in latin-1 bytes
    let bytes: Vec<u8> = [
        b"k,name\n".to_vec(),
        b"1,caf\xe9\n".to_vec(),
        b"2,na\xefve\n".to_vec(),
    ]
    .concat();
    let path = fixture.root().join("latin1.csv");
    std::fs::write(&path, bytes).unwrap();

    let dataset = Dataset::open(&path, Some(Delimiter::Comma))
        .unwrap()
        .with_encoding("windows-1252");
    let mut reader = dataset.chunks(10).unwrap();
    let chunk = reader.next_chunk().unwrap().unwrap();
    assert_eq!(chunk.rows[0][1], "café");
    assert_eq!(chunk.rows[1][1], "naïve");
}

#[test]
fn test_both_datasets_empty() {
    let fixture = TestFixture::new().unwrap();
    let a = fixture.dataset("a.csv", "k\n").unwrap();
    let b = fixture.dataset("b.csv", "k\n").unwrap();

    let result = engine(&["k"]).run(&a, &b, &JobContext::headless()).unwrap();
    assert!(result.matched.is_empty());
    assert!(result.only_a.is_empty());
    assert!(result.only_b.is_empty());
}

#[test]
fn test_missing_source_file_is_immediate_fatal() {
    let fixture = TestFixture::new().unwrap();
    let a = fixture.dataset("a.csv", "k\n1\n").unwrap();
    let mut b = a.clone();
    b.path = fixture.root().join("vanished.csv");

    let err = engine(&["k"]).run(&a, &b, &JobContext::headless()).unwrap_err();
    match err {
        KeydiffError::SourceNotFound { path } => {
            assert!(path.ends_with("vanished.csv"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_malformed_rows_counted_but_comparison_succeeds() {
    let fixture = TestFixture::new().unwrap();
    let a = fixture
        .dataset("a.csv", "k,v\n1,x\nbroken\n2,y\n3,z,extra,fields\n")
        .unwrap();
    let b = fixture.dataset("b.csv", "k,v\n2,y\n").unwrap();

    let result = engine(&["k"]).run(&a, &b, &JobContext::headless()).unwrap();
    assert_eq!(result.malformed_a, 2);
    assert_eq!(result.rows_a, 2);
    assert_eq!(result.matched.len(), 1);
    assert_eq!(result.only_a.len(), 1);
}

#[test]
fn test_schema_checks_are_per_side() {
    let fixture = TestFixture::new().unwrap();
    // column exists in B but not in A: error must blame A
    let a = fixture.dataset("a.csv", "other\n1\n").unwrap();
    let b = fixture.dataset("b.csv", "k\n1\n").unwrap();

    let err = engine(&["k"]).run(&a, &b, &JobContext::headless()).unwrap_err();
    match err {
        KeydiffError::Schema { side, .. } => assert_eq!(side, DatasetSide::A),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_quoted_fields_with_embedded_delimiters() {
    let fixture = TestFixture::new().unwrap();
    let a = fixture
        .dataset("a.csv", "k,v\n\"x,y\",1\n\"z\",2\n")
        .unwrap();
    let key = UniquenessEvaluator::new(10)
        .evaluate(&a, DatasetSide::A, &["k".to_string()], None)
        .unwrap();
    assert_eq!(key.total_rows, 2);
    assert_eq!(key.distinct_count, 2);
}

#[test]
fn test_uniqueness_score_bounds_property() {
    let fixture = TestFixture::new().unwrap();
    let mut content = String::from("k,v\n");
    for i in 0..97 {
        content.push_str(&format!("{},{}\n", i % 13, i % 7));
    }
    let dataset = fixture.dataset("t.csv", &content).unwrap();
    let evaluator = UniquenessEvaluator::new(10);

    for combo in [vec!["k"], vec!["v"], vec!["k", "v"]] {
        let columns: Vec<String> = combo.iter().map(|s| s.to_string()).collect();
        let key = evaluator
            .evaluate(&dataset, DatasetSide::A, &columns, None)
            .unwrap();
        assert!(key.uniqueness_score >= 0.0 && key.uniqueness_score <= 100.0);
        assert_eq!(
            key.uniqueness_score == 100.0,
            key.distinct_count == key.total_rows && key.total_rows > 0
        );
        assert_eq!(
            key.total_rows,
            key.distinct_count + key.duplicate_count
        );
    }
}
