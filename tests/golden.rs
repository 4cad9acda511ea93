use std::path::Path;
use std::time::Duration;

use parable::runner::{
    find_test_files, format_failure, parse_test_file, render, run_files, RunOptions,
};
use parable::{parse, Node};

fn corpus_dir() -> &'static Path {
    Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/parser"))
}

#[test]
fn corpus_files_are_discovered_in_order() {
    let files = find_test_files(corpus_dir()).expect("corpus directory should be searchable");
    assert!(files.len() >= 6);
    let mut sorted = files.clone();
    sorted.sort();
    assert_eq!(files, sorted);
    for file in &files {
        let content = std::fs::read_to_string(file).unwrap();
        assert!(
            !parse_test_file(&content, file).is_empty(),
            "{} has no cases",
            file.display()
        );
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn corpus_passes() {
    let files = find_test_files(corpus_dir()).unwrap();
    let options = RunOptions {
        filter: None,
        timeout: Duration::from_secs(10),
    };
    let report = run_files(&files, &options).await;
    let failures: Vec<String> = report.failures().map(format_failure).collect();
    assert!(failures.is_empty(), "{}\n{}", failures.join(""), report.summary());
    assert!(report.passed > 40);
}

#[tokio::test(flavor = "multi_thread")]
async fn filter_selects_matching_cases() {
    let files = find_test_files(corpus_dir()).unwrap();
    let options = RunOptions {
        filter: Some("heredoc".to_string()),
        timeout: Duration::from_secs(10),
    };
    let report = run_files(&files, &options).await;
    assert_eq!(report.passed, 2);
    assert!(report.results.iter().all(|r| r.name.contains("heredoc")));
}

#[test]
fn empty_source_is_a_single_empty_node() {
    assert_eq!(parse("", false).unwrap(), vec![Node::Empty]);
    assert_eq!(parse("  \n\t", false).unwrap(), vec![Node::Empty]);
}

#[test]
fn parse_error_reports_position() {
    let err = parse("echo \"unterminated", false).unwrap_err();
    assert!(err.is_matched_pair());
    assert_eq!(err.pos, 5);
    assert_eq!(err.to_string(), "Parse error at line 1, position 5: Unterminated double quote");

    let err = parse("echo ${x", false).unwrap_err();
    assert!(err.is_matched_pair());

    let err = parse("echo ok\necho $(date", false).unwrap_err();
    assert!(err.is_matched_pair());
    assert_eq!((err.line, err.pos), (2, 13));
}

#[test]
fn rendering_is_stable_across_parses() {
    let files = find_test_files(corpus_dir()).unwrap();
    for file in &files {
        let content = std::fs::read_to_string(file).unwrap();
        for case in parse_test_file(&content, file) {
            let (source, extglob) = case.source();
            assert_eq!(render(source, extglob), render(source, extglob), "{}", case.name);
        }
    }
}
