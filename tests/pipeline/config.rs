//! Configuration loading through the facade

use crate::common::*;
use ragline::RaglineError;

#[test]
fn test_open_creates_template_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ragline.toml");

    Ragline::open(dir.path()).unwrap();
    let written = std::fs::read_to_string(&path).unwrap();
    assert!(written.contains("[fusion]"));

    std::fs::write(&path, "[adaptive]\ninitial_k = 3\nmax_k = 9\n").unwrap();
    let rag = Ragline::open(dir.path()).unwrap();
    assert_eq!(rag.config().adaptive.initial_k, 3);
    assert_eq!(rag.config().adaptive.max_k, 9);
    assert_eq!(rag.config().fusion.smoothing_constant, 60);
}

#[test]
fn test_open_rejects_bad_weights() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("ragline.toml"),
        "[fusion]\nbackend_weights = { lexical = 0.7, vector = 0.7 }\n",
    )
    .unwrap();
    let err = Ragline::open(dir.path()).err().unwrap();
    assert!(matches!(err, RaglineError::Configuration(_)));
}
