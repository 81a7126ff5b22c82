//! Property tests for rank fusion

use proptest::prelude::*;
use ragline_core::{Record, SearchResult};
use ragline_intelligence::{weighted_rrf_fuse, Fuser, RrfFuser};
use std::collections::{BTreeMap, HashSet};

fn list(ids: &[u8]) -> Vec<SearchResult> {
    let mut seen = HashSet::new();
    ids.iter()
        .filter(|id| seen.insert(**id))
        .enumerate()
        .map(|(i, id)| {
            SearchResult::from_record(&Record::new(format!("d{:03}", id), "x"), 1.0 / (i as f32 + 1.0))
        })
        .collect()
}

proptest! {
    #[test]
    fn fused_ids_unique_sorted_and_bounded(
        lexical in prop::collection::vec(0u8..40, 0..20),
        vector in prop::collection::vec(0u8..40, 0..20),
        top_k in 0usize..25,
    ) {
        let fused = RrfFuser::default().fuse(
            vec![("lexical".into(), list(&lexical)), ("vector".into(), list(&vector))],
            top_k,
        );
        prop_assert!(fused.results.len() <= top_k);

        let ids: HashSet<&str> = fused.results.iter().map(|r| r.id.as_str()).collect();
        prop_assert_eq!(ids.len(), fused.results.len());

        for pair in fused.results.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            prop_assert!(
                a.fused_score > b.fused_score
                    || (a.fused_score == b.fused_score && a.id < b.id)
            );
        }
        for r in &fused.results {
            prop_assert!(r.fused_score <= 1.0 / 61.0 + 1e-6);
            prop_assert!(r.backend_count() >= 1);
        }
    }

    #[test]
    fn weights_outside_tolerance_rejected(lexical in 0.0f32..1.0, drift in 0.02f32..0.5) {
        let weights = BTreeMap::from([
            ("lexical".to_string(), lexical),
            ("vector".to_string(), 1.0 - lexical + drift),
        ]);
        prop_assert!(RrfFuser::new(60, weights).is_err());
    }

    #[test]
    fn weights_within_tolerance_accepted(lexical in 0.0f32..1.0, drift in -0.009f32..0.009) {
        let vector = (1.0 - lexical + drift).max(0.0);
        let weights = BTreeMap::from([
            ("lexical".to_string(), lexical),
            ("vector".to_string(), vector),
        ]);
        let sum = lexical + vector;
        prop_assume!((sum - 1.0).abs() <= 0.0095);
        prop_assert!(RrfFuser::new(60, weights).is_ok());
    }

    #[test]
    fn n_way_matches_named_fusion(
        a in prop::collection::vec(0u8..30, 0..15),
        b in prop::collection::vec(0u8..30, 0..15),
    ) {
        let named = RrfFuser::default().fuse(
            vec![("lexical".into(), list(&a)), ("vector".into(), list(&b))],
            50,
        );
        let weighted = weighted_rrf_fuse(vec![(list(&a), 0.6), (list(&b), 0.4)], 60, 50).unwrap();
        let named_ids: Vec<&str> = named.results.iter().map(|r| r.id.as_str()).collect();
        let weighted_ids: Vec<&str> = weighted.results.iter().map(|r| r.id.as_str()).collect();
        prop_assert_eq!(named_ids, weighted_ids);
    }
}
