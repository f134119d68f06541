//! Property-based checks of shard routing and merged search.

use std::collections::BTreeMap;
use std::sync::Arc;

use multisearch::{
    EmbeddingModel, Granularity, HashingEmbedder, RegistryError, ShardId, ShardRegistry,
};
use proptest::prelude::*;

const TEXTS: [&str; 5] = [
    "Good my lord.",
    "To be, or not to be. That is the question!",
    "I humbly thank you; well, well, well.",
    "Where is Polonius?",
    "Words, words, words",
];

const SHARDS: [&str; 4] = ["", "Hamlet", "Ophelia", "King"];

#[derive(Clone, Debug)]
enum Op {
    Add { text: usize, shard: usize },
    Remove { text: usize, shard: Option<usize> },
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..TEXTS.len(), 0..SHARDS.len()).prop_map(|(text, shard)| Op::Add { text, shard }),
        1 => (0..TEXTS.len(), prop::option::of(0..SHARDS.len()))
            .prop_map(|(text, shard)| Op::Remove { text, shard }),
    ]
}

fn arb_granularity() -> impl Strategy<Value = Granularity> {
    prop_oneof![Just(Granularity::Phrase), Just(Granularity::Sentence)]
}

type Expected = BTreeMap<ShardId, Vec<&'static str>>;

/// Replays `ops` on a fresh registry and on a plain map of phrase lists,
/// checking every removal count against the map.
fn replay(ops: &[Op]) -> Result<(ShardRegistry, Expected), TestCaseError> {
    let model: Arc<dyn EmbeddingModel> =
        Arc::new(HashingEmbedder::new(64, 17).expect("valid model"));
    let mut registry: ShardRegistry = ShardRegistry::with_defaults(model);
    let mut expected = Expected::new();

    for op in ops {
        match *op {
            Op::Add { text, shard } => {
                let id = ShardId::from(SHARDS[shard]);
                registry.add(TEXTS[text], id.clone()).expect("add phrase");
                expected.entry(id).or_default().push(TEXTS[text]);
            }
            Op::Remove { text, shard: None } => {
                let mut want = 0;
                for phrases in expected.values_mut() {
                    let before = phrases.len();
                    phrases.retain(|phrase| *phrase != TEXTS[text]);
                    want += before - phrases.len();
                }
                prop_assert_eq!(registry.remove(TEXTS[text], None).expect("wildcard"), want);
            }
            Op::Remove { text, shard: Some(shard) } => {
                let id = ShardId::from(SHARDS[shard]);
                match expected.get_mut(&id) {
                    Some(phrases) => {
                        let before = phrases.len();
                        phrases.retain(|phrase| *phrase != TEXTS[text]);
                        let removed = registry.remove(TEXTS[text], Some(&id)).expect("known shard");
                        prop_assert_eq!(removed, before - phrases.len());
                    }
                    None => {
                        prop_assert!(matches!(
                            registry.remove(TEXTS[text], Some(&id)),
                            Err(RegistryError::ShardNotFound(_))
                        ));
                    }
                }
            }
        }
    }
    Ok((registry, expected))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn wildcard_counts_are_sums_over_shards(ops in prop::collection::vec(arb_op(), 0..24)) {
        let (registry, expected) = replay(&ops)?;

        prop_assert_eq!(registry.len(), expected.len());
        let mut phrases = 0;
        let mut sentences = 0;
        for id in registry.shard_ids() {
            let in_shard = registry.num_phrases(Some(id)).expect("registered");
            prop_assert_eq!(in_shard, expected[id].len());
            phrases += in_shard;
            sentences += registry.num_sentences(Some(id)).expect("registered");
        }
        prop_assert_eq!(registry.num_phrases(None).expect("wildcard"), phrases);
        prop_assert_eq!(registry.num_sentences(None).expect("wildcard"), sentences);
        prop_assert_eq!(registry.get_phrases(None).expect("wildcard").len(), phrases);
        prop_assert_eq!(registry.get_sentences(None).expect("wildcard").len(), sentences);
    }

    #[test]
    fn merged_results_are_sorted_and_bounded(
        ops in prop::collection::vec(arb_op(), 1..24),
        query in 0..TEXTS.len(),
        k in prop::option::of(0usize..20),
        granularity in arb_granularity(),
    ) {
        let (registry, _) = replay(&ops)?;
        let total = match granularity {
            Granularity::Phrase => registry.num_phrases(None),
            Granularity::Sentence => registry.num_sentences(None),
        }
        .expect("wildcard");

        let results = registry
            .search(TEXTS[query], k, None, granularity)
            .expect("search");
        prop_assert_eq!(results.len(), k.map_or(total, |k| k.min(total)));
        prop_assert_eq!(results.texts.len(), results.distances.len());
        prop_assert!(results.distances.windows(2).all(|pair| pair[0] <= pair[1]));
        prop_assert!(results.distances.iter().all(|distance| *distance >= 0.0));
    }
}
