use std::sync::Arc;

use approx::assert_abs_diff_eq;
use multisearch::{
    EmbeddingModel, FanOut, Granularity, HashingEmbedder, SearchRequest, ShardId, ShardRegistry,
};
use rstest::{fixture, rstest};

const HAMLET_0: &str =
    "To be, or not to be, that is the question. Whether tis nobler in the mind to suffer.";
const HAMLET_1: &str =
    "Or to take arms against a sea of troubles, and by opposing end them? To die, to sleep.";
const THANKS: &str = "I humbly thank you; well, well, well.";

#[fixture]
fn dialogue() -> ShardRegistry {
    let model: Arc<dyn EmbeddingModel> =
        Arc::new(HashingEmbedder::new(256, 2024).expect("valid model"));
    let mut registry = ShardRegistry::with_defaults(model);
    for (text, speaker) in [
        (HAMLET_0, "Hamlet"),
        (HAMLET_1, "Hamlet"),
        (THANKS, "Hamlet"),
        ("Good my lord.", "Ophelia"),
        ("How does your honour for this many a day?", "Ophelia"),
        (THANKS, "King"),
        (HAMLET_0, "Ophelia"),
    ] {
        registry.add(text, speaker).expect("add phrase");
    }
    registry
}

#[rstest]
fn exact_copies_in_two_shards_both_rank_first(dialogue: ShardRegistry) {
    let results = dialogue.search_phrases(HAMLET_0, Some(2), None).unwrap();
    assert_eq!(results.texts, vec![HAMLET_0, HAMLET_0]);
    assert_abs_diff_eq!(results.distances[0], results.distances[1], epsilon = 1e-6);
    assert_abs_diff_eq!(results.distances[0], 0.0, epsilon = 1e-3);
}

#[rstest]
fn restricted_search_stays_inside_the_shard(dialogue: ShardRegistry) {
    let hamlet = ShardId::from("Hamlet");
    let results = dialogue.search_phrases(HAMLET_0, Some(2), Some(&hamlet)).unwrap();
    assert_eq!(results.texts[0], HAMLET_0);
    assert_ne!(results.texts[1], HAMLET_0);

    let ophelia = ShardId::from("Ophelia");
    let results = dialogue.search_phrases(HAMLET_1, Some(1), Some(&ophelia)).unwrap();
    assert_ne!(results.texts[0], HAMLET_1);
}

#[rstest]
#[case(Some(1), 1)]
#[case(Some(4), 4)]
#[case(Some(100), 7)]
#[case(None, 7)]
fn merged_phrases_are_sorted_and_bounded(
    dialogue: ShardRegistry,
    #[case] k: Option<usize>,
    #[case] expected: usize,
) {
    let results = dialogue.search_phrases("well, well", k, None).unwrap();
    assert_eq!(results.len(), expected);
    assert_eq!(results.texts.len(), results.distances.len());
    assert!(results.distances.windows(2).all(|pair| pair[0] <= pair[1]));
    assert!(results.distances.iter().all(|distance| *distance >= 0.0));
}

#[rstest]
fn merged_sentences_cover_every_shard(dialogue: ShardRegistry) {
    let results = dialogue.search_sentences("to sleep", None, None).unwrap();
    assert_eq!(results.len(), dialogue.num_sentences(None).unwrap());
    assert!(results.distances.windows(2).all(|pair| pair[0] <= pair[1]));
}

#[rstest]
#[case("Hamlet", Granularity::Phrase)]
#[case("Ophelia", Granularity::Phrase)]
#[case("King", Granularity::Sentence)]
#[case("Hamlet", Granularity::Sentence)]
fn direct_and_forced_fan_out_agree(
    dialogue: ShardRegistry,
    #[case] shard: &str,
    #[case] granularity: Granularity,
) {
    let base = SearchRequest::new(Some(3))
        .in_shard(shard)
        .granularity(granularity);
    let direct = dialogue.search_with(THANKS, &base).unwrap();
    let fanned = dialogue
        .search_with(THANKS, &base.clone().fan_out(FanOut::Always))
        .unwrap();
    assert_eq!(direct.texts.first(), fanned.texts.first());
    assert_eq!(direct, fanned);
}

#[rstest]
fn repeated_searches_are_deterministic(dialogue: ShardRegistry) {
    let first = dialogue.search_phrases(THANKS, None, None).unwrap();
    for _ in 0..8 {
        assert_eq!(dialogue.search_phrases(THANKS, None, None).unwrap(), first);
    }
}

#[test]
fn searching_an_empty_registry_is_not_an_error() {
    let model: Arc<dyn EmbeddingModel> = Arc::new(HashingEmbedder::new(16, 1).unwrap());
    let registry: ShardRegistry = ShardRegistry::with_defaults(model);
    assert!(registry.search_sentences("anything", None, None).unwrap().is_empty());
}
