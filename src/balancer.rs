//! Category balancing applied to the ranked retrieval list.

use crate::catalog::TestType;
use crate::intent::Intent;
use crate::retriever::RetrievedItem;

/// Knowledge & skills items placed first.
pub const KNOWLEDGE_QUOTA: usize = 5;
/// Personality items, only when the query asks for behavioral skills.
pub const PERSONALITY_QUOTA: usize = 3;
/// Simulation items.
pub const SIMULATION_QUOTA: usize = 2;

/// Reorders `results` into fixed category quotas and backfills the rest in rank order.
///
/// Output order: up to 5 `K`, up to 3 `P` (only if `intent` has behavioral skills), up to
/// 2 `S`, then every untaken item in original order, truncated to `max_results`. Without
/// behavioral skills the backfill places `P` items after all other items.
pub fn balance_results(
    results: Vec<RetrievedItem>,
    intent: &Intent,
    max_results: usize,
) -> Vec<RetrievedItem> {
    let mut quotas = vec![(TestType::K, KNOWLEDGE_QUOTA)];
    if intent.has_behavioral() {
        quotas.push((TestType::P, PERSONALITY_QUOTA));
    }
    quotas.push((TestType::S, SIMULATION_QUOTA));

    let mut order: Vec<usize> = Vec::with_capacity(results.len());
    let mut taken = vec![false; results.len()];
    for (test_type, quota) in quotas {
        let picks: Vec<usize> = results
            .iter()
            .enumerate()
            .filter(|(_, item)| item.test_type() == test_type)
            .map(|(idx, _)| idx)
            .take(quota)
            .collect();
        for idx in picks {
            taken[idx] = true;
            order.push(idx);
        }
    }
    let untaken = (0..results.len()).filter(|idx| !taken[*idx]);
    if intent.has_behavioral() {
        order.extend(untaken);
    } else {
        let (personality, rest): (Vec<usize>, Vec<usize>) =
            untaken.partition(|idx| results[*idx].test_type() == TestType::P);
        order.extend(rest);
        order.extend(personality);
    }
    order.truncate(max_results);

    let mut slots: Vec<Option<RetrievedItem>> = results.into_iter().map(Some).collect();
    order
        .into_iter()
        .filter_map(|idx| slots[idx].take())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::tests::entry;

    fn ranked(types: &[TestType]) -> Vec<RetrievedItem> {
        types
            .iter()
            .enumerate()
            .map(|(idx, test_type)| RetrievedItem {
                record: entry(&format!("item{idx}"), *test_type, vec![1.0]).record,
                score: 1.0 - idx as f32 * 0.01,
            })
            .collect()
    }

    fn names(items: &[RetrievedItem]) -> Vec<&str> {
        items
            .iter()
            .map(|item| item.record.assessment_name.as_str())
            .collect()
    }

    fn behavioral() -> Intent {
        Intent {
            behavioral_skills: vec!["communication".into()],
            ..Intent::default()
        }
    }

    use crate::catalog::TestType::{Unknown as U, K, P, S};

    #[test]
    fn never_exceeds_max_results() {
        let items = ranked(&[K, P, S, K, K, P, S, S, K, K, K, P, U, K]);
        for max in 0..20 {
            assert!(balance_results(items.clone(), &behavioral(), max).len() <= max);
            assert!(balance_results(items.clone(), &Intent::fallback(), max).len() <= max);
        }
    }

    #[test]
    fn first_five_are_knowledge_items_in_rank_order() {
        let items = ranked(&[P, K, S, K, K, P, K, K, K, S]);
        let out = balance_results(items, &behavioral(), 10);
        assert_eq!(
            &names(&out)[..5],
            &["item1", "item3", "item4", "item6", "item7"]
        );
    }

    #[test]
    fn personality_skipped_without_behavioral_skills() {
        let items = ranked(&[P, P, K, K, K, K, K, K, S, S, S, P, K]);
        let out = balance_results(items, &Intent::fallback(), 10);
        assert!(out[..8].iter().all(|item| item.test_type() != P));
        assert_eq!(
            names(&out),
            vec![
                "item2", "item3", "item4", "item5", "item6", "item8", "item9", "item7", "item10",
                "item12"
            ]
        );
    }

    #[test]
    fn behavioral_intent_interleaves_quotas_then_backfills() {
        let items = ranked(&[S, P, K, P, P, P, K, S, S, U]);
        let out = balance_results(items, &behavioral(), 10);
        assert_eq!(
            names(&out),
            vec![
                "item2", "item6", "item1", "item3", "item4", "item0", "item7", "item5", "item8",
                "item9"
            ]
        );
    }

    #[test]
    fn short_input_is_returned_whole() {
        let items = ranked(&[U, S]);
        let out = balance_results(items, &Intent::fallback(), 10);
        assert_eq!(names(&out), vec!["item1", "item0"]);
    }
}
