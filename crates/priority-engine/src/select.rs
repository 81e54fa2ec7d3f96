use std::collections::HashMap;

use screener_core::{CategoryBook, ScoredInstrument};

/// Per-category admission cap for a selection of `target` instruments.
pub fn category_cap(target: usize) -> usize {
    (target / 5).max(3)
}

/// Stable descending sort by final score; equal scores keep candidate order.
pub fn rank_descending(mut candidates: Vec<ScoredInstrument>) -> Vec<ScoredInstrument> {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates
}

/// Greedy top-down walk over ranked candidates, skipping any instrument
/// whose primary category already hit the cap. Skipped instruments are not
/// rescored; the walk stops once `target` instruments are admitted.
pub fn diversify(
    candidates: Vec<ScoredInstrument>,
    categories: &CategoryBook,
    target: usize,
) -> Vec<ScoredInstrument> {
    let cap = category_cap(target);
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut selected = Vec::with_capacity(target.min(candidates.len()));

    for item in candidates {
        if selected.len() >= target {
            break;
        }

        let primary = categories.primary_category(&item.ticker);
        let count = counts.entry(primary).or_insert(0);
        if *count >= cap {
            continue;
        }

        *count += 1;
        selected.push(item);
    }

    selected
}
