use makbuz_core::Money;

use crate::types::{items_total, LineItem};

/// The item list whose sum lies closest to the trusted total. Empty lists
/// never win; ties go to the earliest pass.
pub fn closest_sum(candidates: &[Vec<LineItem>], total: Money) -> Vec<LineItem> {
    let mut best: Option<(&Vec<LineItem>, Money)> = None;
    for items in candidates.iter().filter(|items| !items.is_empty()) {
        let diff = items_total(items).abs_diff(total);
        if best.map_or(true, |(_, d)| diff < d) {
            best = Some((items, diff));
        }
    }
    best.map(|(items, _)| items.clone()).unwrap_or_default()
}

/// The item list whose sum recurs across the most passes. Groups are formed
/// on the two-decimal sum, empty lists are skipped and the earliest list of
/// the winning group is returned.
pub fn most_recurring_sum(candidates: &[Vec<LineItem>]) -> Vec<LineItem> {
    let mut groups: Vec<(Money, &Vec<LineItem>, usize)> = Vec::new();
    for items in candidates.iter().filter(|items| !items.is_empty()) {
        let sum = items_total(items);
        match groups.iter_mut().find(|(s, _, _)| *s == sum) {
            Some((_, _, n)) => *n += 1,
            None => groups.push((sum, items, 1)),
        }
    }

    let mut winner: Option<(&Vec<LineItem>, usize)> = None;
    for (_, items, n) in &groups {
        if winner.map_or(true, |(_, best)| *n > best) {
            winner = Some((*items, *n));
        }
    }
    winner.map(|(items, _)| items.clone()).unwrap_or_default()
}

/// Picks one item list out of the per-pass candidates: closest-sum when a
/// total is known, most-recurring-sum otherwise.
pub fn reconcile_items(candidates: &[Vec<LineItem>], total: Option<Money>) -> Vec<LineItem> {
    match total {
        Some(total) => closest_sum(candidates, total),
        None => most_recurring_sum(candidates),
    }
}
