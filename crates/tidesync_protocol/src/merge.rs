//! Client-side last-write-wins reduction of a pulled page.
//!
//! The server returns every change in tidemark order and never collapses
//! edits to the same path. Clients apply the page with this helper.

use crate::messages::ChangeResponse;
use std::collections::HashMap;

/// Keeps one change per path: the one with the greatest `modified` time.
///
/// Ties go to the later entry, which is the one with the higher tidemark.
/// Survivors keep their relative order from the input.
///
/// A pulled change carries only its property as `path`, not the record id.
/// Edits to the same property of two different records in one page are
/// therefore indistinguishable here and collapse into one. Use this helper
/// only on groups that hold a single record, or reduce per record on the
/// client side before applying.
pub fn latest_per_path(changes: &[ChangeResponse]) -> Vec<ChangeResponse> {
    let mut winners: HashMap<&str, usize> = HashMap::new();

    for (index, change) in changes.iter().enumerate() {
        winners
            .entry(change.path.as_str())
            .and_modify(|current| {
                if change.modified >= changes[*current].modified {
                    *current = index;
                }
            })
            .or_insert(index);
    }

    let mut keep: Vec<usize> = winners.into_values().collect();
    keep.sort_unstable();
    keep.into_iter().map(|index| changes[index].clone()).collect()
}
