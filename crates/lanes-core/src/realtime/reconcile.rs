use std::collections::{HashMap, HashSet};

use crate::model::Entity;

/// Merge a fresh fetch into the current display order.
///
/// Storage does not promise any row order, so a refetch must not reshuffle
/// what the user is looking at. Entities still present keep their current
/// position (with the fetched fields), new ones are appended in fetch
/// order, and vanished ones are dropped.
#[must_use]
pub fn reconcile_order<T: Entity>(current: &[T], fetched: Vec<T>) -> Vec<T> {
    let known: HashSet<&str> = current.iter().map(Entity::id).collect();
    let mut by_id: HashMap<String, T> = HashMap::with_capacity(fetched.len());
    let mut appended = Vec::new();
    for entity in fetched {
        if known.contains(entity.id()) {
            by_id.insert(entity.id().to_string(), entity);
        } else {
            appended.push(entity);
        }
    }

    let mut out: Vec<T> = current
        .iter()
        .filter_map(|existing| by_id.remove(existing.id()))
        .collect();
    out.extend(appended);
    out
}
