use std::collections::HashMap;

use crate::error::DiscoveryError;
use crate::types::{NodeId, StateEnvelope};

/// The newest buffered item from one leader plus the ones it supersedes.
#[derive(Debug)]
pub struct Batch<T> {
    pub latest: T,
    pub superseded: Vec<T>,
}

/// Group buffered items by claimed leader and keep the maximal
/// `(term, version)` of each group.
///
/// Batches come back oldest first so that applying them in order never
/// moves the node backwards.
pub fn take_latest<T, F>(items: Vec<T>, key: F) -> Vec<Batch<T>>
where
    F: Fn(&T) -> (&NodeId, (u64, u64)),
{
    let mut groups: HashMap<NodeId, Vec<T>> = HashMap::new();
    for item in items {
        let leader = key(&item).0.clone();
        groups.entry(leader).or_default().push(item);
    }

    let mut batches: Vec<Batch<T>> = groups
        .into_values()
        .filter_map(|mut group| {
            let (idx, _) = group
                .iter()
                .enumerate()
                .max_by_key(|(_, item)| key(item).1)?;
            let latest = group.swap_remove(idx);
            Some(Batch {
                latest,
                superseded: group,
            })
        })
        .collect();
    batches.sort_by_key(|b| key(&b.latest).1);
    batches
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Reject(DiscoveryError),
    /// Already applied this or something newer.
    Skip,
    Apply,
}

/// Decide what to do with an incoming envelope given the local term and the
/// envelope currently applied.
pub fn decide(local_term: u64, applied: Option<&StateEnvelope>, incoming: &StateEnvelope) -> Decision {
    if incoming.term < local_term {
        return Decision::Reject(DiscoveryError::StaleTerm {
            received: incoming.term,
            current: local_term,
        });
    }
    match applied {
        Some(current) if !incoming.is_newer_than(current) => Decision::Skip,
        _ => Decision::Apply,
    }
}
