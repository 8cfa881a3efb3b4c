//! Transitive closure over the implication graph.
//!
//! Both directions run breadth-first: each round asks the repository for the
//! direct implications of the current frontier and re-seeds the frontier with
//! the pairs discovered. An implication is recorded once, keyed by its four
//! ids, so a round that finds nothing new ends the walk even if the stored
//! graph contains a cycle.

use std::collections::HashSet;
use tagfs_core::{FileTag, Implication, StoreError, TagValuePair, Transaction};
use tracing::debug;

type Edge = (TagValuePair, TagValuePair);

/// Every implication reachable from `pairs` by following rules forwards.
pub async fn implications_for(
    tx: &mut dyn Transaction,
    pairs: &[TagValuePair],
) -> Result<Vec<Implication>, StoreError> {
    let mut result = Vec::new();
    let mut seen: HashSet<Edge> = HashSet::new();
    let mut frontier = pairs.to_vec();

    while !frontier.is_empty() {
        let direct = tx.implications_for(&frontier).await?;

        frontier = Vec::new();
        for implication in direct {
            let edge = (implication.implying_pair(), implication.implied_pair());
            if seen.insert(edge) {
                frontier.push(edge.1);
                result.push(implication);
            }
        }
    }

    debug!("{} pairs imply {} rules", pairs.len(), result.len());
    Ok(result)
}

/// Every implication that leads, possibly through others, to one of `pairs`.
pub async fn implications_implying(
    tx: &mut dyn Transaction,
    pairs: &[TagValuePair],
) -> Result<Vec<Implication>, StoreError> {
    let mut result = Vec::new();
    let mut seen: HashSet<Edge> = HashSet::new();
    let mut frontier = pairs.to_vec();

    while !frontier.is_empty() {
        let direct = tx.implications_implying(&frontier).await?;

        frontier = Vec::new();
        for implication in direct {
            let edge = (implication.implying_pair(), implication.implied_pair());
            if seen.insert(edge) {
                frontier.push(edge.0);
                result.push(implication);
            }
        }
    }

    Ok(result)
}

/// Whether the rules in `implications` derive exactly `pair`.
#[must_use]
pub fn implies(implications: &[Implication], pair: TagValuePair) -> bool {
    implications
        .iter()
        .any(|implication| implication.implied_pair() == pair)
}

/// Whether adding `implying => implied` would close a loop.
///
/// True when `implied` already leads back to `implying`. Values match when
/// they are equal or either side is "any".
pub async fn would_cycle(
    tx: &mut dyn Transaction,
    implying: TagValuePair,
    implied: TagValuePair,
) -> Result<bool, StoreError> {
    let overlaps = |candidate: TagValuePair| {
        candidate.tag_id == implying.tag_id
            && (candidate.value_id.is_none()
                || implying.value_id.is_none()
                || candidate.value_id == implying.value_id)
    };

    if overlaps(implied) {
        return Ok(true);
    }

    let reachable = implications_for(tx, &[implied]).await?;
    Ok(reachable
        .iter()
        .any(|implication| overlaps(implication.implied_pair())))
}

/// Annotate `file_tags` with the taggings their implications add.
///
/// Stored rows that are also implied get `implicit = true`. Implied pairs
/// with no stored row are appended with `explicit = false`; they are never
/// written back.
pub async fn add_implied_file_tags(
    tx: &mut dyn Transaction,
    mut file_tags: Vec<FileTag>,
) -> Result<Vec<FileTag>, StoreError> {
    // synthesized rows are appended while iterating and get visited too
    let mut index = 0;
    while index < file_tags.len() {
        let source = file_tags[index];
        let implications = implications_for(tx, &[source.pair()]).await?;

        for implication in implications {
            let pair = implication.implied_pair();
            match file_tags
                .iter_mut()
                .find(|ft| ft.file_id == source.file_id && ft.pair() == pair)
            {
                Some(existing) => existing.implicit = true,
                None => file_tags.push(FileTag {
                    file_id: source.file_id,
                    tag_id: pair.tag_id,
                    value_id: pair.value_id,
                    explicit: false,
                    implicit: true,
                }),
            }
        }

        index += 1;
    }

    Ok(file_tags)
}
