//! Detection of signing keys registered more than once.

use hashbrown::{HashMap, HashSet};
use tracing::{info, warn};

use crate::common::{DuplicateEntry, Operator};

/// Annotates every key with the other locations holding the same raw key bytes.
///
/// A location is `(operator.id, key.index)`. A key only excludes the location equal to its
/// own, so the same key registered twice by one operator is reported on both indices.
/// Matches are listed in collection order: operators as given, keys by index.
///
/// Keys are indexed by their bytes, so the pass is linear in the number of keys plus the
/// number of reported matches, rather than quadratic. Existing annotations are replaced, so
/// running the pass twice gives the same result.
///
/// Returns the number of keys marked as duplicates.
pub fn find_duplicates(operators: &mut [Operator]) -> usize {
    warn_on_shared_ids(operators);

    let annotations = {
        // key bytes -> (operator position, key position), in scan order
        let mut index: HashMap<&[u8], Vec<(usize, usize)>> = HashMap::new();
        for (op_pos, operator) in operators.iter().enumerate() {
            for (key_pos, key) in operator.keys.iter().enumerate() {
                index.entry(&key.key[..]).or_default().push((op_pos, key_pos));
            }
        }

        operators
            .iter()
            .map(|operator| {
                operator
                    .keys
                    .iter()
                    .map(|key| {
                        index[&key.key[..]]
                            .iter()
                            .map(|&(op_pos, key_pos)| {
                                let other = &operators[op_pos];
                                (other, &other.keys[key_pos])
                            })
                            .filter(|(other_op, other_key)| {
                                (other_op.id, other_key.index) != (operator.id, key.index)
                            })
                            .map(|(other_op, other_key)| DuplicateEntry::new(other_op, other_key))
                            .collect::<Vec<_>>()
                    })
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>()
    };

    let mut marked = 0;
    for (operator, annotations) in operators.iter_mut().zip(annotations) {
        for (key, duplicates) in operator.keys.iter_mut().zip(annotations) {
            key.duplicate = !duplicates.is_empty();
            key.duplicates = duplicates;
            marked += usize::from(key.duplicate);
        }
    }

    info!(duplicates = marked, "Checked signing keys for duplicates");

    marked
}

/// Locations are told apart by operator id, which the registry never reuses. Two records
/// sharing an id make the self exclusion ambiguous, so this is reported and left as is.
fn warn_on_shared_ids(operators: &[Operator]) {
    let mut seen = HashSet::with_capacity(operators.len());
    for operator in operators {
        if !seen.insert(operator.id) {
            warn!(id = operator.id, "Operator id is not unique, duplicate report may be off");
        }
    }
}
