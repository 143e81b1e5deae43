//! Order-independent set checksum.

use std::collections::BTreeSet;

use crate::index::VertexIndex;

/// Computes the XOR checksum of an index set.
///
/// XOR is commutative and associative, so the result is independent of
/// member order and cheap to maintain incrementally. It is deliberately weak
/// on its own; the cache binds it to a key with an Ed25519 signature before
/// trusting it (see [`crate::signing::SetSigner`]).
pub fn xor_checksum(ids: &BTreeSet<VertexIndex>) -> i64 {
    ids.iter().fold(0i64, |acc, id| acc ^ id.value())
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn empty_set_checksums_to_zero() {
        assert_eq!(xor_checksum(&BTreeSet::new()), 0);
    }

    #[test]
    fn single_member_is_identity() {
        let ids: BTreeSet<VertexIndex> = [VertexIndex::new(-1)].into_iter().collect();
        assert_eq!(xor_checksum(&ids), -1);
    }

    proptest! {
        #[test]
        fn removing_a_member_changes_the_checksum(values in proptest::collection::btree_set(1i64..1_000_000, 2..20)) {
            let ids: BTreeSet<VertexIndex> = values.iter().copied().map(VertexIndex::new).collect();
            let full = xor_checksum(&ids);
            let mut smaller = ids.clone();
            let first = *smaller.iter().next().expect("non-empty");
            smaller.remove(&first);
            // XOR-ing the removed member back in must restore the checksum.
            prop_assert_eq!(xor_checksum(&smaller) ^ first.value(), full);
        }
    }
}
