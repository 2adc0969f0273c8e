//! Property tests for the Jaccard oracle and MinHash signatures.

use proptest::prelude::*;
use similarity::{MemberSet, MemberSets, MinHashConfig, MinHasher, jaccard, signature_agreement};

fn member_set() -> impl Strategy<Value = MemberSet> {
    prop::collection::hash_set(0u64..500, 0..40)
}

fn non_empty_member_set() -> impl Strategy<Value = MemberSet> {
    prop::collection::hash_set(0u64..500, 1..40)
}

proptest! {
    #[test]
    fn jaccard_is_symmetric(a in member_set(), b in non_empty_member_set()) {
        prop_assert_eq!(jaccard(&a, &b).unwrap(), jaccard(&b, &a).unwrap());
    }

    #[test]
    fn jaccard_is_bounded(a in member_set(), b in non_empty_member_set()) {
        let sim = jaccard(&a, &b).unwrap();
        prop_assert!((0.0..=1.0).contains(&sim));
    }

    #[test]
    fn jaccard_self_similarity_is_one(a in non_empty_member_set()) {
        prop_assert_eq!(jaccard(&a, &a).unwrap(), 1.0);
    }

    #[test]
    fn signatures_have_fixed_width(
        sets in prop::collection::vec(member_set(), 1..8),
        width in 1usize..64,
        seed in any::<u64>(),
    ) {
        let hasher = MinHasher::from_config(&MinHashConfig::new(width).with_seed(seed)).unwrap();
        for members in &sets {
            prop_assert_eq!(hasher.signature(members).len(), width);
        }

        let keyed: MemberSets<usize> = sets.into_iter().enumerate().collect();
        let matrix = hasher.signature_matrix(&keyed);
        prop_assert_eq!(matrix.as_slice().len(), keyed.len() * width);
    }

    #[test]
    fn identical_sets_have_identical_signatures(a in non_empty_member_set(), seed in any::<u64>()) {
        let hasher = MinHasher::from_config(&MinHashConfig::new(32).with_seed(seed)).unwrap();
        let sig = hasher.signature(&a);
        prop_assert_eq!(signature_agreement(&sig, &hasher.signature(&a.clone())).unwrap(), 1.0);
    }

    #[test]
    fn estimate_is_bounded(a in non_empty_member_set(), b in member_set(), seed in any::<u64>()) {
        let hasher = MinHasher::from_config(&MinHashConfig::new(16).with_seed(seed)).unwrap();
        let estimate = signature_agreement(&hasher.signature(&a), &hasher.signature(&b)).unwrap();
        prop_assert!((0.0..=1.0).contains(&estimate));
    }
}
