//! Property tests for the fact domain: the structural depth bound and
//! the prefix/rebase algebra the flow functions rely on.

use proptest::prelude::*;

use bytedb_analysis::features::ifds::domain::{Fact, Mark};
use bytedb_analysis::shared::models::{AccessPath, Root};

fn arb_root() -> impl Strategy<Value = Root> {
    prop_oneof![
        "[a-z]{1,6}".prop_map(Root::Local),
        (0u32..4).prop_map(Root::Arg),
        Just(Root::This),
    ]
}

fn arb_path(max_depth: usize) -> impl Strategy<Value = AccessPath> {
    (
        arb_root(),
        prop::collection::vec("[a-z]{1,6}", 0..max_depth),
    )
        .prop_map(|(root, selectors)| AccessPath { root, selectors })
}

proptest! {
    /// Fact construction never exceeds the structural bound
    #[test]
    fn fact_depth_is_bounded(path in arb_path(12), depth in 1usize..6) {
        let fact = Fact::marked(path, Mark::Taint, depth);
        prop_assert!(fact.path().unwrap().depth() <= depth);
    }

    /// Truncation is idempotent
    #[test]
    fn truncation_idempotent(path in arb_path(12), depth in 0usize..8) {
        let once = path.clone().truncated(depth);
        prop_assert_eq!(once.clone().truncated(depth), once);
    }

    /// Every path starts with itself and with its bare root
    #[test]
    fn prefix_reflexive(path in arb_path(8)) {
        prop_assert!(path.starts_with(&path));
        let root = AccessPath::root(path.root.clone());
        prop_assert!(path.starts_with(&root));
    }

    /// Rebasing onto the same base is the identity
    #[test]
    fn rebase_onto_self_is_identity(path in arb_path(8)) {
        let root = AccessPath::root(path.root.clone());
        prop_assert_eq!(path.rebased(&root, &root), Some(path));
    }

    /// A successful rebase preserves the selector suffix
    #[test]
    fn rebase_preserves_suffix(
        base in arb_path(3),
        suffix in prop::collection::vec("[a-z]{1,6}", 0..3),
        target in arb_path(3),
    ) {
        let mut full = base.clone();
        full.selectors.extend(suffix.iter().cloned());

        let rebased = full.rebased(&base, &target).unwrap();
        prop_assert_eq!(&rebased.root, &target.root);
        prop_assert!(rebased.selectors.ends_with(&suffix));
        prop_assert_eq!(rebased.selectors.len(), target.selectors.len() + suffix.len());
    }

    /// starts_with agrees with rebased: rebase succeeds exactly on prefixes
    #[test]
    fn rebase_iff_prefix(a in arb_path(6), b in arb_path(6)) {
        let target = AccessPath::local("t");
        prop_assert_eq!(a.starts_with(&b), a.rebased(&b, &target).is_some());
    }
}
