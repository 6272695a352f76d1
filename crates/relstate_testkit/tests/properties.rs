//! Property tests over generated operation sequences.

use proptest::prelude::*;
use relstate_core::Config;
use relstate_testkit::prelude::*;

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn row_count_matches_creates_minus_deletes(ops in row_ops_strategy(1, 60)) {
        let orm = items_orm();
        let mut harness = RowHarness::new(&orm, "Item");
        for op in &ops {
            harness.apply(op);
        }
        harness.verify();
    }

    #[test]
    fn edges_stay_symmetric(ops in edge_ops_strategy(3, 4, 1, 40)) {
        let orm = teams_orm();
        let mut harness = EdgeHarness::new(&orm, 3, 4);
        for op in ops {
            harness.apply(op);
        }
        harness.verify();
    }

    #[test]
    fn lenient_edges_stay_symmetric(ops in edge_ops_strategy(2, 3, 1, 40)) {
        let orm = teams_orm_with(Config::default().strict_edges(false));
        let mut harness = EdgeHarness::new(&orm, 2, 3);
        for op in ops {
            harness.apply(op);
        }
        harness.verify();
    }
}
