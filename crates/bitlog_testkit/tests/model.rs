//! Random operation sequences checked against a `HashMap` model.

use bitlog_core::Config;
use bitlog_testkit::prelude::*;
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn engine_matches_model(ops in ops_strategy(80)) {
        let mut fixture = TempEngine::with_config(
            Config::new().max_segment_size(160).sync_on_write(false),
        );
        let mut model = Model::new();
        let keys = Model::keys_of(&ops);

        for op in &ops {
            match op {
                Op::Put(k, v) => fixture.put(k, v).unwrap(),
                Op::Delete(k) => fixture.delete(k).unwrap(),
                Op::Compact => {
                    fixture.compact().unwrap();
                }
                Op::Reopen => fixture.reopen(),
            }
            model.apply(op);
        }

        prop_assert_eq!(model.first_mismatch(&fixture, &keys), None);
        prop_assert_eq!(fixture.len(), model.len());

        fixture.reopen();
        prop_assert_eq!(model.first_mismatch(&fixture, &keys), None);
        prop_assert_eq!(fixture.len(), model.len());
    }
}
