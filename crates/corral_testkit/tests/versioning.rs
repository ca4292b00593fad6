//! Property tests for the version ledger.

use corral_core::{CoreConfig, Engine, Timestamp};
use corral_store::{Filter, MemoryStore, Predicate};
use corral_testkit::prelude::*;
use proptest::prelude::*;
use std::sync::Arc;

fn engine() -> Engine {
    Engine::new(
        Arc::new(MemoryStore::new()),
        test_registry(),
        CoreConfig::default(),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// However many revisions an object goes through, exactly one row is
    /// current and `read_as_of(now)` agrees with `read_current`.
    #[test]
    fn one_current_row_after_any_revision_history(revisions in revision_strategy()) {
        let e = engine();
        let key = key_of(DOG);

        let mut iter = revisions.into_iter();
        let first = iter.next().unwrap();
        e.run_in_transaction(|txn| e.ledger().record_create(txn, key, first))
            .unwrap();

        for revision in iter {
            let known = e.ledger().read_current(key).unwrap().unwrap().stamp;
            e.run_in_transaction(|txn| {
                e.ledger().record_update(txn, key, revision, known)?;
                Ok(())
            })
            .unwrap();
        }

        let table = e.registry().table_of(DOG).unwrap();
        let current_rows = e
            .store()
            .select(&table, &Filter::all().and("valid_to", Predicate::IsNull))
            .unwrap();
        prop_assert_eq!(current_rows.len(), 1);

        let current = e.ledger().read_current(key).unwrap().unwrap();
        let now = Timestamp::from_millis(current.stamp.as_millis().max(Timestamp::wall().as_millis()));
        let as_of = e.ledger().read_as_of(key, now).unwrap().unwrap();
        prop_assert_eq!(as_of, current);
    }

    /// Every historical stamp still reads back the payload that was
    /// current at that moment.
    #[test]
    fn historical_reads_are_stable(revisions in revision_strategy()) {
        let e = engine();
        let key = key_of(MAMMAL);
        let mut stamps = Vec::new();

        let mut iter = revisions.clone().into_iter();
        let first = iter.next().unwrap();
        e.run_in_transaction(|txn| e.ledger().record_create(txn, key, first))
            .unwrap();
        stamps.push(e.ledger().read_current(key).unwrap().unwrap().stamp);

        for revision in iter {
            let known = *stamps.last().unwrap();
            e.run_in_transaction(|txn| {
                e.ledger().record_update(txn, key, revision, known)?;
                Ok(())
            })
            .unwrap();
            stamps.push(e.ledger().read_current(key).unwrap().unwrap().stamp);
        }

        for (stamp, expected) in stamps.iter().zip(revisions.iter()) {
            let read = e.ledger().read_as_of(key, *stamp).unwrap().unwrap();
            prop_assert_eq!(&read.payload, expected);
        }
    }
}
