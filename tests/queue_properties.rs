//! Property-based tests for queue bookkeeping under arbitrary action sequences.

use proptest::prelude::*;

use listing_curator::testing::{records, FlakyStore};
use listing_curator::{QueueError, RecordFilter, ValidationQueue};

#[derive(Debug, Clone, Copy)]
enum Action {
    Validate(usize),
    Skip(usize),
    Delete(usize),
}

fn arb_action() -> impl Strategy<Value = Action> {
    prop_oneof![
        (0usize..64).prop_map(Action::Validate),
        (0usize..64).prop_map(Action::Skip),
        (0usize..64).prop_map(Action::Delete),
    ]
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
}

fn ids(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("p{}", i)).collect()
}

async fn loaded(n: usize) -> (ValidationQueue, FlakyStore) {
    let ids = ids(n);
    let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    let store = FlakyStore::new(records(&refs));
    let mut queue = ValidationQueue::new();
    queue.load(&store, RecordFilter::unvalidated(n.max(1))).await.unwrap();
    (queue, store)
}

/// Resolve an index against whatever is queued right now
fn pick(queue: &ValidationQueue, i: usize) -> Option<String> {
    let len = queue.len();
    if len == 0 {
        None
    } else {
        queue.ids().nth(i % len).map(str::to_string)
    }
}

proptest! {
    #[test]
    fn length_tracks_validates_and_deletes(
        n in 1usize..12,
        actions in prop::collection::vec(arb_action(), 0..40),
    ) {
        runtime().block_on(async {
            let (mut queue, store) = loaded(n).await;
            let mut removed = Vec::new();

            for action in actions {
                match action {
                    Action::Validate(i) => if let Some(id) = pick(&queue, i) {
                        queue.validate(&store, &id, "prop").await.unwrap();
                        removed.push(id);
                    },
                    Action::Delete(i) => if let Some(id) = pick(&queue, i) {
                        queue.delete(&store, &id).await.unwrap();
                        removed.push(id);
                    },
                    Action::Skip(i) => if let Some(id) = pick(&queue, i) {
                        queue.skip(&id).unwrap();
                    },
                }
                let p = queue.progress();
                prop_assert_eq!(p.validated + queue.len(), p.total);
            }

            prop_assert_eq!(queue.len(), n - removed.len());
            for id in &removed {
                prop_assert!(!queue.contains(id));
            }
            Ok(())
        })?;
    }

    #[test]
    fn skip_moves_only_the_target(n in 1usize..12, i in 0usize..64) {
        runtime().block_on(async {
            let (mut queue, _) = loaded(n).await;
            let before: Vec<String> = queue.ids().map(str::to_string).collect();
            let target = pick(&queue, i).unwrap();

            queue.skip(&target).unwrap();
            let after: Vec<String> = queue.ids().map(str::to_string).collect();

            prop_assert_eq!(after.len(), before.len());
            prop_assert_eq!(after.last(), Some(&target));
            let others_before: Vec<_> = before.iter().filter(|id| **id != target).collect();
            let others_after: Vec<_> = after.iter().filter(|id| **id != target).collect();
            prop_assert_eq!(others_before, others_after);
            if n == 1 {
                prop_assert_eq!(after, before);
            }
            Ok(())
        })?;
    }

    #[test]
    fn failed_validate_changes_nothing(n in 1usize..12, i in 0usize..64) {
        runtime().block_on(async {
            let (mut queue, store) = loaded(n).await;
            let before: Vec<String> = queue.ids().map(str::to_string).collect();
            let progress = queue.progress();
            let target = pick(&queue, i).unwrap();

            store.fail_update(true);
            let err = queue.validate(&store, &target, "prop").await.unwrap_err();
            prop_assert!(
                matches!(err, QueueError::UpdateFailed { .. }),
                "unexpected error: {}",
                err
            );

            let after: Vec<String> = queue.ids().map(str::to_string).collect();
            prop_assert_eq!(after, before);
            prop_assert_eq!(queue.progress(), progress);
            Ok(())
        })?;
    }
}
