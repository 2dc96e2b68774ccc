use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fleetmon::fanout::{all_ok, run_many};

async fn flaky(item: u32) -> anyhow::Result<u32> {
    if item == 2 || item == 4 {
        anyhow::bail!("item {item} failed");
    }
    Ok(item * 10)
}

#[tokio::test]
async fn failures_stay_isolated_at_low_and_high_parallelism() {
    for parallelism in [1usize, 5] {
        let outcomes = run_many("probe", vec![1u32, 2, 3, 4, 5], parallelism, flaky).await;

        assert_eq!(outcomes.len(), 5);
        assert!(!all_ok(&outcomes));

        for outcome in &outcomes {
            match outcome.item {
                2 | 4 => assert!(outcome.result.is_err(), "item {} should fail", outcome.item),
                item => assert_eq!(*outcome.result.as_ref().unwrap(), item * 10),
            }
        }
    }
}

#[tokio::test]
async fn concurrency_stays_within_the_bound() {
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let active_outer = Arc::clone(&active);
    let peak_outer = Arc::clone(&peak);

    let items: Vec<u32> = (0..12).collect();
    let outcomes = run_many("bounded", items, 3, move |_item| {
        let active = Arc::clone(&active_outer);
        let peak = Arc::clone(&peak_outer);
        async move {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            active.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    })
    .await;

    assert_eq!(outcomes.len(), 12);
    assert!(all_ok(&outcomes));
    assert!(peak.load(Ordering::SeqCst) <= 3);
}

#[tokio::test]
async fn a_panicking_item_does_not_abort_siblings() {
    let outcomes = run_many("panicky", vec![1u32, 2, 3], 3, |item| async move {
        if item == 2 {
            panic!("boom");
        }
        Ok(item)
    })
    .await;

    // The panicked item is dropped from the results; its siblings complete.
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|outcome| outcome.item != 2));
    assert!(all_ok(&outcomes));
}

#[tokio::test]
async fn outcomes_map_back_to_their_items() {
    let outcomes = run_many("ordering", vec![5u32, 1, 9], 2, |item| async move {
        // Later items finish first, so collection order is not input order.
        tokio::time::sleep(Duration::from_millis(u64::from(item) * 10)).await;
        Ok(item + 100)
    })
    .await;

    assert_eq!(outcomes.len(), 3);
    for outcome in &outcomes {
        assert_eq!(*outcome.result.as_ref().unwrap(), outcome.item + 100);
    }
}
