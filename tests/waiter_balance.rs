/*!
 * Waiter Bookkeeping Property Tests
 *
 * Any number of waiters, released by any mix of interrupt, cancellation and
 * deadline, leaves the count balanced.
 */

use proptest::prelude::*;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use timeout_cond::{CancellationToken, TimeoutCond};

#[derive(Debug, Clone, Copy)]
enum Release {
    Interrupt,
    Cancel,
    Deadline,
}

fn release_strategy() -> impl Strategy<Value = Release> {
    prop_oneof![
        Just(Release::Interrupt),
        Just(Release::Cancel),
        Just(Release::Deadline),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_waiter_count_balances(waiters in 0usize..6, release in release_strategy()) {
        let cond = Arc::new(TimeoutCond::with_value(0usize));
        let token = match release {
            Release::Deadline => CancellationToken::with_timeout(Duration::from_millis(30)),
            _ => CancellationToken::new(),
        };

        let handles: Vec<_> = (0..waiters)
            .map(|_| {
                let cond = cond.clone();
                let token = token.child_token();
                thread::spawn(move || {
                    let mut guard = cond.lock().lock();
                    *guard += 1;
                    cond.wait(&mut guard, &token)
                })
            })
            .collect();

        // Registration and the counter bump happen under the same lock hold.
        let deadline = Instant::now() + Duration::from_secs(5);
        while *cond.lock().lock() < waiters {
            prop_assert!(Instant::now() < deadline);
            thread::yield_now();
        }

        if !matches!(release, Release::Deadline) {
            prop_assert_eq!(cond.waiter_count(), waiters as u64);
            prop_assert_eq!(cond.has_waiters(), waiters > 0);
        }

        match release {
            Release::Interrupt => cond.interrupt(),
            Release::Cancel => token.cancel(),
            Release::Deadline => {}
        }

        for handle in handles {
            let interrupted = handle.join().unwrap();
            prop_assert_eq!(interrupted, matches!(release, Release::Interrupt));
        }
        prop_assert!(!cond.has_waiters());
        prop_assert_eq!(cond.waiter_count(), 0);
    }
}
