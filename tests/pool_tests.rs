use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use proptest::prelude::*;
use procman::pool::TaskPool;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn every_submitted_task_runs_exactly_once(tasks in 0usize..200, workers in 1usize..6) {
        let pool = TaskPool::new(workers).unwrap();
        let counters: Arc<Vec<AtomicUsize>> =
            Arc::new((0..tasks).map(|_| AtomicUsize::new(0)).collect());

        for index in 0..tasks {
            let counters = Arc::clone(&counters);
            pool.submit(move || {
                counters[index].fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        pool.wait_idle();

        for counter in counters.iter() {
            prop_assert_eq!(counter.load(Ordering::SeqCst), 1);
        }
        prop_assert_eq!(pool.active_tasks(), 0);
    }
}

#[test]
fn two_workers_bound_concurrency() {
    let pool = TaskPool::new(2).unwrap();
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let started = Instant::now();
    for _ in 0..10 {
        let running = Arc::clone(&running);
        let peak = Arc::clone(&peak);
        pool.submit(move || {
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(50));
            running.fetch_sub(1, Ordering::SeqCst);
        })
        .unwrap();
    }
    pool.wait_idle();

    assert!(started.elapsed() >= Duration::from_millis(250));
    assert!(peak.load(Ordering::SeqCst) <= 2);
}

#[test]
fn panicking_task_does_not_kill_worker() {
    let pool = TaskPool::new(1).unwrap();
    let ran = Arc::new(AtomicUsize::new(0));

    pool.submit(|| panic!("boom")).unwrap();
    let after = Arc::clone(&ran);
    pool.submit(move || {
        after.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();
    pool.wait_idle();

    assert_eq!(ran.load(Ordering::SeqCst), 1);
    assert_eq!(pool.panicked_tasks(), 1);
}

#[test]
fn tasks_can_submit_follow_up_work() {
    let pool = Arc::new(TaskPool::new(2).unwrap());
    let order = Arc::new(Mutex::new(Vec::new()));

    let inner_pool = Arc::clone(&pool);
    let inner_order = Arc::clone(&order);
    pool.submit(move || {
        inner_order.lock().unwrap().push("outer");
        let nested = Arc::clone(&inner_order);
        inner_pool
            .submit(move || nested.lock().unwrap().push("inner"))
            .unwrap();
    })
    .unwrap();
    pool.wait_idle();

    assert_eq!(*order.lock().unwrap(), vec!["outer", "inner"]);
}

#[test]
fn drop_joins_workers_after_running_tasks() {
    let done = Arc::new(AtomicUsize::new(0));
    {
        let pool = TaskPool::new(3).unwrap();
        for _ in 0..6 {
            let done = Arc::clone(&done);
            pool.submit(move || {
                thread::sleep(Duration::from_millis(5));
                done.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        pool.wait_idle();
    }
    assert_eq!(done.load(Ordering::SeqCst), 6);
}
