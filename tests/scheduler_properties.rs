//! End-to-end scenarios exercising the scheduler's ordering, signalling,
//! timeout, and join guarantees.

use cogen_rs::{rendezvous, spawn, timer, Runtime, TaskBuilder};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[test]
fn sleep_ordering_fires_shortest_deadline_first() {
    let runtime = Runtime::new();
    let order = Arc::new(Mutex::new(Vec::new()));

    runtime.block_on(async {
        let mut handles = Vec::new();
        for (id, millis) in [(1, 30), (2, 10), (3, 20)] {
            let order = order.clone();
            handles.push(spawn(async move {
                timer::sleep(Duration::from_millis(millis)).await;
                order.lock().unwrap().push(id);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
    });

    assert_eq!(*order.lock().unwrap(), vec![2, 3, 1]);
}

#[test]
fn signal_fan_out_wakes_exactly_the_requested_count() {
    let runtime = Runtime::new();
    let woken = Arc::new(Mutex::new(Vec::new()));

    runtime.block_on(async {
        let mut waiters = Vec::new();
        for id in 0..5 {
            let woken = woken.clone();
            waiters.push(spawn(async move {
                let value = rendezvous::wait_for_signal("go").await;
                woken.lock().unwrap().push(id);
                *value.downcast::<i32>().unwrap()
            }));
        }

        // Give every waiter a chance to register before signalling.
        timer::sleep(Duration::from_millis(5)).await;

        let signaller = spawn(async {
            rendezvous::signal("go", 42i32, Some(3))
        });
        let woken_count = signaller.await.unwrap();
        assert_eq!(*woken_count, 3);

        // Let the three resumed waiters run to completion.
        timer::sleep(Duration::from_millis(5)).await;
        assert_eq!(woken.lock().unwrap().len(), 3);

        // The remaining two are still blocked; release them so the runtime
        // can terminate cleanly.
        rendezvous::signal("go", 7i32, None);
        for waiter in waiters {
            let _ = waiter.await;
        }
        assert_eq!(woken.lock().unwrap().len(), 5);
    });
}

#[test]
fn front_priority_task_runs_before_an_already_queued_back_priority_task() {
    let runtime = Runtime::new();
    let order = Arc::new(Mutex::new(Vec::new()));

    runtime.block_on(async {
        let order_a = order.clone();
        let back = spawn(async move {
            order_a.lock().unwrap().push("back");
        });

        // Spawned second but with the CORO front-priority bit set: it jumps
        // ahead of the already-queued back task.
        let order_b = order.clone();
        let front = TaskBuilder::new().front_priority(true).spawn(async move {
            order_b.lock().unwrap().push("front");
        });

        back.await.unwrap();
        front.await.unwrap();
    });

    assert_eq!(*order.lock().unwrap(), vec!["front", "back"]);
}

#[test]
fn timeout_fires_within_the_expected_window() {
    let runtime = Runtime::new();

    runtime.block_on(async {
        let start = std::time::Instant::now();
        let result = timer::with_timeout(Duration::from_millis(100), async {
            timer::sleep(Duration::from_secs(5)).await;
        })
        .await;
        let elapsed = start.elapsed();

        assert!(result.is_err());
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(500));
    });
}

#[test]
fn join_resolves_to_the_joined_tasks_return_value() {
    let runtime = Runtime::new();

    let result = runtime.block_on(async {
        let x = spawn(async { 99i32 });
        let y = spawn(async move {
            let value = x.await.unwrap();
            *value
        });
        y.await.unwrap()
    });

    assert_eq!(*result, 99);
}
