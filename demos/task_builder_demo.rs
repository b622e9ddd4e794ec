//! TaskBuilder demonstration.
//!
//! Shows spawning via [`cogen_rs::TaskBuilder`] (with the CORO front-priority
//! bit) alongside the plain [`cogen_rs::spawn`] convenience function.

use cogen_rs::{spawn, Runtime, TaskBuilder};
use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

fn main() {
    tracing_subscriber::fmt::init();

    let runtime = Runtime::new();

    runtime.block_on(async {
        println!("TaskBuilder Demo");
        println!("================");

        println!("\n1. Using TaskBuilder directly:");
        let handle = TaskBuilder::new().front_priority(true).spawn(async {
            println!("Task executed via TaskBuilder!");
            42
        });
        let result = handle.await;
        println!("Task result: {:?}", result.map(|v| *v));

        println!("\n2. Using the convenience spawn function:");
        let counter = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for i in 0..5 {
            let counter = counter.clone();
            handles.push(spawn(async move {
                counter.fetch_add(i, Ordering::SeqCst);
                format!("Task {} completed", i)
            }));
        }

        for (i, handle) in handles.into_iter().enumerate() {
            let result = handle.await;
            println!("Handle {}: {:?}", i, result.map(|v| (*v).clone()));
        }

        println!("Final counter value: {}", counter.load(Ordering::SeqCst));
    });
}
