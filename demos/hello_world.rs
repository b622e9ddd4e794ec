//! Hello World example for cogen-rs.
//!
//! Demonstrates the basic usage of the runtime: a simple `block_on`, a
//! couple of chained futures, and spawning a task.

use cogen_rs::{spawn, Runtime};

fn main() {
    tracing_subscriber::fmt::init();

    let runtime = Runtime::new();

    println!("--- Example 1: Simple async block ---");
    let result = runtime.block_on(async {
        println!("Hello from async block!");
        42
    });
    println!("Result: {}", result);

    println!("\n--- Example 2: Chained operations ---");
    let result = runtime.block_on(async {
        let x = async {
            println!("Computing first value...");
            10
        }
        .await;
        let y = async {
            println!("Computing second value...");
            20
        }
        .await;
        println!("Adding {} + {} = {}", x, y, x + y);
        x + y
    });
    println!("Final result: {}", result);

    println!("\n--- Example 3: Task spawning ---");
    let result = runtime.block_on(async {
        let handle = spawn(async {
            println!("Task is running...");
            "Hello from spawned task!"
        });
        *handle.await.unwrap()
    });
    println!("Task result: {}", result);
}
