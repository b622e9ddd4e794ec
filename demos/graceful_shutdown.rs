//! Example demonstrating graceful shutdown via OS signal handling.

#[cfg(feature = "signal")]
fn main() {
    use cogen_rs::{shutdown::SignalHandler, timer, Runtime};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    tracing_subscriber::fmt::init();

    let shutdown_flag = Arc::new(AtomicBool::new(false));
    let handler = SignalHandler::new(shutdown_flag.clone());
    handler.start();

    Runtime::new().block_on(async move {
        let mut counter = 0;
        loop {
            if shutdown_flag.load(Ordering::SeqCst) {
                println!("received shutdown signal, cleaning up...");
                timer::sleep(Duration::from_millis(100)).await;
                println!("cleanup completed, exiting");
                break;
            }
            timer::sleep(Duration::from_millis(500)).await;
            counter += 1;
            println!("working... iteration {}", counter);
            if counter >= 20 {
                println!("work completed naturally");
                break;
            }
        }
    });
}

#[cfg(not(feature = "signal"))]
fn main() {
    println!("Signal handling example requires the 'signal' feature");
    println!("Run with: cargo run --features signal --example graceful_shutdown");
}
