//! Graceful shutdown via OS signals.
//!
//! Spawns a dedicated thread that listens for `SIGINT`/`SIGTERM`/`SIGHUP`.
//! On the first signal it flips a shared `AtomicBool`; a task that polls the
//! flag (typically in its main loop, or via `timer::Interval`) sees it on
//! its next iteration and can wind down. A second signal forces an
//! immediate exit, in case the first one didn't get noticed in time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use signal_hook::{consts::signal::*, iterator::Signals};

/// Type for user-defined signal callbacks, run on the signal-handling
/// thread itself.
pub type SignalCallback = Box<dyn Fn(i32) + Send + Sync>;

/// Listens for termination signals on a dedicated thread and flips a shared
/// flag on the first one received.
pub struct SignalHandler {
    shutdown_flag: Arc<AtomicBool>,
    callbacks: Arc<Mutex<HashMap<i32, Vec<SignalCallback>>>>,
}

impl SignalHandler {
    pub fn new(shutdown_flag: Arc<AtomicBool>) -> Self {
        Self {
            shutdown_flag,
            callbacks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn register_callback<F>(&mut self, signal: i32, callback: F)
    where
        F: Fn(i32) + Send + Sync + 'static,
    {
        self.callbacks
            .lock()
            .unwrap()
            .entry(signal)
            .or_default()
            .push(Box::new(callback));
    }

    /// Start listening in a dedicated thread. Returns immediately; the
    /// listener thread runs for the lifetime of the process.
    pub fn start(&self) {
        let shutdown_flag = self.shutdown_flag.clone();
        let callbacks = self.callbacks.clone();

        thread::spawn(move || {
            let mut signals =
                Signals::new([SIGINT, SIGTERM, SIGHUP]).expect("failed to install signal handler");

            for signal in signals.forever() {
                match signal {
                    SIGINT | SIGTERM | SIGHUP => {
                        tracing::info!(signal, "received signal, initiating graceful shutdown");

                        if let Some(handlers) = callbacks.lock().unwrap().get(&signal) {
                            for handler in handlers {
                                handler(signal);
                            }
                        }

                        if !shutdown_flag.load(Ordering::SeqCst) {
                            shutdown_flag.store(true, Ordering::SeqCst);
                        } else {
                            tracing::warn!(signal, "received second signal, forcing exit");
                            std::process::exit(1);
                        }
                    }
                    _ => unreachable!("Signals was only registered for SIGINT/SIGTERM/SIGHUP"),
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_callback_stores_under_signal_key() {
        let mut handler = SignalHandler::new(Arc::new(AtomicBool::new(false)));
        handler.register_callback(SIGINT, |_| {});
        assert_eq!(handler.callbacks.lock().unwrap().get(&SIGINT).map(|v| v.len()), Some(1));
    }
}
