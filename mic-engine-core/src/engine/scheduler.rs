use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// A named thread invoking a closure at a fixed cadence until cancelled.
///
/// Both the analysis tick and the watchdog tick run as independent
/// `PeriodicTask`s so either can be cancelled without touching the other.
/// The cadence is a target, not a guarantee; a slow tick simply delays the
/// next one.
pub struct PeriodicTask {
    running: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl PeriodicTask {
    pub fn spawn<F>(name: &str, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);

        let handle = thread::Builder::new()
            .name(name.into())
            .spawn(move || {
                while flag.load(Ordering::SeqCst) {
                    thread::sleep(period);
                    if !flag.load(Ordering::SeqCst) {
                        break;
                    }
                    tick();
                }
            })
            .unwrap_or_else(|e| panic!("failed to spawn {} thread: {}", name, e));

        Self {
            running,
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the task and wait for the in-flight tick, if any, to finish.
    pub fn cancel(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.cancel();
    }
}
