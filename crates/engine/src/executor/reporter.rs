//! Background reporter bound to the lifetime of one step invocation.
//!
//! The reporter thread sleeps on a condition variable for one interval, runs
//! the report network, and repeats. Dropping the [`Reporter`] sets the stop
//! flag, wakes the thread, and joins it, so no thread outlives its step.

use std::{
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::network::Network;

#[derive(Default)]
struct StopSignal {
    done: Mutex<bool>,
    wake: Condvar,
}

/// Handle to a running reporter thread. Stops and joins on drop.
pub(crate) struct Reporter {
    signal: Arc<StopSignal>,
    handle: Option<JoinHandle<()>>,
}

impl Reporter {
    /// Spawn the reporter thread. Returns `None` when the thread cannot be
    /// spawned; reporting is best effort and never fails the step.
    pub(crate) fn start(step: &str, network: Arc<dyn Network>, interval: Duration) -> Option<Self> {
        let signal = Arc::new(StopSignal::default());
        let worker_signal = signal.clone();
        let step_name = step.to_string();
        let spawned = thread::Builder::new()
            .name(format!("report-{step}"))
            .spawn(move || report_loop(&step_name, network.as_ref(), interval, &worker_signal));
        match spawned {
            Ok(handle) => Some(Self {
                signal,
                handle: Some(handle),
            }),
            Err(error) => {
                warn!(step = %step, error = %error, "could not spawn reporter thread; continuing without reports");
                None
            }
        }
    }
}

impl Drop for Reporter {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        *self.signal.done.lock() = true;
        self.signal.wake.notify_all();
        if handle.join().is_err() {
            warn!("reporter thread panicked");
        }
    }
}

fn report_loop(step: &str, network: &dyn Network, interval: Duration, signal: &StopSignal) {
    let mut done = signal.done.lock();
    loop {
        match Instant::now().checked_add(interval) {
            Some(deadline) => {
                while !*done {
                    if signal.wake.wait_until(&mut done, deadline).timed_out() {
                        break;
                    }
                }
            }
            // No representable deadline: the next report would never come due.
            None => {
                while !*done {
                    signal.wake.wait(&mut done);
                }
            }
        }
        if *done {
            break;
        }
        MutexGuard::unlocked(&mut done, || {
            debug!(step = %step, net = %network.name(), "running report net");
            if let Err(error) = network.run() {
                warn!(step = %step, net = %network.name(), error = %format!("{error:#}"), "error running report net");
            }
        });
    }
    debug!(step = %step, "reporter stopped");
}
