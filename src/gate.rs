use std::sync::{Condvar, Mutex, MutexGuard};

use log::trace;

#[derive(Debug, Default)]
struct State {
    arrived: usize,
    open: bool,
}

/// Single-use start signal for one iteration.
///
/// Workers park in [`wait`](Self::wait); the harness waits for all of them to
/// arrive, starts its clock and [`open`](Self::open)s the gate.
#[derive(Debug, Default)]
pub struct StartGate {
    state: Mutex<State>,
    changed: Condvar,
}

impl StartGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // State is two plain fields, a poisoned lock still holds valid data.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn wait(&self) {
        let mut state = self.lock();
        state.arrived += 1;
        self.changed.notify_all();
        while !state.open {
            state = self.changed.wait(state).unwrap_or_else(|e| e.into_inner());
        }
    }

    pub fn await_arrivals(&self, count: usize) {
        let mut state = self.lock();
        while state.arrived < count && !state.open {
            state = self.changed.wait(state).unwrap_or_else(|e| e.into_inner());
        }
        trace!("{} workers parked at the gate", state.arrived);
    }

    pub fn open(&self) {
        let mut state = self.lock();
        state.open = true;
        self.changed.notify_all();
    }

    #[cfg(test)]
    pub fn is_open(&self) -> bool {
        self.lock().open
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn nobody_passes_before_open() {
        let gate = StartGate::new();
        let passed = AtomicUsize::new(0);

        thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    gate.wait();
                    passed.fetch_add(1, Ordering::SeqCst);
                });
            }

            gate.await_arrivals(8);
            thread::sleep(Duration::from_millis(20));
            assert_eq!(passed.load(Ordering::SeqCst), 0);
            assert!(!gate.is_open());

            gate.open();
        });

        assert_eq!(passed.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn wait_after_open_returns_immediately() {
        let gate = StartGate::new();
        gate.open();
        gate.open();
        gate.wait();
        assert!(gate.is_open());
    }

    #[test]
    fn await_arrivals_returns_once_gate_is_open() {
        let gate = StartGate::new();
        gate.open();
        gate.await_arrivals(3);
    }
}
