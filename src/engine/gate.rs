/*
ControlGate
===========

One flag, two ways in.

  render thread             control plane
  -------------             -------------
  try_render(f)             configure(f)
   |                         |
   |  compare_exchange       |  queue on `control` (blocks)
   |-- ok --> f(state)       |  compare_exchange until it sticks
   |-- busy --> None         |   (spin, then yield)
        (caller writes       |--> f(state)
         silence for the
         whole block)

The render side makes exactly one attempt per block and never waits. The
control side waits as long as it takes. Mutations never observe a block
half-rendered, and a block never observes a mutation half-applied.

Control threads queue among themselves on `control`; only they ever park
on it. The render side touches nothing but the `busy` flag, so taking or
releasing the gate there is a pair of atomic operations and never a wake-up.

Poisoning of `control` is ignored: the state is plain data and each
mutation validates before writing, so a panic cannot leave it half-updated
in a way the next caller would care about.
*/

use std::cell::UnsafeCell;
use std::hint;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;

/// Busy-wait rounds before a waiting control thread starts yielding.
const SPIN_LIMIT: u32 = 64;

#[derive(Debug, Default)]
pub struct ControlGate<T> {
    busy: AtomicBool,
    control: Mutex<()>,
    state: UnsafeCell<T>,
    contended: AtomicU64,
}

// SAFETY: `state` is only reached while holding `busy`, which admits one
// thread at a time, so sharing the gate only ever moves `T` across threads.
unsafe impl<T: Send> Send for ControlGate<T> {}
unsafe impl<T: Send> Sync for ControlGate<T> {}

/// Clears `busy` on drop, including during unwinding.
struct Held<'a>(&'a AtomicBool);

impl Drop for Held<'_> {
    #[inline]
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<T> ControlGate<T> {
    pub fn new(state: T) -> Self {
        Self {
            busy: AtomicBool::new(false),
            control: Mutex::new(()),
            state: UnsafeCell::new(state),
            contended: AtomicU64::new(0),
        }
    }

    #[inline]
    fn try_hold(&self) -> Option<Held<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| Held(&self.busy))
    }

    /// Single non-blocking attempt. `None` means the control plane holds the
    /// gate and this block must be silent.
    #[inline]
    pub fn try_render<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let Some(_held) = self.try_hold() else {
            self.contended.fetch_add(1, Ordering::Relaxed);
            return None;
        };
        // SAFETY: `_held` is the only way in until it drops.
        Some(f(unsafe { &mut *self.state.get() }))
    }

    /// Blocking acquisition for the control plane.
    pub fn configure<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let _queue = self.control.lock().unwrap_or_else(PoisonError::into_inner);
        let mut spins = 0;
        let _held = loop {
            if let Some(held) = self.try_hold() {
                break held;
            }
            if spins < SPIN_LIMIT {
                spins += 1;
                hint::spin_loop();
            } else {
                thread::yield_now();
            }
        };
        // SAFETY: as in `try_render`.
        f(unsafe { &mut *self.state.get() })
    }

    /// Blocks the render side gave up on so far.
    pub fn contention_count(&self) -> u64 {
        self.contended.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn render_side_gives_up_while_configuring() {
        let gate = Arc::new(ControlGate::new(0u32));
        let (locked_tx, locked_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let holder = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || {
                gate.configure(|value| {
                    *value += 1;
                    locked_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                });
            })
        };

        locked_rx.recv().unwrap();
        assert_eq!(gate.try_render(|value| *value), None);
        assert_eq!(gate.contention_count(), 1);

        release_tx.send(()).unwrap();
        holder.join().unwrap();
        assert_eq!(gate.try_render(|value| *value), Some(1));
        assert_eq!(gate.contention_count(), 1);
    }

    #[test]
    fn poisoned_gate_keeps_working() {
        let gate = Arc::new(ControlGate::new(vec![1, 2, 3]));
        let poisoner = Arc::clone(&gate);
        let _ = thread::spawn(move || {
            poisoner.configure(|_| panic!("control thread died"));
        })
        .join();

        assert_eq!(gate.try_render(|v| v.len()), Some(3));
        gate.configure(|v| v.push(4));
        assert_eq!(gate.configure(|v| v.len()), 4);
    }

    #[test]
    fn render_side_ignores_queued_control_threads() {
        let gate = ControlGate::new(7u32);
        // A control thread parked in the queue does not hold the state.
        let _queue = gate.control.lock().unwrap();
        assert_eq!(gate.try_render(|value| *value), Some(7));
        assert_eq!(gate.contention_count(), 0);
    }

    #[test]
    fn control_side_waits_out_a_render_block() {
        let gate = Arc::new(ControlGate::new(0u32));
        let (started_tx, started_rx) = mpsc::channel();

        let rendered = gate.try_render(|value| {
            let writer = {
                let gate = Arc::clone(&gate);
                thread::spawn(move || {
                    started_tx.send(()).unwrap();
                    gate.configure(|value| *value = 2);
                })
            };
            started_rx.recv().unwrap();
            thread::sleep(std::time::Duration::from_millis(20));
            // Still ours: the writer is spinning on the flag.
            *value += 1;
            writer
        });

        rendered.unwrap().join().unwrap();
        assert_eq!(gate.configure(|value| *value), 2);
    }

    #[test]
    fn renders_and_mutations_never_overlap() {
        let gate = Arc::new(ControlGate::new((0u64, 0u64)));
        let writers: Vec<_> = (0..3)
            .map(|_| {
                let gate = Arc::clone(&gate);
                thread::spawn(move || {
                    for _ in 0..2_000 {
                        gate.configure(|(a, b)| {
                            *a += 1;
                            *b += 1;
                        });
                    }
                })
            })
            .collect();

        let mut rendered = 0u64;
        for _ in 0..20_000 {
            if let Some(consistent) = gate.try_render(|(a, b)| a == b) {
                assert!(consistent);
                rendered += 1;
            }
        }
        for writer in writers {
            writer.join().unwrap();
        }

        assert_eq!(gate.configure(|(a, _)| *a), 6_000);
        assert_eq!(rendered + gate.contention_count(), 20_000);
    }
}
