//! Bottom-half channel.
//!
//! Every LP has one multi-producer, single-consumer channel into which other
//! LPs deliver their messages. The channel is double-buffered: producers append
//! to the live buffer under a short lock, while the worker owning the LP swaps
//! the live buffer with an empty spare one and drains the retrieved messages
//! outside of the critical section.
//!
//! The order of the messages sent by each producer is preserved.
use crate::loom_exports::sync::atomic::{AtomicUsize, Ordering};
use crate::loom_exports::sync::{Mutex, PoisonError};

/// A double-buffered MPSC channel.
pub(crate) struct Channel<T> {
    live: Mutex<Vec<T>>,
    len: AtomicUsize,
}

impl<T> Channel<T> {
    pub(crate) fn new() -> Self {
        Self {
            live: Mutex::new(Vec::new()),
            len: AtomicUsize::new(0),
        }
    }

    /// Appends a message to the live buffer.
    pub(crate) fn send(&self, msg: T) {
        let mut live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
        live.push(msg);
        self.len.store(live.len(), Ordering::Release);
    }

    /// Swaps the live buffer with `spare`, which must be empty.
    ///
    /// After the call, `spare` contains all messages sent since the last swap,
    /// in sending order.
    pub(crate) fn swap(&self, spare: &mut Vec<T>) {
        debug_assert!(spare.is_empty());

        // Fast path: there is nothing to retrieve.
        if self.len.load(Ordering::Acquire) == 0 {
            return;
        }
        let mut live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::swap(&mut *live, spare);
        self.len.store(0, Ordering::Release);
    }
}

impl<T> Default for Channel<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(all(test, not(rootsim_loom)))]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn channel_preserves_producer_order() {
        const PRODUCERS: usize = 4;
        const MSGS: usize = 10_000;

        let channel = Arc::new(Channel::new());
        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let channel = channel.clone();
                thread::spawn(move || {
                    for i in 0..MSGS {
                        channel.send((p, i));
                    }
                })
            })
            .collect();

        let mut next = [0; PRODUCERS];
        let mut spare = Vec::new();
        let mut received = 0;
        while received < PRODUCERS * MSGS {
            channel.swap(&mut spare);
            for (p, i) in spare.drain(..) {
                assert_eq!(next[p], i);
                next[p] += 1;
                received += 1;
            }
        }
        for p in producers {
            p.join().unwrap();
        }
        channel.swap(&mut spare);
        assert!(spare.is_empty());
    }
}

#[cfg(all(test, rootsim_loom))]
mod tests {
    use loom::thread;

    use super::*;
    use crate::loom_exports::sync::Arc;

    #[test]
    fn loom_channel_two_producers() {
        loom::model(|| {
            let channel = Arc::new(Channel::new());

            let th: Vec<_> = (0..2)
                .map(|p| {
                    let channel = channel.clone();
                    thread::spawn(move || {
                        channel.send((p, 0));
                        channel.send((p, 1));
                    })
                })
                .collect();

            let mut next = [0; 2];
            let mut spare = Vec::new();
            channel.swap(&mut spare);
            for (p, i) in spare.drain(..) {
                assert_eq!(next[p], i);
                next[p] += 1;
            }

            for th in th {
                th.join().unwrap();
            }

            channel.swap(&mut spare);
            for (p, i) in spare.drain(..) {
                assert_eq!(next[p], i);
                next[p] += 1;
            }
            assert_eq!(next, [2, 2]);
        });
    }
}
