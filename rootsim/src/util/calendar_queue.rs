//! Calendar queue.
//!
//! The classical priority queue for pending events of R. Brown, "Calendar
//! Queues: A Fast O(1) Priority Queue Implementation for the Simulation Event
//! Set Problem", CACM 31(10), 1988. Items are spread over an array of buckets
//! (the days of a year) by `timestamp / width modulo nbuckets`; the bucket
//! count doubles or halves as the queue grows or shrinks, and the bucket width
//! is resampled from the queue at each resize.
//!
//! # Contract
//!
//! Inserting an item with a timestamp *earlier* than the last extracted one is
//! outside the contract of the queue: the dequeue cursor only moves forward,
//! so such an item may be returned out of order. The queue does not attempt to
//! detect or repair this; callers must guarantee that insertions never regress
//! below the last dequeued timestamp.
use std::collections::VecDeque;

use crate::time::SimTime;

const MIN_BUCKETS: usize = 2;
const MAX_BUCKETS: usize = 1 << 20;
const MAX_SAMPLES: usize = 25;

/// A self-tuning priority queue keyed by [`SimTime`], FIFO among ties.
pub(crate) struct CalendarQueue<T> {
    buckets: Vec<VecDeque<(SimTime, T)>>,
    width: f64,
    size: usize,
    last_bucket: usize,
    bucket_top: f64,
    last_prio: f64,
    top_threshold: usize,
    bot_threshold: usize,
    resize_enabled: bool,
}

impl<T> CalendarQueue<T> {
    pub(crate) fn new() -> Self {
        let mut queue = Self {
            buckets: Vec::new(),
            width: 1.0,
            size: 0,
            last_bucket: 0,
            bucket_top: 0.0,
            last_prio: 0.0,
            top_threshold: 0,
            bot_threshold: 0,
            resize_enabled: true,
        };
        queue.local_init(MIN_BUCKETS, 1.0, 0.0);

        queue
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.size
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Sets up an empty calendar of `nbuckets` buckets of the given width,
    /// with the dequeue cursor placed at `start`.
    fn local_init(&mut self, nbuckets: usize, width: f64, start: f64) {
        self.buckets = (0..nbuckets).map(|_| VecDeque::new()).collect();
        self.width = width;
        self.size = 0;
        self.last_prio = start;

        let n = (start / width) as u64;
        self.last_bucket = (n % nbuckets as u64) as usize;
        self.bucket_top = (n + 1) as f64 * width + 0.5 * width;

        self.bot_threshold = (nbuckets / 2).saturating_sub(2);
        self.top_threshold = 2 * nbuckets;
    }

    fn bucket_of(&self, timestamp: SimTime) -> usize {
        let virtual_bucket = (timestamp.as_f64() / self.width).round() as u64;

        (virtual_bucket % self.buckets.len() as u64) as usize
    }

    /// Inserts an item.
    ///
    /// The timestamp must not be earlier than the last dequeued one.
    pub(crate) fn put(&mut self, timestamp: SimTime, item: T) {
        let i = self.bucket_of(timestamp);
        let bucket = &mut self.buckets[i];

        // Keep buckets sorted, after any item with an equal timestamp.
        let pos = bucket.partition_point(|(t, _)| *t <= timestamp);
        bucket.insert(pos, (timestamp, item));
        self.size += 1;

        if self.size > self.top_threshold && self.buckets.len() < MAX_BUCKETS {
            self.resize(2 * self.buckets.len());
        }
    }

    /// Extracts the item with the lowest timestamp.
    pub(crate) fn get(&mut self) -> Option<(SimTime, T)> {
        let item = self.dequeue()?;

        if self.size < self.bot_threshold {
            self.resize(self.buckets.len() / 2);
        }

        Some(item)
    }

    /// Returns the lowest timestamp without extracting it.
    pub(crate) fn peek_time(&self) -> Option<SimTime> {
        self.buckets
            .iter()
            .filter_map(|bucket| bucket.front().map(|(t, _)| *t))
            .min()
    }

    fn dequeue(&mut self) -> Option<(SimTime, T)> {
        if self.size == 0 {
            return None;
        }

        let nbuckets = self.buckets.len();
        let mut i = self.last_bucket;
        loop {
            if let Some((t, _)) = self.buckets[i].front() {
                if t.as_f64() < self.bucket_top {
                    return self.take_from(i);
                }
            }
            i += 1;
            if i == nbuckets {
                i = 0;
            }
            self.bucket_top += self.width;
            if i == self.last_bucket {
                break;
            }
        }

        // A whole year went by without a hit: search directly for the minimum
        // and move the cursor there.
        let mut lowest: Option<(usize, SimTime)> = None;
        for (j, bucket) in self.buckets.iter().enumerate() {
            if let Some((t, _)) = bucket.front() {
                if lowest.map_or(true, |(_, l)| *t < l) {
                    lowest = Some((j, *t));
                }
            }
        }
        let (j, t) = lowest?;
        let n = (t.as_f64() / self.width) as u64;
        self.bucket_top = (n + 1) as f64 * self.width + 0.5 * self.width;

        self.take_from(j)
    }

    fn take_from(&mut self, i: usize) -> Option<(SimTime, T)> {
        let item = self.buckets[i].pop_front()?;
        self.last_bucket = i;
        self.last_prio = item.0.as_f64();
        self.size -= 1;

        Some(item)
    }

    /// Estimates a bucket width yielding about three items per bucket, from
    /// the separation of the earliest items of the queue.
    fn new_width(&mut self) -> f64 {
        if self.size < 2 {
            return 1.0;
        }
        let nsamples = if self.size <= 5 {
            self.size
        } else {
            (5 + self.size / 10).min(MAX_SAMPLES)
        };

        // Sampling dequeues items: save and restore the cursor around it.
        let saved = (self.last_bucket, self.last_prio, self.bucket_top);
        self.resize_enabled = false;

        let mut samples = Vec::with_capacity(nsamples);
        for _ in 0..nsamples {
            if let Some(item) = self.dequeue() {
                samples.push(item);
            }
        }
        let times: Vec<f64> = samples.iter().map(|(t, _)| t.as_f64()).collect();
        for (t, item) in samples.into_iter().rev() {
            self.reinsert_front(t, item);
        }

        (self.last_bucket, self.last_prio, self.bucket_top) = saved;
        self.resize_enabled = true;

        let gaps: Vec<f64> = times.windows(2).map(|w| w[1] - w[0]).collect();
        if gaps.is_empty() {
            return self.width;
        }
        let average = gaps.iter().sum::<f64>() / gaps.len() as f64;

        // Recompute the average ignoring large separations.
        let small: Vec<f64> = gaps.into_iter().filter(|g| *g < average * 2.0).collect();
        let width = if small.is_empty() {
            0.0
        } else {
            3.0 * small.iter().sum::<f64>() / small.len() as f64
        };

        if width > 0.0 && width.is_finite() {
            width
        } else {
            // All samples share the same timestamp: keep the current width.
            self.width
        }
    }

    /// Puts a sampled item back ahead of any item with an equal timestamp,
    /// preserving the FIFO order among ties.
    fn reinsert_front(&mut self, timestamp: SimTime, item: T) {
        let i = self.bucket_of(timestamp);
        let bucket = &mut self.buckets[i];
        let pos = bucket.partition_point(|(t, _)| *t < timestamp);
        bucket.insert(pos, (timestamp, item));
        self.size += 1;
    }

    /// Copies the queue onto a calendar with `new_size` buckets.
    fn resize(&mut self, new_size: usize) {
        if !self.resize_enabled {
            return;
        }
        let new_size = new_size.clamp(MIN_BUCKETS, MAX_BUCKETS);
        let width = self.new_width();

        let old = std::mem::take(&mut self.buckets);
        let last_prio = self.last_prio;
        self.local_init(new_size, width, last_prio);

        // Items of a bucket are in timestamp order and ties across buckets
        // cannot occur, so re-putting them preserves the FIFO order of ties.
        for bucket in old {
            for (t, item) in bucket {
                let i = self.bucket_of(t);
                self.buckets[i].push_back((t, item));
                self.size += 1;
            }
        }
    }
}

impl<T> Default for CalendarQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
