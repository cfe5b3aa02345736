//! Fixed-capacity circular sample buffer with running aggregates.
//!
//! Every miner stores its per-tick derived values in a `TimeSeries`. The
//! rendering layer only ever reads through [`TimeSeries::ordered_snapshot`]
//! or the aggregate accessors; all mutation happens on the sampling side.
//!
//! Aggregates (`min`/`max`/`sum`) cover only samples that were actually
//! appended (or written by `set_all`). Slots left unwritten after `new` or a
//! growing `resize` are zero in storage but excluded from aggregates via the
//! `filled` count.

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombineOp {
    Add,
    Subtract,
}

impl CombineOp {
    fn apply(self, a: f32, b: f32) -> f32 {
        match self {
            CombineOp::Add => a + b,
            CombineOp::Subtract => a - b,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TimeSeries {
    values: Vec<f32>,
    // Next write position.
    current_index: usize,
    // Number of slots holding appended data (<= capacity).
    filled: usize,
    min: f32,
    max: f32,
    sum: f32,
}

impl TimeSeries {
    pub fn new(capacity: usize) -> Self {
        Self {
            values: vec![0.0; capacity],
            current_index: 0,
            filled: 0,
            min: 0.0,
            max: 0.0,
            sum: 0.0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.values.len()
    }

    /// Number of real (appended) samples currently held.
    pub fn len(&self) -> usize {
        self.filled
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    pub fn min(&self) -> f32 {
        self.min
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    pub fn sum(&self) -> f32 {
        self.sum
    }

    pub fn average(&self) -> f32 {
        if self.filled == 0 {
            return 0.0;
        }
        self.sum / self.filled as f32
    }

    /// Most recently appended value, or zero when nothing has been sampled.
    pub fn current(&self) -> f32 {
        if self.filled == 0 || self.values.is_empty() {
            return 0.0;
        }
        let cap = self.capacity();
        self.values[(self.current_index + cap - 1) % cap]
    }

    /// Append one sample, overwriting the oldest slot when full.
    pub fn append(&mut self, value: f32) {
        let cap = self.capacity();
        if cap == 0 {
            return;
        }
        if self.filled < cap {
            self.values[self.current_index] = value;
            self.current_index = (self.current_index + 1) % cap;
            if self.filled == 0 {
                self.min = value;
                self.max = value;
            } else {
                self.min = self.min.min(value);
                self.max = self.max.max(value);
            }
            self.sum += value;
            self.filled += 1;
            return;
        }

        // Full: evict the sample at the cursor.
        let evicted = self.values[self.current_index];
        self.values[self.current_index] = value;
        self.current_index = (self.current_index + 1) % cap;
        self.sum += value - evicted;
        if value <= self.min {
            self.min = value;
        }
        if value >= self.max {
            self.max = value;
        }
        // The evicted sample may have been the extremum; rescan when so.
        if evicted <= self.min || evicted >= self.max {
            self.rescan_extrema();
        }
    }

    /// Overwrite every slot with `value` and reset aggregates to match.
    pub fn set_all(&mut self, value: f32) {
        let cap = self.capacity();
        for v in &mut self.values {
            *v = value;
        }
        self.current_index = 0;
        self.filled = cap;
        self.min = value;
        self.max = value;
        self.sum = value * cap as f32;
    }

    /// Change capacity. Shrinking keeps the most recent samples; growing
    /// preserves everything and leaves the new oldest positions as zero
    /// padding (excluded from aggregates until overwritten by appends).
    pub fn resize(&mut self, new_capacity: usize) {
        if new_capacity == self.capacity() {
            return;
        }
        let snapshot = self.ordered_snapshot();
        let keep = snapshot.len().min(new_capacity);
        let tail = &snapshot[snapshot.len() - keep..];

        let mut values = vec![0.0; new_capacity];
        values[..keep].copy_from_slice(tail);
        self.values = values;
        self.filled = keep;
        self.current_index = if new_capacity == 0 { 0 } else { keep % new_capacity };
        self.recompute_aggregates();
    }

    /// Element-wise combine with a series of equal capacity, aligned
    /// chronologically from the newest sample backwards. Used to derive
    /// series such as total bandwidth = rx + tx.
    pub fn combine(&mut self, other: &TimeSeries, op: CombineOp) -> Result<()> {
        if self.capacity() != other.capacity() {
            debug_assert!(
                false,
                "combining series of capacities {} and {}",
                self.capacity(),
                other.capacity()
            );
            return Err(EngineError::CapacityMismatch {
                left: self.capacity(),
                right: other.capacity(),
            });
        }
        let a = self.ordered_snapshot();
        let b = other.ordered_snapshot();
        let n = a.len().min(b.len());
        let cap = self.capacity();

        let mut values = vec![0.0; cap];
        for i in 0..n {
            let x = a[a.len() - n + i];
            let y = b[b.len() - n + i];
            values[i] = op.apply(x, y);
        }
        self.values = values;
        self.filled = n;
        self.current_index = if cap == 0 { 0 } else { n % cap };
        self.recompute_aggregates();
        Ok(())
    }

    /// Divide every sample by `divisor` (per-core averaging, unit scaling).
    pub fn scale(&mut self, divisor: f32) {
        if divisor == 0.0 {
            debug_assert!(false, "scaling a time series by zero");
            return;
        }
        for v in &mut self.values {
            *v /= divisor;
        }
        self.recompute_aggregates();
    }

    /// Samples oldest-to-newest. The one read path used by rendering; never
    /// mutates.
    pub fn ordered_snapshot(&self) -> Vec<f32> {
        let cap = self.capacity();
        let mut out = Vec::with_capacity(self.filled);
        if cap == 0 {
            return out;
        }
        let start = (self.current_index + cap - self.filled) % cap;
        for i in 0..self.filled {
            out.push(self.values[(start + i) % cap]);
        }
        out
    }

    fn rescan_extrema(&mut self) {
        let cap = self.capacity();
        if cap == 0 || self.filled == 0 {
            self.min = 0.0;
            self.max = 0.0;
            return;
        }
        let snapshot_iter = {
            let start = (self.current_index + cap - self.filled) % cap;
            (0..self.filled).map(move |i| (start + i) % cap)
        };
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        for idx in snapshot_iter {
            let v = self.values[idx];
            min = min.min(v);
            max = max.max(v);
        }
        self.min = min;
        self.max = max;
    }

    fn recompute_aggregates(&mut self) {
        self.rescan_extrema();
        let cap = self.capacity();
        if cap == 0 || self.filled == 0 {
            self.sum = 0.0;
            return;
        }
        let start = (self.current_index + cap - self.filled) % cap;
        self.sum = (0..self.filled)
            .map(|i| self.values[(start + i) % cap])
            .sum();
    }
}
