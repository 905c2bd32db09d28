use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default number of samples kept in the sliding window.
pub const DEFAULT_CAPACITY: usize = 300;

/// Basic typed time series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    /// Uniform sampling frequency in Hz
    pub fs: f64,
    /// Samples
    pub data: Vec<f64>,
}

impl TimeSeries {
    pub fn len(&self) -> usize {
        self.data.len()
    }
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
    pub fn duration(&self) -> f64 {
        self.data.len() as f64 / self.fs
    }
}

/// Bounded FIFO window of raw samples, newest last.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl Default for SampleBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl SampleBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append one sample, evicting the oldest once the window is full.
    pub fn append(&mut self, sample: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn snapshot(&self) -> Vec<f64> {
        self.samples.iter().copied().collect()
    }

    pub fn to_time_series(&self, fs: f64) -> TimeSeries {
        TimeSeries {
            fs,
            data: self.snapshot(),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Trailing moving average: `out[i]` is the mean of the last `window` samples up to and
/// including `i`, or of every sample so far near the start of the signal.
///
/// The trailing form delays every trough by the same `(window - 1) / 2` samples, so the
/// spacing between troughs is untouched.
pub fn smooth(signal: &[f64], window: usize) -> Vec<f64> {
    if signal.is_empty() {
        return Vec::new();
    }
    if window <= 1 {
        return signal.to_vec();
    }
    let mut out = Vec::with_capacity(signal.len());
    let mut acc = 0.0;
    for (i, &sample) in signal.iter().enumerate() {
        acc += sample;
        if i >= window {
            acc -= signal[i - window];
        }
        let count = (i + 1).min(window);
        out.push(acc / count as f64);
    }
    out
}

/// A trough in the pulse waveform, used as the per-beat timing marker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Valley {
    /// Position in the buffer at detection time.
    pub index: usize,
    /// Smoothed signal value at the trough.
    pub value: f64,
    /// Seconds since the Unix epoch, back-dated from the detection instant.
    pub time: f64,
}

impl Valley {
    /// Synthesise the timestamp of a trough found at `index` in a buffer of `len` samples.
    pub fn at(index: usize, value: f64, len: usize, fs: f64, now: f64) -> Self {
        let age = (len - index.min(len)) as f64 / fs;
        Self {
            index,
            value,
            time: now - age,
        }
    }
}

/// Successive valley-to-valley gaps in seconds.
///
/// Gaps come from buffer indices, not timestamps; every valley in the list must come
/// from the same buffer snapshot sampled at `fs`.
pub fn valley_intervals_s(valleys: &[Valley], fs: f64) -> Vec<f64> {
    valleys
        .windows(2)
        .map(|w| index_gap(&w[0], &w[1]) / fs)
        .collect()
}

/// Successive valley-to-valley gaps in milliseconds (RR intervals).
pub fn valley_intervals_ms(valleys: &[Valley], fs: f64) -> Vec<f64> {
    valleys
        .windows(2)
        .map(|w| index_gap(&w[0], &w[1]) * 1000.0 / fs)
        .collect()
}

fn index_gap(a: &Valley, b: &Valley) -> f64 {
    b.index as f64 - a.index as f64
}
