//! Binned aggregation of a field over a time range.
//!
//! The range `[start, end]` is split into `num_bins` equal bins. Every
//! sample updates the running sums of its bin:
//!
//! ```text
//!   bin = floor((t - start) / bin_width)      t == end lands in the last bin
//!   mean = sum1 / sum0
//!   rms  = sqrt(max(0, sum2 / sum0 - mean²))
//! ```

use crate::error::Result;
use crate::store::{HistoryStore, ReadRequest, SampleSink};

/// Statistics of one bin. Empty bins report zeros.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Bin {
    /// Number of samples.
    pub count: u64,
    /// Arithmetic mean.
    pub mean: f64,
    /// Standard deviation around the mean.
    pub rms: f64,
    /// Smallest value.
    pub min: f64,
    /// Largest value.
    pub max: f64,
}

/// Result of a binned read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BinnedResult {
    /// One entry per bin, in time order.
    pub bins: Vec<Bin>,
    /// Time of the last sample, 0 if there was none.
    pub last_time: u32,
    /// Value of the last sample.
    pub last_value: f64,
}

/// Running bin accumulators, fed as a [`SampleSink`].
///
/// # Examples
///
/// ```rust,ignore
/// use alopex_hstore::binned::BinnedBuffer;
/// use alopex_hstore::store::SampleSink;
///
/// let mut buffer = BinnedBuffer::new(0, 100, 2);
/// buffer.add(10, 1.0);
/// buffer.add(60, 3.0);
/// let result = buffer.finish();
/// assert_eq!(result.bins[1].mean, 3.0);
/// ```
#[derive(Debug, Clone)]
pub struct BinnedBuffer {
    start: u32,
    end: u32,
    bin_width: f64,
    sum0: Vec<f64>,
    sum1: Vec<f64>,
    sum2: Vec<f64>,
    min: Vec<f64>,
    max: Vec<f64>,
    last_time: u32,
    last_value: f64,
}

impl BinnedBuffer {
    /// Creates empty accumulators for `num_bins` bins over `[start, end]`.
    pub fn new(start: u32, end: u32, num_bins: usize) -> Self {
        let span = f64::from(end.saturating_sub(start));
        let bin_width = if num_bins == 0 { 0.0 } else { span / num_bins as f64 };
        Self {
            start,
            end,
            bin_width,
            sum0: vec![0.0; num_bins],
            sum1: vec![0.0; num_bins],
            sum2: vec![0.0; num_bins],
            min: vec![0.0; num_bins],
            max: vec![0.0; num_bins],
            last_time: 0,
            last_value: 0.0,
        }
    }

    /// Number of bins.
    pub fn num_bins(&self) -> usize {
        self.sum0.len()
    }

    fn bin_of(&self, time: u32) -> Option<usize> {
        let last = self.num_bins().checked_sub(1)?;
        if time < self.start || time > self.end {
            return None;
        }
        if self.bin_width <= 0.0 {
            return Some(0);
        }
        let bin = (f64::from(time - self.start) / self.bin_width).floor() as usize;
        Some(bin.min(last))
    }

    /// Derives per-bin statistics.
    pub fn finish(self) -> BinnedResult {
        let bins = (0..self.num_bins())
            .map(|i| {
                let count = self.sum0[i];
                if count == 0.0 {
                    return Bin::default();
                }
                let mean = self.sum1[i] / count;
                let variance = self.sum2[i] / count - mean * mean;
                Bin {
                    count: count as u64,
                    mean,
                    rms: variance.max(0.0).sqrt(),
                    min: self.min[i],
                    max: self.max[i],
                }
            })
            .collect();
        BinnedResult {
            bins,
            last_time: self.last_time,
            last_value: self.last_value,
        }
    }
}

impl SampleSink for BinnedBuffer {
    fn add(&mut self, time: u32, value: f64) {
        let Some(bin) = self.bin_of(time) else {
            return;
        };
        if self.sum0[bin] == 0.0 {
            self.min[bin] = value;
            self.max[bin] = value;
        } else {
            self.min[bin] = self.min[bin].min(value);
            self.max[bin] = self.max[bin].max(value);
        }
        self.sum0[bin] += 1.0;
        self.sum1[bin] += value;
        self.sum2[bin] += value * value;
        self.last_time = time;
        self.last_value = value;
    }
}

impl HistoryStore {
    /// Reads one field into `num_bins` equal time bins.
    ///
    /// # Errors
    ///
    /// Fails like [`HistoryStore::read`].
    pub fn read_binned(&self, request: &ReadRequest, num_bins: usize) -> Result<BinnedResult> {
        let query = self.query(request);
        let resolved = request.clone().with_range(query.start, query.end);
        let mut buffer = BinnedBuffer::new(query.start, query.end, num_bins);
        self.read_with_sink(&resolved, &mut buffer)?;
        Ok(buffer.finish())
    }
}
