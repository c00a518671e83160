//! MP4 sample table data structures and their reduction to a sample index.

use crate::config::ParseOptions;
use crate::error::IndexError;
use crate::index;
use crate::media::{native_to_ticks, Sample};

/// `sdtp` sample_depends_on value of an independently decodable sample.
const DEPENDS_ON_NONE: u8 = 2;

#[derive(Debug, Clone, Default)]
pub struct SampleTable {
    /// Constant sample size from `stsz`, 0 when sizes are listed.
    pub sample_size: u32,
    pub sample_count: u32,
    /// Set once `stsz` or `stz2` has been read.
    pub has_sizes: bool,
    pub sample_sizes: Vec<u32>,
    pub chunk_offsets: Vec<u64>,
    pub sample_to_chunk: Vec<(u32, u32, u32)>, // first_chunk, samples_per_chunk, sample_desc_index
    pub time_to_sample: Vec<(u32, u32)>,       // sample_count, sample_delta
    pub composition_offsets: Vec<(u32, i32)>,  // sample_count, offset
    pub sync_samples: Option<Vec<u32>>,        // 1-based sample numbers
    pub dependencies: Option<Vec<u8>>,         // sdtp sample_depends_on per sample
}

/// Expands `(count, value)` runs one sample at a time. Once the runs are
/// exhausted the last value repeats.
struct Runs<'a, T> {
    runs: &'a [(u32, T)],
    index: usize,
    used: u32,
    last: T,
}

impl<'a, T: Copy + Default> Runs<'a, T> {
    fn new(runs: &'a [(u32, T)]) -> Self {
        Self {
            runs,
            index: 0,
            used: 0,
            last: T::default(),
        }
    }

    fn next_value(&mut self) -> T {
        while let Some(&(count, value)) = self.runs.get(self.index) {
            if self.used < count {
                self.used += 1;
                self.last = value;
                return value;
            }
            self.index += 1;
            self.used = 0;
        }
        self.last
    }
}

impl SampleTable {
    fn size_of(&self, sample: u32) -> u32 {
        if self.sample_size != 0 {
            self.sample_size
        } else {
            self.sample_sizes.get(sample as usize).copied().unwrap_or(0)
        }
    }

    fn is_sync(&self, sample: u32, sync_list: Option<&[u32]>) -> bool {
        if let Some(list) = sync_list {
            return list.binary_search(&(sample + 1)).is_ok();
        }
        match &self.dependencies {
            Some(deps) => deps
                .get(sample as usize)
                .map_or(true, |&d| d == DEPENDS_ON_NONE),
            None => true,
        }
    }

    /// Interleave the chunk runs against the chunk offsets and attach
    /// timestamps. A chunk table that cannot place every sample fails the
    /// whole track.
    pub fn build(&self, timescale: u32, options: &ParseOptions) -> Result<Vec<Sample>, IndexError> {
        if !self.has_sizes {
            return Err(IndexError::MissingTable("stsz"));
        }
        let count = self.sample_count;
        if count > 0 && self.chunk_offsets.is_empty() {
            return Err(IndexError::MissingTable("stco"));
        }
        if count > 0 && self.sample_to_chunk.is_empty() {
            return Err(IndexError::MissingTable("stsc"));
        }
        if self.sample_size == 0 && (self.sample_sizes.len() as u64) < count as u64 {
            return Err(IndexError::Inconsistent(format!(
                "stsz lists {} sizes for {} samples",
                self.sample_sizes.len(),
                count
            )));
        }

        let mut samples = index::allocate(count as u64, options)?;
        let mut deltas = Runs::new(&self.time_to_sample);
        let mut cts = Runs::new(&self.composition_offsets);
        let sync_list = self.sync_samples.as_ref().map(|list| {
            let mut list = list.clone();
            list.sort_unstable();
            list
        });
        let timescale = timescale as u64;
        let chunk_count = self.chunk_offsets.len() as u64;

        let mut dts: i64 = 0;
        let mut sample: u32 = 0;

        'runs: for (k, &(first_chunk, per_chunk, _)) in self.sample_to_chunk.iter().enumerate() {
            let next_first = self
                .sample_to_chunk
                .get(k + 1)
                .map_or(chunk_count + 1, |next| next.0 as u64)
                .min(chunk_count + 1);

            for chunk in (first_chunk.max(1) as u64)..next_first {
                let mut offset = self.chunk_offsets[chunk as usize - 1];
                for _ in 0..per_chunk {
                    if sample >= count {
                        break 'runs;
                    }
                    let size = self.size_of(sample);
                    let pts = dts + cts.next_value() as i64;
                    samples.push(Sample::frame(
                        offset,
                        size,
                        self.is_sync(sample, sync_list.as_deref()),
                        native_to_ticks(dts, timescale),
                        native_to_ticks(pts, timescale),
                    ));
                    dts += deltas.next_value() as i64;
                    offset = offset.saturating_add(size as u64);
                    sample += 1;
                }
            }
        }

        if sample < count {
            return Err(IndexError::Inconsistent(format!(
                "chunk table places {} of {} samples",
                sample, count
            )));
        }
        Ok(samples)
    }
}
