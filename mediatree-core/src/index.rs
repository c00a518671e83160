//! Helpers shared by the per-format sample index builders.

use crate::config::ParseOptions;
use crate::error::IndexError;
use crate::media::{Sample, Track};
use crate::params::{NalConfig, ParameterSetKind};
use crate::walker::Walk;

/// Sample vector sized for `count` entries. A declared count of zero still
/// gets room for one.
pub(crate) fn allocate(count: u64, options: &ParseOptions) -> Result<Vec<Sample>, IndexError> {
    check_limit(count, options)?;
    let mut samples = Vec::new();
    samples
        .try_reserve_exact(count.max(1) as usize)
        .map_err(|_| IndexError::Allocation(count))?;
    Ok(samples)
}

pub(crate) fn check_limit(count: u64, options: &ParseOptions) -> Result<(), IndexError> {
    if count > options.max_samples_per_track {
        return Err(IndexError::TooManySamples {
            count,
            limit: options.max_samples_per_track,
        });
    }
    Ok(())
}

/// Append for builders that discover samples one at a time.
pub(crate) fn push_sample(
    samples: &mut Vec<Sample>,
    sample: Sample,
    options: &ParseOptions,
) -> Result<(), IndexError> {
    check_limit(samples.len() as u64 + 1, options)?;
    samples
        .try_reserve(1)
        .map_err(|_| IndexError::Allocation(samples.len() as u64 + 1))?;
    samples.push(sample);
    Ok(())
}

/// Containers that only store presentation times (Matroska, ASF): the decode
/// time of the n-th sample is the n-th smallest presentation time.
pub(crate) fn decode_times_from_pts(samples: &mut [Sample]) {
    let mut times: Vec<i64> = samples.iter().filter_map(|s| s.pts).collect();
    times.sort_unstable();
    let mut times = times.into_iter();
    for sample in samples.iter_mut().filter(|s| s.pts.is_some()) {
        sample.dts = times.next();
    }
}

/// Put the track's parameter sets in front of its media samples. They count
/// against the per-track limit like any other entry.
pub(crate) fn with_parameter_sets(
    track: &Track,
    samples: Vec<Sample>,
    options: &ParseOptions,
) -> Result<Vec<Sample>, IndexError> {
    if !options.inject_parameter_sets || track.parameter_sets.is_empty() {
        return Ok(samples);
    }
    let total = samples.len() as u64 + track.parameter_sets.len() as u64;
    let mut out = allocate(total, options)?;
    for set in &track.parameter_sets {
        out.push(Sample::parameter_set(set.range)?);
    }
    out.extend(samples);
    Ok(out)
}

/// Record a decoder configuration on `track` and hand its SPS units to the
/// injected decoder, if any.
pub(crate) fn attach_nal_config(walk: &Walk<'_>, track: &mut Track, config: NalConfig) {
    let codec = track.codec;
    let id = track.id;
    let video = track.video_mut();
    video.profile = Some(config.profile);
    video.level = Some(config.level);

    if let Some(decoder) = walk.decoder() {
        for set in config.sets.iter().filter(|s| s.kind == ParameterSetKind::Sps) {
            if let Some(nal) = walk.cursor.slice(set.range.offset, set.range.size) {
                if !decoder.decode_sps(codec, &nal, video) {
                    tracing::debug!(track = id, "parameter set decoder declined SPS");
                }
            }
        }
    }

    track.parameter_sets = config.sets;
}
