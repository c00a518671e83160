//! Codec parameter-set location
//!
//! Finds the byte ranges of SPS/PPS/VPS NAL units inside `avcC` / `hvcC`
//! configuration records so they can be exposed as parameter-set samples.
//! The bit-level meaning of those NAL units is left to an optional
//! [`ParameterSetDecoder`].

use serde::Serialize;

use crate::codec::Codec;
use crate::media::VideoParams;
use crate::node::ByteRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParameterSetKind {
    Vps,
    Sps,
    Pps,
    /// SPS extensions, SEI and other NAL arrays carried in `hvcC`.
    Other(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ParameterSet {
    pub kind: ParameterSetKind,
    /// Absolute position of the NAL unit (without its length prefix).
    pub range: ByteRange,
}

/// What a decoder configuration record tells us without decoding NAL units.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NalConfig {
    pub profile: u8,
    pub level: u8,
    /// Size of the length prefix in front of every NAL unit in the samples.
    pub nal_length_size: u8,
    pub sets: Vec<ParameterSet>,
}

/// External decoder for SPS-style parameter sets. Called with the NAL unit
/// bytes; it fills whatever it understands into `target`.
pub trait ParameterSetDecoder: Send + Sync {
    fn decode_sps(&self, codec: Codec, nal: &[u8], target: &mut VideoParams) -> bool;
}

/// Walk an AVCDecoderConfigurationRecord. `base` is the absolute file offset
/// of `data[0]`.
///
/// ```text
/// [0] version (1)  [1] profile  [2] compat  [3] level
/// [4] 0xFC | (nal_length_size - 1)   [5] 0xE0 | num_sps
/// { u16 len, sps } * num_sps,  u8 num_pps,  { u16 len, pps } * num_pps
/// ```
pub fn locate_avcc(data: &[u8], base: u64) -> Option<NalConfig> {
    if data.len() < 7 || data[0] != 1 {
        return None;
    }

    let mut config = NalConfig {
        profile: data[1],
        level: data[3],
        nal_length_size: (data[4] & 0x03) + 1,
        sets: Vec::new(),
    };

    let num_sps = (data[5] & 0x1F) as usize;
    let mut offset = 6;
    offset = read_nal_array(data, offset, num_sps, base, ParameterSetKind::Sps, &mut config.sets)?;

    // Some muxers stop after the SPS array.
    if offset >= data.len() {
        return Some(config);
    }
    let num_pps = data[offset] as usize;
    offset += 1;
    read_nal_array(data, offset, num_pps, base, ParameterSetKind::Pps, &mut config.sets)?;

    Some(config)
}

/// Walk an HEVCDecoderConfigurationRecord (22 fixed bytes, then NAL arrays).
pub fn locate_hvcc(data: &[u8], base: u64) -> Option<NalConfig> {
    if data.len() < 23 {
        return None;
    }

    let mut config = NalConfig {
        profile: data[1] & 0x1F,
        level: data[12],
        nal_length_size: (data[21] & 0x03) + 1,
        sets: Vec::new(),
    };

    let num_arrays = data[22] as usize;
    let mut offset = 23;

    for _ in 0..num_arrays {
        if offset + 3 > data.len() {
            return None;
        }
        let nal_type = data[offset] & 0x3F;
        let num_nalus = u16::from_be_bytes([data[offset + 1], data[offset + 2]]) as usize;
        offset += 3;

        let kind = match nal_type {
            32 => ParameterSetKind::Vps,
            33 => ParameterSetKind::Sps,
            34 => ParameterSetKind::Pps,
            other => ParameterSetKind::Other(other),
        };
        offset = read_nal_array(data, offset, num_nalus, base, kind, &mut config.sets)?;
    }

    Some(config)
}

fn read_nal_array(
    data: &[u8],
    mut offset: usize,
    count: usize,
    base: u64,
    kind: ParameterSetKind,
    out: &mut Vec<ParameterSet>,
) -> Option<usize> {
    for _ in 0..count {
        if offset + 2 > data.len() {
            return None;
        }
        let len = u16::from_be_bytes([data[offset], data[offset + 1]]) as usize;
        offset += 2;
        if offset + len > data.len() {
            return None;
        }
        out.push(ParameterSet {
            kind,
            range: ByteRange::new(base + offset as u64, len as u64),
        });
        offset += len;
    }
    Some(offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locates_avcc_sets() {
        let avcc = [
            0x01, 0x64, 0x00, 0x1F, 0xFF, 0xE1, // header, 1 SPS
            0x00, 0x04, 0x67, 0x64, 0x00, 0x1F, // SPS
            0x01, // 1 PPS
            0x00, 0x02, 0x68, 0xEE, // PPS
        ];
        let cfg = locate_avcc(&avcc, 1000).expect("avcc");
        assert_eq!(cfg.profile, 0x64);
        assert_eq!(cfg.level, 0x1F);
        assert_eq!(cfg.nal_length_size, 4);
        assert_eq!(cfg.sets.len(), 2);
        assert_eq!(cfg.sets[0].kind, ParameterSetKind::Sps);
        assert_eq!(cfg.sets[0].range, ByteRange::new(1008, 4));
        assert_eq!(cfg.sets[1].kind, ParameterSetKind::Pps);
        assert_eq!(cfg.sets[1].range, ByteRange::new(1015, 2));
    }

    #[test]
    fn rejects_truncated_avcc() {
        let avcc = [0x01, 0x64, 0x00, 0x1F, 0xFF, 0xE1, 0x00, 0x09, 0x67];
        assert!(locate_avcc(&avcc, 0).is_none());
        assert!(locate_avcc(&[0x02; 8], 0).is_none());
    }

    #[test]
    fn locates_hvcc_arrays() {
        let mut hvcc = vec![0u8; 23];
        hvcc[0] = 1;
        hvcc[1] = 0x01;
        hvcc[12] = 93;
        hvcc[21] = 0x03;
        hvcc[22] = 2;
        hvcc.extend_from_slice(&[0xA0, 0x00, 0x01, 0x00, 0x02, 0x40, 0x01]); // VPS
        hvcc.extend_from_slice(&[0xA1, 0x00, 0x01, 0x00, 0x03, 0x42, 0x01, 0x01]); // SPS
        let cfg = locate_hvcc(&hvcc, 0).expect("hvcc");
        assert_eq!(cfg.level, 93);
        assert_eq!(cfg.nal_length_size, 4);
        assert_eq!(cfg.sets.len(), 2);
        assert_eq!(cfg.sets[0].kind, ParameterSetKind::Vps);
        assert_eq!(cfg.sets[0].range, ByteRange::new(28, 2));
        assert_eq!(cfg.sets[1].kind, ParameterSetKind::Sps);
        assert_eq!(cfg.sets[1].range, ByteRange::new(35, 3));
    }
}
