//! In-memory builders for small but well-formed container files.

#![allow(dead_code)]

// ============================================================================
// ISO-BMFF
// ============================================================================

pub fn mp4_box(tag: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = ((payload.len() + 8) as u32).to_be_bytes().to_vec();
    out.extend_from_slice(tag);
    out.extend_from_slice(payload);
    out
}

pub fn full_box(tag: &[u8; 4], version: u8, flags: u32, payload: &[u8]) -> Vec<u8> {
    let mut body = vec![version];
    body.extend_from_slice(&flags.to_be_bytes()[1..]);
    body.extend_from_slice(payload);
    mp4_box(tag, &body)
}

fn be32(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

pub fn ftyp() -> Vec<u8> {
    let mut p = b"isom".to_vec();
    p.extend_from_slice(&0x200u32.to_be_bytes());
    p.extend_from_slice(b"isomavc1");
    mp4_box(b"ftyp", &p)
}

#[derive(Debug, Clone)]
pub struct TrakLayout {
    pub id: u32,
    pub handler: [u8; 4],
    pub timescale: u32,
    pub time_to_sample: Vec<(u32, u32)>,
    pub sample_to_chunk: Vec<(u32, u32, u32)>,
    /// Constant size, or 0 to list `sizes`.
    pub sample_size: u32,
    pub sample_count: u32,
    pub sizes: Vec<u32>,
    pub chunk_offsets: Vec<u32>,
    pub with_stsz: bool,
}

impl TrakLayout {
    pub fn video(id: u32, sizes: &[u32]) -> Self {
        Self {
            id,
            handler: *b"vide",
            timescale: 25,
            time_to_sample: vec![(sizes.len() as u32, 1)],
            sample_to_chunk: vec![(1, sizes.len() as u32, 1)],
            sample_size: 0,
            sample_count: sizes.len() as u32,
            sizes: sizes.to_vec(),
            chunk_offsets: vec![0],
            with_stsz: true,
        }
    }

    pub fn audio(id: u32, count: u32, size: u32) -> Self {
        Self {
            id,
            handler: *b"soun",
            timescale: 8000,
            time_to_sample: vec![(count, 1024)],
            sample_to_chunk: vec![(1, count, 1)],
            sample_size: size,
            sample_count: count,
            sizes: Vec::new(),
            chunk_offsets: vec![0],
            with_stsz: true,
        }
    }
}

fn sample_entry(handler: &[u8; 4]) -> Vec<u8> {
    let mut p = vec![0u8; 6];
    p.extend_from_slice(&1u16.to_be_bytes());
    match handler {
        b"vide" => {
            p.extend_from_slice(&[0; 16]);
            p.extend_from_slice(&320u16.to_be_bytes());
            p.extend_from_slice(&240u16.to_be_bytes());
            p.extend_from_slice(&[0; 4 + 4 + 4 + 2 + 32]);
            p.extend_from_slice(&24u16.to_be_bytes());
            p.extend_from_slice(&(-1i16).to_be_bytes());
            mp4_box(b"avc1", &p)
        }
        _ => {
            p.extend_from_slice(&[0; 2 + 2 + 4]);
            p.extend_from_slice(&1u16.to_be_bytes());
            p.extend_from_slice(&16u16.to_be_bytes());
            p.extend_from_slice(&[0; 4]);
            p.extend_from_slice(&(8000u32 << 16).to_be_bytes());
            mp4_box(b"mp4a", &p)
        }
    }
}

pub fn trak(layout: &TrakLayout) -> Vec<u8> {
    let mut tkhd = vec![0u8; 8];
    tkhd.extend_from_slice(&layout.id.to_be_bytes());
    tkhd.extend_from_slice(&[0; 4 + 4 + 8 + 8 + 36]);
    let (w, h) = if &layout.handler == b"vide" { (320u32, 240u32) } else { (0, 0) };
    tkhd.extend_from_slice(&(w << 16).to_be_bytes());
    tkhd.extend_from_slice(&(h << 16).to_be_bytes());

    let mut mdhd = vec![0u8; 8];
    mdhd.extend_from_slice(&layout.timescale.to_be_bytes());
    let duration: u32 = layout.time_to_sample.iter().map(|(c, d)| c * d).sum();
    mdhd.extend_from_slice(&duration.to_be_bytes());
    mdhd.extend_from_slice(&0x55C4u16.to_be_bytes()); // "und"
    mdhd.extend_from_slice(&[0; 2]);

    let mut hdlr = vec![0u8; 4];
    hdlr.extend_from_slice(&layout.handler);
    hdlr.extend_from_slice(&[0; 12]);
    hdlr.extend_from_slice(b"Handler\0");

    let mut stsd = 1u32.to_be_bytes().to_vec();
    stsd.extend(sample_entry(&layout.handler));

    let mut stts = be32(&[layout.time_to_sample.len() as u32]);
    for &(count, delta) in &layout.time_to_sample {
        stts.extend(be32(&[count, delta]));
    }
    let mut stsc = be32(&[layout.sample_to_chunk.len() as u32]);
    for &(first, per_chunk, desc) in &layout.sample_to_chunk {
        stsc.extend(be32(&[first, per_chunk, desc]));
    }
    let mut stsz = be32(&[layout.sample_size, layout.sample_count]);
    stsz.extend(be32(&layout.sizes));
    let mut stco = be32(&[layout.chunk_offsets.len() as u32]);
    stco.extend(be32(&layout.chunk_offsets));

    let mut stbl = [
        full_box(b"stsd", 0, 0, &stsd),
        full_box(b"stts", 0, 0, &stts),
        full_box(b"stsc", 0, 0, &stsc),
    ]
    .concat();
    if layout.with_stsz {
        stbl.extend(full_box(b"stsz", 0, 0, &stsz));
    }
    stbl.extend(full_box(b"stco", 0, 0, &stco));

    let minf = mp4_box(b"minf", &mp4_box(b"stbl", &stbl));
    let mdia = mp4_box(
        b"mdia",
        &[full_box(b"mdhd", 0, 0, &mdhd), full_box(b"hdlr", 0, 0, &hdlr), minf].concat(),
    );
    mp4_box(b"trak", &[full_box(b"tkhd", 0, 0x3, &tkhd), mdia].concat())
}

pub fn moov(traks: &[TrakLayout]) -> Vec<u8> {
    let mvhd = be32(&[0, 0, 1000, 512]);
    let mut body = full_box(b"mvhd", 0, 0, &mvhd);
    for layout in traks {
        body.extend(trak(layout));
    }
    mp4_box(b"moov", &body)
}

/// Two tracks whose chunks alternate inside `mdat`:
/// video chunk 1 (samples 1-2), audio chunk 1, video chunk 2, audio chunk 2.
/// Video sample `i` is filled with `0x10 + i`, audio sample `j` with `0xA0 + j`.
pub fn interleaved_mp4() -> Vec<u8> {
    let mut video = TrakLayout::video(1, &[10, 20, 30]);
    video.sample_to_chunk = vec![(1, 2, 1), (2, 1, 1)];
    video.chunk_offsets = vec![0, 0];
    let mut audio = TrakLayout::audio(2, 4, 5);
    audio.sample_to_chunk = vec![(1, 2, 1)];
    audio.chunk_offsets = vec![0, 0];

    let head_len = ftyp().len() + moov(&[video.clone(), audio.clone()]).len();
    let base = (head_len + 8) as u32;
    video.chunk_offsets = vec![base, base + 30 + 10];
    audio.chunk_offsets = vec![base + 30, base + 30 + 10 + 30];

    let mut mdat = Vec::new();
    mdat.extend(vec![0x10; 10]);
    mdat.extend(vec![0x11; 20]);
    mdat.extend(vec![0xA0; 5]);
    mdat.extend(vec![0xA1; 5]);
    mdat.extend(vec![0x12; 30]);
    mdat.extend(vec![0xA2; 5]);
    mdat.extend(vec![0xA3; 5]);

    [ftyp(), moov(&[video, audio]), mp4_box(b"mdat", &mdat)].concat()
}

// ============================================================================
// RIFF WAVE
// ============================================================================

pub fn riff_chunk(tag: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = tag.to_vec();
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    if payload.len() % 2 == 1 {
        out.push(0);
    }
    out
}

/// 16-bit mono PCM at 8 kHz.
pub fn pcm_wave(data_len: usize) -> Vec<u8> {
    let mut fmt = Vec::new();
    fmt.extend_from_slice(&1u16.to_le_bytes());
    fmt.extend_from_slice(&1u16.to_le_bytes());
    fmt.extend_from_slice(&8000u32.to_le_bytes());
    fmt.extend_from_slice(&16000u32.to_le_bytes());
    fmt.extend_from_slice(&2u16.to_le_bytes());
    fmt.extend_from_slice(&16u16.to_le_bytes());

    let mut body = b"WAVE".to_vec();
    body.extend(riff_chunk(b"fmt ", &fmt));
    body.extend(riff_chunk(b"data", &vec![0x55; data_len]));
    riff_chunk(b"RIFF", &body)
}

// ============================================================================
// Matroska
// ============================================================================

/// Element with an 8-byte size field.
pub fn ebml(id: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = id_bytes(id);
    out.push(0x01);
    out.extend_from_slice(&(payload.len() as u64).to_be_bytes()[1..]);
    out.extend_from_slice(payload);
    out
}

fn id_bytes(id: u32) -> Vec<u8> {
    let bytes = id.to_be_bytes();
    let skip = bytes.iter().position(|&b| b != 0).unwrap_or(3);
    bytes[skip..].to_vec()
}

pub fn ebml_uint(id: u32, value: u64) -> Vec<u8> {
    ebml(id, &value.to_be_bytes())
}

pub fn simple_block(track: u8, timecode: i16, keyframe: bool, data: &[u8]) -> Vec<u8> {
    let mut p = vec![0x80 | track];
    p.extend_from_slice(&timecode.to_be_bytes());
    p.push(if keyframe { 0x80 } else { 0x00 });
    p.extend_from_slice(data);
    ebml(0xA3, &p)
}

/// One VP9 track, three frames presented in B-frame order.
pub fn webm() -> Vec<u8> {
    let header = ebml(0x1A45DFA3, &ebml(0x4282, b"webm"));
    let info = ebml(0x1549A966, &ebml_uint(0x2AD7B1, 1_000_000));
    let entry = [
        ebml_uint(0xD7, 1),
        ebml_uint(0x83, 1),
        ebml(0x86, b"V_VP9"),
        ebml_uint(0x23E383, 40_000_000),
    ]
    .concat();
    let tracks = ebml(0x1654AE6B, &ebml(0xAE, &entry));
    let cluster = ebml(
        0x1F43B675,
        &[
            ebml_uint(0xE7, 0),
            simple_block(1, 0, true, b"key-frame"),
            simple_block(1, 80, false, b"p-frame"),
            simple_block(1, 40, false, b"b-frame"),
        ]
        .concat(),
    );
    let segment = ebml(0x18538067, &[info, tracks, cluster].concat());
    [header, segment].concat()
}
