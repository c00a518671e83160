//! Advanced Systems Format (WMA, WMV).
//!
//! ```text
//! Header Object
//! ├── File Properties          packet size, preroll, play duration
//! ├── Stream Properties*       WAVEFORMATEX / BITMAPINFOHEADER
//! ├── Header Extension
//! │   └── Extended Stream Properties*   (may embed Stream Properties)
//! └── Content Description      title
//! Data Object                  fixed-size packets
//! Simple Index / Index         (skipped)
//! ```
//! Objects are a 16-byte GUID plus a 64-bit little-endian size that covers
//! the 24-byte header.

pub mod guids;
pub mod packets;

use std::collections::HashMap;

use once_cell::sync::Lazy;
use uuid::Uuid;

use crate::bitstream::BitCursor;
use crate::codec::Codec;
use crate::config::ParseOptions;
use crate::error::{DemuxError, IndexError, Result};
use crate::index;
use crate::media::{
    datetime_from_epoch, ContainerFormat, ContainerProfile, MediaFile, Sample, TimeBase, Track, TrackKind,
};
use crate::node::{ByteRange, Node, NodeId};
use crate::riff::{BitmapInfo, WaveFormat};
use crate::walker::{walk_children, walk_root, DispatchTable, Format, HeaderCodec, Walk};

const OBJECT_HEADER_SIZE: u64 = 24;

/// FILETIME and ASF durations tick at 100 ns.
const HNS_PER_SECOND: u64 = 10_000_000;

pub struct AsfHeader;

impl HeaderCodec for AsfHeader {
    const MIN_HEADER_SIZE: u64 = OBJECT_HEADER_SIZE;

    fn read_header(cursor: &mut BitCursor, parent: &Node) -> Result<Node> {
        let start = cursor.absolute_byte_offset();
        let guid = Uuid::from_bytes_le(cursor.read_array::<16>()?);
        let size = cursor.read_u64_le()?;
        let id = NodeId::Guid(guid);

        // Broadcast writers leave the Data Object size at zero.
        if size == 0 {
            let mut node = Node::new(id, start, OBJECT_HEADER_SIZE, parent.offset_end);
            node.unknown_size = true;
            return Ok(node);
        }
        if size < OBJECT_HEADER_SIZE {
            return Err(DemuxError::malformed(id.to_string(), format!("object size {}", size)));
        }
        Ok(Node::new(id, start, OBJECT_HEADER_SIZE, start.saturating_add(size)))
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct FileProperties {
    packet_count: u64,
    /// Milliseconds to subtract from every presentation time.
    preroll: u64,
    min_packet_size: u32,
    max_packet_size: u32,
}

#[derive(Debug, Clone, Copy)]
struct DataObject {
    packets: ByteRange,
    declared: u64,
}

struct Stream {
    track: Track,
    samples: Vec<Sample>,
    overflow: Option<IndexError>,
}

impl Stream {
    fn push(&mut self, sample: Sample, options: &ParseOptions) {
        if self.overflow.is_some() {
            return;
        }
        if let Err(e) = index::push_sample(&mut self.samples, sample, options) {
            self.overflow = Some(e);
        }
    }
}

pub(crate) struct Asf {
    media: MediaFile,
    file: Option<FileProperties>,
    streams: Vec<Stream>,
    /// Average time per frame from Extended Stream Properties, 100 ns units.
    frame_times: HashMap<u64, u64>,
    data: Option<DataObject>,
}

impl Asf {
    fn new(file_size: u64) -> Self {
        Self {
            media: MediaFile::new(ContainerFormat::Asf, ContainerProfile::Asf, file_size),
            file: None,
            streams: Vec::new(),
            frame_times: HashMap::new(),
            data: None,
        }
    }

    fn finish(self, walk: &Walk<'_>) -> MediaFile {
        let Asf {
            mut media,
            file,
            mut streams,
            frame_times,
            data,
        } = self;

        for stream in &mut streams {
            if let Some(&hns) = frame_times.get(&stream.track.id) {
                if hns > 0 && stream.track.kind == TrackKind::Video {
                    stream.track.video_mut().frame_rate = Some(HNS_PER_SECOND as f64 / hns as f64);
                }
            }
        }

        let failure = match (file, data) {
            (None, _) => Some(IndexError::MissingTable("File Properties")),
            (_, None) => Some(IndexError::MissingTable("Data")),
            (Some(file), _) if file.min_packet_size == 0 || file.min_packet_size != file.max_packet_size => {
                Some(IndexError::Inconsistent(format!(
                    "packet size {}..{}",
                    file.min_packet_size, file.max_packet_size
                )))
            }
            (Some(file), Some(data)) => {
                read_packets(walk, file, data, &mut streams);
                None
            }
        };

        for stream in streams {
            let Stream {
                mut track,
                mut samples,
                overflow,
            } = stream;
            let built = match (&failure, overflow) {
                (Some(e), _) => Err(e.clone()),
                (None, Some(e)) => Err(e),
                (None, None) => {
                    index::decode_times_from_pts(&mut samples);
                    Ok(samples)
                }
            };
            track.finalize(built, media.file_size);
            tracing::debug!(
                stream = track.id,
                codec = ?track.codec,
                samples = track.sample_count(),
                "asf stream indexed"
            );
            media.tracks.push(track);
        }
        media
    }
}

/// Walk the Data Object packet by packet. A packet that does not parse is
/// dropped on its own.
fn read_packets(walk: &Walk<'_>, file: FileProperties, data: DataObject, streams: &mut [Stream]) {
    let packet_size = file.min_packet_size as u64;
    let end = data.packets.end().min(walk.file_size());
    let mut fitting = end.saturating_sub(data.packets.offset) / packet_size;
    if data.declared > 0 && data.declared < fitting {
        fitting = data.declared;
    }
    if file.packet_count > 0 && file.packet_count != fitting {
        tracing::debug!(declared = file.packet_count, found = fitting, "packet count mismatch");
    }

    let preroll = file.preroll as i64;
    for n in 0..fitting {
        let offset = data.packets.offset + n * packet_size;
        let Some(packet) = walk.cursor.slice(offset, packet_size) else {
            break;
        };
        let payloads = match packets::parse_packet(packet, offset) {
            Ok(payloads) => payloads,
            Err(e) => {
                tracing::warn!(packet = n, offset, error = %e, "skipping data packet");
                continue;
            }
        };

        for payload in payloads {
            let Some(stream) = streams.iter_mut().find(|s| s.track.id == payload.stream as u64) else {
                tracing::trace!(stream = payload.stream, "payload for undeclared stream");
                continue;
            };
            let Ok(size) = u32::try_from(payload.range.size) else {
                tracing::warn!(stream = payload.stream, size = payload.range.size, "oversized payload");
                continue;
            };
            let time = (payload.presentation_ms as i64).saturating_sub(preroll).saturating_mul(1000);
            let sample = Sample::frame(
                payload.range.offset,
                size,
                payload.keyframe,
                time,
                time,
            );
            stream.push(sample, walk.options);
        }
    }
}

fn utf16_string(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .take_while(|&u| u != 0)
        .collect();
    String::from_utf16_lossy(&units)
}

// ============================================================================
// Handlers
// ============================================================================

type Handler = Result<()>;

fn header_object(s: &mut Asf, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    let objects = w.cursor.read_u32_le()?;
    w.cursor.skip_bytes(2)?;
    w.field("objects", objects);
    walk_children(s, w, n)
}

fn file_properties(s: &mut Asf, w: &mut Walk<'_>, _n: &mut Node) -> Handler {
    let c = &mut w.cursor;
    let _file_id = c.read_array::<16>()?;
    let file_size = c.read_u64_le()?;
    let creation = c.read_u64_le()?;
    let packet_count = c.read_u64_le()?;
    let play_duration = c.read_u64_le()?;
    let _send_duration = c.read_u64_le()?;
    let preroll = c.read_u64_le()?;
    let flags = c.read_u32_le()?;
    let min_packet_size = c.read_u32_le()?;
    let max_packet_size = c.read_u32_le()?;
    let max_bitrate = c.read_u32_le()?;

    w.field("file_size", file_size);
    w.field("packets", packet_count);
    w.field("play_duration", play_duration);
    w.field("preroll", preroll);
    w.field("flags", flags);
    w.field("packet_size", min_packet_size);
    w.field("max_bitrate", max_bitrate);

    s.media.creation_time = datetime_from_epoch(
        1601,
        (creation / HNS_PER_SECOND) as i64,
        ((creation % HNS_PER_SECOND) * 100) as u32,
    );
    s.media.duration_us = Some((play_duration / 10).saturating_sub(preroll.saturating_mul(1000)));
    s.file = Some(FileProperties {
        packet_count,
        preroll,
        min_packet_size,
        max_packet_size,
    });
    Ok(())
}

fn stream_properties(s: &mut Asf, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    let c = &mut w.cursor;
    let stream_type = Uuid::from_bytes_le(c.read_array::<16>()?);
    let _error_correction = c.read_array::<16>()?;
    let _time_offset = c.read_u64_le()?;
    let type_specific_len = c.read_u32_le()? as u64;
    let _error_correction_len = c.read_u32_le()?;
    let flags = c.read_u16_le()?;
    let _reserved = c.read_u32_le()?;
    let number = (flags & 0x7F) as u64;
    let type_end = (c.absolute_byte_offset() + type_specific_len).min(n.offset_end);

    w.field("stream", number);
    w.field("encrypted", (flags >> 15) as u64);
    if s.streams.iter().any(|st| st.track.id == number) {
        tracing::debug!(stream = number, "stream declared twice, keeping the first");
        return Ok(());
    }

    let mut track = Track::new(number, TrackKind::Other);
    track.time_base = TimeBase::new(1, 1000);
    if stream_type == guids::AUDIO_MEDIA {
        let format = WaveFormat::read(&mut w.cursor, type_end)?;
        w.field("format_tag", format.format_tag);
        track.kind = TrackKind::Audio;
        track.codec = format.codec();
        track.codec_tag = Some(format!("0x{:04X}", format.effective_tag()));
        track.audio = Some(format.audio_params());
        track.codec_private = format.extra;
    } else if stream_type == guids::VIDEO_MEDIA {
        let c = &mut w.cursor;
        let width = c.read_u32_le()?;
        let height = c.read_u32_le()?;
        let _reserved = c.read_u8()?;
        let _format_size = c.read_u16_le()?;
        let info = BitmapInfo::read(c, type_end)?;
        w.field("compression", info.compression.to_string());
        track.kind = TrackKind::Video;
        track.codec = Codec::from_fourcc(info.compression);
        track.codec_tag = Some(info.compression.to_string());
        let mut video = info.video_params();
        video.width = width;
        video.height = height;
        track.video = Some(video);
        track.codec_private = info.extra;
    } else if ![guids::COMMAND_MEDIA, guids::BINARY_MEDIA, guids::JFIF_MEDIA].contains(&stream_type) {
        tracing::debug!(stream = number, kind = %stream_type, "unknown stream type");
    }

    s.streams.push(Stream {
        track,
        samples: Vec::new(),
        overflow: None,
    });
    Ok(())
}

fn header_extension(s: &mut Asf, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    let _reserved = w.cursor.read_array::<16>()?;
    let _reserved = w.cursor.read_u16_le()?;
    let size = w.cursor.read_u32_le()?;
    w.field("data_size", size);
    walk_children(s, w, n)
}

fn extended_stream_properties(s: &mut Asf, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    let c = &mut w.cursor;
    let start_time = c.read_u64_le()?;
    let _end_time = c.read_u64_le()?;
    // Bitrates, buffer sizes, max object size, flags
    c.skip_bytes(32)?;
    let number = c.read_u16_le()? as u64;
    let _language = c.read_u16_le()?;
    let avg_time_per_frame = c.read_u64_le()?;
    let name_count = c.read_u16_le()?;
    let system_count = c.read_u16_le()?;

    for _ in 0..name_count {
        let _language = c.read_u16_le()?;
        let len = c.read_u16_le()? as u64;
        c.skip_bytes(len)?;
    }
    for _ in 0..system_count {
        let _system = c.read_array::<16>()?;
        let _data_size = c.read_u16_le()?;
        let len = c.read_u32_le()? as u64;
        c.skip_bytes(len)?;
    }

    w.field("stream", number);
    w.field("start_time", start_time);
    w.field("avg_time_per_frame", avg_time_per_frame);
    s.frame_times.insert(number, avg_time_per_frame);

    // Whatever is left is an embedded Stream Properties Object.
    walk_children(s, w, n)
}

fn content_description(s: &mut Asf, w: &mut Walk<'_>, _n: &mut Node) -> Handler {
    let c = &mut w.cursor;
    let mut lengths = [0u64; 5];
    for len in lengths.iter_mut() {
        *len = c.read_u16_le()? as u64;
    }
    let [title, author, _copyright, _description, _rating] = lengths;
    let title = utf16_string(&c.read_bytes(title)?);
    let author = utf16_string(&c.read_bytes(author)?);

    w.field("title", title.as_str());
    w.field("author", author);
    if !title.is_empty() {
        s.media.title = Some(title);
    }
    Ok(())
}

fn data_object(s: &mut Asf, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    let _file_id = w.cursor.read_array::<16>()?;
    let declared = w.cursor.read_u64_le()?;
    let _reserved = w.cursor.read_u16_le()?;
    let offset = w.cursor.absolute_byte_offset();
    let packets = ByteRange::new(offset, w.remaining_in(n));

    w.field("packets", declared);
    s.data = Some(DataObject { packets, declared });
    w.stop_if_indexed();
    Ok(())
}

static ASF_TABLE: Lazy<DispatchTable<Asf>> = Lazy::new(|| {
    use guids::*;

    let g = NodeId::Guid;
    DispatchTable::new()
        .on(g(HEADER_OBJECT), "Header", header_object)
        .on(g(FILE_PROPERTIES_OBJECT), "File Properties", file_properties)
        .on(g(STREAM_PROPERTIES_OBJECT), "Stream Properties", stream_properties)
        .on(g(HEADER_EXTENSION_OBJECT), "Header Extension", header_extension)
        .on(
            g(EXTENDED_STREAM_PROPERTIES_OBJECT),
            "Extended Stream Properties",
            extended_stream_properties,
        )
        .on(g(CONTENT_DESCRIPTION_OBJECT), "Content Description", content_description)
        .on(g(DATA_OBJECT), "Data", data_object)
        .skip(g(CODEC_LIST_OBJECT), "Codec List")
        .skip(g(EXTENDED_CONTENT_DESCRIPTION_OBJECT), "Extended Content Description")
        .skip(g(STREAM_BITRATE_PROPERTIES_OBJECT), "Stream Bitrate Properties")
        .skip(g(PADDING_OBJECT), "Padding")
        .skip(g(METADATA_OBJECT), "Metadata")
        .skip(g(LANGUAGE_LIST_OBJECT), "Language List")
        .skip(g(SIMPLE_INDEX_OBJECT), "Simple Index")
        .skip(g(INDEX_OBJECT), "Index")
});

impl Format for Asf {
    type Header = AsfHeader;

    fn dispatch_table() -> &'static DispatchTable<Self> {
        &ASF_TABLE
    }
}

pub(crate) fn parse(walk: &mut Walk<'_>) -> Result<MediaFile> {
    let mut state = Asf::new(walk.file_size());
    walk_root(&mut state, walk)?;
    Ok(state.finish(walk))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{NullTrace, StructureDump};

    const PACKET: usize = 64;

    fn object(guid: Uuid, payload: &[u8]) -> Vec<u8> {
        let mut out = guid.to_bytes_le().to_vec();
        out.extend_from_slice(&((payload.len() + 24) as u64).to_le_bytes());
        out.extend_from_slice(payload);
        out
    }

    fn file_properties(packets: u64, play_duration: u64, preroll: u64) -> Vec<u8> {
        let mut p = vec![0u8; 16];
        p.extend_from_slice(&0u64.to_le_bytes());
        p.extend_from_slice(&116_444_736_000_000_000u64.to_le_bytes()); // 1970-01-01
        p.extend_from_slice(&packets.to_le_bytes());
        p.extend_from_slice(&play_duration.to_le_bytes());
        p.extend_from_slice(&play_duration.to_le_bytes());
        p.extend_from_slice(&preroll.to_le_bytes());
        p.extend_from_slice(&2u32.to_le_bytes());
        p.extend_from_slice(&(PACKET as u32).to_le_bytes());
        p.extend_from_slice(&(PACKET as u32).to_le_bytes());
        p.extend_from_slice(&128_000u32.to_le_bytes());
        object(guids::FILE_PROPERTIES_OBJECT, &p)
    }

    fn stream_properties(kind: Uuid, number: u16, type_specific: &[u8]) -> Vec<u8> {
        let mut p = kind.to_bytes_le().to_vec();
        p.extend_from_slice(&[0u8; 16]);
        p.extend_from_slice(&0u64.to_le_bytes());
        p.extend_from_slice(&(type_specific.len() as u32).to_le_bytes());
        p.extend_from_slice(&0u32.to_le_bytes());
        p.extend_from_slice(&number.to_le_bytes());
        p.extend_from_slice(&0u32.to_le_bytes());
        p.extend_from_slice(type_specific);
        object(guids::STREAM_PROPERTIES_OBJECT, &p)
    }

    fn wma() -> Vec<u8> {
        let mut p = Vec::new();
        p.extend_from_slice(&0x0161u16.to_le_bytes());
        p.extend_from_slice(&2u16.to_le_bytes());
        p.extend_from_slice(&44_100u32.to_le_bytes());
        p.extend_from_slice(&16_000u32.to_le_bytes());
        p.extend_from_slice(&2_230u16.to_le_bytes());
        p.extend_from_slice(&16u16.to_le_bytes());
        p.extend_from_slice(&0u16.to_le_bytes());
        p
    }

    fn wmv() -> Vec<u8> {
        let mut p = Vec::new();
        p.extend_from_slice(&320u32.to_le_bytes());
        p.extend_from_slice(&240u32.to_le_bytes());
        p.push(2);
        p.extend_from_slice(&40u16.to_le_bytes());
        p.extend_from_slice(&40u32.to_le_bytes());
        p.extend_from_slice(&320i32.to_le_bytes());
        p.extend_from_slice(&240i32.to_le_bytes());
        p.extend_from_slice(&1u16.to_le_bytes());
        p.extend_from_slice(&24u16.to_le_bytes());
        p.extend_from_slice(b"WMV3");
        p.extend_from_slice(&[0u8; 20]);
        p
    }

    fn extended_stream_properties(number: u16, avg_time_per_frame: u64) -> Vec<u8> {
        let mut p = vec![0u8; 48];
        p.extend_from_slice(&number.to_le_bytes());
        p.extend_from_slice(&0u16.to_le_bytes());
        p.extend_from_slice(&avg_time_per_frame.to_le_bytes());
        p.extend_from_slice(&0u16.to_le_bytes());
        p.extend_from_slice(&0u16.to_le_bytes());
        object(guids::EXTENDED_STREAM_PROPERTIES_OBJECT, &p)
    }

    fn content_description(title: &str) -> Vec<u8> {
        let title: Vec<u8> = title.encode_utf16().chain([0]).flat_map(u16::to_le_bytes).collect();
        let mut p = Vec::new();
        p.extend_from_slice(&(title.len() as u16).to_le_bytes());
        p.extend_from_slice(&[0u8; 8]);
        p.extend_from_slice(&title);
        object(guids::CONTENT_DESCRIPTION_OBJECT, &p)
    }

    /// Single payload, replicated data with the presentation time.
    fn packet(stream: u8, keyframe: bool, presentation_ms: u32, fill: u8) -> Vec<u8> {
        let mut p = vec![0x00, 0x5D];
        p.extend_from_slice(&presentation_ms.to_le_bytes());
        p.extend_from_slice(&0u16.to_le_bytes());
        p.push(stream | if keyframe { 0x80 } else { 0 });
        p.push(0);
        p.extend_from_slice(&0u32.to_le_bytes());
        p.push(8);
        p.extend_from_slice(&50u32.to_le_bytes());
        p.extend_from_slice(&presentation_ms.to_le_bytes());
        p.resize(PACKET, fill);
        p
    }

    fn asf_file(packets: &[Vec<u8>]) -> Vec<u8> {
        let ext = {
            let mut p = vec![0u8; 18];
            let children = extended_stream_properties(2, 400_000);
            p.extend_from_slice(&(children.len() as u32).to_le_bytes());
            p.extend_from_slice(&children);
            object(guids::HEADER_EXTENSION_OBJECT, &p)
        };
        let children = [
            file_properties(packets.len() as u64, 40_000_000, 3000),
            stream_properties(guids::AUDIO_MEDIA, 1, &wma()),
            stream_properties(guids::VIDEO_MEDIA, 2, &wmv()),
            ext,
            content_description("Demo"),
        ];
        let mut header = 5u32.to_le_bytes().to_vec();
        header.extend_from_slice(&[1, 2]);
        header.extend(children.concat());

        let mut data = vec![0u8; 16];
        data.extend_from_slice(&(packets.len() as u64).to_le_bytes());
        data.extend_from_slice(&[1, 1]);
        data.extend(packets.concat());

        [
            object(guids::HEADER_OBJECT, &header),
            object(guids::DATA_OBJECT, &data),
            object(guids::SIMPLE_INDEX_OBJECT, &[0u8; 8]),
        ]
        .concat()
    }

    fn parse_asf(data: Vec<u8>) -> MediaFile {
        let options = ParseOptions::default();
        let mut sink = NullTrace;
        let mut walk = Walk::new(BitCursor::new(data), &options, &mut sink, None);
        parse(&mut walk).expect("parse")
    }

    #[test]
    fn streams_and_payloads() {
        let data = asf_file(&[
            packet(2, true, 3000, 0xA0),
            packet(1, true, 3000, 0xA1),
            packet(2, false, 3080, 0xA2),
            packet(2, false, 3040, 0xA3),
        ]);
        let media = parse_asf(data.clone());

        assert_eq!(media.profile, ContainerProfile::Asf);
        assert_eq!(media.title.as_deref(), Some("Demo"));
        assert_eq!(media.duration_us, Some(1_000_000));
        assert_eq!(media.creation_time.map(|t| t.timestamp()), Some(0));

        let audio = media.track(1).unwrap();
        assert_eq!(audio.kind, TrackKind::Audio);
        assert_eq!(audio.codec, Codec::Wma2);
        assert_eq!(audio.sample_count(), 1);
        assert_eq!(audio.samples[0].pts, Some(0));
        assert_eq!(data[audio.samples[0].offset as usize], 0xA1);

        let video = media.track(2).unwrap();
        assert_eq!(video.codec, Codec::Wmv9);
        assert_eq!(video.codec_tag.as_deref(), Some("WMV3"));
        let params = video.video.as_ref().unwrap();
        assert_eq!((params.width, params.height), (320, 240));
        assert_eq!(params.frame_rate, Some(25.0));

        let pts: Vec<_> = video.samples.iter().map(|s| s.pts.unwrap()).collect();
        let dts: Vec<_> = video.samples.iter().map(|s| s.dts.unwrap()).collect();
        assert_eq!(pts, vec![0, 80_000, 40_000]);
        assert_eq!(dts, vec![0, 40_000, 80_000]);
        assert_eq!(video.sync_sample_count(), 1);
        // Payload runs to the end of its packet.
        assert!(video.samples.iter().all(|s| s.size == 41));
    }

    #[test]
    fn broken_packet_is_skipped() {
        let mut bad = packet(2, false, 3040, 0);
        bad[0] = 0x82; // claims error correction data of 2 bytes in an unsupported layout
        bad[0] |= 0x20;
        let data = asf_file(&[packet(2, true, 3000, 0xA0), bad, packet(2, false, 3080, 0xA2)]);
        let media = parse_asf(data);
        assert_eq!(media.track(2).unwrap().sample_count(), 2);
    }

    #[test]
    fn structure_dump_names_objects() {
        let data = asf_file(&[packet(1, true, 3000, 0)]);
        let options = ParseOptions {
            stop_when_indexed: false,
            ..ParseOptions::default()
        };
        let mut dump = StructureDump::new();
        {
            let mut walk = Walk::new(BitCursor::new(data), &options, &mut dump, None);
            parse(&mut walk).unwrap();
        }
        let names: Vec<_> = dump.entries.iter().map(|e| (e.name.as_str(), e.depth)).collect();
        assert_eq!(
            names,
            vec![
                ("Header", 1),
                ("File Properties", 2),
                ("Stream Properties", 2),
                ("Stream Properties", 2),
                ("Header Extension", 2),
                ("Extended Stream Properties", 3),
                ("Content Description", 2),
                ("Data", 1),
                ("Simple Index", 1),
            ]
        );
    }

    #[test]
    fn missing_file_properties_fails_streams() {
        let header = object(
            guids::HEADER_OBJECT,
            &[vec![1, 0, 0, 0, 1, 2], stream_properties(guids::AUDIO_MEDIA, 1, &wma())].concat(),
        );
        let media = parse_asf(header);
        assert_eq!(
            media.tracks[0].index_status,
            crate::media::IndexStatus::Failed(IndexError::MissingTable("File Properties"))
        );
    }
}
