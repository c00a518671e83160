//! Codec identification from container discriminants.
//!
//! Every lookup here is a pure function from a FourCC, TwoCC, Matroska codec
//! ID string or MPEG-4 object type to a [`Codec`].

use serde::Serialize;

use crate::node::FourCc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Codec {
    // Video
    H264,
    H265,
    H266,
    Mpeg1Video,
    Mpeg2Video,
    Mpeg4Part2,
    H263,
    Vp8,
    Vp9,
    Av1,
    Mjpeg,
    Theora,
    Vc1,
    Wmv7,
    Wmv8,
    Wmv9,
    ProRes,
    Cinepak,
    Indeo,
    RawVideo,
    // Audio
    Aac,
    Mp3,
    Mp2,
    Mp1,
    Ac3,
    Eac3,
    Dts,
    TrueHd,
    Flac,
    Opus,
    Vorbis,
    Alac,
    Pcm,
    PcmFloat,
    Alaw,
    Mulaw,
    AdpcmMs,
    AdpcmIma,
    Wma1,
    Wma2,
    WmaPro,
    WmaLossless,
    AmrNb,
    AmrWb,
    // Subtitles
    Srt,
    Ass,
    WebVtt,
    TimedText,
    Pgs,
    VobSub,
    Unknown,
}

impl Default for Codec {
    fn default() -> Self {
        Codec::Unknown
    }
}

impl Codec {
    /// Video codec FourCCs (ISO-BMFF sample entries, AVI `biCompression` and
    /// `fccHandler`, ASF video type data). Matching is case-insensitive.
    pub fn from_fourcc(cc: FourCc) -> Codec {
        match &cc.to_ascii_uppercase().0 {
            b"AVC1" | b"AVC2" | b"AVC3" | b"AVC4" | b"H264" | b"X264" | b"DAVC" | b"VSSH" => {
                Codec::H264
            }
            b"HVC1" | b"HEV1" | b"H265" | b"X265" | b"HEVC" => Codec::H265,
            b"VVC1" | b"VVI1" => Codec::H266,
            b"MP4V" | b"XVID" | b"DIVX" | b"DX50" | b"FMP4" | b"MP4S" | b"M4S2" => {
                Codec::Mpeg4Part2
            }
            b"MPG1" => Codec::Mpeg1Video,
            b"MPG2" | b"MPEG" | b"MX3N" | b"MX5P" | b"XDV7" | b"HDV2" => Codec::Mpeg2Video,
            b"S263" | b"H263" | b"U263" => Codec::H263,
            b"VP80" | b"VP08" => Codec::Vp8,
            b"VP90" | b"VP09" => Codec::Vp9,
            b"AV01" => Codec::Av1,
            b"MJPG" | b"JPEG" | b"AVRN" | b"MJPA" | b"MJPB" => Codec::Mjpeg,
            b"THEO" => Codec::Theora,
            b"WVC1" | b"VC-1" | b"WMVA" => Codec::Vc1,
            b"WMV1" => Codec::Wmv7,
            b"WMV2" => Codec::Wmv8,
            b"WMV3" => Codec::Wmv9,
            b"APCN" | b"APCH" | b"APCS" | b"APCO" | b"AP4H" | b"AP4X" => Codec::ProRes,
            b"CVID" => Codec::Cinepak,
            b"IV50" | b"IV41" | b"IV32" => Codec::Indeo,
            b"I420" | b"YV12" | b"YUY2" | b"UYVY" | b"RAW " | b"2VUY" | b"NV12" => {
                Codec::RawVideo
            }
            // Audio sample entries
            b"MP4A" => Codec::Aac,
            b".MP3" => Codec::Mp3,
            b"AC-3" => Codec::Ac3,
            b"EC-3" => Codec::Eac3,
            b"DTSC" | b"DTSH" | b"DTSL" => Codec::Dts,
            b"MLPA" => Codec::TrueHd,
            b"FLAC" => Codec::Flac,
            b"OPUS" => Codec::Opus,
            b"ALAC" => Codec::Alac,
            b"LPCM" | b"SOWT" | b"TWOS" | b"IN24" | b"IN32" | b"NONE" => Codec::Pcm,
            b"FL32" | b"FL64" => Codec::PcmFloat,
            b"ALAW" => Codec::Alaw,
            b"ULAW" => Codec::Mulaw,
            b"SAMR" => Codec::AmrNb,
            b"SAWB" => Codec::AmrWb,
            // Subtitle sample entries
            b"TX3G" | b"TEXT" => Codec::TimedText,
            b"WVTT" => Codec::WebVtt,
            _ => {
                if cc.0 == [0; 4] {
                    // BI_RGB
                    Codec::RawVideo
                } else {
                    Codec::Unknown
                }
            }
        }
    }

    /// WAVEFORMATEX `wFormatTag` values (WAVE, AVI and ASF audio).
    pub fn from_twocc(tag: u16) -> Codec {
        match tag {
            0x0001 => Codec::Pcm,
            0x0002 => Codec::AdpcmMs,
            0x0003 => Codec::PcmFloat,
            0x0006 => Codec::Alaw,
            0x0007 => Codec::Mulaw,
            0x0011 => Codec::AdpcmIma,
            0x0050 => Codec::Mp2,
            0x0055 => Codec::Mp3,
            0x00FF | 0x1600 | 0x1601 | 0x4143 | 0xA106 => Codec::Aac,
            0x0160 => Codec::Wma1,
            0x0161 => Codec::Wma2,
            0x0162 => Codec::WmaPro,
            0x0163 => Codec::WmaLossless,
            0x2000 => Codec::Ac3,
            0x2001 => Codec::Dts,
            0x566F => Codec::Vorbis,
            0xF1AC => Codec::Flac,
            0x704F => Codec::Opus,
            _ => Codec::Unknown,
        }
    }

    /// Matroska `CodecID` strings. Prefix matches cover the many PCM/AAC
    /// variants.
    pub fn from_matroska_id(id: &str) -> Codec {
        match id {
            "V_MPEG4/ISO/AVC" => Codec::H264,
            "V_MPEGH/ISO/HEVC" => Codec::H265,
            "V_MPEGI/ISO/VVC" => Codec::H266,
            "V_MPEG1" => Codec::Mpeg1Video,
            "V_MPEG2" => Codec::Mpeg2Video,
            "V_VP8" => Codec::Vp8,
            "V_VP9" => Codec::Vp9,
            "V_AV1" => Codec::Av1,
            "V_MJPEG" => Codec::Mjpeg,
            "V_THEORA" => Codec::Theora,
            "V_PRORES" => Codec::ProRes,
            "V_UNCOMPRESSED" => Codec::RawVideo,
            "A_MPEG/L3" => Codec::Mp3,
            "A_MPEG/L2" => Codec::Mp2,
            "A_MPEG/L1" => Codec::Mp1,
            "A_AC3" => Codec::Ac3,
            "A_EAC3" => Codec::Eac3,
            "A_DTS" => Codec::Dts,
            "A_TRUEHD" => Codec::TrueHd,
            "A_FLAC" => Codec::Flac,
            "A_OPUS" => Codec::Opus,
            "A_VORBIS" => Codec::Vorbis,
            "A_ALAC" => Codec::Alac,
            "A_PCM/FLOAT/IEEE" => Codec::PcmFloat,
            "S_TEXT/UTF8" | "S_TEXT/ASCII" => Codec::Srt,
            "S_TEXT/ASS" | "S_TEXT/SSA" | "S_ASS" | "S_SSA" => Codec::Ass,
            "S_TEXT/WEBVTT" => Codec::WebVtt,
            "S_HDMV/PGS" => Codec::Pgs,
            "S_VOBSUB" => Codec::VobSub,
            _ if id.starts_with("V_MPEG4/ISO/") => Codec::Mpeg4Part2,
            _ if id.starts_with("A_AAC") => Codec::Aac,
            _ if id.starts_with("A_PCM/INT/") => Codec::Pcm,
            _ => Codec::Unknown,
        }
    }

    /// `objectTypeIndication` of an `esds` DecoderConfigDescriptor.
    pub fn from_mp4_object_type(oti: u8) -> Codec {
        match oti {
            0x20 => Codec::Mpeg4Part2,
            0x21 => Codec::H264,
            0x23 => Codec::H265,
            0x40 | 0x66 | 0x67 | 0x68 => Codec::Aac,
            0x60..=0x65 => Codec::Mpeg2Video,
            0x69 => Codec::Mp3,
            0x6A => Codec::Mpeg1Video,
            0x6B => Codec::Mp3,
            0x6C => Codec::Mjpeg,
            0xA5 => Codec::Ac3,
            0xA6 => Codec::Eac3,
            0xA9 | 0xAA..=0xAC => Codec::Dts,
            0xAD => Codec::Opus,
            0xDD => Codec::Vorbis,
            _ => Codec::Unknown,
        }
    }

    pub fn is_pcm(&self) -> bool {
        matches!(
            self,
            Codec::Pcm | Codec::PcmFloat | Codec::Alaw | Codec::Mulaw
        )
    }

    /// Codecs whose out-of-band configuration holds SPS/PPS style NAL units.
    pub fn has_parameter_sets(&self) -> bool {
        matches!(self, Codec::H264 | Codec::H265)
    }
}
