mod common;

use common::*;
use mediatree_core::media::IndexStatus;
use mediatree_core::{
    parse_bytes, ContainerFormat, Demuxer, MediaFile, ParseOptions, SampleKind, StructureDump,
};
use proptest::prelude::*;

/// Index invariants every parse result must keep, whatever the input.
fn assert_index_invariants(media: &MediaFile, options: &ParseOptions) {
    for track in &media.tracks {
        if let IndexStatus::Failed(_) = track.index_status {
            assert!(track.samples.is_empty(), "failed track {} kept samples", track.id);
        }
        assert!(track.samples.len() as u64 <= options.max_samples_per_track + 16);

        let leading = track
            .samples
            .iter()
            .take_while(|s| s.kind == SampleKind::ParameterSet)
            .count();
        assert!(
            track.samples[leading..]
                .iter()
                .all(|s| s.kind != SampleKind::ParameterSet),
            "parameter sets after media samples"
        );

        let mut last = i64::MIN;
        for sample in track.frames() {
            assert!(sample.end() <= media.file_size, "sample past end of file");
            let dts = sample.dts.expect("frames carry a decode time");
            assert!(dts >= last, "decode times go backwards in track {}", track.id);
            last = dts;
        }
    }
}

fn seeds() -> Vec<Vec<u8>> {
    vec![interleaved_mp4(), pcm_wave(5000), webm()]
}

fn fuzz_options() -> ParseOptions {
    ParseOptions {
        max_samples_per_track: 4096,
        ..ParseOptions::default()
    }
}

#[test]
fn seeds_parse_as_expected() {
    let formats: Vec<ContainerFormat> = seeds()
        .into_iter()
        .map(|data| parse_bytes(data).expect("seed parses").format)
        .collect();
    assert_eq!(
        formats,
        vec![ContainerFormat::Mp4, ContainerFormat::Wave, ContainerFormat::Matroska]
    );

    let wave = parse_bytes(pcm_wave(5000)).expect("wave");
    let track = &wave.tracks[0];
    assert_eq!(track.sample_count(), 3);
    assert_eq!(track.total_frame_bytes(), 5000);
    assert_eq!(track.samples[1].pts, Some(128_000));

    let webm = parse_bytes(webm()).expect("webm");
    let video = webm.track(1).expect("track 1");
    let pts: Vec<i64> = video.samples.iter().filter_map(|s| s.pts).collect();
    let dts: Vec<i64> = video.samples.iter().filter_map(|s| s.dts).collect();
    assert_eq!(pts, vec![0, 80_000, 40_000]);
    assert_eq!(dts, vec![0, 40_000, 80_000]);
    assert_eq!(video.sync_sample_count(), 1);
}

#[test]
fn parsing_is_idempotent() {
    let demuxer = Demuxer::new(ParseOptions::default());
    for data in seeds() {
        let first = demuxer.parse(data.clone()).expect("first");
        let second = demuxer.parse(data.clone()).expect("second");
        assert_eq!(first, second);

        let mut dump = StructureDump::new();
        let traced = demuxer.parse_traced(data, &mut dump).expect("traced");
        assert_eq!(first, traced);
        assert!(!dump.entries.is_empty());
    }
}

#[test]
fn results_serialize_to_json() {
    let media = parse_bytes(interleaved_mp4()).expect("parse");
    let json = serde_json::to_value(&media).expect("json");
    assert_eq!(json["format"], "Mp4");
    assert_eq!(json["tracks"].as_array().map(|t| t.len()), Some(2));
    assert_eq!(json["tracks"][0]["samples"][1]["size"], 20);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn arbitrary_bytes_never_panic(data in proptest::collection::vec(any::<u8>(), 0..512)) {
        if let Ok(media) = Demuxer::new(fuzz_options()).parse(data) {
            assert_index_invariants(&media, &fuzz_options());
        }
    }

    #[test]
    fn corrupted_files_keep_index_invariants(
        seed in 0usize..3,
        flips in proptest::collection::vec((any::<prop::sample::Index>(), any::<u8>()), 1..8),
    ) {
        let mut data = seeds().swap_remove(seed);
        let len = data.len();
        for (at, value) in flips {
            data[at.index(len)] = value;
        }
        if let Ok(media) = Demuxer::new(fuzz_options()).parse(data) {
            assert_index_invariants(&media, &fuzz_options());
        }
    }

    #[test]
    fn truncated_files_keep_index_invariants(seed in 0usize..3, keep in 0.0f64..1.0) {
        let mut data = seeds().swap_remove(seed);
        let cut = (data.len() as f64 * keep) as usize;
        data.truncate(cut);
        match Demuxer::new(fuzz_options()).parse(data) {
            Ok(media) => assert_index_invariants(&media, &fuzz_options()),
            Err(e) => prop_assert!(cut < 64, "{} byte prefix rejected: {}", cut, e),
        }
    }
}
