//! ASF object and stream type GUIDs.

use uuid::Uuid;

// ============================================================================
// Top-level objects
// ============================================================================

pub const HEADER_OBJECT: Uuid = Uuid::from_u128(0x75b22630_668e_11cf_a6d9_00aa0062ce6c);
pub const DATA_OBJECT: Uuid = Uuid::from_u128(0x75b22636_668e_11cf_a6d9_00aa0062ce6c);
pub const SIMPLE_INDEX_OBJECT: Uuid = Uuid::from_u128(0x33000890_e5b1_11cf_89f4_00a0c90349cb);
pub const INDEX_OBJECT: Uuid = Uuid::from_u128(0xd6e229d3_35da_11d1_9034_00a0c90349be);

// ============================================================================
// Header Object children
// ============================================================================

pub const FILE_PROPERTIES_OBJECT: Uuid = Uuid::from_u128(0x8cabdca1_a947_11cf_8ee4_00c00c205365);
pub const STREAM_PROPERTIES_OBJECT: Uuid = Uuid::from_u128(0xb7dc0791_a9b7_11cf_8ee6_00c00c205365);
pub const HEADER_EXTENSION_OBJECT: Uuid = Uuid::from_u128(0x5fbf03b5_a92e_11cf_8ee3_00c00c205365);
pub const CODEC_LIST_OBJECT: Uuid = Uuid::from_u128(0x86d15240_311d_11d0_a3a4_00a0c90348f6);
pub const CONTENT_DESCRIPTION_OBJECT: Uuid = Uuid::from_u128(0x75b22633_668e_11cf_a6d9_00aa0062ce6c);
pub const EXTENDED_CONTENT_DESCRIPTION_OBJECT: Uuid =
    Uuid::from_u128(0xd2d0a440_e307_11d2_97f0_00a0c95ea850);
pub const STREAM_BITRATE_PROPERTIES_OBJECT: Uuid =
    Uuid::from_u128(0x7bf875ce_468d_11d1_8d82_006097c9a2b2);
pub const PADDING_OBJECT: Uuid = Uuid::from_u128(0x1806d474_cadf_4509_a4ba_9aabcb96aae8);

// ============================================================================
// Header Extension Object children
// ============================================================================

pub const EXTENDED_STREAM_PROPERTIES_OBJECT: Uuid =
    Uuid::from_u128(0x14e6a5cb_c672_4332_8399_a96952065b5a);
pub const METADATA_OBJECT: Uuid = Uuid::from_u128(0xc5f8cbea_5baf_4877_8467_aa8c44fa4cca);
pub const LANGUAGE_LIST_OBJECT: Uuid = Uuid::from_u128(0x7c4346a9_efe0_4bfc_b229_393ede415c85);

// ============================================================================
// Stream types
// ============================================================================

pub const AUDIO_MEDIA: Uuid = Uuid::from_u128(0xf8699e40_5b4d_11cf_a8fd_00805f5c442b);
pub const VIDEO_MEDIA: Uuid = Uuid::from_u128(0xbc19efc0_5b4d_11cf_a8fd_00805f5c442b);
pub const COMMAND_MEDIA: Uuid = Uuid::from_u128(0x59dacfc0_59e6_11d0_a3ac_00a0c90348f6);
pub const JFIF_MEDIA: Uuid = Uuid::from_u128(0xb61be100_5b4e_11cf_a8fd_00805f5c442b);
pub const BINARY_MEDIA: Uuid = Uuid::from_u128(0x3afb65e2_47ef_40f2_ac2c_70a90d71d343);

/// Header Object GUID as it appears on disk (mixed-endian).
pub fn header_object_bytes() -> [u8; 16] {
    HEADER_OBJECT.to_bytes_le()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn on_disk_layout_is_mixed_endian() {
        assert_eq!(
            header_object_bytes(),
            [
                0x30, 0x26, 0xB2, 0x75, 0x8E, 0x66, 0xCF, 0x11, 0xA6, 0xD9, 0x00, 0xAA, 0x00, 0x62, 0xCE,
                0x6C
            ]
        );
        assert_eq!(Uuid::from_bytes_le(header_object_bytes()), HEADER_OBJECT);
    }
}
