use crate::binary::{
    SHIFTED_TRIAD_MARKER, decode_model, decode_model_header, decode_table, encode_model_header,
    encode_table, encrypt_pointer, peek_table_name,
};
use crate::test_support::{ModelSpec, channel, model_bytes, table_bytes, table_header};
use crate::{ChannelMode, Error, ErrorKind, TriadLayout};
use glam::{Vec3, Vec4};

fn sample_locations() -> Vec<Vec3> {
    vec![
        Vec3::new(0.0, 1.0, 2.0),
        Vec3::new(-3.5, 4.25, 0.125),
        Vec3::new(1e-6, -0.0, 1e6),
    ]
}

fn sample_rotations() -> Vec<Vec4> {
    vec![Vec4::new(0.0, 0.0, 0.0, 1.0), Vec4::new(0.5, -0.5, 0.5, 0.5)]
}

fn assert_format_error(err: Error, needle: &str) {
    assert_eq!(err.kind(), ErrorKind::Format, "{err}");
    let message = err.to_string();
    assert!(message.contains(needle), "expected {needle:?} in {message:?}");
}

#[test]
fn table_round_trip_preserves_header_and_luts() {
    let header = table_header("Dma", 3, 2);
    let bytes = encode_table(&header, &sample_locations(), &sample_rotations()).expect("encode");
    assert_eq!(bytes.len(), 56 + 3 * 12 + 2 * 16);
    assert_eq!(&bytes[0..4], b"TPKL");

    let table = decode_table(&bytes).expect("decode");
    assert_eq!(table.header, header);
    assert_eq!(table.locations, sample_locations());
    assert_eq!(table.rotations, sample_rotations());
    assert_eq!(table.name(), "Dma");
}

#[test]
fn table_layout_matches_fixed_offsets() {
    let bytes = table_bytes("Dhbja", &sample_locations(), &sample_rotations());
    assert_eq!(&bytes[12..18], b"Dhbja\0");
    assert_eq!(crate::test_support::u32_at(&bytes, 28), 3);
    assert_eq!(crate::test_support::u32_at(&bytes, 32), 2);
    assert_eq!(&bytes[56..60], &0.0f32.to_le_bytes());
    assert_eq!(&bytes[60..64], &1.0f32.to_le_bytes());
}

#[test]
fn table_with_non_finite_entry_is_rejected() {
    let mut locations = sample_locations();
    locations[1].y = f32::NAN;
    let err = decode_table(&table_bytes("Dma", &locations, &sample_rotations())).expect_err("nan");
    assert_format_error(err, "location 1 is not finite");

    let mut rotations = sample_rotations();
    rotations[0].w = f32::INFINITY;
    let err = decode_table(&table_bytes("Dma", &sample_locations(), &rotations)).expect_err("inf");
    assert_format_error(err, "rotation 0 is not finite");
}

#[test]
fn encode_table_pads_with_first_vector() {
    let header = table_header("Dma", 4, 3);
    let locations = [Vec3::new(9.0, 8.0, 7.0), Vec3::ONE];
    let rotations = [Vec4::W];
    let table = decode_table(&encode_table(&header, &locations, &rotations).expect("encode"))
        .expect("decode");
    assert_eq!(table.header.num_loc, 4);
    assert_eq!(
        table.locations,
        vec![locations[0], locations[1], locations[0], locations[0]]
    );
    assert_eq!(table.rotations, vec![Vec4::W; 3]);
}

#[test]
fn encode_table_rejects_more_vectors_than_slots() {
    let header = table_header("Dma", 1, 2);
    let err = encode_table(&header, &sample_locations(), &sample_rotations()).expect_err("overflow");
    assert_eq!(err.kind(), ErrorKind::Capacity);
}

#[test]
fn decode_table_rejects_bad_magic() {
    let mut bytes = table_bytes("Dma", &sample_locations(), &sample_rotations());
    bytes[0..4].copy_from_slice(b"TMDL");
    assert_format_error(decode_table(&bytes).expect_err("magic"), "bad magic");
}

#[test]
fn decode_table_rejects_truncated_luts() {
    let bytes = table_bytes("Dma", &sample_locations(), &sample_rotations());
    let err = decode_table(&bytes[..bytes.len() - 1]).expect_err("truncated");
    assert_format_error(err, "3 locations and 2 rotations");
    assert_format_error(decode_table(&bytes[..20]).expect_err("header"), "unexpected EOF");
}

fn two_node_model() -> ModelSpec {
    ModelSpec::new(
        "Dma",
        vec![
            vec![
                channel(1, &[(0.0, 0, 1), (0.5, 2, 0)]),
                channel(2, &[]),
            ],
            vec![
                channel(0, &[(0.0, 77, 1)]),
                channel(3, &[(0.25, 1, 55), (1.0, 2, 66)]),
            ],
        ],
    )
}

#[test]
fn model_header_decrypts_pointer_triad() {
    let spec = two_node_model();
    let bytes = model_bytes(&spec);
    let header = decode_model_header(&bytes).expect("header");

    assert_eq!(header.table_name(), "Dma");
    assert_eq!(header.salt, spec.salt);
    assert_eq!(header.magic, [0x1234_5678, 0x9abc_def0]);
    assert_eq!(header.scene.num_nodes, 2);
    assert_eq!(header.scene.num_anims, 2);
    assert_eq!(header.scene.counters, [7, 9]);
    assert_eq!(header.layout, TriadLayout::Standard);
    assert_eq!(header.stored_pointers.aux_node_data, 128);
    assert_eq!(header.pointers().anim_pointer, 128 + spec.node_block as u32);
    assert_eq!(header.byte_count as usize, bytes.len() - 60);
    assert_eq!(header.lod_offset as usize, bytes.len() - spec.lod.len());
}

#[test]
fn shifted_triad_moves_anim_pointer_into_node_slot() {
    let mut spec = two_node_model();
    spec.shifted_triad = true;
    let bytes = model_bytes(&spec);
    let header = decode_model_header(&bytes).expect("header");

    assert_eq!(header.stored_pointers.aux_node_data, SHIFTED_TRIAD_MARKER);
    assert_eq!(header.layout, TriadLayout::Shifted);
    let pointers = header.pointers();
    assert_eq!(pointers.node_data, SHIFTED_TRIAD_MARKER);
    assert_eq!(pointers.anim_pointer, 128 + spec.node_block as u32);

    let model = decode_model(&bytes).expect("decode");
    assert_eq!(model.animations.len(), 2);
}

#[test]
fn encode_model_header_reproduces_original_bytes() {
    for shifted in [false, true] {
        let mut spec = two_node_model();
        spec.shifted_triad = shifted;
        spec.salt = 0xffff_fff0;
        let bytes = model_bytes(&spec);
        let header = decode_model_header(&bytes).expect("header");

        let mut scratch = bytes.clone();
        scratch[..128].fill(0);
        scratch[36..60].copy_from_slice(&bytes[36..60]);
        scratch[72..116].copy_from_slice(&bytes[72..116]);
        encode_model_header(&header, &mut scratch).expect("encode");
        assert_eq!(scratch, bytes);
    }
}

#[test]
fn decode_model_reads_animation_structure() {
    let bytes = model_bytes(&two_node_model());
    let model = decode_model(&bytes).expect("decode");

    assert_eq!(model.animations.len(), 2);
    let first = &model.animations[0];
    assert_eq!(first.name(), "anim0");
    assert_eq!(first.unknown, [100, 200]);
    assert_eq!(first.num_groups, 1);
    assert_eq!(first.duration, 1.5);
    assert_eq!(first.channels.len(), 2);
    assert_eq!(first.channels[0].mode, ChannelMode::TransAndRot);
    assert_eq!(first.channels[0].frames.len(), 2);
    assert_eq!(first.channels[0].frames[1].time, 0.5);
    assert_eq!(first.channels[0].frames[1].location, 2);
    assert_eq!(first.channels[1].mode, ChannelMode::Skip);
    assert!(first.channels[1].frames.is_empty());

    let second = &model.animations[1];
    assert_eq!(second.channels[0].mode, ChannelMode::TransQuatFallback);
    assert_eq!(second.channels[1].mode, ChannelMode::QuatTransFallback);
    assert_eq!(second.channels[1].frames[1].rotation, 66);
}

#[test]
fn skip_channel_with_frames_is_a_format_error() {
    let spec = ModelSpec::new("Dma", vec![vec![channel(2, &[(0.0, 1, 1)])]]);
    let err = decode_model(&model_bytes(&spec)).expect_err("skip with frames");
    assert_format_error(err, "skip channel");
}

#[test]
fn unknown_channel_mode_is_a_format_error() {
    let spec = ModelSpec::new("Dma", vec![vec![channel(4, &[(0.0, 1, 1)])]]);
    let err = decode_model(&model_bytes(&spec)).expect_err("mode 4");
    assert_format_error(err, "unknown channel mode 4");
}

#[test]
fn dangling_animation_offset_is_a_format_error() {
    let spec = two_node_model();
    let mut bytes = model_bytes(&spec);
    let table_at = 128 + spec.node_block;
    let bogus = encrypt_pointer(bytes.len() as u32 + 100, spec.salt);
    bytes[table_at..table_at + 4].copy_from_slice(&bogus.to_le_bytes());
    assert_format_error(decode_model(&bytes).expect_err("dangling"), "outside the buffer");
}

#[test]
fn model_header_rejects_bad_magic_and_short_buffers() {
    let mut bytes = model_bytes(&two_node_model());
    assert_format_error(decode_model_header(&bytes[..100]).expect_err("short"), "shorter");
    bytes[0] = b'X';
    assert_format_error(decode_model_header(&bytes).expect_err("magic"), "bad magic");
}

#[test]
fn peek_reads_only_the_table_reference() {
    let bytes = model_bytes(&ModelSpec::new("Dhbja", vec![vec![channel(1, &[])]]));
    assert_eq!(peek_table_name(&bytes[..20]).expect("peek"), "Dhbja");
    assert!(peek_table_name(&bytes[..16]).is_err());
}
