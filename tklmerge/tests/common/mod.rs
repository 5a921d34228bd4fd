//! Minimal `.tkl` / `.tmd` writers for file-level tests.

#![allow(dead_code)]

use glam::{Vec3, Vec4};
use std::path::Path;
use tklmerge::TableHeader;
use tklmerge::binary::{encode_table, encrypt_pointer};

pub fn write_table(dir: &Path, name: &str, locations: &[Vec3], rotations: &[Vec4]) {
    let mut fixed = [0u8; 6];
    fixed[..name.len()].copy_from_slice(name.as_bytes());
    let header = TableHeader {
        flags: [0; 4],
        byte_count: 44 + locations.len() as u32 * 12 + rotations.len() as u32 * 16,
        name: fixed,
        reserved: [0; 10],
        num_loc: locations.len() as u32,
        num_rot: rotations.len() as u32,
        scalars: [0; 5],
    };
    let bytes = encode_table(&header, locations, rotations).expect("encode table");
    std::fs::write(dir.join(format!("{name}.tkl")), bytes).expect("write table");
}

/// A model with one animation and one channel of `mode`, followed by a recognizable LOD payload.
pub fn model(table: &str, mode: u16, frames: &[(u16, u16)]) -> Vec<u8> {
    let salt = 0x55u32;
    let anim_pointer = 128usize;
    let anim = anim_pointer + 4;
    let channel = anim + 32 + 4;
    let lod = channel + 4 + 8 * frames.len();

    let mut out = vec![0u8; lod];
    out.extend_from_slice(b"LOD-PAYLOAD");
    let total = out.len() as u32;
    let put = |out: &mut Vec<u8>, at: usize, v: u32| out[at..at + 4].copy_from_slice(&v.to_le_bytes());

    out[0..4].copy_from_slice(b"TMDL");
    put(&mut out, 8, total - 60);
    out[12..12 + table.len()].copy_from_slice(table.as_bytes());
    put(&mut out, 28, lod as u32 - 60);
    put(&mut out, 32, salt);
    out[64..66].copy_from_slice(&1u16.to_le_bytes());
    out[68..70].copy_from_slice(&1u16.to_le_bytes());
    put(&mut out, 116, encrypt_pointer(128, salt));
    put(&mut out, 120, encrypt_pointer(128, salt));
    put(&mut out, 124, encrypt_pointer(anim_pointer as u32, salt));

    put(&mut out, anim_pointer, encrypt_pointer(anim as u32, salt));
    out[anim] = 4;
    out[anim + 1..anim + 5].copy_from_slice(b"walk");
    put(&mut out, anim + 32, encrypt_pointer(channel as u32, salt));
    out[channel..channel + 2].copy_from_slice(&mode.to_le_bytes());
    out[channel + 2..channel + 4].copy_from_slice(&(frames.len() as u16).to_le_bytes());
    for (i, &(loc, rot)) in frames.iter().enumerate() {
        let at = channel + 4 + 8 * i;
        out[at..at + 4].copy_from_slice(&(i as f32).to_le_bytes());
        out[at + 4..at + 6].copy_from_slice(&loc.to_le_bytes());
        out[at + 6..at + 8].copy_from_slice(&rot.to_le_bytes());
    }
    out
}
