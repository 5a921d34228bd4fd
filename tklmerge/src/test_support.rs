//! In-memory fixtures for `.tkl` / `.tmd` files.

use crate::TableHeader;
use crate::binary::{encode_table, encrypt_pointer};
use glam::{Vec3, Vec4};

pub(crate) fn table_header(name: &str, num_loc: u32, num_rot: u32) -> TableHeader {
    let mut fixed = [0u8; 6];
    fixed[..name.len()].copy_from_slice(name.as_bytes());
    TableHeader {
        flags: [1, 0, 2, 0],
        byte_count: 44 + num_loc * 12 + num_rot * 16,
        name: fixed,
        reserved: [0, 1, 2, 3, 4, 5, 6, 7, 8, 9],
        num_loc,
        num_rot,
        scalars: [10, 20, 30, 40, 50],
    }
}

pub(crate) fn table_bytes(name: &str, locations: &[Vec3], rotations: &[Vec4]) -> Vec<u8> {
    let header = table_header(name, locations.len() as u32, rotations.len() as u32);
    encode_table(&header, locations, rotations).expect("encode table")
}

#[derive(Clone, Debug)]
pub(crate) struct ChannelSpec {
    pub mode: u16,
    /// `(time, location, rotation)`
    pub frames: Vec<(f32, u16, u16)>,
}

pub(crate) fn channel(mode: u16, frames: &[(f32, u16, u16)]) -> ChannelSpec {
    ChannelSpec {
        mode,
        frames: frames.to_vec(),
    }
}

#[derive(Clone, Debug)]
pub(crate) struct ModelSpec {
    pub table: String,
    pub salt: u32,
    pub num_nodes: u16,
    /// One entry per animation, each holding `num_nodes` channels.
    pub animations: Vec<Vec<ChannelSpec>>,
    /// Opaque node data between the header and the animation set.
    pub node_block: usize,
    /// Padding after every channel, which a rewrite drops.
    pub channel_gap: usize,
    pub lod: Vec<u8>,
    pub shifted_triad: bool,
}

impl ModelSpec {
    pub(crate) fn new(table: &str, animations: Vec<Vec<ChannelSpec>>) -> Self {
        let num_nodes = animations.first().map(|a| a.len()).unwrap_or(0) as u16;
        Self {
            table: table.to_string(),
            salt: 0x0001_0203,
            num_nodes,
            animations,
            node_block: 176,
            channel_gap: 0,
            lod: (0..64u8).map(|i| i.wrapping_mul(7)).collect(),
            shifted_triad: false,
        }
    }
}

fn put_u32(out: &mut [u8], at: usize, v: u32) {
    out[at..at + 4].copy_from_slice(&v.to_le_bytes());
}

fn put_u16(out: &mut [u8], at: usize, v: u16) {
    out[at..at + 2].copy_from_slice(&v.to_le_bytes());
}

pub(crate) fn model_bytes(spec: &ModelSpec) -> Vec<u8> {
    let num_nodes = spec.num_nodes as usize;
    let num_anims = spec.animations.len();
    let anim_pointer = 128 + spec.node_block;

    let mut pos = anim_pointer + 4 * num_anims;
    let mut anim_pos = Vec::new();
    let mut channel_pos = Vec::new();
    for channels in &spec.animations {
        anim_pos.push(pos);
        pos += 32 + 4 * num_nodes;
        let mut per_anim = Vec::new();
        for ch in channels {
            per_anim.push(pos);
            pos += 4 + 8 * ch.frames.len() + spec.channel_gap;
        }
        channel_pos.push(per_anim);
    }
    let lod_offset = pos;

    let mut out: Vec<u8> = (0..lod_offset).map(|i| (i % 251) as u8).collect();
    out.extend_from_slice(&spec.lod);
    let salt = spec.salt;
    let enc = |p: usize| encrypt_pointer(p as u32, salt);

    out[0..4].copy_from_slice(b"TMDL");
    out[4..8].copy_from_slice(&[0xaa, 0xbb, 0xcc, 0xdd]);
    let total = out.len() as u32;
    put_u32(&mut out, 8, total - 60);
    let mut name = [0u8; 8];
    name[..spec.table.len()].copy_from_slice(spec.table.as_bytes());
    out[12..20].copy_from_slice(&name);
    put_u32(&mut out, 20, 0x1234_5678);
    put_u32(&mut out, 24, 0x9abc_def0);
    put_u32(&mut out, 28, lod_offset as u32 - 60);
    put_u32(&mut out, 32, salt);

    put_u32(&mut out, 60, 0x40);
    put_u16(&mut out, 64, spec.num_nodes);
    put_u16(&mut out, 66, 7);
    put_u16(&mut out, 68, num_anims as u16);
    put_u16(&mut out, 70, 9);

    if spec.shifted_triad {
        put_u32(&mut out, 116, enc(124));
        put_u32(&mut out, 120, enc(anim_pointer));
        put_u32(&mut out, 124, enc(0xdead));
    } else {
        put_u32(&mut out, 116, enc(128));
        put_u32(&mut out, 120, enc(128 + spec.node_block / 2));
        put_u32(&mut out, 124, enc(anim_pointer));
    }

    for (a, channels) in spec.animations.iter().enumerate() {
        put_u32(&mut out, anim_pointer + 4 * a, enc(anim_pos[a]));
        let base = anim_pos[a];
        let name = format!("anim{a}");
        out[base] = name.len() as u8;
        out[base + 1..base + 16].fill(0);
        out[base + 1..base + 1 + name.len()].copy_from_slice(name.as_bytes());
        put_u32(&mut out, base + 16, 100 + a as u32);
        put_u32(&mut out, base + 20, 200 + a as u32);
        put_u32(&mut out, base + 24, 1);
        out[base + 28..base + 32].copy_from_slice(&(1.5f32 + a as f32).to_le_bytes());
        for (c, ch) in channels.iter().enumerate() {
            put_u32(&mut out, base + 32 + 4 * c, enc(channel_pos[a][c]));
            let at = channel_pos[a][c];
            put_u16(&mut out, at, ch.mode);
            put_u16(&mut out, at + 2, ch.frames.len() as u16);
            for (f, &(time, loc, rot)) in ch.frames.iter().enumerate() {
                let k = at + 4 + 8 * f;
                out[k..k + 4].copy_from_slice(&time.to_le_bytes());
                put_u16(&mut out, k + 4, loc);
                put_u16(&mut out, k + 6, rot);
            }
        }
    }
    out
}

pub(crate) fn u32_at(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}
