//! `.tkl` / `.tmd` codec.
//!
//! The codec is IO-free: it operates on in-memory byte slices. All multi-byte values are
//! little-endian.

use crate::{
    Animation, Channel, ChannelMode, Error, Keyframe, LutKind, ModelFile, ModelHeader,
    PointerTriad, SceneSummary, TableFile, TableHeader, TriadLayout,
};
use byteorder::{ByteOrder, LittleEndian};
use glam::{Vec3, Vec4};

pub const TABLE_MAGIC: &[u8; 4] = b"TPKL";
pub const TABLE_HEADER_SIZE: usize = 56;
pub const LOCATION_STRIDE: usize = 12;
pub const ROTATION_STRIDE: usize = 16;

pub const MODEL_MAGIC: &[u8; 4] = b"TMDL";
/// Size of the leading model header. Stored pointers and the LOD offset are relative to its end.
pub const MODEL_HEADER_SIZE: u32 = 60;
pub const TABLE_NAME_SIZE: usize = 6;
pub const MODEL_TABLE_NAME_SIZE: usize = 8;

/// A decrypted `aux_node_data` equal to this marks the shifted pointer triad variant.
pub const SHIFTED_TRIAD_MARKER: u32 = 124;

pub const POINTER_SIZE: usize = 4;
pub const ANIMATION_HEADER_SIZE: usize = 32;
pub const CHANNEL_HEADER_SIZE: usize = 4;
pub const KEYFRAME_SIZE: usize = 8;

const MODEL_TABLE_NAME_OFFSET: usize = 12;
const SCENE_SUMMARY_OFFSET: usize = 60;
const POINTER_TRIAD_OFFSET: usize = 116;
const MODEL_PREFIX_SIZE: usize = POINTER_TRIAD_OFFSET + 3 * POINTER_SIZE;

#[derive(Copy, Clone, Debug)]
enum Container {
    Table,
    Model,
}

impl Container {
    fn error(self, message: String) -> Error {
        match self {
            Self::Table => Error::TableParse { message },
            Self::Model => Error::ModelParse { message },
        }
    }
}

#[derive(Clone, Debug)]
struct BinaryInput<'a> {
    bytes: &'a [u8],
    cursor: usize,
    container: Container,
}

impl<'a> BinaryInput<'a> {
    fn new(bytes: &'a [u8], container: Container) -> Self {
        Self {
            bytes,
            cursor: 0,
            container,
        }
    }

    fn error(&self, message: String) -> Error {
        self.container.error(message)
    }

    fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.cursor)
    }

    fn seek(&mut self, offset: usize) -> Result<(), Error> {
        if offset > self.bytes.len() {
            return Err(self.error(format!(
                "offset {offset} is outside the buffer ({} bytes)",
                self.bytes.len()
            )));
        }
        self.cursor = offset;
        Ok(())
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], Error> {
        if self.remaining() < len {
            return Err(self.error(format!(
                "unexpected EOF reading {len} bytes at offset {} ({} bytes total)",
                self.cursor,
                self.bytes.len()
            )));
        }
        let bytes = &self.bytes[self.cursor..self.cursor + len];
        self.cursor += len;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], Error> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn read_u16(&mut self) -> Result<u16, Error> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    fn read_u32(&mut self) -> Result<u32, Error> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    fn read_f32(&mut self) -> Result<f32, Error> {
        Ok(LittleEndian::read_f32(self.take(4)?))
    }

    fn read_vec3(&mut self) -> Result<Vec3, Error> {
        Ok(Vec3::new(self.read_f32()?, self.read_f32()?, self.read_f32()?))
    }

    fn read_vec4(&mut self) -> Result<Vec4, Error> {
        Ok(Vec4::new(
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
        ))
    }
}

pub(crate) fn put_u16(out: &mut Vec<u8>, v: u16) {
    let mut b = [0u8; 2];
    LittleEndian::write_u16(&mut b, v);
    out.extend_from_slice(&b);
}

pub(crate) fn put_u32(out: &mut Vec<u8>, v: u32) {
    let mut b = [0u8; 4];
    LittleEndian::write_u32(&mut b, v);
    out.extend_from_slice(&b);
}

pub(crate) fn put_f32(out: &mut Vec<u8>, v: f32) {
    let mut b = [0u8; 4];
    LittleEndian::write_f32(&mut b, v);
    out.extend_from_slice(&b);
}

/// Null-padded fixed-width name field. `None` if `name` does not fit.
pub(crate) fn fixed_name<const N: usize>(name: &str) -> Option<[u8; N]> {
    let bytes = name.as_bytes();
    if bytes.len() > N {
        return None;
    }
    let mut out = [0u8; N];
    out[..bytes.len()].copy_from_slice(bytes);
    Some(out)
}

pub fn decrypt_pointer(stored: u32, salt: u32) -> u32 {
    stored.wrapping_add(MODEL_HEADER_SIZE).wrapping_sub(salt)
}

pub fn encrypt_pointer(absolute: u32, salt: u32) -> u32 {
    absolute.wrapping_sub(MODEL_HEADER_SIZE).wrapping_add(salt)
}

fn check_magic(input: &mut BinaryInput<'_>, expected: &[u8; 4]) -> Result<(), Error> {
    let magic = input.read_array::<4>()?;
    if &magic != expected {
        return Err(input.error(format!(
            "bad magic {:02x?}, expected {:?}",
            magic,
            String::from_utf8_lossy(expected)
        )));
    }
    Ok(())
}

pub fn decode_table(bytes: &[u8]) -> Result<TableFile, Error> {
    let mut input = BinaryInput::new(bytes, Container::Table);
    check_magic(&mut input, TABLE_MAGIC)?;

    let flags = input.read_array()?;
    let byte_count = input.read_u32()?;
    let name = input.read_array()?;
    let reserved = input.read_array()?;
    let num_loc = input.read_u32()?;
    let num_rot = input.read_u32()?;
    let mut scalars = [0u32; 5];
    for s in &mut scalars {
        *s = input.read_u32()?;
    }
    let header = TableHeader {
        flags,
        byte_count,
        name,
        reserved,
        num_loc,
        num_rot,
        scalars,
    };

    let declared = num_loc as u64 * LOCATION_STRIDE as u64 + num_rot as u64 * ROTATION_STRIDE as u64;
    if (input.remaining() as u64) < declared {
        return Err(input.error(format!(
            "header declares {num_loc} locations and {num_rot} rotations ({declared} bytes) but only {} bytes follow",
            input.remaining()
        )));
    }

    let mut locations = Vec::with_capacity(num_loc as usize);
    for i in 0..num_loc {
        let v = input.read_vec3()?;
        if !v.is_finite() {
            return Err(input.error(format!("location {i} is not finite: {v}")));
        }
        locations.push(v);
    }
    let mut rotations = Vec::with_capacity(num_rot as usize);
    for i in 0..num_rot {
        let v = input.read_vec4()?;
        if !v.is_finite() {
            return Err(input.error(format!("rotation {i} is not finite: {v}")));
        }
        rotations.push(v);
    }

    Ok(TableFile {
        header,
        locations,
        rotations,
    })
}

/// Pads `values` to `count` entries by repeating the first one. An empty LUT is padded with the
/// default (zero) vector.
fn pad_lut<V: Copy + Default>(values: &[V], count: u32, lut: LutKind) -> Result<Vec<V>, Error> {
    let count = count as usize;
    if values.len() > count {
        return Err(Error::Capacity {
            lut,
            required: values.len(),
            capacity: count,
        });
    }
    let mut out = Vec::with_capacity(count);
    out.extend_from_slice(values);
    let fill = values.first().copied().unwrap_or_default();
    out.resize(count, fill);
    Ok(out)
}

/// Encodes a table with the counts recorded in `header`. Short LUTs are padded by repeating their
/// first vector.
pub fn encode_table(
    header: &TableHeader,
    locations: &[Vec3],
    rotations: &[Vec4],
) -> Result<Vec<u8>, Error> {
    let locations = pad_lut(locations, header.num_loc, LutKind::Location)?;
    let rotations = pad_lut(rotations, header.num_rot, LutKind::Rotation)?;

    let mut out = Vec::with_capacity(
        TABLE_HEADER_SIZE + locations.len() * LOCATION_STRIDE + rotations.len() * ROTATION_STRIDE,
    );
    out.extend_from_slice(TABLE_MAGIC);
    out.extend_from_slice(&header.flags);
    put_u32(&mut out, header.byte_count);
    out.extend_from_slice(&header.name);
    out.extend_from_slice(&header.reserved);
    put_u32(&mut out, header.num_loc);
    put_u32(&mut out, header.num_rot);
    for s in header.scalars {
        put_u32(&mut out, s);
    }
    for v in &locations {
        for c in v.to_array() {
            put_f32(&mut out, c);
        }
    }
    for v in &rotations {
        for c in v.to_array() {
            put_f32(&mut out, c);
        }
    }
    Ok(out)
}

/// Reads only the table reference of a model.
pub fn peek_table_name(bytes: &[u8]) -> Result<String, Error> {
    let mut input = BinaryInput::new(bytes, Container::Model);
    check_magic(&mut input, MODEL_MAGIC)?;
    input.seek(MODEL_TABLE_NAME_OFFSET)?;
    let name = input.read_array::<MODEL_TABLE_NAME_SIZE>()?;
    let end = name.iter().position(|&b| b == 0).unwrap_or(name.len());
    Ok(String::from_utf8_lossy(&name[..end]).into_owned())
}

pub fn decode_model_header(bytes: &[u8]) -> Result<ModelHeader, Error> {
    let mut input = BinaryInput::new(bytes, Container::Model);
    if bytes.len() < MODEL_PREFIX_SIZE {
        return Err(input.error(format!(
            "buffer of {} bytes is shorter than the {MODEL_PREFIX_SIZE}-byte header",
            bytes.len()
        )));
    }
    check_magic(&mut input, MODEL_MAGIC)?;

    let reserved = input.read_array()?;
    let byte_count = input.read_u32()?;
    let table_name = input.read_array()?;
    let magic = [input.read_u32()?, input.read_u32()?];
    let lod_relative = input.read_u32()?;
    let salt = input.read_u32()?;
    let lod_offset = lod_relative.checked_add(MODEL_HEADER_SIZE).ok_or_else(|| {
        input.error(format!("LOD offset {lod_relative} overflows"))
    })?;

    input.seek(SCENE_SUMMARY_OFFSET)?;
    let scene_bytes = input.read_u32()?;
    let num_nodes = input.read_u16()?;
    let counter0 = input.read_u16()?;
    let num_anims = input.read_u16()?;
    let counter1 = input.read_u16()?;

    input.seek(POINTER_TRIAD_OFFSET)?;
    let stored_pointers = PointerTriad {
        aux_node_data: decrypt_pointer(input.read_u32()?, salt),
        node_data: decrypt_pointer(input.read_u32()?, salt),
        anim_pointer: decrypt_pointer(input.read_u32()?, salt),
    };
    let layout = if stored_pointers.aux_node_data == SHIFTED_TRIAD_MARKER {
        tracing::debug!("shifted pointer triad (aux_node_data = {SHIFTED_TRIAD_MARKER})");
        TriadLayout::Shifted
    } else {
        TriadLayout::Standard
    };

    Ok(ModelHeader {
        reserved,
        byte_count,
        table_name,
        magic,
        lod_offset,
        salt,
        scene: SceneSummary {
            byte_count: scene_bytes,
            num_nodes,
            num_anims,
            counters: [counter0, counter1],
        },
        stored_pointers,
        layout,
    })
}

/// Patches the known header fields into `buf`, which must already hold the original header bytes.
/// Unknown header bytes are left untouched.
pub fn encode_model_header(header: &ModelHeader, buf: &mut [u8]) -> Result<(), Error> {
    if buf.len() < MODEL_PREFIX_SIZE {
        return Err(Error::ModelParse {
            message: format!(
                "buffer of {} bytes is shorter than the {MODEL_PREFIX_SIZE}-byte header",
                buf.len()
            ),
        });
    }
    let lod_relative = header
        .lod_offset
        .checked_sub(MODEL_HEADER_SIZE)
        .ok_or_else(|| Error::ModelParse {
            message: format!(
                "LOD offset {} precedes the end of the header",
                header.lod_offset
            ),
        })?;

    buf[0..4].copy_from_slice(MODEL_MAGIC);
    buf[4..8].copy_from_slice(&header.reserved);
    LittleEndian::write_u32(&mut buf[8..12], header.byte_count);
    buf[12..20].copy_from_slice(&header.table_name);
    LittleEndian::write_u32(&mut buf[20..24], header.magic[0]);
    LittleEndian::write_u32(&mut buf[24..28], header.magic[1]);
    LittleEndian::write_u32(&mut buf[28..32], lod_relative);
    LittleEndian::write_u32(&mut buf[32..36], header.salt);

    let scene = &mut buf[SCENE_SUMMARY_OFFSET..SCENE_SUMMARY_OFFSET + 12];
    LittleEndian::write_u32(&mut scene[0..4], header.scene.byte_count);
    LittleEndian::write_u16(&mut scene[4..6], header.scene.num_nodes);
    LittleEndian::write_u16(&mut scene[6..8], header.scene.counters[0]);
    LittleEndian::write_u16(&mut scene[8..10], header.scene.num_anims);
    LittleEndian::write_u16(&mut scene[10..12], header.scene.counters[1]);

    let p = header.stored_pointers;
    let triad = &mut buf[POINTER_TRIAD_OFFSET..MODEL_PREFIX_SIZE];
    LittleEndian::write_u32(&mut triad[0..4], encrypt_pointer(p.aux_node_data, header.salt));
    LittleEndian::write_u32(&mut triad[4..8], encrypt_pointer(p.node_data, header.salt));
    LittleEndian::write_u32(&mut triad[8..12], encrypt_pointer(p.anim_pointer, header.salt));
    Ok(())
}

/// Decodes the header and the full animation set of a model.
pub fn decode_model(bytes: &[u8]) -> Result<ModelFile, Error> {
    let header = decode_model_header(bytes)?;
    let pointers = header.pointers();
    let num_nodes = header.scene.num_nodes as usize;
    let num_anims = header.scene.num_anims as usize;
    let salt = header.salt;

    let mut input = BinaryInput::new(bytes, Container::Model);
    if header.lod_offset as usize > bytes.len() {
        return Err(input.error(format!(
            "LOD payload offset {} is past the end of the buffer ({} bytes)",
            header.lod_offset,
            bytes.len()
        )));
    }
    if (pointers.anim_pointer as usize) < MODEL_PREFIX_SIZE {
        return Err(input.error(format!(
            "animation set at {} overlaps the {MODEL_PREFIX_SIZE}-byte header",
            pointers.anim_pointer
        )));
    }
    if pointers.anim_pointer > header.lod_offset {
        return Err(input.error(format!(
            "animation set at {} starts after the LOD payload at {}",
            pointers.anim_pointer, header.lod_offset
        )));
    }

    input.seek(pointers.anim_pointer as usize)?;
    let mut anim_offsets = Vec::with_capacity(num_anims);
    for _ in 0..num_anims {
        anim_offsets.push(decrypt_pointer(input.read_u32()?, salt));
    }

    let mut animations = Vec::with_capacity(num_anims);
    for offset in anim_offsets {
        input.seek(offset as usize)?;
        animations.push(read_animation(&mut input, num_nodes, salt)?);
    }

    Ok(ModelFile { header, animations })
}

fn read_animation(
    input: &mut BinaryInput<'_>,
    num_nodes: usize,
    salt: u32,
) -> Result<Animation, Error> {
    let name = input.read_array()?;
    let unknown = [input.read_u32()?, input.read_u32()?];
    let num_groups = input.read_u32()?;
    let duration = input.read_f32()?;

    let mut channel_offsets = Vec::with_capacity(num_nodes);
    for _ in 0..num_nodes {
        channel_offsets.push(decrypt_pointer(input.read_u32()?, salt));
    }

    let mut channels = Vec::with_capacity(num_nodes);
    for offset in channel_offsets {
        input.seek(offset as usize)?;
        channels.push(read_channel(input)?);
    }

    Ok(Animation {
        name,
        unknown,
        num_groups,
        duration,
        channels,
    })
}

fn read_channel(input: &mut BinaryInput<'_>) -> Result<Channel, Error> {
    let offset = input.cursor;
    let raw_mode = input.read_u16()?;
    let num_frames = input.read_u16()?;
    let mode = ChannelMode::from_raw(raw_mode).ok_or_else(|| {
        input.error(format!("unknown channel mode {raw_mode} at offset {offset}"))
    })?;
    if mode == ChannelMode::Skip && num_frames > 0 {
        return Err(input.error(format!(
            "skip channel at offset {offset} declares {num_frames} frames"
        )));
    }

    let mut frames = Vec::with_capacity(num_frames as usize);
    for _ in 0..num_frames {
        frames.push(Keyframe {
            time: input.read_f32()?,
            location: input.read_u16()?,
            rotation: input.read_u16()?,
        });
    }
    Ok(Channel { mode, frames })
}
