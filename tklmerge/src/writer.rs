//! Re-serialization of models and the reduced table.

use crate::binary::{
    ANIMATION_HEADER_SIZE, CHANNEL_HEADER_SIZE, KEYFRAME_SIZE, MODEL_TABLE_NAME_SIZE, POINTER_SIZE,
    decode_model, encode_model_header, encode_table, encrypt_pointer, fixed_name, put_f32,
    put_u16, put_u32,
};
use crate::{Animation, Error, KeySlot, LutKind, ModelFile, TableHeader};
use glam::{Vec3, Vec4};

/// Rewrites a model so that it references `table_name` and reads its keys from the given index
/// streams. The streams are consumed in the order [`crate::extract::collect`] produced them.
pub fn rewrite_model(
    original: &[u8],
    table_name: &str,
    locations: &[u16],
    rotations: &[u16],
) -> Result<Vec<u8>, Error> {
    let mut model = decode_model(original)?;
    apply_indices(&mut model, locations, rotations)?;
    encode_model(original, &model, table_name)
}

/// Replaces the used indices of every visited keyframe and zeroes the unused ones.
pub fn apply_indices(
    model: &mut ModelFile,
    locations: &[u16],
    rotations: &[u16],
) -> Result<(), Error> {
    let counts = model.key_counts();
    check_stream(LutKind::Location, counts.locations, locations.len())?;
    check_stream(LutKind::Rotation, counts.rotations, rotations.len())?;

    let slots: Vec<KeySlot> = model.key_slots().collect();
    let mut location_stream = locations.iter().copied();
    let mut rotation_stream = rotations.iter().copied();
    for slot in slots {
        let key = model.keyframe_mut(slot);
        key.rotation = if slot.mode.uses_rotation() {
            rotation_stream.next().ok_or(Error::IndexStreamMismatch {
                lut: LutKind::Rotation,
                expected: counts.rotations,
                supplied: rotations.len(),
            })?
        } else {
            0
        };
        key.location = if slot.mode.uses_location() {
            location_stream.next().ok_or(Error::IndexStreamMismatch {
                lut: LutKind::Location,
                expected: counts.locations,
                supplied: locations.len(),
            })?
        } else {
            0
        };
    }
    Ok(())
}

fn check_stream(lut: LutKind, expected: usize, supplied: usize) -> Result<(), Error> {
    if expected != supplied {
        return Err(Error::IndexStreamMismatch {
            lut,
            expected,
            supplied,
        });
    }
    Ok(())
}

/// Serializes `model` over the bytes of the model it was decoded from. Everything before the
/// animation set and the LOD payload after it are copied verbatim.
pub fn encode_model(original: &[u8], model: &ModelFile, table_name: &str) -> Result<Vec<u8>, Error> {
    let table_name = fixed_name::<MODEL_TABLE_NAME_SIZE>(table_name).ok_or_else(|| {
        Error::ModelParse {
            message: format!(
                "table name '{table_name}' does not fit the {MODEL_TABLE_NAME_SIZE}-byte reference"
            ),
        }
    })?;

    let anim_start = model.header.pointers().anim_pointer as usize;
    let lod_start = model.header.lod_offset as usize;
    if anim_start > lod_start || lod_start > original.len() {
        return Err(Error::ModelParse {
            message: format!(
                "animation set at {anim_start} and LOD payload at {lod_start} do not fit a {}-byte model",
                original.len()
            ),
        });
    }

    let animation_set = encode_animation_set(model, anim_start)?;
    let lod = &original[lod_start..];
    let mut out = Vec::with_capacity(anim_start + animation_set.len() + lod.len());
    out.extend_from_slice(&original[..anim_start]);
    out.extend_from_slice(&animation_set);
    out.extend_from_slice(lod);

    let mut header = model.header.clone();
    header.table_name = table_name;
    header.lod_offset = to_offset(anim_start + animation_set.len())?;
    let delta = out.len() as i64 - original.len() as i64;
    header.byte_count = u32::try_from(header.byte_count as i64 + delta).map_err(|_| {
        Error::ModelParse {
            message: format!(
                "byte count {} cannot absorb a size change of {delta}",
                header.byte_count
            ),
        }
    })?;
    encode_model_header(&header, &mut out)?;
    Ok(out)
}

fn to_offset(offset: usize) -> Result<u32, Error> {
    u32::try_from(offset).map_err(|_| Error::ModelParse {
        message: format!("offset {offset} does not fit a 32-bit pointer"),
    })
}

fn animation_size(animation: &Animation) -> usize {
    ANIMATION_HEADER_SIZE
        + animation.channels.len() * POINTER_SIZE
        + animation
            .channels
            .iter()
            .map(|ch| CHANNEL_HEADER_SIZE + ch.frames.len() * KEYFRAME_SIZE)
            .sum::<usize>()
}

/// Lays out the animation set sequentially from `start`: the offset table, then per animation its
/// header, channel pointer table and channels. Every pointer is re-encrypted with the model salt.
fn encode_animation_set(model: &ModelFile, start: usize) -> Result<Vec<u8>, Error> {
    let salt = model.header.salt;
    let table_size = model.animations.len() * POINTER_SIZE;
    let total = table_size + model.animations.iter().map(animation_size).sum::<usize>();
    let mut out = Vec::with_capacity(total);

    let mut offset = start + table_size;
    for animation in &model.animations {
        put_u32(&mut out, encrypt_pointer(to_offset(offset)?, salt));
        offset += animation_size(animation);
    }

    for animation in &model.animations {
        out.extend_from_slice(&animation.name);
        put_u32(&mut out, animation.unknown[0]);
        put_u32(&mut out, animation.unknown[1]);
        put_u32(&mut out, animation.num_groups);
        put_f32(&mut out, animation.duration);

        let mut channel_offset =
            start + out.len() + animation.channels.len() * POINTER_SIZE;
        for channel in &animation.channels {
            put_u32(&mut out, encrypt_pointer(to_offset(channel_offset)?, salt));
            channel_offset += CHANNEL_HEADER_SIZE + channel.frames.len() * KEYFRAME_SIZE;
        }

        for channel in &animation.channels {
            put_u16(&mut out, channel.mode.raw());
            put_u16(&mut out, channel.frames.len() as u16);
            for key in &channel.frames {
                put_f32(&mut out, key.time);
                put_u16(&mut out, key.location);
                put_u16(&mut out, key.rotation);
            }
        }
    }
    debug_assert_eq!(out.len(), total);
    Ok(out)
}

/// Encodes the reduced table, inheriting every non-count field from the master table header.
pub fn rewrite_table(
    master: &TableHeader,
    locations: &[Vec3],
    rotations: &[Vec4],
) -> Result<Vec<u8>, Error> {
    encode_table(master, locations, rotations)
}
