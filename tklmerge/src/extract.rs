//! Collects the table indices a model actually references.

use crate::{Error, LutKind, ModelFile, TableFile};
use glam::{Vec3, Vec4};

/// Index streams of one model, in traversal order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyIndices {
    /// Name of the table the model references.
    pub table: String,
    pub locations: Vec<u16>,
    pub rotations: Vec<u16>,
}

/// Resolved values of [`KeyIndices`], in the same order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct KeyValues {
    pub locations: Vec<Vec3>,
    pub rotations: Vec<Vec4>,
}

pub fn collect(model: &ModelFile) -> KeyIndices {
    let counts = model.key_counts();
    let mut locations = Vec::with_capacity(counts.locations);
    let mut rotations = Vec::with_capacity(counts.rotations);
    for slot in model.key_slots() {
        let key = model.keyframe(slot);
        if slot.mode.uses_rotation() {
            rotations.push(key.rotation);
        }
        if slot.mode.uses_location() {
            locations.push(key.location);
        }
    }
    KeyIndices {
        table: model.header.table_name(),
        locations,
        rotations,
    }
}

impl KeyIndices {
    pub fn resolve(&self, table: &TableFile) -> Result<KeyValues, Error> {
        Ok(KeyValues {
            locations: lookup(&self.locations, &table.locations, LutKind::Location, table)?,
            rotations: lookup(&self.rotations, &table.rotations, LutKind::Rotation, table)?,
        })
    }
}

fn lookup<V: Copy>(
    indices: &[u16],
    lut: &[V],
    kind: LutKind,
    table: &TableFile,
) -> Result<Vec<V>, Error> {
    indices
        .iter()
        .map(|&index| {
            lut.get(index as usize)
                .copied()
                .ok_or_else(|| Error::IndexOutOfRange {
                    lut: kind,
                    index,
                    len: lut.len(),
                    table: table.name(),
                })
        })
        .collect()
}
