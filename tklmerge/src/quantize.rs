//! Nearest-centroid assignment.

use crate::{Error, LutKind};
use glam::{Vec3, Vec4};
use std::hash::Hash;
use std::ops::{Add, Mul};

/// A fixed-width float vector stored in a lookup table.
pub trait LutVector:
    Copy + PartialEq + Default + Add<Output = Self> + Mul<f32, Output = Self>
{
    /// Bit pattern used for exact-equality hashing.
    type Bits: Eq + Hash;

    fn distance_squared(self, other: Self) -> f32;

    fn bits(self) -> Self::Bits;
}

macro_rules! impl_lut_vector {
    ($ty:ty, $n:literal) => {
        impl LutVector for $ty {
            type Bits = [u32; $n];

            fn distance_squared(self, other: Self) -> f32 {
                <$ty>::distance_squared(self, other)
            }

            fn bits(self) -> Self::Bits {
                self.to_array().map(f32::to_bits)
            }
        }
    };
}

impl_lut_vector!(Vec3, 3);
impl_lut_vector!(Vec4, 4);

/// Index of the centroid closest to `value` (Euclidean). Ties go to the lowest index and a NaN
/// distance ranks behind every other. `None` when `centroids` is empty.
pub fn quantize<V: LutVector>(value: V, centroids: &[V]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &c) in centroids.iter().enumerate() {
        let d = value.distance_squared(c);
        let closer = match best {
            None => true,
            Some((_, best_d)) => d < best_d || (best_d.is_nan() && !d.is_nan()),
        };
        if closer {
            best = Some((i, d));
        }
    }
    best.map(|(i, _)| i)
}

/// Quantizes every value in order, producing the replacement index stream.
pub fn remap<V: LutVector>(values: &[V], centroids: &[V], lut: LutKind) -> Result<Vec<u16>, Error> {
    if centroids.len() > u16::MAX as usize + 1 || (centroids.is_empty() && !values.is_empty()) {
        return Err(Error::Capacity {
            lut,
            required: values.len().max(centroids.len()),
            capacity: centroids.len().min(u16::MAX as usize + 1),
        });
    }
    Ok(values
        .iter()
        .filter_map(|&v| quantize(v, centroids))
        .map(|i| i as u16)
        .collect())
}
