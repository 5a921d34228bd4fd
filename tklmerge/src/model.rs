use glam::{Vec3, Vec4};
use std::fmt;

/// Which of the two lookup tables a value or index belongs to.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum LutKind {
    Location,
    Rotation,
}

impl fmt::Display for LutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Location => "location",
            Self::Rotation => "rotation",
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TableHeader {
    pub flags: [u8; 4],
    pub byte_count: u32,
    pub name: [u8; 6],
    pub reserved: [u8; 10],
    pub num_loc: u32,
    pub num_rot: u32,
    pub scalars: [u32; 5],
}

impl TableHeader {
    pub fn name(&self) -> String {
        fixed_str(&self.name)
    }

    pub fn count(&self, lut: LutKind) -> u32 {
        match lut {
            LutKind::Location => self.num_loc,
            LutKind::Rotation => self.num_rot,
        }
    }
}

/// A decoded `.tkl` keyframe table.
#[derive(Clone, Debug, PartialEq)]
pub struct TableFile {
    pub header: TableHeader,
    pub locations: Vec<Vec3>,
    pub rotations: Vec<Vec4>,
}

impl TableFile {
    pub fn name(&self) -> String {
        self.header.name()
    }

    pub fn len(&self, lut: LutKind) -> usize {
        match lut {
            LutKind::Location => self.locations.len(),
            LutKind::Rotation => self.rotations.len(),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[repr(u16)]
pub enum ChannelMode {
    /// Rotation keys; the location comes from the bind pose.
    TransQuatFallback = 0,
    TransAndRot = 1,
    Skip = 2,
    /// Location keys; the rotation comes from the bind pose.
    QuatTransFallback = 3,
}

impl ChannelMode {
    pub fn from_raw(raw: u16) -> Option<Self> {
        match raw {
            0 => Some(Self::TransQuatFallback),
            1 => Some(Self::TransAndRot),
            2 => Some(Self::Skip),
            3 => Some(Self::QuatTransFallback),
            _ => None,
        }
    }

    pub fn raw(self) -> u16 {
        self as u16
    }

    pub fn uses_location(self) -> bool {
        matches!(self, Self::TransAndRot | Self::QuatTransFallback)
    }

    pub fn uses_rotation(self) -> bool {
        matches!(self, Self::TransAndRot | Self::TransQuatFallback)
    }

    pub fn uses(self, lut: LutKind) -> bool {
        match lut {
            LutKind::Location => self.uses_location(),
            LutKind::Rotation => self.uses_rotation(),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Keyframe {
    pub time: f32,
    pub location: u16,
    pub rotation: u16,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Channel {
    pub mode: ChannelMode,
    pub frames: Vec<Keyframe>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Animation {
    /// Length-prefixed name, stored in a fixed 16-byte field.
    pub name: [u8; 16],
    pub unknown: [u32; 2],
    pub num_groups: u32,
    pub duration: f32,
    /// One channel per node, in node order.
    pub channels: Vec<Channel>,
}

impl Animation {
    pub fn name(&self) -> String {
        let len = (self.name[0] as usize).min(self.name.len() - 1);
        fixed_str(&self.name[1..1 + len])
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SceneSummary {
    pub byte_count: u32,
    pub num_nodes: u16,
    pub num_anims: u16,
    pub counters: [u16; 2],
}

/// Absolute (decrypted) offsets of the node and animation blocks.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PointerTriad {
    pub aux_node_data: u32,
    pub node_data: u32,
    pub anim_pointer: u32,
}

/// How the stored pointer triad maps onto its roles.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum TriadLayout {
    #[default]
    Standard,
    /// Heuristic for an alternate header variant: the decrypted `aux_node_data` slot holds
    /// the marker offset and the remaining roles are shifted by one slot.
    Shifted,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ModelHeader {
    pub reserved: [u8; 4],
    pub byte_count: u32,
    pub table_name: [u8; 8],
    pub magic: [u32; 2],
    /// Absolute offset of the mesh/LOD payload.
    pub lod_offset: u32,
    pub salt: u32,
    pub scene: SceneSummary,
    /// Decrypted triad in stored slot order.
    pub stored_pointers: PointerTriad,
    pub layout: TriadLayout,
}

impl ModelHeader {
    pub fn table_name(&self) -> String {
        fixed_str(&self.table_name)
    }

    /// The triad with roles resolved according to [`TriadLayout`].
    pub fn pointers(&self) -> PointerTriad {
        let stored = self.stored_pointers;
        match self.layout {
            TriadLayout::Standard => stored,
            TriadLayout::Shifted => PointerTriad {
                aux_node_data: stored.aux_node_data,
                node_data: stored.aux_node_data,
                anim_pointer: stored.node_data,
            },
        }
    }
}

/// A decoded `.tmd` model: header plus the animation set. Node and mesh payload are not decoded.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelFile {
    pub header: ModelHeader,
    pub animations: Vec<Animation>,
}

/// Position of one keyframe that contributes to the index streams.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct KeySlot {
    pub animation: usize,
    pub channel: usize,
    pub frame: usize,
    pub mode: ChannelMode,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct KeyCounts {
    pub locations: usize,
    pub rotations: usize,
}

impl ModelFile {
    /// The traversal shared by key extraction and rewriting: animations in stored order, channels
    /// in node order, frames in stored order. `Skip` channels are not visited.
    pub fn key_slots(&self) -> impl Iterator<Item = KeySlot> + '_ {
        self.animations
            .iter()
            .enumerate()
            .flat_map(|(animation, anim)| {
                anim.channels
                    .iter()
                    .enumerate()
                    .filter(|(_, ch)| ch.mode != ChannelMode::Skip)
                    .flat_map(move |(channel, ch)| {
                        (0..ch.frames.len()).map(move |frame| KeySlot {
                            animation,
                            channel,
                            frame,
                            mode: ch.mode,
                        })
                    })
            })
    }

    pub fn keyframe(&self, slot: KeySlot) -> &Keyframe {
        &self.animations[slot.animation].channels[slot.channel].frames[slot.frame]
    }

    pub fn keyframe_mut(&mut self, slot: KeySlot) -> &mut Keyframe {
        &mut self.animations[slot.animation].channels[slot.channel].frames[slot.frame]
    }

    pub fn key_counts(&self) -> KeyCounts {
        let mut counts = KeyCounts::default();
        for slot in self.key_slots() {
            if slot.mode.uses_location() {
                counts.locations += 1;
            }
            if slot.mode.uses_rotation() {
                counts.rotations += 1;
            }
        }
        counts
    }
}

fn fixed_str(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
