//! Shared resources: identified data transmitted once per connection and
//! referenced by many shapes. Meshes are the only resource type today.

pub mod mesh;
pub mod packer;

pub use mesh::MeshResource;
pub use packer::ResourcePacker;

use crate::error::WireResult;
use crate::packet::PacketWriter;

// Mesh resource message ids under the mesh routing id.
pub const MMT_DESTROY: u16 = 1;
pub const MMT_CREATE: u16 = 2;
pub const MMT_VERTEX: u16 = 3;
pub const MMT_INDEX: u16 = 4;
pub const MMT_VERTEX_COLOUR: u16 = 5;
pub const MMT_NORMAL: u16 = 6;
pub const MMT_UV: u16 = 7;
pub const MMT_SET_MATERIAL: u16 = 8;
pub const MMT_REDEFINE: u16 = 9;
pub const MMT_FINALISE: u16 = 10;

/// Mesh create flag: the transform uses double precision floats.
pub const MESH_DOUBLE_PRECISION: u16 = 1;

/// Mesh topology. `Quads` is reserved and not implemented. For `Voxels` the
/// per vertex normal encodes the voxel half extents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DrawType {
    Points = 0,
    Lines = 1,
    Triangles = 2,
    Voxels = 3,
    Quads = 4,
}

impl DrawType {
    pub fn from_code(code: u8) -> Option<DrawType> {
        Some(match code {
            0 => DrawType::Points,
            1 => DrawType::Lines,
            2 => DrawType::Triangles,
            3 => DrawType::Voxels,
            4 => DrawType::Quads,
            _ => return None,
        })
    }
}

/// Tracks a chunked transfer across packets: the element phase, the element
/// offset within it, and completion.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransferProgress {
    pub phase: u32,
    pub progress: u32,
    pub complete: bool,
}

impl TransferProgress {
    pub fn reset(&mut self) {
        *self = TransferProgress::default();
    }
}

/// A shared, identified piece of data transmitted once and referenced by many
/// shapes. The key combines the resource type tag and id, so ids need only be
/// unique within one resource type.
pub trait Resource: Send + Sync {
    /// Resource id, unique within `type_id`.
    fn id(&self) -> u32;

    /// The routing id of the handler for this resource type.
    fn type_id(&self) -> u16;

    /// Globally unique key: type tag combined with id.
    fn unique_key(&self) -> u64 {
        u64::from(self.type_id()) << 32 | u64::from(self.id())
    }

    /// Packs the creation message. Resets the packet.
    fn write_create(&self, packet: &mut PacketWriter) -> WireResult<()>;

    /// Packs the destruction message. Resets the packet.
    fn write_destroy(&self, packet: &mut PacketWriter) -> WireResult<()>;

    /// Packs the next transfer message, consuming up to `byte_limit` payload
    /// bytes (zero meaning bounded only by the packet). Returns false when
    /// the budget is too small to make progress; the packet content is then
    /// undefined and must not be sent. Sets `progress.complete` once the
    /// final message has been packed.
    fn transfer(
        &self,
        packet: &mut PacketWriter,
        byte_limit: u32,
        progress: &mut TransferProgress,
    ) -> WireResult<bool>;
}
