//! Shape messages: create, data, update and destroy encoding for every shape
//! family. Shapes are a closed sum over the simple primitives, text, mesh
//! geometry, mesh sets, point clouds and multi-shape sets; directional
//! conventions live in constructor helpers rather than shape subtypes.

mod decode;
mod mesh_shape;
mod mesh_set;
mod multi;
mod point_cloud;
mod simple;
mod text;

pub use decode::{read_create, read_update, DecodedCreate, DecodedTail, DecodedUpdate};
pub use mesh_shape::MeshShape;
pub use mesh_set::{MeshSet, MeshSetPart};
pub use multi::MultiShape;
pub use point_cloud::PointCloud;
pub use simple::{SimpleKind, SimpleShape};
pub use text::TextShape;

use crate::error::{Error, WireResult};
use crate::maths::{
    read_quaternion, read_vector3, write_quaternion, write_vector3, Quaternion, Vector3,
};
use crate::messages::{rgba, SMT_CREATE, SMT_DESTROY, SMT_UPDATE};
use crate::packet::{PacketReader, PacketWriter};
use crate::resource::Resource;
use std::sync::Arc;

// Shape flags (u16), shared across create messages.
pub const SF_DOUBLE_PRECISION: u16 = 1;
pub const SF_WIREFRAME: u16 = 2;
pub const SF_TRANSPARENT: u16 = 4;
pub const SF_TWO_SIDED: u16 = 8;
pub const SF_REPLACE: u16 = 16;
pub const SF_MULTI_SHAPE: u16 = 32;
pub const SF_SKIP_RESOURCES: u16 = 64;
/// Shape specific flags start here.
pub const SF_USER: u16 = 256;

/// Text2D: position is in world space, projected onto the screen.
pub const SF_TEXT2D_WORLD_SPACE: u16 = SF_USER;
/// Text3D: billboard the text towards the screen.
pub const SF_TEXT3D_SCREEN_FACING: u16 = SF_USER;

// Update message flags.
pub const UF_LIMITED_ATTRIBUTES: u16 = 256;
pub const UF_POSITION: u16 = 512;
pub const UF_ROTATION: u16 = 1024;
pub const UF_SCALE: u16 = 2048;
pub const UF_COLOUR: u16 = 4096;

/// Shape transform and colour, present in create and update messages.
/// Held in double precision; the `DoublePrecision` flag selects the wire
/// width for both halves of a create/update exchange.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Attributes {
    pub colour: u32,
    pub position: Vector3,
    pub rotation: Quaternion,
    pub scale: Vector3,
}

impl Default for Attributes {
    fn default() -> Attributes {
        Attributes {
            colour: rgba(255, 255, 255, 255),
            position: Vector3::ZERO,
            rotation: Quaternion::IDENTITY,
            scale: Vector3::ONE,
        }
    }
}

impl Attributes {
    /// Encoded byte size for the given precision.
    #[inline]
    pub fn wire_size(double_precision: bool) -> usize {
        4 + 10 * if double_precision { 8 } else { 4 }
    }

    pub fn write(&self, packet: &mut PacketWriter, double_precision: bool) -> WireResult<()> {
        packet.write_u32(self.colour)?;
        write_vector3(packet, &self.position, double_precision)?;
        write_quaternion(packet, &self.rotation, double_precision)?;
        write_vector3(packet, &self.scale, double_precision)
    }

    pub fn read(reader: &mut PacketReader, double_precision: bool) -> WireResult<Attributes> {
        Ok(Attributes {
            colour: reader.read_u32()?,
            position: read_vector3(reader, double_precision)?,
            rotation: read_quaternion(reader, double_precision)?,
            scale: read_vector3(reader, double_precision)?,
        })
    }
}

/// Identity, flags and attributes common to every shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeCore {
    /// Zero marks a transient shape, destroyed at the next frame boundary.
    pub object_id: u32,
    pub category: u16,
    pub flags: u16,
    pub attributes: Attributes,
}

impl ShapeCore {
    pub fn new(object_id: u32) -> ShapeCore {
        ShapeCore {
            object_id,
            category: 0,
            flags: 0,
            attributes: Attributes::default(),
        }
    }

    #[inline]
    pub fn double_precision(&self) -> bool {
        self.flags & SF_DOUBLE_PRECISION != 0
    }

    /// Writes the common create prefix after resetting the packet.
    fn write_create_prefix(&self, packet: &mut PacketWriter, routing_id: u16) -> WireResult<()> {
        packet.reset(routing_id, SMT_CREATE);
        packet.write_u32(self.object_id)?;
        packet.write_u16(self.category)?;
        packet.write_u16(self.flags)?;
        packet.write_u16(0)?;
        self.attributes.write(packet, self.double_precision())
    }
}

/// Tracks multi-packet data emission for complex shapes.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataProgress {
    pub phase: u32,
    pub offset: u32,
}

/// A shape instance as described to viewers. Borrows any caller owned
/// element arrays for the duration of the create call.
pub enum Shape<'a> {
    Simple(SimpleShape),
    Text2d(TextShape),
    Text3d(TextShape),
    Mesh(MeshShape<'a>),
    MeshSet(MeshSet),
    PointCloud(PointCloud<'a>),
    Multi(MultiShape),
}

impl<'a> Shape<'a> {
    #[inline]
    pub fn core(&self) -> &ShapeCore {
        match self {
            Shape::Simple(shape) => &shape.core,
            Shape::Text2d(shape) | Shape::Text3d(shape) => &shape.core,
            Shape::Mesh(shape) => &shape.core,
            Shape::MeshSet(shape) => &shape.core,
            Shape::PointCloud(shape) => &shape.core,
            Shape::Multi(shape) => &shape.core,
        }
    }

    #[inline]
    pub fn core_mut(&mut self) -> &mut ShapeCore {
        match self {
            Shape::Simple(shape) => &mut shape.core,
            Shape::Text2d(shape) | Shape::Text3d(shape) => &mut shape.core,
            Shape::Mesh(shape) => &mut shape.core,
            Shape::MeshSet(shape) => &mut shape.core,
            Shape::PointCloud(shape) => &mut shape.core,
            Shape::Multi(shape) => &mut shape.core,
        }
    }

    pub fn routing_id(&self) -> u16 {
        match self {
            Shape::Simple(shape) => shape.kind.routing_id(),
            Shape::Text2d(_) => crate::messages::SID_TEXT2D,
            Shape::Text3d(_) => crate::messages::SID_TEXT3D,
            Shape::Mesh(_) => crate::messages::SID_MESH_SHAPE,
            Shape::MeshSet(_) => crate::messages::SID_MESH_SET,
            Shape::PointCloud(_) => crate::messages::SID_POINT_CLOUD,
            Shape::Multi(shape) => shape.kind.routing_id(),
        }
    }

    #[inline]
    pub fn object_id(&self) -> u32 {
        self.core().object_id
    }

    #[inline]
    pub fn category(&self) -> u16 {
        self.core().category
    }

    #[inline]
    pub fn flags(&self) -> u16 {
        self.core().flags
    }

    #[inline]
    pub fn is_transient(&self) -> bool {
        self.object_id() == 0
    }

    #[inline]
    pub fn skip_resources(&self) -> bool {
        self.flags() & SF_SKIP_RESOURCES != 0
    }

    /// A complex shape needs data messages after its create message.
    pub fn is_complex(&self) -> bool {
        match self {
            Shape::Mesh(_) => true,
            Shape::PointCloud(shape) => shape.has_index_subset(),
            Shape::Multi(shape) => shape.needs_data_messages(),
            _ => false,
        }
    }

    /// Packs the create message, resetting the packet first.
    pub fn write_create(&self, packet: &mut PacketWriter) -> WireResult<()> {
        self.core().write_create_prefix(packet, self.routing_id())?;
        match self {
            Shape::Simple(_) => Ok(()),
            Shape::Text2d(shape) | Shape::Text3d(shape) => shape.write_create_tail(packet),
            Shape::Mesh(shape) => shape.write_create_tail(packet),
            Shape::MeshSet(shape) => shape.write_create_tail(packet),
            Shape::PointCloud(shape) => shape.write_create_tail(packet),
            Shape::Multi(shape) => shape.write_create_tail(packet),
        }
    }

    /// Packs the next data message for a complex shape. Returns true while
    /// more data messages remain.
    pub fn write_data(
        &self,
        packet: &mut PacketWriter,
        progress: &mut DataProgress,
    ) -> WireResult<bool> {
        match self {
            Shape::Mesh(shape) => shape.write_data(packet, progress),
            Shape::PointCloud(shape) => shape.write_data(packet, progress),
            Shape::Multi(shape) => shape.write_data(packet, progress),
            _ => Err(Error::InvalidPacket),
        }
    }

    /// Packs an update message. Transient shapes cannot be updated. When
    /// `UF_LIMITED_ATTRIBUTES` is set only the flagged components are
    /// written, in position, rotation, scale, colour order.
    pub fn write_update(&self, packet: &mut PacketWriter) -> WireResult<()> {
        let core = self.core();
        if core.object_id == 0 {
            return Err(Error::InvalidPacket);
        }
        packet.reset(self.routing_id(), SMT_UPDATE);
        packet.write_u32(core.object_id)?;
        packet.write_u16(core.flags)?;
        let double = core.double_precision();
        if core.flags & UF_LIMITED_ATTRIBUTES == 0 {
            return core.attributes.write(packet, double);
        }
        if core.flags & UF_POSITION != 0 {
            write_vector3(packet, &core.attributes.position, double)?;
        }
        if core.flags & UF_ROTATION != 0 {
            write_quaternion(packet, &core.attributes.rotation, double)?;
        }
        if core.flags & UF_SCALE != 0 {
            write_vector3(packet, &core.attributes.scale, double)?;
        }
        if core.flags & UF_COLOUR != 0 {
            packet.write_u32(core.attributes.colour)?;
        }
        Ok(())
    }

    /// Packs the destroy message.
    pub fn write_destroy(&self, packet: &mut PacketWriter) -> WireResult<()> {
        packet.reset(self.routing_id(), SMT_DESTROY);
        packet.write_u32(self.object_id())
    }

    /// The resources this shape references, deduplicated by key.
    pub fn enumerate_resources(&self) -> Vec<Arc<dyn Resource>> {
        match self {
            Shape::MeshSet(shape) => shape.enumerate_resources(),
            Shape::PointCloud(shape) => shape.enumerate_resources(),
            _ => Vec::new(),
        }
    }

    // Chainable modifiers shared by every shape kind.

    pub fn with_colour(mut self, colour: u32) -> Shape<'a> {
        self.core_mut().attributes.colour = colour;
        self
    }

    pub fn with_category(mut self, category: u16) -> Shape<'a> {
        self.core_mut().category = category;
        self
    }

    pub fn with_flags(mut self, flags: u16) -> Shape<'a> {
        self.core_mut().flags |= flags;
        self
    }

    pub fn with_double_precision(mut self) -> Shape<'a> {
        self.core_mut().flags |= SF_DOUBLE_PRECISION;
        self
    }
}
