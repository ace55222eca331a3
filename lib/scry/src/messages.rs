//! Core message structures and the routing/message id spaces. Shape specific
//! payloads live in `shapes`; mesh resource payloads in `resource`.

use crate::error::{Error, WireResult};
use crate::packet::{PacketReader, PacketWriter};

// Reserved routing ids.
pub const ROUTING_SERVER_INFO: u16 = 1;
pub const ROUTING_CONTROL: u16 = 2;
pub const ROUTING_COLLATED_PACKET: u16 = 3;
pub const ROUTING_MESH: u16 = 4;
pub const ROUTING_CAMERA: u16 = 5;
pub const ROUTING_CATEGORY: u16 = 6;
pub const ROUTING_MATERIAL: u16 = 7;

// Shape routing ids occupy 64..2047.
pub const SID_SPHERE: u16 = 64;
pub const SID_BOX: u16 = 65;
pub const SID_CONE: u16 = 66;
pub const SID_CYLINDER: u16 = 67;
pub const SID_CAPSULE: u16 = 68;
pub const SID_PLANE: u16 = 69;
pub const SID_STAR: u16 = 70;
pub const SID_ARROW: u16 = 71;
pub const SID_MESH_SHAPE: u16 = 72;
pub const SID_MESH_SET: u16 = 73;
pub const SID_POINT_CLOUD: u16 = 74;
pub const SID_TEXT3D: u16 = 75;
pub const SID_TEXT2D: u16 = 76;
pub const SID_POSE: u16 = 77;

/// User extension routing ids start here.
pub const ROUTING_USER_START: u16 = 2048;

// Shape message ids, shared by every shape routing id. Zero is unused.
pub const SMT_CREATE: u16 = 1;
pub const SMT_UPDATE: u16 = 2;
pub const SMT_DESTROY: u16 = 3;
pub const SMT_DATA: u16 = 4;

/// Control message ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ControlId {
    Null = 0,
    Frame = 1,
    CoordinateFrame = 2,
    FrameCount = 3,
    ForceFrameFlush = 4,
    Reset = 5,
    Keyframe = 6,
    End = 7,
}

impl From<ControlId> for u16 {
    #[inline]
    fn from(id: ControlId) -> u16 {
        id as u16
    }
}

/// Frame control flag: transient shapes persist through this frame.
pub const CF_FRAME_PERSIST: u32 = 1;

/// The server's basis axes, named by (right, forward, up). Codes 0..5 are
/// right handed, 6..11 left handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CoordinateFrame {
    Xyz = 0,
    XzNegY = 1,
    YxNegZ = 2,
    Yzx = 3,
    Zxy = 4,
    ZyNegX = 5,
    XyNegZ = 6,
    Xzy = 7,
    Yxz = 8,
    YzNegX = 9,
    ZxNegY = 10,
    Zyx = 11,
}

impl CoordinateFrame {
    pub fn from_code(code: u8) -> WireResult<CoordinateFrame> {
        Ok(match code {
            0 => CoordinateFrame::Xyz,
            1 => CoordinateFrame::XzNegY,
            2 => CoordinateFrame::YxNegZ,
            3 => CoordinateFrame::Yzx,
            4 => CoordinateFrame::Zxy,
            5 => CoordinateFrame::ZyNegX,
            6 => CoordinateFrame::XyNegZ,
            7 => CoordinateFrame::Xzy,
            8 => CoordinateFrame::Yxz,
            9 => CoordinateFrame::YzNegX,
            10 => CoordinateFrame::ZxNegY,
            11 => CoordinateFrame::Zyx,
            _ => return Err(Error::InvalidPacket),
        })
    }

    #[inline]
    pub fn is_right_handed(self) -> bool {
        (self as u8) < 6
    }
}

/// Packs RGBA channels into the wire colour value. Colours serialize as a
/// big endian `u32`, so the wire bytes run red, green, blue, alpha.
#[inline]
pub fn rgba(r: u8, g: u8, b: u8, a: u8) -> u32 {
    u32::from(r) << 24 | u32::from(g) << 16 | u32::from(b) << 8 | u32::from(a)
}

/// Messages which can be packed into a packet payload.
pub trait Message {
    fn write(&self, packet: &mut PacketWriter) -> WireResult<()>;
}

/// Describes the server stream: tick scale, default frame time and the
/// coordinate frame. Always the first packet of a stream, 48 payload bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerInfoMessage {
    /// Microseconds per time unit tick.
    pub time_unit: u64,
    /// Default frame display time, in ticks.
    pub default_frame_time: u32,
    pub coordinate_frame: CoordinateFrame,
}

impl ServerInfoMessage {
    /// Reserved tail bytes. Must be zero for a stable CRC.
    const RESERVED_BYTES: usize = 35;

    pub fn read(reader: &mut PacketReader) -> WireResult<ServerInfoMessage> {
        let time_unit = reader.read_u64()?;
        let default_frame_time = reader.read_u32()?;
        let coordinate_frame = CoordinateFrame::from_code(reader.read_u8()?)?;
        reader.read_bytes(Self::RESERVED_BYTES)?;
        Ok(ServerInfoMessage {
            time_unit,
            default_frame_time,
            coordinate_frame,
        })
    }
}

impl Default for ServerInfoMessage {
    fn default() -> ServerInfoMessage {
        ServerInfoMessage {
            time_unit: 1000,
            default_frame_time: 33,
            coordinate_frame: CoordinateFrame::Xyz,
        }
    }
}

impl Message for ServerInfoMessage {
    fn write(&self, packet: &mut PacketWriter) -> WireResult<()> {
        packet.write_u64(self.time_unit)?;
        packet.write_u32(self.default_frame_time)?;
        packet.write_u8(self.coordinate_frame as u8)?;
        packet.write_padding(Self::RESERVED_BYTES)
    }
}

/// Common control message body. Value semantics depend on the message id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlMessage {
    pub control_flags: u32,
    pub value32: u32,
    pub value64: u64,
}

impl ControlMessage {
    pub fn read(reader: &mut PacketReader) -> WireResult<ControlMessage> {
        Ok(ControlMessage {
            control_flags: reader.read_u32()?,
            value32: reader.read_u32()?,
            value64: reader.read_u64()?,
        })
    }
}

impl Message for ControlMessage {
    fn write(&self, packet: &mut PacketWriter) -> WireResult<()> {
        packet.write_u32(self.control_flags)?;
        packet.write_u32(self.value32)?;
        packet.write_u64(self.value64)
    }
}

/// Names a shape category and places it in the category hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryNameMessage {
    pub category_id: u16,
    pub parent_id: u16,
    pub default_active: bool,
    pub name: String,
}

impl CategoryNameMessage {
    pub fn read(reader: &mut PacketReader) -> WireResult<CategoryNameMessage> {
        let category_id = reader.read_u16()?;
        let parent_id = reader.read_u16()?;
        let default_active = reader.read_u16()? != 0;
        let name_length = reader.read_u16()? as usize;
        let name_bytes = reader.read_bytes(name_length)?;
        let name = std::str::from_utf8(name_bytes)
            .map_err(|_| Error::InvalidPacket)?
            .to_string();
        Ok(CategoryNameMessage {
            category_id,
            parent_id,
            default_active,
            name,
        })
    }
}

impl Message for CategoryNameMessage {
    fn write(&self, packet: &mut PacketWriter) -> WireResult<()> {
        if self.name.len() > usize::from(u16::MAX) {
            return Err(Error::OversizedPacket);
        }
        packet.write_u16(self.category_id)?;
        packet.write_u16(self.parent_id)?;
        packet.write_u16(u16::from(self.default_active))?;
        packet.write_u16(self.name.len() as u16)?;
        packet.write_bytes(self.name.as_bytes())
    }
}
