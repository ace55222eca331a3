//! Parsing for shape create and update messages, mirroring the encoders.
//! Used by recording tooling and tests; viewers consume the same wire
//! contract.

use super::{
    Attributes, SF_DOUBLE_PRECISION, SF_MULTI_SHAPE, UF_COLOUR, UF_LIMITED_ATTRIBUTES,
    UF_POSITION, UF_ROTATION, UF_SCALE,
};
use crate::error::{Error, WireResult};
use crate::maths::{read_quaternion, read_vector3};
use crate::messages::{SID_MESH_SET, SID_MESH_SHAPE, SID_POINT_CLOUD, SID_TEXT2D, SID_TEXT3D};
use crate::packet::PacketReader;

/// Shape family specific create payload tail.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedTail {
    None,
    Text(String),
    MeshShape {
        vertex_count: u32,
        index_count: u32,
        draw_scale: f32,
        draw_type: u8,
    },
    MeshSet {
        parts: Vec<(u32, Attributes)>,
    },
    PointCloud {
        resource_id: u32,
        index_count: u32,
        point_size: f32,
    },
    Multi {
        shape_count: u32,
        payload: Vec<Attributes>,
    },
}

/// A decoded shape create message.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedCreate {
    pub routing_id: u16,
    pub object_id: u32,
    pub category: u16,
    pub flags: u16,
    pub attributes: Attributes,
    pub tail: DecodedTail,
}

/// Parses a create message. The reader must be positioned at the payload
/// start of a packet with a shape routing id and the create message id.
pub fn read_create(reader: &mut PacketReader) -> WireResult<DecodedCreate> {
    let routing_id = reader.routing_id();
    let object_id = reader.read_u32()?;
    let category = reader.read_u16()?;
    let flags = reader.read_u16()?;
    let reserved = reader.read_u16()?;
    if reserved != 0 {
        return Err(Error::InvalidPacket);
    }
    let double = flags & SF_DOUBLE_PRECISION != 0;
    let attributes = Attributes::read(reader, double)?;

    let tail = if flags & SF_MULTI_SHAPE != 0 {
        let shape_count = reader.read_u32()?;
        let payload_count = reader.read_u16()?;
        let mut payload = Vec::with_capacity(payload_count as usize);
        for _ in 0..payload_count {
            payload.push(Attributes::read(reader, double)?);
        }
        DecodedTail::Multi { shape_count, payload }
    } else {
        match routing_id {
            SID_TEXT2D | SID_TEXT3D => {
                let length = reader.read_u16()? as usize;
                let bytes = reader.read_bytes(length)?;
                let text = std::str::from_utf8(bytes)
                    .map_err(|_| Error::InvalidPacket)?
                    .to_string();
                DecodedTail::Text(text)
            }
            SID_MESH_SHAPE => DecodedTail::MeshShape {
                vertex_count: reader.read_u32()?,
                index_count: reader.read_u32()?,
                draw_scale: reader.read_f32()?,
                draw_type: reader.read_u8()?,
            },
            SID_MESH_SET => {
                let part_count = reader.read_u16()?;
                let mut parts = Vec::with_capacity(part_count as usize);
                for _ in 0..part_count {
                    let resource_id = reader.read_u32()?;
                    parts.push((resource_id, Attributes::read(reader, double)?));
                }
                DecodedTail::MeshSet { parts }
            }
            SID_POINT_CLOUD => DecodedTail::PointCloud {
                resource_id: reader.read_u32()?,
                index_count: reader.read_u32()?,
                point_size: reader.read_f32()?,
            },
            _ => DecodedTail::None,
        }
    };

    Ok(DecodedCreate {
        routing_id,
        object_id,
        category,
        flags,
        attributes,
        tail,
    })
}

/// A decoded shape update message. Absent components were not flagged.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedUpdate {
    pub routing_id: u16,
    pub object_id: u32,
    pub flags: u16,
    pub position: Option<crate::maths::Vector3>,
    pub rotation: Option<crate::maths::Quaternion>,
    pub scale: Option<crate::maths::Vector3>,
    pub colour: Option<u32>,
}

pub fn read_update(reader: &mut PacketReader) -> WireResult<DecodedUpdate> {
    let routing_id = reader.routing_id();
    let object_id = reader.read_u32()?;
    if object_id == 0 {
        return Err(Error::InvalidPacket);
    }
    let flags = reader.read_u16()?;
    let double = flags & SF_DOUBLE_PRECISION != 0;

    let mut update = DecodedUpdate {
        routing_id,
        object_id,
        flags,
        position: None,
        rotation: None,
        scale: None,
        colour: None,
    };

    if flags & UF_LIMITED_ATTRIBUTES == 0 {
        let attributes = Attributes::read(reader, double)?;
        update.position = Some(attributes.position);
        update.rotation = Some(attributes.rotation);
        update.scale = Some(attributes.scale);
        update.colour = Some(attributes.colour);
        return Ok(update);
    }

    if flags & UF_POSITION != 0 {
        update.position = Some(read_vector3(reader, double)?);
    }
    if flags & UF_ROTATION != 0 {
        update.rotation = Some(read_quaternion(reader, double)?);
    }
    if flags & UF_SCALE != 0 {
        update.scale = Some(read_vector3(reader, double)?);
    }
    if flags & UF_COLOUR != 0 {
        update.colour = Some(reader.read_u32()?);
    }
    Ok(update)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::maths::{Quaternion, Vector3};
    use crate::packet::{PacketReader, PacketWriter};
    use crate::shapes::{Shape, SimpleKind};

    fn encode_create(shape: &Shape) -> Vec<u8> {
        let mut packet = PacketWriter::new(65_504);
        shape.write_create(&mut packet).unwrap();
        packet.finalise().unwrap();
        packet.packet_bytes().to_vec()
    }

    #[test]
    fn test_sphere_create_roundtrip() {
        let shape = Shape::sphere(42, Vector3::new(1.2, 2.3, 3.4), 1.26).with_category(1);
        let bytes = encode_create(&shape);
        let mut reader = PacketReader::new(&bytes).unwrap();
        let decoded = read_create(&mut reader).unwrap();

        assert_eq!(decoded.routing_id, 64);
        assert_eq!(decoded.object_id, 42);
        assert_eq!(decoded.category, 1);
        let scale = decoded.attributes.scale;
        assert!((scale.x - 1.26).abs() < 1e-6);
        assert_eq!(decoded.tail, DecodedTail::None);
    }

    #[test]
    fn test_double_precision_create_is_exact() {
        let position = Vector3::new(1.000_000_000_1, -2.0, 1e-12);
        let shape = Shape::sphere(7, position, 3.0).with_double_precision();
        let bytes = encode_create(&shape);
        let mut reader = PacketReader::new(&bytes).unwrap();
        let decoded = read_create(&mut reader).unwrap();
        assert_eq!(decoded.attributes.position, position);
    }

    #[test]
    fn test_text_create_roundtrip() {
        let shape = Shape::text3d("hello viewer", 3, Vector3::ZERO, 0.1);
        let bytes = encode_create(&shape);
        let mut reader = PacketReader::new(&bytes).unwrap();
        let decoded = read_create(&mut reader).unwrap();
        assert_eq!(decoded.tail, DecodedTail::Text("hello viewer".to_string()));
    }

    #[test]
    fn test_multi_create_roundtrip() {
        let children: Vec<_> = (0..5)
            .map(|index| {
                let mut attrs = crate::shapes::Attributes::default();
                attrs.position = Vector3::new(f64::from(index), 0.0, 0.0);
                attrs
            })
            .collect();
        let shape = Shape::multi_shape(SimpleKind::Star, 9, children.clone());
        let bytes = encode_create(&shape);
        let mut reader = PacketReader::new(&bytes).unwrap();
        let decoded = read_create(&mut reader).unwrap();
        match decoded.tail {
            DecodedTail::Multi { shape_count, payload } => {
                assert_eq!(shape_count, 5);
                assert_eq!(payload, children);
            }
            tail => panic!("Unexpected tail {:?}", tail),
        }
    }

    #[test]
    fn test_limited_update_roundtrip() {
        let mut shape = Shape::sphere(4, Vector3::ZERO, 1.0);
        {
            let core = shape.core_mut();
            core.flags |= UF_LIMITED_ATTRIBUTES | UF_POSITION | UF_COLOUR;
            core.attributes.position = Vector3::new(5.0, 6.0, 7.0);
            core.attributes.colour = 0xdeadbeef;
        }
        let mut packet = PacketWriter::new(1024);
        shape.write_update(&mut packet).unwrap();
        packet.finalise().unwrap();

        let mut reader = PacketReader::new(packet.packet_bytes()).unwrap();
        let decoded = read_update(&mut reader).unwrap();
        assert_eq!(decoded.position, Some(Vector3::new(5.0, 6.0, 7.0)));
        assert_eq!(decoded.colour, Some(0xdeadbeef));
        assert_eq!(decoded.rotation, None);
        assert_eq!(decoded.scale, None);
    }

    #[test]
    fn test_full_update_roundtrip() {
        let mut shape = Shape::box_shape(
            6,
            Vector3::new(1.0, 2.0, 3.0),
            Vector3::ONE,
            Quaternion::IDENTITY,
        );
        shape.core_mut().attributes.colour = 0x11223344;
        let mut packet = PacketWriter::new(1024);
        shape.write_update(&mut packet).unwrap();
        packet.finalise().unwrap();

        let mut reader = PacketReader::new(packet.packet_bytes()).unwrap();
        let decoded = read_update(&mut reader).unwrap();
        assert_eq!(decoded.colour, Some(0x11223344));
        assert!(decoded.position.is_some());
    }

    #[test]
    fn test_update_rejects_transient() {
        let shape = Shape::sphere(0, Vector3::ZERO, 1.0);
        let mut packet = PacketWriter::new(1024);
        assert_eq!(shape.write_update(&mut packet).unwrap_err(), Error::InvalidPacket);
    }

    #[test]
    fn test_create_rejects_nonzero_reserved() {
        let shape = Shape::sphere(1, Vector3::ZERO, 1.0);
        let mut bytes = encode_create(&shape);
        // Corrupt the reserved field (payload offset 8) and refresh the CRC.
        let reserved_at = crate::packet::PACKET_HEADER_SIZE + 8;
        bytes[reserved_at] = 1;
        let crc_at = bytes.len() - 2;
        let crc = crate::crc::crc16(&bytes[..crc_at]);
        bytes[crc_at..].copy_from_slice(&crc.to_be_bytes());

        let mut reader = PacketReader::new(&bytes).unwrap();
        assert_eq!(read_create(&mut reader).unwrap_err(), Error::InvalidPacket);
    }
}
