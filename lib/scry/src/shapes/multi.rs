//! Multi-shape sets: one create message describing many instances of a
//! simple shape, each with its own attributes. The parent attributes act as
//! a global transform; the whole set shares a single object id.

use super::{Attributes, DataProgress, Shape, ShapeCore, SimpleKind, SF_MULTI_SHAPE};
use crate::error::WireResult;
use crate::messages::SMT_DATA;
use crate::packet::PacketWriter;

/// Child attribute blocks carried per message, bounded so a full block fits
/// the wire payload limit in either precision.
fn block_limit(double_precision: bool) -> usize {
    if double_precision {
        600
    } else {
        1024
    }
}

pub struct MultiShape {
    pub kind: SimpleKind,
    pub core: ShapeCore,
    children: Vec<Attributes>,
}

impl MultiShape {
    #[inline]
    pub fn shape_count(&self) -> u32 {
        self.children.len() as u32
    }

    fn payload_limit(&self) -> usize {
        block_limit(self.core.double_precision())
    }

    /// Children beyond the create payload arrive in data messages.
    #[inline]
    pub(super) fn needs_data_messages(&self) -> bool {
        self.children.len() > self.payload_limit()
    }

    pub(super) fn write_create_tail(&self, packet: &mut PacketWriter) -> WireResult<()> {
        let double = self.core.double_precision();
        let payload_count = self.children.len().min(self.payload_limit());
        packet.write_u32(self.shape_count())?;
        packet.write_u16(payload_count as u16)?;
        for child in &self.children[..payload_count] {
            child.write(packet, double)?;
        }
        Ok(())
    }

    /// Data payload mirrors the create payload minus the shape count.
    pub(super) fn write_data(
        &self,
        packet: &mut PacketWriter,
        progress: &mut DataProgress,
    ) -> WireResult<bool> {
        let double = self.core.double_precision();
        let limit = self.payload_limit();
        if progress.offset == 0 {
            // The create message carried the first block.
            progress.offset = limit.min(self.children.len()) as u32;
        }
        let start = progress.offset as usize;
        let end = (start + limit).min(self.children.len());

        packet.reset(self.kind.routing_id(), SMT_DATA);
        packet.write_u32(self.core.object_id)?;
        packet.write_u16((end - start) as u16)?;
        for child in &self.children[start..end] {
            child.write(packet, double)?;
        }
        progress.offset = end as u32;
        Ok(end < self.children.len())
    }
}

impl<'a> Shape<'a> {
    /// A set of `kind` instances sharing one id and a parent transform.
    pub fn multi_shape(kind: SimpleKind, object_id: u32, children: Vec<Attributes>) -> Shape<'a> {
        let mut core = ShapeCore::new(object_id);
        core.flags |= SF_MULTI_SHAPE;
        Shape::Multi(MultiShape { kind, core, children })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::maths::Vector3;
    use crate::packet::{PacketReader, PacketWriter};
    use crate::shapes::Attributes;

    fn capsules(count: usize) -> Vec<Attributes> {
        (0..count)
            .map(|index| {
                let mut attrs = Attributes::default();
                attrs.position = Vector3::new(index as f64, 0.0, 0.0);
                attrs
            })
            .collect()
    }

    #[test]
    fn test_small_set_fits_create() {
        let shape = Shape::multi_shape(SimpleKind::Capsule, 8, capsules(10));
        assert!(!shape.is_complex());

        let mut packet = PacketWriter::new(65_504);
        shape.write_create(&mut packet).unwrap();
        packet.finalise().unwrap();

        let mut reader = PacketReader::new(packet.packet_bytes()).unwrap();
        reader.read_u32().unwrap();
        reader.read_u16().unwrap();
        let flags = reader.read_u16().unwrap();
        assert_ne!(flags & SF_MULTI_SHAPE, 0);
        reader.read_u16().unwrap();
        Attributes::read(&mut reader, false).unwrap();
        assert_eq!(reader.read_u32().unwrap(), 10);
        assert_eq!(reader.read_u16().unwrap(), 10);
    }

    #[test]
    fn test_large_set_splits_into_data_messages() {
        let total = 3375usize;
        let shape = Shape::multi_shape(SimpleKind::Capsule, 8, capsules(total));
        assert!(shape.is_complex());

        let mut packet = PacketWriter::new(65_504);
        shape.write_create(&mut packet).unwrap();
        packet.finalise().unwrap();
        let mut reader = PacketReader::new(packet.packet_bytes()).unwrap();
        reader.read_u32().unwrap();
        reader.read_u16().unwrap();
        reader.read_u16().unwrap();
        reader.read_u16().unwrap();
        Attributes::read(&mut reader, false).unwrap();
        assert_eq!(reader.read_u32().unwrap(), total as u32);
        let create_count = reader.read_u16().unwrap() as usize;
        assert!(create_count <= total);

        let mut delivered = create_count;
        let mut progress = DataProgress::default();
        loop {
            let more = shape.write_data(&mut packet, &mut progress).unwrap();
            packet.finalise().unwrap();
            let mut reader = PacketReader::new(packet.packet_bytes()).unwrap();
            assert_eq!(reader.read_u32().unwrap(), 8);
            delivered += reader.read_u16().unwrap() as usize;
            if !more {
                break;
            }
        }
        assert_eq!(delivered, total);
    }
}
