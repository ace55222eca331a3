//! A mesh set references shared mesh resources by id, one transform per
//! part. The referenced meshes travel separately through the resource
//! transfer path and are reference counted per connection.

use super::{Attributes, Shape, ShapeCore};
use crate::error::WireResult;
use crate::packet::PacketWriter;
use crate::resource::{MeshResource, Resource};
use std::sync::Arc;

pub struct MeshSetPart {
    pub resource: Arc<MeshResource>,
    pub attributes: Attributes,
}

pub struct MeshSet {
    pub core: ShapeCore,
    parts: Vec<MeshSetPart>,
}

impl MeshSet {
    pub fn add_part(&mut self, resource: Arc<MeshResource>, attributes: Attributes) {
        self.parts.push(MeshSetPart { resource, attributes });
    }

    pub fn with_part(mut self, resource: Arc<MeshResource>, attributes: Attributes) -> MeshSet {
        self.add_part(resource, attributes);
        self
    }

    #[inline]
    pub fn part_count(&self) -> u16 {
        self.parts.len() as u16
    }

    pub(super) fn write_create_tail(&self, packet: &mut PacketWriter) -> WireResult<()> {
        let double = self.core.double_precision();
        packet.write_u16(self.part_count())?;
        for part in &self.parts {
            packet.write_u32(part.resource.id())?;
            part.attributes.write(packet, double)?;
        }
        Ok(())
    }

    /// Part resources, deduplicated: shapes sharing one resource across
    /// several parts hold a single reference to it.
    pub(super) fn enumerate_resources(&self) -> Vec<Arc<dyn Resource>> {
        let mut seen = Vec::new();
        let mut resources: Vec<Arc<dyn Resource>> = Vec::new();
        for part in &self.parts {
            let key = part.resource.unique_key();
            if !seen.contains(&key) {
                seen.push(key);
                resources.push(Arc::clone(&part.resource) as Arc<dyn Resource>);
            }
        }
        resources
    }
}

impl MeshSet {
    /// An empty mesh set; populate with `add_part` or `with_part`.
    pub fn new(object_id: u32) -> MeshSet {
        MeshSet {
            core: ShapeCore::new(object_id),
            parts: Vec::new(),
        }
    }
}

impl<'a> From<MeshSet> for Shape<'a> {
    fn from(shape: MeshSet) -> Shape<'a> {
        Shape::MeshSet(shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::maths::Vector3;
    use crate::packet::{PacketReader, PacketWriter};
    use crate::resource::DrawType;

    fn mesh(id: u32) -> Arc<MeshResource> {
        let mut mesh = MeshResource::new(id, DrawType::Triangles);
        mesh.add_vertices(&[[0.0, 0.0, 0.0]]);
        Arc::new(mesh)
    }

    #[test]
    fn test_create_lists_parts() {
        let shared = mesh(5);
        let mut part_attrs = Attributes::default();
        part_attrs.position = Vector3::new(1.0, 0.0, 0.0);
        let shape: Shape = MeshSet::new(9)
            .with_part(Arc::clone(&shared), Attributes::default())
            .with_part(shared, part_attrs)
            .into();

        let mut packet = PacketWriter::new(1024);
        shape.write_create(&mut packet).unwrap();
        packet.finalise().unwrap();

        let mut reader = PacketReader::new(packet.packet_bytes()).unwrap();
        reader.read_u32().unwrap();
        reader.read_u16().unwrap();
        reader.read_u16().unwrap();
        reader.read_u16().unwrap();
        Attributes::read(&mut reader, false).unwrap();
        assert_eq!(reader.read_u16().unwrap(), 2);
        assert_eq!(reader.read_u32().unwrap(), 5);
        Attributes::read(&mut reader, false).unwrap();
        assert_eq!(reader.read_u32().unwrap(), 5);
        let second = Attributes::read(&mut reader, false).unwrap();
        assert_eq!(second.position, Vector3::new(1.0, 0.0, 0.0));
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_shared_resource_enumerates_once() {
        let shared = mesh(5);
        let shape: Shape = MeshSet::new(9)
            .with_part(Arc::clone(&shared), Attributes::default())
            .with_part(shared, Attributes::default())
            .into();
        assert_eq!(shape.enumerate_resources().len(), 1);
    }

    #[test]
    fn test_mesh_set_is_not_complex() {
        let shape: Shape = MeshSet::new(1).with_part(mesh(2), Attributes::default()).into();
        assert!(!shape.is_complex());
    }
}
