//! A point cloud shape references a shared mesh resource holding the points
//! and may restrict the displayed subset with an index buffer delivered in
//! data messages.

use super::{DataProgress, Shape, ShapeCore};
use crate::buffer::DataBuffer;
use crate::error::{Error, WireResult};
use crate::messages::{SID_POINT_CLOUD, SMT_DATA};
use crate::packet::PacketWriter;
use crate::resource::{MeshResource, Resource};
use std::sync::Arc;

pub struct PointCloud<'a> {
    pub core: ShapeCore,
    cloud: Arc<MeshResource>,
    indices: Option<DataBuffer<'a>>,
    point_size: f32,
}

impl<'a> PointCloud<'a> {
    /// Restricts the view to the indexed subset of the cloud's vertices.
    pub fn with_indices(mut self, indices: DataBuffer<'a>) -> PointCloud<'a> {
        assert!(
            indices.scalar_type().is_integer(),
            "Point cloud indices must be an integer type"
        );
        self.indices = Some(indices);
        self
    }

    /// Overrides the rendered point size; zero keeps the client default.
    pub fn with_point_size(mut self, point_size: f32) -> PointCloud<'a> {
        self.point_size = point_size;
        self
    }

    #[inline]
    pub(super) fn has_index_subset(&self) -> bool {
        self.indices.as_ref().map_or(false, |buffer| buffer.count() > 0)
    }

    pub(super) fn write_create_tail(&self, packet: &mut PacketWriter) -> WireResult<()> {
        packet.write_u32(self.cloud.id())?;
        let index_count = self.indices.as_ref().map_or(0, |buffer| buffer.count() as u32);
        packet.write_u32(index_count)?;
        packet.write_f32(self.point_size)
    }

    pub(super) fn write_data(
        &self,
        packet: &mut PacketWriter,
        progress: &mut DataProgress,
    ) -> WireResult<bool> {
        let indices = match &self.indices {
            Some(indices) if indices.count() > 0 => indices,
            _ => return Ok(false),
        };
        packet.reset(SID_POINT_CLOUD, SMT_DATA);
        packet.write_u32(self.core.object_id)?;
        let wrote = indices.write(packet, progress.offset, 0)?;
        if wrote == 0 {
            return Err(Error::OversizedPacket);
        }
        progress.offset += u32::from(wrote);
        Ok((progress.offset as usize) < indices.count())
    }

    pub(super) fn enumerate_resources(&self) -> Vec<Arc<dyn Resource>> {
        vec![Arc::clone(&self.cloud) as Arc<dyn Resource>]
    }
}

impl<'a> PointCloud<'a> {
    /// A point cloud view over a shared mesh resource. Mind the resource's
    /// topology: points or voxels.
    pub fn new(object_id: u32, cloud: Arc<MeshResource>) -> PointCloud<'a> {
        PointCloud {
            core: ShapeCore::new(object_id),
            cloud,
            indices: None,
            point_size: 0.0,
        }
    }
}

impl<'a> From<PointCloud<'a>> for Shape<'a> {
    fn from(shape: PointCloud<'a>) -> Shape<'a> {
        Shape::PointCloud(shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketReader;
    use crate::resource::DrawType;
    use crate::shapes::Attributes;

    fn cloud() -> Arc<MeshResource> {
        let mut mesh = MeshResource::new(31, DrawType::Points);
        mesh.add_vertices(&[[0.0, 0.0, 0.0], [1.0, 1.0, 1.0], [2.0, 2.0, 2.0]]);
        Arc::new(mesh)
    }

    #[test]
    fn test_create_tail() {
        let shape: Shape = PointCloud::new(6, cloud()).with_point_size(2.0).into();
        let mut packet = PacketWriter::new(1024);
        shape.write_create(&mut packet).unwrap();
        packet.finalise().unwrap();

        let mut reader = PacketReader::new(packet.packet_bytes()).unwrap();
        reader.read_u32().unwrap();
        reader.read_u16().unwrap();
        reader.read_u16().unwrap();
        reader.read_u16().unwrap();
        Attributes::read(&mut reader, false).unwrap();
        assert_eq!(reader.read_u32().unwrap(), 31);
        assert_eq!(reader.read_u32().unwrap(), 0);
        assert_eq!(reader.read_f32().unwrap(), 2.0);
    }

    #[test]
    fn test_complex_only_with_indices() {
        let plain: Shape = PointCloud::new(1, cloud()).into();
        assert!(!plain.is_complex());

        let indices = [0u32, 2];
        let subset: Shape = PointCloud::new(2, cloud())
            .with_indices(DataBuffer::borrow(&indices, 1))
            .into();
        assert!(subset.is_complex());
    }

    #[test]
    fn test_index_data_message() {
        let indices = [0u32, 2];
        let shape: Shape = PointCloud::new(2, cloud())
            .with_indices(DataBuffer::borrow(&indices, 1))
            .into();

        let mut packet = PacketWriter::new(1024);
        let mut progress = DataProgress::default();
        let more = shape.write_data(&mut packet, &mut progress).unwrap();
        assert!(!more);
        packet.finalise().unwrap();

        let mut reader = PacketReader::new(packet.packet_bytes()).unwrap();
        assert_eq!(reader.read_u32().unwrap(), 2);
        assert_eq!(reader.read_u32().unwrap(), 0);
        assert_eq!(reader.read_u16().unwrap(), 2);
    }

    #[test]
    fn test_enumerates_cloud_resource() {
        let shape: Shape = PointCloud::new(1, cloud()).into();
        let resources = shape.enumerate_resources();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].id(), 31);
    }
}
