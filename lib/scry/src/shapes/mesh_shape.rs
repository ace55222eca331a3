//! A single mesh delivered inline with the shape: vertices and optional
//! indices, normals and colours stream in data messages after the create.

use super::{DataProgress, Shape, ShapeCore};
use crate::buffer::DataBuffer;
use crate::error::{Error, WireResult};
use crate::messages::{SID_MESH_SHAPE, SMT_DATA};
use crate::packet::PacketWriter;
use crate::resource::DrawType;

// Data message payload type ids.
pub const SDT_VERTICES: u16 = 0;
pub const SDT_INDICES: u16 = 1;
pub const SDT_NORMALS: u16 = 2;
pub const SDT_COLOURS: u16 = 3;

// Data emission phases.
const PHASE_VERTICES: u32 = 0;
const PHASE_INDICES: u32 = 1;
const PHASE_NORMALS: u32 = 2;
const PHASE_COLOURS: u32 = 3;

pub struct MeshShape<'a> {
    pub core: ShapeCore,
    vertices: DataBuffer<'a>,
    indices: Option<DataBuffer<'a>>,
    normals: Option<DataBuffer<'a>>,
    colours: Option<DataBuffer<'a>>,
    draw_type: DrawType,
    draw_scale: f32,
}

impl<'a> MeshShape<'a> {
    /// Attaches indices; any integer scalar type. Index pairs for lines,
    /// triples for triangles.
    pub fn with_indices(mut self, indices: DataBuffer<'a>) -> MeshShape<'a> {
        assert!(
            indices.scalar_type().is_integer(),
            "Mesh indices must be an integer type"
        );
        self.indices = Some(indices);
        self
    }

    /// Attaches per vertex normals, triples of floats.
    pub fn with_normals(mut self, normals: DataBuffer<'a>) -> MeshShape<'a> {
        self.normals = Some(normals);
        self
    }

    /// Attaches per vertex colours, 32-bit RGBA.
    pub fn with_colours(mut self, colours: DataBuffer<'a>) -> MeshShape<'a> {
        self.colours = Some(colours);
        self
    }

    pub fn with_draw_scale(mut self, draw_scale: f32) -> MeshShape<'a> {
        self.draw_scale = draw_scale;
        self
    }

    #[inline]
    pub fn vertex_count(&self) -> u32 {
        self.vertices.count() as u32
    }

    #[inline]
    pub fn index_count(&self) -> u32 {
        self.indices.as_ref().map_or(0, |buffer| buffer.count() as u32)
    }

    pub(super) fn write_create_tail(&self, packet: &mut PacketWriter) -> WireResult<()> {
        packet.write_u32(self.vertex_count())?;
        packet.write_u32(self.index_count())?;
        packet.write_f32(self.draw_scale)?;
        packet.write_u8(self.draw_type as u8)
    }

    pub(super) fn write_data(
        &self,
        packet: &mut PacketWriter,
        progress: &mut DataProgress,
    ) -> WireResult<bool> {
        loop {
            let (buffer, type_id) = match progress.phase {
                PHASE_VERTICES => (Some(&self.vertices), SDT_VERTICES),
                PHASE_INDICES => (self.indices.as_ref(), SDT_INDICES),
                PHASE_NORMALS => (self.normals.as_ref(), SDT_NORMALS),
                PHASE_COLOURS => (self.colours.as_ref(), SDT_COLOURS),
                _ => return Ok(false),
            };

            let buffer = match buffer {
                Some(buffer) if buffer.count() > 0 => buffer,
                _ => {
                    progress.phase += 1;
                    progress.offset = 0;
                    continue;
                }
            };

            packet.reset(SID_MESH_SHAPE, SMT_DATA);
            packet.write_u32(self.core.object_id)?;
            packet.write_u16(type_id)?;
            let wrote = buffer.write(packet, progress.offset, 0)?;
            if wrote == 0 {
                // Even an empty packet cannot take one element.
                return Err(Error::OversizedPacket);
            }
            progress.offset += u32::from(wrote);
            if progress.offset as usize >= buffer.count() {
                progress.phase += 1;
                progress.offset = 0;
                return Ok(self.more_after(progress.phase));
            }
            // Current channel is only partially sent.
            return Ok(true);
        }
    }

    /// True when any populated channel remains at or after `phase`.
    fn more_after(&self, phase: u32) -> bool {
        let channels = [
            (PHASE_INDICES, self.indices.as_ref()),
            (PHASE_NORMALS, self.normals.as_ref()),
            (PHASE_COLOURS, self.colours.as_ref()),
        ];
        channels
            .iter()
            .any(|(p, buffer)| *p >= phase && buffer.map_or(false, |b| b.count() > 0))
    }
}

impl<'a> MeshShape<'a> {
    /// A mesh shape over the caller's vertex array, triples of floats.
    pub fn new(object_id: u32, draw_type: DrawType, vertices: DataBuffer<'a>) -> MeshShape<'a> {
        assert!(
            vertices.scalar_type().is_float() && vertices.component_count() == 3,
            "Mesh vertices must be float triples"
        );
        MeshShape {
            core: ShapeCore::new(object_id),
            vertices,
            indices: None,
            normals: None,
            colours: None,
            draw_type,
            draw_scale: 0.0,
        }
    }
}

impl<'a> From<MeshShape<'a>> for Shape<'a> {
    fn from(shape: MeshShape<'a>) -> Shape<'a> {
        Shape::Mesh(shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketReader;

    #[test]
    fn test_data_messages_tile_vertices() {
        let vertices: Vec<[f32; 3]> = (0..20_000).map(|v| [v as f32; 3]).collect();
        let shape: Shape =
            MeshShape::new(11, DrawType::Points, DataBuffer::borrow_vec3(&vertices)).into();

        let mut packet = PacketWriter::new(65_504);
        let mut progress = DataProgress::default();
        let mut expected_offset = 0u32;
        let mut messages = 0;
        loop {
            let more = shape.write_data(&mut packet, &mut progress).unwrap();
            packet.finalise().unwrap();
            let mut reader = PacketReader::new(packet.packet_bytes()).unwrap();
            assert_eq!(reader.read_u32().unwrap(), 11);
            assert_eq!(reader.read_u16().unwrap(), SDT_VERTICES);
            let offset = reader.read_u32().unwrap();
            let count = reader.read_u16().unwrap();
            assert_eq!(offset, expected_offset);
            expected_offset += u32::from(count);
            messages += 1;
            if !more {
                break;
            }
        }
        assert_eq!(expected_offset, 20_000);
        assert!(messages >= 2);
    }

    #[test]
    fn test_create_tail_counts() {
        let vertices = [[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let indices = [0u32, 1, 2];
        let shape: Shape = MeshShape::new(
            3,
            DrawType::Triangles,
            DataBuffer::borrow_vec3(&vertices),
        )
        .with_indices(DataBuffer::borrow(&indices, 1))
        .into();

        let mut packet = PacketWriter::new(1024);
        shape.write_create(&mut packet).unwrap();
        packet.finalise().unwrap();
        let mut reader = PacketReader::new(packet.packet_bytes()).unwrap();
        // Skip the common prefix.
        reader.read_u32().unwrap();
        reader.read_u16().unwrap();
        reader.read_u16().unwrap();
        reader.read_u16().unwrap();
        crate::shapes::Attributes::read(&mut reader, false).unwrap();
        assert_eq!(reader.read_u32().unwrap(), 3);
        assert_eq!(reader.read_u32().unwrap(), 3);
        assert_eq!(reader.read_f32().unwrap(), 0.0);
        assert_eq!(reader.read_u8().unwrap(), DrawType::Triangles as u8);
    }

    #[test]
    fn test_phases_cover_all_channels() {
        let vertices = [[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0]];
        let indices = [0u32, 1];
        let colours = [0xffffffffu32, 0xff0000ff];
        let shape: Shape = MeshShape::new(
            4,
            DrawType::Lines,
            DataBuffer::borrow_vec3(&vertices),
        )
        .with_indices(DataBuffer::borrow(&indices, 1))
        .with_colours(DataBuffer::borrow(&colours, 1))
        .into();

        let mut packet = PacketWriter::new(65_504);
        let mut progress = DataProgress::default();
        let mut type_ids = Vec::new();
        loop {
            let more = shape.write_data(&mut packet, &mut progress).unwrap();
            packet.finalise().unwrap();
            let mut reader = PacketReader::new(packet.packet_bytes()).unwrap();
            reader.read_u32().unwrap();
            type_ids.push(reader.read_u16().unwrap());
            if !more {
                break;
            }
        }
        assert_eq!(type_ids, vec![SDT_VERTICES, SDT_INDICES, SDT_COLOURS]);
    }
}
