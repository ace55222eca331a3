//! An owned mesh resource: build up vertices, indices and optional per
//! vertex channels, then share it between shapes. Transfer to clients is
//! chunked across packets by the resource packer.

use super::{
    DrawType, Resource, TransferProgress, MESH_DOUBLE_PRECISION, MMT_CREATE, MMT_DESTROY,
    MMT_FINALISE, MMT_INDEX, MMT_NORMAL, MMT_REDEFINE, MMT_UV, MMT_VERTEX, MMT_VERTEX_COLOUR,
};
use crate::buffer::DataBuffer;
use crate::error::WireResult;
use crate::maths::{write_quaternion, write_vector3, Quaternion, Vector3};
use crate::messages::{rgba, ROUTING_MESH};
use crate::packet::PacketWriter;

// Transfer phases, in emission order.
const PHASE_CREATE: u32 = 0;
const PHASE_VERTEX: u32 = 1;
const PHASE_INDEX: u32 = 2;
const PHASE_COLOUR: u32 = 3;
const PHASE_NORMAL: u32 = 4;
const PHASE_UV: u32 = 5;
const PHASE_FINALISE: u32 = 6;

/// An encapsulated mesh definition owning all its element arrays.
pub struct MeshResource {
    id: u32,
    draw_type: DrawType,
    draw_scale: f32,
    tint: u32,
    position: Vector3,
    rotation: Quaternion,
    scale: Vector3,
    double_precision: bool,
    vertices: Vec<[f32; 3]>,
    indices: Vec<u32>,
    colours: Vec<u32>,
    normals: Vec<[f32; 3]>,
    uvs: Vec<[f32; 2]>,
}

impl MeshResource {
    pub fn new(id: u32, draw_type: DrawType) -> MeshResource {
        MeshResource {
            id,
            draw_type,
            draw_scale: 0.0,
            tint: rgba(255, 255, 255, 255),
            position: Vector3::ZERO,
            rotation: Quaternion::IDENTITY,
            scale: Vector3::ONE,
            double_precision: false,
            vertices: Vec::new(),
            indices: Vec::new(),
            colours: Vec::new(),
            normals: Vec::new(),
            uvs: Vec::new(),
        }
    }

    pub fn set_transform(&mut self, position: Vector3, rotation: Quaternion, scale: Vector3) {
        self.position = position;
        self.rotation = rotation;
        self.scale = scale;
    }

    pub fn set_double_precision(&mut self, double_precision: bool) {
        self.double_precision = double_precision;
    }

    pub fn set_tint(&mut self, tint: u32) {
        self.tint = tint;
    }

    pub fn set_draw_scale(&mut self, draw_scale: f32) {
        self.draw_scale = draw_scale;
    }

    pub fn add_vertices(&mut self, vertices: &[[f32; 3]]) {
        self.vertices.extend_from_slice(vertices);
    }

    pub fn add_indices(&mut self, indices: &[u32]) {
        self.indices.extend_from_slice(indices);
    }

    pub fn add_colours(&mut self, colours: &[u32]) {
        self.colours.extend_from_slice(colours);
    }

    pub fn add_normals(&mut self, normals: &[[f32; 3]]) {
        self.normals.extend_from_slice(normals);
    }

    pub fn add_uvs(&mut self, uvs: &[[f32; 2]]) {
        self.uvs.extend_from_slice(uvs);
    }

    #[inline]
    pub fn vertex_count(&self) -> u32 {
        self.vertices.len() as u32
    }

    #[inline]
    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    #[inline]
    pub fn draw_type(&self) -> DrawType {
        self.draw_type
    }

    /// Clears the element arrays, keeping identity and transform.
    pub fn clear_data(&mut self) {
        self.vertices.clear();
        self.indices.clear();
        self.colours.clear();
        self.normals.clear();
        self.uvs.clear();
    }

    /// Reopens the resource for mutation on clients that already hold it.
    /// Same payload as the create message; element messages and a finalise
    /// follow through the normal transfer path.
    pub fn write_redefine(&self, packet: &mut PacketWriter) -> WireResult<()> {
        self.write_create_body(packet, MMT_REDEFINE)
    }

    fn write_create_body(&self, packet: &mut PacketWriter, message_id: u16) -> WireResult<()> {
        packet.reset(ROUTING_MESH, message_id);
        packet.write_u32(self.id)?;
        packet.write_u32(self.vertex_count())?;
        packet.write_u32(self.index_count())?;
        let flags = if self.double_precision { MESH_DOUBLE_PRECISION } else { 0 };
        packet.write_u16(flags)?;
        packet.write_f32(self.draw_scale)?;
        packet.write_u32(self.tint)?;
        write_vector3(packet, &self.position, self.double_precision)?;
        write_quaternion(packet, &self.rotation, self.double_precision)?;
        write_vector3(packet, &self.scale, self.double_precision)
    }

    /// Writes one element phase chunk. Returns `(element_count, phase_done)`.
    fn write_elements(
        &self,
        packet: &mut PacketWriter,
        message_id: u16,
        buffer: &DataBuffer,
        offset: u32,
        byte_limit: u32,
    ) -> WireResult<(u16, bool)> {
        packet.reset(ROUTING_MESH, message_id);
        packet.write_u32(self.id)?;
        let wrote = buffer.write(packet, offset, byte_limit)?;
        let done = offset as usize + wrote as usize >= buffer.count();
        Ok((wrote, done))
    }
}

impl Resource for MeshResource {
    fn id(&self) -> u32 {
        self.id
    }

    fn type_id(&self) -> u16 {
        ROUTING_MESH
    }

    fn write_create(&self, packet: &mut PacketWriter) -> WireResult<()> {
        self.write_create_body(packet, MMT_CREATE)
    }

    fn write_destroy(&self, packet: &mut PacketWriter) -> WireResult<()> {
        packet.reset(ROUTING_MESH, MMT_DESTROY);
        packet.write_u32(self.id)
    }

    fn transfer(
        &self,
        packet: &mut PacketWriter,
        byte_limit: u32,
        progress: &mut TransferProgress,
    ) -> WireResult<bool> {
        loop {
            match progress.phase {
                PHASE_CREATE => {
                    self.write_create(packet)?;
                    progress.phase = PHASE_VERTEX;
                    progress.progress = 0;
                    return Ok(true);
                }
                PHASE_VERTEX if !self.vertices.is_empty() => {
                    let buffer = DataBuffer::borrow_vec3(&self.vertices);
                    let (wrote, done) = self.write_elements(
                        packet,
                        MMT_VERTEX,
                        &buffer,
                        progress.progress,
                        byte_limit,
                    )?;
                    if wrote == 0 {
                        return Ok(false);
                    }
                    progress.progress += u32::from(wrote);
                    if done {
                        progress.phase = PHASE_INDEX;
                        progress.progress = 0;
                    }
                    return Ok(true);
                }
                PHASE_INDEX if !self.indices.is_empty() => {
                    let buffer = DataBuffer::borrow(&self.indices, 1);
                    let (wrote, done) = self.write_elements(
                        packet,
                        MMT_INDEX,
                        &buffer,
                        progress.progress,
                        byte_limit,
                    )?;
                    if wrote == 0 {
                        return Ok(false);
                    }
                    progress.progress += u32::from(wrote);
                    if done {
                        progress.phase = PHASE_COLOUR;
                        progress.progress = 0;
                    }
                    return Ok(true);
                }
                PHASE_COLOUR if !self.colours.is_empty() => {
                    let buffer = DataBuffer::borrow(&self.colours, 1);
                    let (wrote, done) = self.write_elements(
                        packet,
                        MMT_VERTEX_COLOUR,
                        &buffer,
                        progress.progress,
                        byte_limit,
                    )?;
                    if wrote == 0 {
                        return Ok(false);
                    }
                    progress.progress += u32::from(wrote);
                    if done {
                        progress.phase = PHASE_NORMAL;
                        progress.progress = 0;
                    }
                    return Ok(true);
                }
                PHASE_NORMAL if !self.normals.is_empty() => {
                    let buffer = DataBuffer::borrow_vec3(&self.normals);
                    let (wrote, done) = self.write_elements(
                        packet,
                        MMT_NORMAL,
                        &buffer,
                        progress.progress,
                        byte_limit,
                    )?;
                    if wrote == 0 {
                        return Ok(false);
                    }
                    progress.progress += u32::from(wrote);
                    if done {
                        progress.phase = PHASE_UV;
                        progress.progress = 0;
                    }
                    return Ok(true);
                }
                PHASE_UV if !self.uvs.is_empty() => {
                    let buffer = DataBuffer::borrow_vec2(&self.uvs);
                    let (wrote, done) = self.write_elements(
                        packet,
                        MMT_UV,
                        &buffer,
                        progress.progress,
                        byte_limit,
                    )?;
                    if wrote == 0 {
                        return Ok(false);
                    }
                    progress.progress += u32::from(wrote);
                    if done {
                        progress.phase = PHASE_FINALISE;
                        progress.progress = 0;
                    }
                    return Ok(true);
                }
                PHASE_FINALISE => {
                    packet.reset(ROUTING_MESH, MMT_FINALISE);
                    packet.write_u32(self.id)?;
                    packet.write_u16(0)?;
                    progress.complete = true;
                    return Ok(true);
                }
                // Empty phase: fall through to the next one.
                _ => {
                    progress.phase += 1;
                    progress.progress = 0;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketReader;
    use crate::resource::TransferProgress;

    fn quad() -> MeshResource {
        let mut mesh = MeshResource::new(7, DrawType::Triangles);
        mesh.add_vertices(&[
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
        ]);
        mesh.add_indices(&[0, 1, 2, 0, 2, 3]);
        mesh.add_colours(&[0xff0000ff, 0x00ff00ff, 0x0000ffff, 0xffffffff]);
        mesh
    }

    fn drain_transfer(mesh: &MeshResource, byte_limit: u32) -> Vec<(u16, Vec<u8>)> {
        let mut packet = PacketWriter::new(65536);
        let mut progress = TransferProgress::default();
        let mut messages = Vec::new();
        while !progress.complete {
            assert!(mesh.transfer(&mut packet, byte_limit, &mut progress).unwrap());
            packet.finalise().unwrap();
            let reader = PacketReader::new(packet.packet_bytes()).unwrap();
            messages.push((reader.message_id(), packet.packet_bytes().to_vec()));
        }
        messages
    }

    #[test]
    fn test_transfer_message_sequence() {
        let mesh = quad();
        let ids: Vec<u16> = drain_transfer(&mesh, 0).iter().map(|(id, _)| *id).collect();
        assert_eq!(
            ids,
            vec![MMT_CREATE, MMT_VERTEX, MMT_INDEX, MMT_VERTEX_COLOUR, MMT_FINALISE]
        );
    }

    #[test]
    fn test_transfer_skips_empty_channels() {
        let mut mesh = MeshResource::new(1, DrawType::Points);
        mesh.add_vertices(&[[0.0, 0.0, 0.0]]);
        let ids: Vec<u16> = drain_transfer(&mesh, 0).iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![MMT_CREATE, MMT_VERTEX, MMT_FINALISE]);
    }

    #[test]
    fn test_create_message_payload() {
        let mesh = quad();
        let mut packet = PacketWriter::new(1024);
        mesh.write_create(&mut packet).unwrap();
        packet.finalise().unwrap();
        let mut reader = PacketReader::new(packet.packet_bytes()).unwrap();
        assert_eq!(reader.message_id(), MMT_CREATE);
        assert_eq!(reader.read_u32().unwrap(), 7);
        assert_eq!(reader.read_u32().unwrap(), 4);
        assert_eq!(reader.read_u32().unwrap(), 6);
        assert_eq!(reader.read_u16().unwrap(), 0);
        // Single precision transform: f32 draw scale, u32 tint, then 10 f32s.
        assert_eq!(reader.remaining(), 4 + 4 + 10 * 4);
    }

    #[test]
    fn test_chunked_vertex_transfer_tiles() {
        let mut mesh = MeshResource::new(2, DrawType::Points);
        let vertices: Vec<[f32; 3]> = (0..5000).map(|v| [v as f32; 3]).collect();
        mesh.add_vertices(&vertices);

        let messages = drain_transfer(&mesh, 4096);
        let vertex_messages: Vec<&Vec<u8>> = messages
            .iter()
            .filter(|(id, _)| *id == MMT_VERTEX)
            .map(|(_, bytes)| bytes)
            .collect();
        assert!(vertex_messages.len() > 1);

        let mut expected_offset = 0u32;
        for bytes in vertex_messages {
            let mut reader = PacketReader::new(bytes).unwrap();
            assert_eq!(reader.read_u32().unwrap(), 2);
            let offset = reader.read_u32().unwrap();
            let count = reader.read_u16().unwrap();
            assert_eq!(offset, expected_offset);
            expected_offset += u32::from(count);
        }
        assert_eq!(expected_offset, 5000);
    }

    #[test]
    fn test_redefine_mirrors_create() {
        let mut mesh = quad();
        let mut packet = PacketWriter::new(1024);
        mesh.write_create(&mut packet).unwrap();
        packet.finalise().unwrap();
        let create_payload = packet.packet_bytes()[16..].to_vec();

        mesh.clear_data();
        mesh.add_vertices(&[[9.0, 9.0, 9.0]]);
        mesh.write_redefine(&mut packet).unwrap();
        packet.finalise().unwrap();
        let mut reader = PacketReader::new(packet.packet_bytes()).unwrap();
        assert_eq!(reader.message_id(), MMT_REDEFINE);
        assert_eq!(reader.read_u32().unwrap(), 7);
        assert_eq!(reader.read_u32().unwrap(), 1);
        // Same payload shape as create, differing only in the counts.
        assert_eq!(reader.remaining() + 8, create_payload.len() - 2);
    }

    #[test]
    fn test_unique_key_combines_type_and_id() {
        let mesh = MeshResource::new(42, DrawType::Triangles);
        assert_eq!(mesh.unique_key(), u64::from(ROUTING_MESH) << 32 | 42);
    }
}
