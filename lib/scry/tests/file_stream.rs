//! End to end recording scenarios: a server with a file stream connection,
//! replayed through the packet stream reader.

use scry::messages::{
    ControlId, ControlMessage, ServerInfoMessage, ROUTING_CONTROL, ROUTING_MESH,
    ROUTING_SERVER_INFO, SID_MESH_SET, SID_MESH_SHAPE, SID_SPHERE, SMT_CREATE, SMT_DATA,
    SMT_DESTROY,
};
use scry::prelude::*;
use scry::resource::{
    MMT_CREATE, MMT_DESTROY, MMT_FINALISE, MMT_INDEX, MMT_VERTEX, MMT_VERTEX_COLOUR,
};
use scry::shapes::{read_create, DecodedTail, MeshSet, MeshShape};
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("scry-{}-{}.rec", name, std::process::id()))
}

fn server_with_recording(path: &PathBuf) -> Server {
    let server = Server::new(ServerSettings::default(), None, None);
    let monitor = server.connection_monitor().clone();
    monitor.open_file_stream(path).unwrap();
    monitor.commit_connections(&server);
    assert_eq!(server.connection_count(), 1);
    server
}

fn read_recording(path: &PathBuf) -> Vec<Vec<u8>> {
    let mut reader = PacketStreamReader::new(File::open(path).unwrap());
    let mut packets = Vec::new();
    while let Some(packet) = reader.next_packet().unwrap() {
        packets.push(packet);
    }
    packets
}

fn ids(packet: &[u8]) -> (u16, u16) {
    let reader = PacketReader::new(packet).unwrap();
    (reader.routing_id(), reader.message_id())
}

#[test]
fn test_sphere_create_destroy_stream() {
    let path = temp_path("sphere");
    let server = server_with_recording(&path);

    let sphere = Shape::sphere(42, Vector3::new(1.2, 2.3, 3.4), 1.26).with_category(1);
    assert!(server.create(&sphere) > 0);
    assert!(server.update_frame(0.033, true) > 0);
    assert!(server.destroy(&sphere) > 0);
    assert!(server.update_frame(0.033, true) > 0);
    server.close();

    let packets = read_recording(&path);
    let sequence: Vec<(u16, u16)> = packets.iter().map(|packet| ids(packet)).collect();
    assert_eq!(
        sequence,
        vec![
            (ROUTING_SERVER_INFO, 0),
            (ROUTING_CONTROL, ControlId::FrameCount.into()),
            (SID_SPHERE, SMT_CREATE),
            (ROUTING_CONTROL, ControlId::Frame.into()),
            (SID_SPHERE, SMT_DESTROY),
            (ROUTING_CONTROL, ControlId::Frame.into()),
        ]
    );

    // Server info carries the defaults.
    let mut reader = PacketReader::new(&packets[0]).unwrap();
    let info = ServerInfoMessage::read(&mut reader).unwrap();
    assert_eq!(info.time_unit, 1000);
    assert_eq!(info.coordinate_frame, CoordinateFrame::Xyz);

    // Two frames were recorded.
    let mut reader = PacketReader::new(&packets[1]).unwrap();
    assert_eq!(ControlMessage::read(&mut reader).unwrap().value32, 2);

    // The create message round trips the sphere.
    let mut reader = PacketReader::new(&packets[2]).unwrap();
    let decoded = read_create(&mut reader).unwrap();
    assert_eq!(decoded.object_id, 42);
    assert_eq!(decoded.category, 1);
    assert!((decoded.attributes.position.x - 1.2).abs() < 1e-6);
    assert!((decoded.attributes.scale.x - 1.26).abs() < 1e-6);

    // Both frame messages carry 33 ticks and no persist flag.
    for index in [3usize, 5] {
        let mut reader = PacketReader::new(&packets[index]).unwrap();
        let frame = ControlMessage::read(&mut reader).unwrap();
        assert_eq!(frame.value32, 33);
        assert_eq!(frame.control_flags, 0);
    }

    std::fs::remove_file(&path).ok();
}

#[test]
fn test_mesh_set_shared_resource() {
    let path = temp_path("meshset");
    let server = server_with_recording(&path);

    let mut quad = MeshResource::new(17, DrawType::Triangles);
    quad.add_vertices(&[
        [0.0, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        [1.0, 1.0, 0.0],
        [0.0, 1.0, 0.0],
    ]);
    quad.add_indices(&[0, 1, 2, 0, 2, 3]);
    quad.add_colours(&[0xff0000ff, 0x00ff00ff, 0x0000ffff, 0xffffffff]);
    let quad = Arc::new(quad);

    let mut offset = Attributes::default();
    offset.position = Vector3::new(2.0, 0.0, 0.0);
    let set: Shape = MeshSet::new(10)
        .with_part(Arc::clone(&quad), Attributes::default())
        .with_part(Arc::clone(&quad), offset)
        .into();

    assert!(server.create(&set) > 0);
    assert!(server.update_transfers(64_000) > 0);
    assert!(server.destroy(&set) > 0);
    assert!(server.update_frame(0.033, true) > 0);
    server.close();

    let packets = read_recording(&path);

    // The mesh set create lists both parts against the shared resource.
    let create = packets
        .iter()
        .find(|packet| ids(packet) == (SID_MESH_SET, SMT_CREATE))
        .unwrap();
    let mut reader = PacketReader::new(create).unwrap();
    match read_create(&mut reader).unwrap().tail {
        DecodedTail::MeshSet { parts } => {
            assert_eq!(parts.len(), 2);
            assert!(parts.iter().all(|(resource_id, _)| *resource_id == 17));
        }
        tail => panic!("Unexpected tail {:?}", tail),
    }

    // One full transfer cycle and exactly one destroy: the two parts share
    // one reference.
    let mesh_messages: Vec<u16> = packets
        .iter()
        .filter(|packet| ids(packet).0 == ROUTING_MESH)
        .map(|packet| ids(packet).1)
        .collect();
    assert_eq!(
        mesh_messages,
        vec![
            MMT_CREATE,
            MMT_VERTEX,
            MMT_INDEX,
            MMT_VERTEX_COLOUR,
            MMT_FINALISE,
            MMT_DESTROY,
        ]
    );

    std::fs::remove_file(&path).ok();
}

#[test]
fn test_mesh_shape_streams_in_chunks() {
    let path = temp_path("meshshape");
    let server = server_with_recording(&path);

    let vertices: Vec<[f32; 3]> = (0..80_000)
        .map(|index| [index as f32, 0.5 * index as f32, -0.25 * index as f32])
        .collect();
    let shape: Shape =
        MeshShape::new(3, DrawType::Points, DataBuffer::borrow_vec3(&vertices)).into();

    assert!(server.create(&shape) > 0);
    assert!(server.update_frame(0.033, true) > 0);
    server.close();

    let packets = read_recording(&path);

    let create = packets
        .iter()
        .find(|packet| ids(packet) == (SID_MESH_SHAPE, SMT_CREATE))
        .unwrap();
    let mut reader = PacketReader::new(create).unwrap();
    match read_create(&mut reader).unwrap().tail {
        DecodedTail::MeshShape { vertex_count, .. } => assert_eq!(vertex_count, 80_000),
        tail => panic!("Unexpected tail {:?}", tail),
    }

    // Data messages tile [0, 80000) without overlap, monotonically.
    let mut expected_offset = 0u32;
    let mut data_packets = 0;
    for packet in packets
        .iter()
        .filter(|packet| ids(packet) == (SID_MESH_SHAPE, SMT_DATA))
    {
        let mut reader = PacketReader::new(packet).unwrap();
        assert_eq!(reader.read_u32().unwrap(), 3);
        assert_eq!(reader.read_u16().unwrap(), 0);
        let offset = reader.read_u32().unwrap();
        let count = reader.read_u16().unwrap();
        assert_eq!(offset, expected_offset);
        expected_offset += u32::from(count);
        data_packets += 1;
    }
    assert_eq!(expected_offset, 80_000);
    assert!(data_packets >= 2);

    std::fs::remove_file(&path).ok();
}

#[test]
fn test_frame_count_patched_on_close() {
    let path = temp_path("framecount");
    let server = server_with_recording(&path);

    for _ in 0..7 {
        assert!(server.update_frame(0.033, true) > 0);
    }
    server.close();

    let packets = read_recording(&path);
    let frame_count = packets
        .iter()
        .find(|packet| ids(packet) == (ROUTING_CONTROL, ControlId::FrameCount.into()))
        .unwrap();
    let mut reader = PacketReader::new(frame_count).unwrap();
    assert_eq!(ControlMessage::read(&mut reader).unwrap().value32, 7);

    // A reader starting from an arbitrary offset recovers the subsequent
    // packet sequence by scanning to the first marker.
    let bytes = std::fs::read(&path).unwrap();
    let recovered = {
        let mut reader = PacketStreamReader::new(&bytes[11..]);
        let mut packets = Vec::new();
        while let Some(packet) = reader.next_packet().unwrap() {
            packets.push(packet);
        }
        packets
    };
    assert!(!recovered.is_empty());
    assert!(recovered.len() < packets.len() + 1);
    let tail = &packets[packets.len() - recovered.len()..];
    assert_eq!(recovered.as_slice(), tail);

    std::fs::remove_file(&path).ok();
}

#[test]
fn test_inactive_server_is_a_no_op() {
    let path = temp_path("inactive");
    let server = server_with_recording(&path);
    server.set_active(false);

    let sphere = Shape::sphere(1, Vector3::ZERO, 1.0);
    assert_eq!(server.create(&sphere), 0);
    assert_eq!(server.update_frame(0.033, true), 0);
    assert_eq!(server.destroy(&sphere), 0);

    server.set_active(true);
    server.close();

    // Only the stream bootstrap reached the file.
    let packets = read_recording(&path);
    let sequence: Vec<(u16, u16)> = packets.iter().map(|packet| ids(packet)).collect();
    assert_eq!(
        sequence,
        vec![
            (ROUTING_SERVER_INFO, 0),
            (ROUTING_CONTROL, ControlId::FrameCount.into()),
        ]
    );

    std::fs::remove_file(&path).ok();
}

#[test]
fn test_oversize_collated_recording() {
    let path = temp_path("oversize");
    let server = server_with_recording(&path);
    let file = server.connection(0).unwrap();
    server.close();
    drop(file);

    // Rebuild a recording by hand with an oversize keyframe style packet.
    let mut collated = CollatedPacket::for_file_stream(false);
    let packet = scry::net::pack_message(
        ROUTING_CONTROL,
        ControlId::Frame.into(),
        &ControlMessage::default(),
    )
    .unwrap();
    let mut inner_count = 0usize;
    while collated.collated_bytes() <= 70_000 {
        collated.add(&packet).unwrap();
        inner_count += 1;
    }
    collated.finalise().unwrap();

    let mut bytes = std::fs::read(&path).unwrap();
    bytes.extend_from_slice(collated.buffer());
    let mut reader = PacketStreamReader::new(&bytes[..]);
    let mut total = 0usize;
    while let Some(_packet) = reader.next_packet().unwrap() {
        total += 1;
    }
    // Bootstrap packets plus every inner packet of the oversize collation.
    assert_eq!(total, 2 + inner_count);

    std::fs::remove_file(&path).ok();
}
