//! Dumps a recorded stream as one line per packet, expanding collated
//! packets. Useful for eyeballing what a server actually wrote.

use clap::{Arg, Command};
use scry::messages::{
    ControlMessage, ServerInfoMessage, ROUTING_CAMERA, ROUTING_CATEGORY, ROUTING_COLLATED_PACKET,
    ROUTING_CONTROL, ROUTING_MATERIAL, ROUTING_MESH, ROUTING_SERVER_INFO,
};
use scry::prelude::*;
use std::fs::File;

fn routing_name(routing_id: u16) -> &'static str {
    match routing_id {
        ROUTING_SERVER_INFO => "server-info",
        ROUTING_CONTROL => "control",
        ROUTING_COLLATED_PACKET => "collated",
        ROUTING_MESH => "mesh",
        ROUTING_CAMERA => "camera",
        ROUTING_CATEGORY => "category",
        ROUTING_MATERIAL => "material",
        64..=2047 => "shape",
        _ => "user",
    }
}

fn main() {
    let matches = Command::new("rec_dump")
        .about("Lists the packets of a recorded stream")
        .arg(Arg::new("file").required(true).value_name("PATH"))
        .get_matches();
    let path = matches.get_one::<String>("file").unwrap();

    let file = File::open(path).expect("Failed to open the recording");
    let mut reader = PacketStreamReader::new(file);
    let mut index = 0usize;

    loop {
        let packet = match reader.next_packet() {
            Ok(Some(packet)) => packet,
            Ok(None) => break,
            Err(err) => {
                eprintln!("packet {}: {}", index, err);
                break;
            }
        };
        let mut packet_reader = PacketReader::new(&packet).expect("Reader yielded a bad packet");
        let header = *packet_reader.header();
        print!(
            "{:5}  {:>11}  routing {:4}  message {:2}  payload {:5}",
            index,
            routing_name(header.routing_id),
            header.routing_id,
            header.message_id,
            header.payload_size,
        );

        match header.routing_id {
            ROUTING_SERVER_INFO => {
                if let Ok(info) = ServerInfoMessage::read(&mut packet_reader) {
                    print!(
                        "  time_unit {}us frame_time {} frame {:?}",
                        info.time_unit, info.default_frame_time, info.coordinate_frame
                    );
                }
            }
            ROUTING_CONTROL => {
                if let Ok(message) = ControlMessage::read(&mut packet_reader) {
                    print!(
                        "  flags {:#x} value32 {} value64 {}",
                        message.control_flags, message.value32, message.value64
                    );
                }
            }
            _ => {}
        }
        println!();
        index += 1;
    }
    println!("{} packets", index);
}
