//! A debug visualization protocol and server library. Instrumented
//! applications describe 3D primitives, meshes, point clouds and text;
//! the server streams them to remote viewers over a binary protocol and
//! can record the same stream to disk for later replay.
//!
//! The wire protocol frames every message in a marked, CRC protected packet
//! (`packet`), collates and optionally compresses packets per connection
//! (`collate`), and chunks large mesh resources across packets under a byte
//! budget (`resource`). `net` holds the per connection pipeline, the fan-out
//! server and the connection monitor; `stream` replays recordings.

pub mod buffer;
pub mod collate;
pub mod crc;
pub mod error;
pub mod maths;
pub mod messages;
pub mod net;
pub mod packet;
pub mod resource;
pub mod settings;
pub mod shapes;
pub mod stream;

pub use error::{Error, WireResult};

pub mod prelude {
    pub use crate::buffer::{DataBuffer, ScalarType};
    pub use crate::collate::{CollatedPacket, CompressionLevel};
    pub use crate::maths::{Quaternion, Vector3};
    pub use crate::messages::{rgba, ControlId, CoordinateFrame, ServerInfoMessage};
    pub use crate::net::{
        send_message, Connection, ConnectionMonitor, FileConnection, MonitorMode, Server,
        TcpConnection,
    };
    pub use crate::packet::{PacketReader, PacketWriter};
    pub use crate::resource::{DrawType, MeshResource, Resource};
    pub use crate::settings::ServerSettings;
    pub use crate::shapes::{Attributes, Shape, SimpleKind};
    pub use crate::stream::PacketStreamReader;
}
