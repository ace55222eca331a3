//! Text shapes. Both 2D and 3D text append the UTF-8 string to the create
//! message, length prefixed with no terminator. Only `scale.z` carries the
//! text height.

use super::{Shape, ShapeCore};
use crate::error::{Error, WireResult};
use crate::maths::Vector3;
use crate::packet::PacketWriter;

pub struct TextShape {
    pub core: ShapeCore,
    pub text: String,
}

impl TextShape {
    pub(super) fn write_create_tail(&self, packet: &mut PacketWriter) -> WireResult<()> {
        if self.text.len() > usize::from(u16::MAX) {
            return Err(Error::OversizedPacket);
        }
        packet.write_u16(self.text.len() as u16)?;
        packet.write_bytes(self.text.as_bytes())
    }
}

impl<'a> Shape<'a> {
    /// Screen space text. Position x and y span `(0, 0)` upper left to
    /// `(1, 1)` lower right; the world space flag reinterprets it.
    pub fn text2d<S: Into<String>>(text: S, object_id: u32, position: Vector3) -> Shape<'a> {
        let mut core = ShapeCore::new(object_id);
        core.attributes.position = position;
        Shape::Text2d(TextShape {
            core,
            text: text.into(),
        })
    }

    /// Text positioned in 3D space. `size` sets the text height.
    pub fn text3d<S: Into<String>>(
        text: S,
        object_id: u32,
        position: Vector3,
        size: f64,
    ) -> Shape<'a> {
        let mut core = ShapeCore::new(object_id);
        core.attributes.position = position;
        core.attributes.scale.z = size;
        Shape::Text3d(TextShape {
            core,
            text: text.into(),
        })
    }
}
