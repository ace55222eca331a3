//! Minimal vector and quaternion support for shape transforms. Values are
//! held in double precision; the wire precision is chosen at encode time.

/// A 3D vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3 { x: 0.0, y: 0.0, z: 0.0 };
    pub const ONE: Vector3 = Vector3 { x: 1.0, y: 1.0, z: 1.0 };
    /// The canonical forward axis for directional shapes.
    pub const AXIS_Z: Vector3 = Vector3 { x: 0.0, y: 0.0, z: 1.0 };

    #[inline]
    pub fn new(x: f64, y: f64, z: f64) -> Vector3 {
        Vector3 { x, y, z }
    }

    #[inline]
    pub fn uniform(value: f64) -> Vector3 {
        Vector3 { x: value, y: value, z: value }
    }

    #[inline]
    pub fn dot(&self, other: &Vector3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    #[inline]
    pub fn cross(&self, other: &Vector3) -> Vector3 {
        Vector3 {
            x: self.y * other.z - self.z * other.y,
            y: self.z * other.x - self.x * other.z,
            z: self.x * other.y - self.y * other.x,
        }
    }

    #[inline]
    pub fn length_squared(&self) -> f64 {
        self.dot(self)
    }

    #[inline]
    pub fn length(&self) -> f64 {
        self.length_squared().sqrt()
    }

    /// Returns a unit length copy, or zero for degenerate input.
    pub fn normalised(&self) -> Vector3 {
        let len = self.length();
        if len <= f64::EPSILON {
            return Vector3::ZERO;
        }
        Vector3::new(self.x / len, self.y / len, self.z / len)
    }
}

/// A rotation quaternion, xyzw component order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Quaternion {
    pub const IDENTITY: Quaternion = Quaternion { x: 0.0, y: 0.0, z: 0.0, w: 1.0 };

    #[inline]
    pub fn new(x: f64, y: f64, z: f64, w: f64) -> Quaternion {
        Quaternion { x, y, z, w }
    }

    pub fn from_axis_angle(axis: Vector3, angle: f64) -> Quaternion {
        let axis = axis.normalised();
        let half = 0.5 * angle;
        let sin_half = half.sin();
        Quaternion {
            x: axis.x * sin_half,
            y: axis.y * sin_half,
            z: axis.z * sin_half,
            w: half.cos(),
        }
    }

    /// The rotation taking unit vector `from` onto unit vector `to`.
    ///
    /// Antiparallel input resolves to a half turn about an arbitrary
    /// perpendicular axis.
    pub fn rotation_between(from: Vector3, to: Vector3) -> Quaternion {
        let from = from.normalised();
        let to = to.normalised();
        let dot = from.dot(&to);

        if dot >= 1.0 - 1e-9 {
            return Quaternion::IDENTITY;
        }
        if dot <= -1.0 + 1e-9 {
            // Pick any axis perpendicular to `from`.
            let mut axis = Vector3::new(1.0, 0.0, 0.0).cross(&from);
            if axis.length_squared() <= f64::EPSILON {
                axis = Vector3::new(0.0, 1.0, 0.0).cross(&from);
            }
            return Quaternion::from_axis_angle(axis, std::f64::consts::PI);
        }

        let half = from.cross(&to);
        let quat = Quaternion {
            x: half.x,
            y: half.y,
            z: half.z,
            w: 1.0 + dot,
        };
        quat.normalised()
    }

    #[inline]
    pub fn length(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w).sqrt()
    }

    pub fn normalised(&self) -> Quaternion {
        let len = self.length();
        if len <= f64::EPSILON {
            return Quaternion::IDENTITY;
        }
        Quaternion {
            x: self.x / len,
            y: self.y / len,
            z: self.z / len,
            w: self.w / len,
        }
    }

    /// Rotates a vector by this quaternion.
    pub fn rotate(&self, v: Vector3) -> Vector3 {
        let u = Vector3::new(self.x, self.y, self.z);
        let uv = u.cross(&v);
        let uuv = u.cross(&uv);
        Vector3 {
            x: v.x + 2.0 * (self.w * uv.x + uuv.x),
            y: v.y + 2.0 * (self.w * uv.y + uuv.y),
            z: v.z + 2.0 * (self.w * uv.z + uuv.z),
        }
    }
}

/// Writes a vector in the wire precision selected by `double_precision`.
pub fn write_vector3(
    packet: &mut crate::packet::PacketWriter,
    v: &Vector3,
    double_precision: bool,
) -> crate::error::WireResult<()> {
    if double_precision {
        packet.write_f64(v.x)?;
        packet.write_f64(v.y)?;
        packet.write_f64(v.z)
    } else {
        packet.write_f32(v.x as f32)?;
        packet.write_f32(v.y as f32)?;
        packet.write_f32(v.z as f32)
    }
}

pub fn read_vector3(
    reader: &mut crate::packet::PacketReader,
    double_precision: bool,
) -> crate::error::WireResult<Vector3> {
    Ok(if double_precision {
        Vector3::new(reader.read_f64()?, reader.read_f64()?, reader.read_f64()?)
    } else {
        Vector3::new(
            f64::from(reader.read_f32()?),
            f64::from(reader.read_f32()?),
            f64::from(reader.read_f32()?),
        )
    })
}

/// Writes a quaternion xyzw in the wire precision selected by
/// `double_precision`.
pub fn write_quaternion(
    packet: &mut crate::packet::PacketWriter,
    q: &Quaternion,
    double_precision: bool,
) -> crate::error::WireResult<()> {
    if double_precision {
        packet.write_f64(q.x)?;
        packet.write_f64(q.y)?;
        packet.write_f64(q.z)?;
        packet.write_f64(q.w)
    } else {
        packet.write_f32(q.x as f32)?;
        packet.write_f32(q.y as f32)?;
        packet.write_f32(q.z as f32)?;
        packet.write_f32(q.w as f32)
    }
}

pub fn read_quaternion(
    reader: &mut crate::packet::PacketReader,
    double_precision: bool,
) -> crate::error::WireResult<Quaternion> {
    Ok(if double_precision {
        Quaternion::new(
            reader.read_f64()?,
            reader.read_f64()?,
            reader.read_f64()?,
            reader.read_f64()?,
        )
    } else {
        Quaternion::new(
            f64::from(reader.read_f32()?),
            f64::from(reader.read_f32()?),
            f64::from(reader.read_f32()?),
            f64::from(reader.read_f32()?),
        )
    })
}
