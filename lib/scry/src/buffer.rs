//! Typed, possibly strided views over vertex, index and colour arrays with
//! chunked packet transfer and optional quantised packing.
//!
//! A `DataBuffer` either borrows a caller array or owns densely packed
//! storage. Wire payloads carry a small transfer header
//! `(offset u32, count u16, components u8, type u8)` followed by the element
//! bytes; packed float forms insert the packing origin and quantisation unit
//! between header and data.

use crate::error::{Error, WireResult};
use crate::packet::{PacketReader, PacketWriter};
use byteorder::{ByteOrder, NativeEndian};

/// Maximum components (channels) per buffer element.
pub const MAX_COMPONENTS: u8 = 16;

/// Transfer header bytes: offset, count, component count, content type.
const TRANSFER_HEADER_SIZE: usize = 4 + 2 + 1 + 1;

/// Scalar content types as carried on the wire. The two packed types are
/// transient wire forms only and never back a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
    PackedFloat16,
    PackedFloat32,
}

impl ScalarType {
    pub fn byte_size(self) -> usize {
        match self {
            ScalarType::Int8 | ScalarType::UInt8 => 1,
            ScalarType::Int16 | ScalarType::UInt16 | ScalarType::PackedFloat16 => 2,
            ScalarType::Int32
            | ScalarType::UInt32
            | ScalarType::Float32
            | ScalarType::PackedFloat32 => 4,
            ScalarType::Int64 | ScalarType::UInt64 | ScalarType::Float64 => 8,
        }
    }

    pub fn wire_id(self) -> u8 {
        match self {
            ScalarType::Int8 => 1,
            ScalarType::UInt8 => 2,
            ScalarType::Int16 => 3,
            ScalarType::UInt16 => 4,
            ScalarType::Int32 => 5,
            ScalarType::UInt32 => 6,
            ScalarType::Int64 => 7,
            ScalarType::UInt64 => 8,
            ScalarType::Float32 => 9,
            ScalarType::Float64 => 10,
            ScalarType::PackedFloat16 => 11,
            ScalarType::PackedFloat32 => 12,
        }
    }

    pub fn from_wire_id(id: u8) -> WireResult<ScalarType> {
        Ok(match id {
            1 => ScalarType::Int8,
            2 => ScalarType::UInt8,
            3 => ScalarType::Int16,
            4 => ScalarType::UInt16,
            5 => ScalarType::Int32,
            6 => ScalarType::UInt32,
            7 => ScalarType::Int64,
            8 => ScalarType::UInt64,
            9 => ScalarType::Float32,
            10 => ScalarType::Float64,
            11 => ScalarType::PackedFloat16,
            12 => ScalarType::PackedFloat32,
            _ => return Err(Error::TypeMismatch),
        })
    }

    #[inline]
    pub fn is_float(self) -> bool {
        matches!(self, ScalarType::Float32 | ScalarType::Float64)
    }

    #[inline]
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            ScalarType::Int8
                | ScalarType::UInt8
                | ScalarType::Int16
                | ScalarType::UInt16
                | ScalarType::Int32
                | ScalarType::UInt32
                | ScalarType::Int64
                | ScalarType::UInt64
        )
    }

    #[inline]
    pub fn is_packed(self) -> bool {
        matches!(self, ScalarType::PackedFloat16 | ScalarType::PackedFloat32)
    }
}

/// An exact scalar value pulled out of a buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScalarValue {
    Signed(i64),
    Unsigned(u64),
    Float(f64),
}

impl ScalarValue {
    #[inline]
    pub fn as_f64(self) -> f64 {
        match self {
            ScalarValue::Signed(v) => v as f64,
            ScalarValue::Unsigned(v) => v as f64,
            ScalarValue::Float(v) => v,
        }
    }
}

/// Scalar types a `DataBuffer` can view. Conversion through `ScalarValue`
/// follows plain numeric cast semantics.
pub trait Scalar: bytemuck::Pod {
    const SCALAR_TYPE: ScalarType;
    fn to_value(self) -> ScalarValue;
    fn from_value(value: ScalarValue) -> Self;
}

macro_rules! impl_scalar_int {
    ($ty:ty, $scalar:expr, $variant:ident, $wide:ty) => {
        impl Scalar for $ty {
            const SCALAR_TYPE: ScalarType = $scalar;

            #[inline]
            fn to_value(self) -> ScalarValue {
                ScalarValue::$variant(self as $wide)
            }

            #[inline]
            fn from_value(value: ScalarValue) -> Self {
                match value {
                    ScalarValue::Signed(v) => v as $ty,
                    ScalarValue::Unsigned(v) => v as $ty,
                    ScalarValue::Float(v) => v as $ty,
                }
            }
        }
    };
}

impl_scalar_int!(i8, ScalarType::Int8, Signed, i64);
impl_scalar_int!(u8, ScalarType::UInt8, Unsigned, u64);
impl_scalar_int!(i16, ScalarType::Int16, Signed, i64);
impl_scalar_int!(u16, ScalarType::UInt16, Unsigned, u64);
impl_scalar_int!(i32, ScalarType::Int32, Signed, i64);
impl_scalar_int!(u32, ScalarType::UInt32, Unsigned, u64);
impl_scalar_int!(i64, ScalarType::Int64, Signed, i64);
impl_scalar_int!(u64, ScalarType::UInt64, Unsigned, u64);

macro_rules! impl_scalar_float {
    ($ty:ty, $scalar:expr) => {
        impl Scalar for $ty {
            const SCALAR_TYPE: ScalarType = $scalar;

            #[inline]
            fn to_value(self) -> ScalarValue {
                ScalarValue::Float(f64::from(self))
            }

            #[inline]
            fn from_value(value: ScalarValue) -> Self {
                match value {
                    ScalarValue::Signed(v) => v as $ty,
                    ScalarValue::Unsigned(v) => v as $ty,
                    ScalarValue::Float(v) => v as $ty,
                }
            }
        }
    };
}

impl_scalar_float!(f32, ScalarType::Float32);
impl_scalar_float!(f64, ScalarType::Float64);

enum Storage<'a> {
    Borrowed(&'a [u8]),
    Owned(Vec<u8>),
}

impl<'a> Storage<'a> {
    #[inline]
    fn bytes(&self) -> &[u8] {
        match self {
            Storage::Borrowed(bytes) => bytes,
            Storage::Owned(bytes) => bytes,
        }
    }
}

/// A typed view over an array of scalars, `component_count` channels per
/// element, stepping `element_stride` scalars between elements.
pub struct DataBuffer<'a> {
    data: Storage<'a>,
    count: usize,
    component_count: u8,
    element_stride: u8,
    scalar: ScalarType,
}

impl<'a> DataBuffer<'a> {
    /// Borrows a contiguous scalar array, densely packed.
    pub fn borrow<T: Scalar>(data: &'a [T], component_count: u8) -> DataBuffer<'a> {
        Self::borrow_strided(data, component_count, component_count)
    }

    /// Borrows a contiguous scalar array with an explicit element stride in
    /// scalar units.
    pub fn borrow_strided<T: Scalar>(
        data: &'a [T],
        component_count: u8,
        element_stride: u8,
    ) -> DataBuffer<'a> {
        assert!(
            component_count >= 1 && component_count <= MAX_COMPONENTS,
            "Component count out of range: {}",
            component_count
        );
        assert!(
            element_stride >= component_count,
            "Element stride {} below component count {}",
            element_stride,
            component_count
        );
        let count = if data.len() < component_count as usize {
            0
        } else {
            (data.len() - component_count as usize) / element_stride as usize + 1
        };
        DataBuffer {
            data: Storage::Borrowed(bytemuck::cast_slice(data)),
            count,
            component_count,
            element_stride,
            scalar: T::SCALAR_TYPE,
        }
    }

    /// Borrows an array of 3 component vectors.
    pub fn borrow_vec3<T: Scalar>(data: &'a [[T; 3]]) -> DataBuffer<'a> {
        DataBuffer {
            data: Storage::Borrowed(bytemuck::cast_slice(data)),
            count: data.len(),
            component_count: 3,
            element_stride: 3,
            scalar: T::SCALAR_TYPE,
        }
    }

    /// Borrows an array of 2 component vectors.
    pub fn borrow_vec2<T: Scalar>(data: &'a [[T; 2]]) -> DataBuffer<'a> {
        DataBuffer {
            data: Storage::Borrowed(bytemuck::cast_slice(data)),
            count: data.len(),
            component_count: 2,
            element_stride: 2,
            scalar: T::SCALAR_TYPE,
        }
    }

    /// Takes ownership of a densely packed scalar vector.
    pub fn owned<T: Scalar>(data: Vec<T>, component_count: u8) -> DataBuffer<'static> {
        assert!(
            component_count >= 1 && component_count <= MAX_COMPONENTS,
            "Component count out of range: {}",
            component_count
        );
        let count = data.len() / component_count as usize;
        let bytes: &[u8] = bytemuck::cast_slice(&data);
        DataBuffer {
            data: Storage::Owned(bytes.to_vec()),
            count,
            component_count,
            element_stride: component_count,
            scalar: T::SCALAR_TYPE,
        }
    }

    /// Allocates a zeroed, owned destination buffer for reads.
    pub fn owned_zeroed(
        scalar: ScalarType,
        count: usize,
        component_count: u8,
    ) -> DataBuffer<'static> {
        assert!(!scalar.is_packed(), "Packed types cannot back a buffer");
        assert!(
            component_count >= 1 && component_count <= MAX_COMPONENTS,
            "Component count out of range: {}",
            component_count
        );
        DataBuffer {
            data: Storage::Owned(vec![0; count * component_count as usize * scalar.byte_size()]),
            count,
            component_count,
            element_stride: component_count,
            scalar,
        }
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn component_count(&self) -> u8 {
        self.component_count
    }

    #[inline]
    pub fn element_stride(&self) -> u8 {
        self.element_stride
    }

    #[inline]
    pub fn scalar_type(&self) -> ScalarType {
        self.scalar
    }

    /// Bytes between the starts of consecutive elements.
    #[inline]
    pub fn byte_stride(&self) -> usize {
        self.element_stride as usize * self.scalar.byte_size()
    }

    #[inline]
    pub fn is_owned(&self) -> bool {
        matches!(self.data, Storage::Owned(_))
    }

    /// Densely packs the buffer content into freshly owned storage.
    pub fn duplicate(&self) -> DataBuffer<'static> {
        let scalar_size = self.scalar.byte_size();
        let packed_element = self.component_count as usize * scalar_size;
        let mut packed = Vec::with_capacity(self.count * packed_element);
        let bytes = self.data.bytes();
        for element in 0..self.count {
            let start = element * self.byte_stride();
            packed.extend_from_slice(&bytes[start..start + packed_element]);
        }
        DataBuffer {
            data: Storage::Owned(packed),
            count: self.count,
            component_count: self.component_count,
            element_stride: self.component_count,
            scalar: self.scalar,
        }
    }

    /// Reads the component at `(element, component)` as any supported scalar
    /// type, cast from the stored type.
    pub fn get<T: Scalar>(&self, element: usize, component: usize) -> T {
        T::from_value(self.value_at(element, component))
    }

    fn value_at(&self, element: usize, component: usize) -> ScalarValue {
        assert!(element < self.count, "Element {} out of range", element);
        assert!(
            component < self.component_count as usize,
            "Component {} out of range",
            component
        );
        let scalar_size = self.scalar.byte_size();
        let offset = element * self.byte_stride() + component * scalar_size;
        let bytes = &self.data.bytes()[offset..offset + scalar_size];
        match self.scalar {
            ScalarType::Int8 => ScalarValue::Signed(i64::from(bytes[0] as i8)),
            ScalarType::UInt8 => ScalarValue::Unsigned(u64::from(bytes[0])),
            ScalarType::Int16 => ScalarValue::Signed(i64::from(NativeEndian::read_i16(bytes))),
            ScalarType::UInt16 => ScalarValue::Unsigned(u64::from(NativeEndian::read_u16(bytes))),
            ScalarType::Int32 => ScalarValue::Signed(i64::from(NativeEndian::read_i32(bytes))),
            ScalarType::UInt32 => ScalarValue::Unsigned(u64::from(NativeEndian::read_u32(bytes))),
            ScalarType::Int64 => ScalarValue::Signed(NativeEndian::read_i64(bytes)),
            ScalarType::UInt64 => ScalarValue::Unsigned(NativeEndian::read_u64(bytes)),
            ScalarType::Float32 => ScalarValue::Float(f64::from(NativeEndian::read_f32(bytes))),
            ScalarType::Float64 => ScalarValue::Float(NativeEndian::read_f64(bytes)),
            ScalarType::PackedFloat16 | ScalarType::PackedFloat32 => {
                unreachable!("Packed types never back a buffer")
            }
        }
    }

    fn write_component(&self, packet: &mut PacketWriter, element: usize, component: usize) -> WireResult<()> {
        let scalar_size = self.scalar.byte_size();
        let offset = element * self.byte_stride() + component * scalar_size;
        let bytes = &self.data.bytes()[offset..offset + scalar_size];
        match self.scalar {
            ScalarType::Int8 => packet.write_i8(bytes[0] as i8),
            ScalarType::UInt8 => packet.write_u8(bytes[0]),
            ScalarType::Int16 => packet.write_i16(NativeEndian::read_i16(bytes)),
            ScalarType::UInt16 => packet.write_u16(NativeEndian::read_u16(bytes)),
            ScalarType::Int32 => packet.write_i32(NativeEndian::read_i32(bytes)),
            ScalarType::UInt32 => packet.write_u32(NativeEndian::read_u32(bytes)),
            ScalarType::Int64 => packet.write_i64(NativeEndian::read_i64(bytes)),
            ScalarType::UInt64 => packet.write_u64(NativeEndian::read_u64(bytes)),
            ScalarType::Float32 => packet.write_f32(NativeEndian::read_f32(bytes)),
            ScalarType::Float64 => packet.write_f64(NativeEndian::read_f64(bytes)),
            ScalarType::PackedFloat16 | ScalarType::PackedFloat32 => {
                unreachable!("Packed types never back a buffer")
            }
        }
    }

    /// Chooses how many elements fit within `byte_limit` (zero meaning
    /// unlimited), the packet's remaining capacity, and the element range.
    fn transfer_count(&self, offset: u32, byte_limit: u32, available: usize, overhead: usize, item_size: usize) -> u16 {
        let available = if byte_limit > 0 {
            available.min(byte_limit as usize)
        } else {
            available
        };
        if available < overhead + item_size {
            return 0;
        }
        let fit = (available - overhead) / item_size;
        let left = self.count.saturating_sub(offset as usize);
        fit.min(left).min(usize::from(u16::MAX)) as u16
    }

    /// Writes up to `byte_limit` bytes of elements starting at `offset` into
    /// the packet in the buffer's own scalar type. Returns the element count
    /// written; zero when nothing fits.
    pub fn write(&self, packet: &mut PacketWriter, offset: u32, byte_limit: u32) -> WireResult<u16> {
        let item_size = self.scalar.byte_size() * self.component_count as usize;
        let transfer = self.transfer_count(
            offset,
            byte_limit,
            packet.remaining(),
            TRANSFER_HEADER_SIZE,
            item_size,
        );
        if transfer == 0 {
            return Ok(0);
        }

        packet.write_u32(offset)?;
        packet.write_u16(transfer)?;
        packet.write_u8(self.component_count)?;
        packet.write_u8(self.scalar.wire_id())?;
        for element in offset as usize..offset as usize + transfer as usize {
            for component in 0..self.component_count as usize {
                self.write_component(packet, element, component)?;
            }
        }
        Ok(transfer)
    }

    /// Writes elements in quantised packed form. Only float buffers pack:
    /// `Float32` to `PackedFloat16`, `Float64` to `PackedFloat32`. Each
    /// component is stored as `round((value - origin[c]) / quantisation_unit)`
    /// and must round trip within one quantisation unit.
    pub fn write_packed(
        &self,
        packet: &mut PacketWriter,
        offset: u32,
        byte_limit: u32,
        quantisation_unit: f64,
        packing_origin: Option<&[f64]>,
    ) -> WireResult<u16> {
        let (packed_type, packed_size, origin_size, packed_min, packed_max) = match self.scalar {
            ScalarType::Float32 => (
                ScalarType::PackedFloat16,
                2usize,
                4usize,
                f64::from(i16::MIN),
                f64::from(i16::MAX),
            ),
            ScalarType::Float64 => (
                ScalarType::PackedFloat32,
                4usize,
                8usize,
                f64::from(i32::MIN),
                f64::from(i32::MAX),
            ),
            _ => return Err(Error::TypeMismatch),
        };
        if let Some(origin) = packing_origin {
            assert_eq!(
                origin.len(),
                self.component_count as usize,
                "Packing origin length must match the component count"
            );
        }
        assert!(quantisation_unit > 0.0, "Quantisation unit must be positive");

        let components = self.component_count as usize;
        let overhead = TRANSFER_HEADER_SIZE + components * origin_size + 4;
        let item_size = packed_size * components;
        let transfer = self.transfer_count(offset, byte_limit, packet.remaining(), overhead, item_size);
        if transfer == 0 {
            return Ok(0);
        }

        // Quantise ahead of the header write so an overflow emits nothing.
        let mut packed_values = Vec::with_capacity(transfer as usize * components);
        for element in offset as usize..offset as usize + transfer as usize {
            for component in 0..components {
                let mut value = self.value_at(element, component).as_f64();
                if let Some(origin) = packing_origin {
                    value -= origin[component];
                }
                value /= quantisation_unit;
                let packed = value.round();
                if (packed - value).abs() > 1.0 || packed < packed_min || packed > packed_max {
                    return Err(Error::QuantisationOverflow);
                }
                packed_values.push(packed as i64);
            }
        }

        packet.write_u32(offset)?;
        packet.write_u16(transfer)?;
        packet.write_u8(self.component_count)?;
        packet.write_u8(packed_type.wire_id())?;
        for component in 0..components {
            let origin = packing_origin.map_or(0.0, |origin| origin[component]);
            match self.scalar {
                ScalarType::Float32 => packet.write_f32(origin as f32)?,
                _ => packet.write_f64(origin)?,
            }
        }
        packet.write_f32(quantisation_unit as f32)?;
        for packed in packed_values {
            match packed_type {
                ScalarType::PackedFloat16 => packet.write_i16(packed as i16)?,
                _ => packet.write_i32(packed as i32)?,
            }
        }
        Ok(transfer)
    }

    /// Reads one transfer payload into this owned buffer. Accepts a payload
    /// of the buffer's own scalar type, or a packed float payload feeding a
    /// float buffer. Returns the `(offset, count)` covered by the payload.
    pub fn read_into(&mut self, reader: &mut PacketReader) -> WireResult<(u32, u16)> {
        let offset = reader.read_u32()?;
        let count = reader.read_u16()?;
        let components = reader.read_u8()?;
        let wire_type = ScalarType::from_wire_id(reader.read_u8()?)?;

        if components != self.component_count {
            return Err(Error::TypeMismatch);
        }
        if offset as usize + count as usize > self.count {
            return Err(Error::Truncated);
        }

        if wire_type == self.scalar {
            for element in offset as usize..offset as usize + count as usize {
                for component in 0..components as usize {
                    let value = read_wire_scalar(reader, wire_type)?;
                    self.store(element, component, value);
                }
            }
            return Ok((offset, count));
        }

        // Packed payloads unpack into float destinations only.
        let origin_wide = match (wire_type, self.scalar) {
            (ScalarType::PackedFloat16, ScalarType::Float32)
            | (ScalarType::PackedFloat16, ScalarType::Float64) => false,
            (ScalarType::PackedFloat32, ScalarType::Float32)
            | (ScalarType::PackedFloat32, ScalarType::Float64) => true,
            _ => return Err(Error::TypeMismatch),
        };

        let mut origin = [0.0f64; MAX_COMPONENTS as usize];
        for component in origin.iter_mut().take(components as usize) {
            *component = if origin_wide {
                reader.read_f64()?
            } else {
                f64::from(reader.read_f32()?)
            };
        }
        let unit = f64::from(reader.read_f32()?);

        for element in offset as usize..offset as usize + count as usize {
            for component in 0..components as usize {
                let packed = match wire_type {
                    ScalarType::PackedFloat16 => f64::from(reader.read_i16()?),
                    _ => f64::from(reader.read_i32()?),
                };
                let value = packed * unit + origin[component];
                self.store(element, component, ScalarValue::Float(value));
            }
        }
        Ok((offset, count))
    }

    fn store(&mut self, element: usize, component: usize, value: ScalarValue) {
        let scalar = self.scalar;
        let scalar_size = scalar.byte_size();
        let offset = element * self.byte_stride() + component * scalar_size;
        let bytes = match &mut self.data {
            Storage::Owned(bytes) => &mut bytes[offset..offset + scalar_size],
            Storage::Borrowed(_) => panic!("Cannot read into a borrowed buffer"),
        };
        match scalar {
            ScalarType::Int8 => bytes[0] = i8::from_value(value) as u8,
            ScalarType::UInt8 => bytes[0] = u8::from_value(value),
            ScalarType::Int16 => NativeEndian::write_i16(bytes, i16::from_value(value)),
            ScalarType::UInt16 => NativeEndian::write_u16(bytes, u16::from_value(value)),
            ScalarType::Int32 => NativeEndian::write_i32(bytes, i32::from_value(value)),
            ScalarType::UInt32 => NativeEndian::write_u32(bytes, u32::from_value(value)),
            ScalarType::Int64 => NativeEndian::write_i64(bytes, i64::from_value(value)),
            ScalarType::UInt64 => NativeEndian::write_u64(bytes, u64::from_value(value)),
            ScalarType::Float32 => NativeEndian::write_f32(bytes, f32::from_value(value)),
            ScalarType::Float64 => NativeEndian::write_f64(bytes, f64::from_value(value)),
            ScalarType::PackedFloat16 | ScalarType::PackedFloat32 => {
                unreachable!("Packed types never back a buffer")
            }
        }
    }
}

fn read_wire_scalar(reader: &mut PacketReader, scalar: ScalarType) -> WireResult<ScalarValue> {
    Ok(match scalar {
        ScalarType::Int8 => ScalarValue::Signed(i64::from(reader.read_i8()?)),
        ScalarType::UInt8 => ScalarValue::Unsigned(u64::from(reader.read_u8()?)),
        ScalarType::Int16 => ScalarValue::Signed(i64::from(reader.read_i16()?)),
        ScalarType::UInt16 => ScalarValue::Unsigned(u64::from(reader.read_u16()?)),
        ScalarType::Int32 => ScalarValue::Signed(i64::from(reader.read_i32()?)),
        ScalarType::UInt32 => ScalarValue::Unsigned(u64::from(reader.read_u32()?)),
        ScalarType::Int64 => ScalarValue::Signed(reader.read_i64()?),
        ScalarType::UInt64 => ScalarValue::Unsigned(reader.read_u64()?),
        ScalarType::Float32 => ScalarValue::Float(f64::from(reader.read_f32()?)),
        ScalarType::Float64 => ScalarValue::Float(reader.read_f64()?),
        ScalarType::PackedFloat16 | ScalarType::PackedFloat32 => {
            unreachable!("Packed scalars are decoded via their origin and unit")
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{PacketReader, PacketWriter};

    fn finalise(writer: &mut PacketWriter) -> Vec<u8> {
        writer.finalise().unwrap();
        writer.packet_bytes().to_vec()
    }

    #[test]
    fn test_strided_access() {
        // x, y, z, w layout reading only xyz with stride 4.
        let data: Vec<f32> = (0..12).map(|v| v as f32).collect();
        let buffer = DataBuffer::borrow_strided(&data, 3, 4);
        assert_eq!(buffer.count(), 3);
        assert_eq!(buffer.get::<f32>(1, 0), 4.0);
        assert_eq!(buffer.get::<f32>(2, 2), 10.0);
        assert_eq!(buffer.get::<i32>(2, 2), 10);
    }

    #[test]
    fn test_duplicate_packs_dense() {
        let data: Vec<f32> = (0..8).map(|v| v as f32).collect();
        let strided = DataBuffer::borrow_strided(&data, 2, 4);
        let packed = strided.duplicate();
        assert!(packed.is_owned());
        assert_eq!(packed.element_stride(), 2);
        assert_eq!(packed.count(), 2);
        assert_eq!(packed.get::<f32>(1, 1), 5.0);
    }

    #[test]
    fn test_write_read_roundtrip_f32() {
        let data: Vec<[f32; 3]> = (0..10).map(|v| [v as f32, -(v as f32), 0.5 * v as f32]).collect();
        let source = DataBuffer::borrow_vec3(&data);

        let mut writer = PacketWriter::new(4096);
        writer.reset(4, 3);
        let wrote = source.write(&mut writer, 0, 0).unwrap();
        assert_eq!(wrote, 10);
        let bytes = finalise(&mut writer);

        let mut dest = DataBuffer::owned_zeroed(ScalarType::Float32, 10, 3);
        let mut reader = PacketReader::new(&bytes).unwrap();
        let (offset, count) = dest.read_into(&mut reader).unwrap();
        assert_eq!((offset, count), (0, 10));
        for element in 0..10 {
            for component in 0..3 {
                assert_eq!(dest.get::<f32>(element, component), data[element][component]);
            }
        }
    }

    #[test]
    fn test_write_respects_byte_limit() {
        let data: Vec<[f32; 3]> = (0..100).map(|v| [v as f32; 3]).collect();
        let source = DataBuffer::borrow_vec3(&data);

        let mut writer = PacketWriter::new(65536);
        writer.reset(4, 3);
        // 8 header bytes + 12 per element: a 128 byte budget fits 10 elements.
        let wrote = source.write(&mut writer, 0, 128).unwrap();
        assert_eq!(wrote, 10);
    }

    #[test]
    fn test_chunked_writes_tile_the_buffer() {
        let data: Vec<[f32; 3]> = (0..1000).map(|v| [v as f32; 3]).collect();
        let source = DataBuffer::borrow_vec3(&data);

        let mut offset = 0u32;
        let mut chunks = 0;
        while offset < 1000 {
            let mut writer = PacketWriter::new(1024);
            writer.reset(4, 3);
            let wrote = source.write(&mut writer, offset, 0).unwrap();
            assert!(wrote > 0);
            offset += u32::from(wrote);
            chunks += 1;
        }
        assert_eq!(offset, 1000);
        assert!(chunks > 1);
    }

    #[test]
    fn test_packed_roundtrip_within_unit() {
        use rand::Rng;

        // With q = 0.005 an i16 packed value spans ~163 units above the
        // packing origin; keep the samples inside that window.
        let unit = 0.005f64;
        let mut rng = rand::thread_rng();
        let data: Vec<[f32; 3]> = (0..1000)
            .map(|_| {
                [
                    rng.gen_range(-100.0f32..60.0),
                    rng.gen_range(-100.0f32..60.0),
                    rng.gen_range(-100.0f32..60.0),
                ]
            })
            .collect();
        let source = DataBuffer::borrow_vec3(&data);
        let origin = [-100.0f64, -100.0, -100.0];

        let mut offset = 0u32;
        let mut dest = DataBuffer::owned_zeroed(ScalarType::Float32, 1000, 3);
        while offset < 1000 {
            let mut writer = PacketWriter::new(65536);
            writer.reset(4, 3);
            let wrote = source
                .write_packed(&mut writer, offset, 0, unit, Some(&origin))
                .unwrap();
            assert!(wrote > 0);
            let bytes = finalise(&mut writer);
            let mut reader = PacketReader::new(&bytes).unwrap();
            dest.read_into(&mut reader).unwrap();
            offset += u32::from(wrote);
        }

        for element in 0..1000 {
            for component in 0..3 {
                let expect = f64::from(data[element][component]);
                let got = f64::from(dest.get::<f32>(element, component));
                assert!(
                    (expect - got).abs() <= unit,
                    "element {} component {}: {} vs {}",
                    element,
                    component,
                    expect,
                    got
                );
            }
        }
    }

    #[test]
    fn test_packed_overflow() {
        let data = [[10_000.0f32, 0.0, 0.0]];
        let source = DataBuffer::borrow_vec3(&data);
        let origin = [-100.0f64, -100.0, -100.0];

        let mut writer = PacketWriter::new(65536);
        writer.reset(4, 3);
        let result = source.write_packed(&mut writer, 0, 0, 0.005, Some(&origin));
        assert_eq!(result.unwrap_err(), Error::QuantisationOverflow);
        // Nothing was emitted for the failed write.
        assert_eq!(writer.payload_size(), 0);
    }

    #[test]
    fn test_packed_rejects_integer_source() {
        let data = [1u32, 2, 3];
        let source = DataBuffer::borrow(&data, 1);
        let mut writer = PacketWriter::new(1024);
        writer.reset(4, 4);
        assert_eq!(
            source.write_packed(&mut writer, 0, 0, 0.01, None).unwrap_err(),
            Error::TypeMismatch
        );
    }

    #[test]
    fn test_read_type_mismatch() {
        let data = [1.0f32, 2.0, 3.0];
        let source = DataBuffer::borrow(&data, 1);
        let mut writer = PacketWriter::new(1024);
        writer.reset(4, 3);
        source.write(&mut writer, 0, 0).unwrap();
        let bytes = finalise(&mut writer);

        let mut dest = DataBuffer::owned_zeroed(ScalarType::UInt32, 3, 1);
        let mut reader = PacketReader::new(&bytes).unwrap();
        assert_eq!(dest.read_into(&mut reader).unwrap_err(), Error::TypeMismatch);
    }

    #[test]
    fn test_read_component_mismatch() {
        let data = [[1.0f32, 2.0, 3.0]];
        let source = DataBuffer::borrow_vec3(&data);
        let mut writer = PacketWriter::new(1024);
        writer.reset(4, 3);
        source.write(&mut writer, 0, 0).unwrap();
        let bytes = finalise(&mut writer);

        let mut dest = DataBuffer::owned_zeroed(ScalarType::Float32, 3, 2);
        let mut reader = PacketReader::new(&bytes).unwrap();
        assert_eq!(dest.read_into(&mut reader).unwrap_err(), Error::TypeMismatch);
    }

    #[test]
    fn test_integer_index_roundtrip() {
        let indices: Vec<u32> = (0..600).map(|v| v * 3).collect();
        let source = DataBuffer::borrow(&indices, 1);
        let mut writer = PacketWriter::new(65536);
        writer.reset(4, 4);
        let wrote = source.write(&mut writer, 0, 0).unwrap();
        assert_eq!(wrote, 600);
        let bytes = finalise(&mut writer);

        let mut dest = DataBuffer::owned_zeroed(ScalarType::UInt32, 600, 1);
        let mut reader = PacketReader::new(&bytes).unwrap();
        dest.read_into(&mut reader).unwrap();
        assert_eq!(dest.get::<u32>(599, 0), 599 * 3);
    }
}
