use std::fmt;
use std::io;

/// Semantic error kinds for the wire codec and connection pipeline. Framing
/// and I/O errors are local to one packet or one connection and never abort
/// the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A read or write would cross the payload or packet boundary.
    Truncated,
    /// Packet bytes did not begin with the packet marker.
    BadMarker,
    /// Unsupported protocol version in the packet header.
    BadVersion,
    /// CRC validation failed. The packet is dropped, the sink stays open.
    BadCrc,
    /// A `DataBuffer` cross-type read without a supported conversion.
    TypeMismatch,
    /// A packed float would lose more than one quantisation unit.
    QuantisationOverflow,
    /// Packet assembly exceeded the payload limit on a path without the
    /// file-stream exception.
    OversizedPacket,
    /// Lookup of an unknown resource key.
    ResourceNotFound,
    /// A sink write failed or the peer closed the connection.
    ConnectionLost,
    /// Operation issued on an inactive or closed endpoint.
    Inadmissible,
    /// The packet writer or reader is in an invalid state from an earlier
    /// failure, or the operation does not fit the current message.
    InvalidPacket,
}

pub type WireResult<T> = Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Error::Truncated => "read or write crosses the payload boundary",
            Error::BadMarker => "missing packet marker",
            Error::BadVersion => "unsupported protocol version",
            Error::BadCrc => "crc mismatch",
            Error::TypeMismatch => "unsupported buffer type conversion",
            Error::QuantisationOverflow => "quantisation overflow",
            Error::OversizedPacket => "packet exceeds the payload limit",
            Error::ResourceNotFound => "unknown resource",
            Error::ConnectionLost => "connection lost",
            Error::Inadmissible => "endpoint inactive or closed",
            Error::InvalidPacket => "packet in an invalid state",
        };
        f.write_str(name)
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    #[inline]
    fn from(_: io::Error) -> Self {
        Error::ConnectionLost
    }
}
