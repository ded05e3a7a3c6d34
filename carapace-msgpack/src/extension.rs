//! Extension framing and the reserved timestamp extension.

use crate::error::Error;

/// Extension type code reserved by the format for timestamps.
pub const TIMESTAMP_TYPE_CODE: i8 = -1;

/// Header of an extension token: the application type code and the payload
/// length in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtensionHeader {
    /// Application-assigned type code. Negative codes are reserved by the
    /// format.
    pub type_code: i8,
    /// Payload length in bytes.
    pub length: u32,
}

impl ExtensionHeader {
    /// Construct a header.
    pub const fn new(type_code: i8, length: u32) -> Self {
        Self { type_code, length }
    }
}

const NANOS_PER_SECOND: u32 = 1_000_000_000;

/// A point in time as carried by the reserved `-1` extension: seconds since
/// the Unix epoch plus a sub-second nanosecond component in `[0, 1e9)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    seconds: i64,
    nanos: u32,
}

impl Timestamp {
    /// Build a timestamp; fails when `nanos` is a full second or more.
    pub fn new(seconds: i64, nanos: u32) -> Result<Self, Error> {
        if nanos >= NANOS_PER_SECOND {
            return Err(Error::InvalidTimestamp { length: 0 });
        }
        Ok(Self { seconds, nanos })
    }

    /// Whole seconds since the Unix epoch.
    pub fn seconds(&self) -> i64 {
        self.seconds
    }

    /// Sub-second nanoseconds, always in `[0, 1e9)`.
    pub fn nanos(&self) -> u32 {
        self.nanos
    }

    /// Wire payload length of the most compact representable form: 4, 8, or
    /// 12 bytes.
    pub fn payload_len(&self) -> u32 {
        if self.seconds >= 0 && self.seconds < (1 << 34) {
            if self.nanos == 0 && self.seconds <= u32::MAX as i64 {
                4
            } else {
                8
            }
        } else {
            12
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_most_compact_payload() {
        assert_eq!(Timestamp::new(0, 0).unwrap().payload_len(), 4);
        assert_eq!(Timestamp::new(u32::MAX as i64, 0).unwrap().payload_len(), 4);
        assert_eq!(Timestamp::new(0, 1).unwrap().payload_len(), 8);
        assert_eq!(Timestamp::new((1 << 34) - 1, 0).unwrap().payload_len(), 8);
        assert_eq!(Timestamp::new(1 << 34, 0).unwrap().payload_len(), 12);
        assert_eq!(Timestamp::new(-1, 500).unwrap().payload_len(), 12);
    }

    #[test]
    fn rejects_overflowing_nanos() {
        assert!(Timestamp::new(0, 1_000_000_000).is_err());
    }
}
