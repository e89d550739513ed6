//! Log sequence numbers.
//!
//! SQL Server identifies positions in the change log with 10-byte binary
//! LSNs. The same type covers both the poll watermark and the per-row
//! `__$seqval` sequence value, which share the format and ordering.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ChangeStreamError;

/// LSN (Log Sequence Number) for SQL Server
///
/// A 10-byte binary token consisting of:
/// - VLF sequence number (4 bytes)
/// - Log block offset (4 bytes)
/// - Slot number (2 bytes)
///
/// Byte-wise comparison matches SQL Server's LSN ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Lsn {
    /// Raw LSN bytes (10 bytes)
    pub bytes: [u8; 10],
}

impl Lsn {
    /// Create a new LSN from bytes
    pub fn new(bytes: [u8; 10]) -> Self {
        Self { bytes }
    }

    /// Create an LSN from hex string (20 characters)
    pub fn from_hex(hex: &str) -> Result<Self, ChangeStreamError> {
        if hex.len() != 20 {
            return Err(ChangeStreamError::InvalidLsn(format!(
                "LSN hex must be 20 characters, got {}",
                hex.len()
            )));
        }
        let bytes = hex::decode(hex)
            .map_err(|e| ChangeStreamError::InvalidLsn(format!("Invalid hex: {}", e)))?;
        let arr: [u8; 10] = bytes
            .try_into()
            .map_err(|_| ChangeStreamError::InvalidLsn("Invalid LSN length".to_string()))?;
        Ok(Self::new(arr))
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Create minimum LSN (all zeros)
    pub fn min() -> Self {
        Self::new([0u8; 10])
    }

    /// Create maximum LSN (all ones)
    pub fn max() -> Self {
        Self::new([0xFF; 10])
    }

    /// Check if this is the minimum LSN
    pub fn is_min(&self) -> bool {
        self.bytes.iter().all(|&b| b == 0)
    }
}

impl std::fmt::Display for Lsn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Format as SQL Server style: VLF:Offset:Slot
        let vlf = u32::from_be_bytes([self.bytes[0], self.bytes[1], self.bytes[2], self.bytes[3]]);
        let offset =
            u32::from_be_bytes([self.bytes[4], self.bytes[5], self.bytes[6], self.bytes[7]]);
        let slot = u16::from_be_bytes([self.bytes[8], self.bytes[9]]);
        write!(f, "{:08X}:{:08X}:{:04X}", vlf, offset, slot)
    }
}

// Serialized as a hex string so change rows render readably.
impl Serialize for Lsn {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Lsn {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        Lsn::from_hex(&hex).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_round_trip() {
        let lsn = Lsn::from_hex("00000001000000010001").unwrap();
        assert_eq!(lsn.to_hex(), "00000001000000010001");
    }

    #[test]
    fn test_invalid_hex() {
        assert!(Lsn::from_hex("0001").is_err());
        assert!(Lsn::from_hex("zzzzzzzzzzzzzzzzzzzz").is_err());
    }

    #[test]
    fn test_ordering() {
        let lsn1 = Lsn::from_hex("00000001000000010001").unwrap();
        let lsn2 = Lsn::from_hex("00000001000000010002").unwrap();
        let lsn3 = Lsn::from_hex("00000002000000000000").unwrap();
        assert!(lsn1 < lsn2);
        assert!(lsn2 < lsn3);
        assert!(Lsn::min() < lsn1);
        assert!(lsn3 < Lsn::max());
    }

    #[test]
    fn test_min() {
        assert!(Lsn::min().is_min());
        assert!(!Lsn::max().is_min());
    }

    #[test]
    fn test_display_format() {
        let lsn = Lsn::from_hex("0000002a000001f00003").unwrap();
        assert_eq!(format!("{}", lsn), "0000002A:000001F0:0003");
    }

    #[test]
    fn test_serde_as_hex_string() {
        let lsn = Lsn::from_hex("00000001000000010001").unwrap();
        let json = serde_json::to_string(&lsn).unwrap();
        assert_eq!(json, "\"00000001000000010001\"");

        let parsed: Lsn = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, lsn);
    }
}
