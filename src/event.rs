//! Change row and batch representation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::position::Lsn;

/// Operation kind of a captured row change.
///
/// Mirrors the CDC `__$operation` codes. With the before-image row filter,
/// updates appear only as [`ChangeOp::UpdateBefore`] rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    /// Row deleted (operation code 1)
    Delete,
    /// Row inserted (operation code 2)
    Insert,
    /// Pre-change image of an update (operation code 3)
    UpdateBefore,
    /// Post-change image of an update (operation code 4)
    UpdateAfter,
}

impl ChangeOp {
    /// Convert a CDC `__$operation` code; returns None for unknown codes.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::Delete),
            2 => Some(Self::Insert),
            3 => Some(Self::UpdateBefore),
            4 => Some(Self::UpdateAfter),
            _ => None,
        }
    }

    /// The CDC `__$operation` code for this kind.
    pub fn code(&self) -> i32 {
        match self {
            Self::Delete => 1,
            Self::Insert => 2,
            Self::UpdateBefore => 3,
            Self::UpdateAfter => 4,
        }
    }
}

impl std::fmt::Display for ChangeOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeOp::Delete => write!(f, "delete"),
            ChangeOp::Insert => write!(f, "insert"),
            ChangeOp::UpdateBefore => write!(f, "update_before"),
            ChangeOp::UpdateAfter => write!(f, "update_after"),
        }
    }
}

/// One captured row mutation.
///
/// The sequence value (`__$seqval`) is unique and monotonically increasing
/// within the source table's change stream; it defines the ordering inside
/// a [`ChangeBatch`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRow {
    /// Capture instance that produced this row (e.g. "dbo_Employee")
    pub table: String,
    /// Operation kind
    pub operation: ChangeOp,
    /// Change sequence value within the transaction (`__$seqval`)
    pub sequence_value: Lsn,
    /// Commit LSN of the transaction (`__$start_lsn`)
    pub commit_lsn: Lsn,
    /// Column values for the row image this operation carries
    pub values: Map<String, Value>,
}

/// An ordered sequence of change rows produced by one poll cycle,
/// ascending by sequence value. Empty batches are never emitted.
pub type ChangeBatch = Vec<ChangeRow>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_op_codes() {
        assert_eq!(ChangeOp::from_code(1), Some(ChangeOp::Delete));
        assert_eq!(ChangeOp::from_code(2), Some(ChangeOp::Insert));
        assert_eq!(ChangeOp::from_code(3), Some(ChangeOp::UpdateBefore));
        assert_eq!(ChangeOp::from_code(4), Some(ChangeOp::UpdateAfter));
        assert_eq!(ChangeOp::from_code(0), None);
        assert_eq!(ChangeOp::from_code(5), None);

        for code in 1..=4 {
            assert_eq!(ChangeOp::from_code(code).unwrap().code(), code);
        }
    }

    #[test]
    fn test_op_serializes_by_name() {
        assert_eq!(
            serde_json::to_string(&ChangeOp::UpdateBefore).unwrap(),
            "\"update_before\""
        );
        assert_eq!(serde_json::to_string(&ChangeOp::Insert).unwrap(), "\"insert\"");
    }

    #[test]
    fn test_row_rendering() {
        let mut values = Map::new();
        values.insert("id".to_string(), json!(42));
        values.insert("name".to_string(), json!("Alice"));

        let row = ChangeRow {
            table: "dbo_Employee".to_string(),
            operation: ChangeOp::Insert,
            sequence_value: Lsn::from_hex("00000001000000010001").unwrap(),
            commit_lsn: Lsn::from_hex("00000001000000010000").unwrap(),
            values,
        };

        let json = serde_json::to_string_pretty(&row).unwrap();
        assert!(json.contains("\"operation\": \"insert\""));
        assert!(json.contains("\"table\": \"dbo_Employee\""));
        assert!(json.contains("\"sequence_value\": \"00000001000000010001\""));
        assert!(json.contains("\"name\": \"Alice\""));
    }
}
