//! Ordered batch assembly.
//!
//! Pure merge step, kept free of I/O so it is testable independently of
//! the polling logic.

use crate::event::{ChangeBatch, ChangeRow};

/// Merge per-table fetch results from one poll cycle into a single batch
/// ordered ascending by sequence value.
///
/// Concatenates in table-iteration order and applies a stable sort, so
/// rows with equal sequence values keep their relative input order. The
/// sequence value is a total order only within one table's own stream;
/// cross-table ties are possible and resolved by input order.
pub fn assemble_batch(per_table: Vec<Vec<ChangeRow>>) -> ChangeBatch {
    let mut batch: ChangeBatch = per_table.into_iter().flatten().collect();
    batch.sort_by(|a, b| a.sequence_value.cmp(&b.sequence_value));
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ChangeOp;
    use crate::position::Lsn;
    use serde_json::Map;

    fn row(table: &str, seq: u64) -> ChangeRow {
        ChangeRow {
            table: table.to_string(),
            operation: ChangeOp::Insert,
            sequence_value: Lsn::from_hex(&format!("{:020x}", seq)).unwrap(),
            commit_lsn: Lsn::min(),
            values: Map::new(),
        }
    }

    fn seqs(batch: &ChangeBatch) -> Vec<String> {
        batch.iter().map(|r| r.sequence_value.to_hex()).collect()
    }

    #[test]
    fn test_single_table_sorted() {
        let batch = assemble_batch(vec![vec![row("t", 130), row("t", 110), row("t", 140)]]);
        assert_eq!(
            seqs(&batch),
            vec![
                format!("{:020x}", 110),
                format!("{:020x}", 130),
                format!("{:020x}", 140)
            ]
        );
    }

    #[test]
    fn test_multi_table_merge() {
        let batch = assemble_batch(vec![
            vec![row("t1", 5), row("t1", 20)],
            vec![row("t2", 10), row("t2", 15)],
        ]);
        let expected: Vec<String> = [5u64, 10, 15, 20]
            .iter()
            .map(|n| format!("{:020x}", n))
            .collect();
        assert_eq!(seqs(&batch), expected);
    }

    #[test]
    fn test_ties_preserve_table_order() {
        let batch = assemble_batch(vec![
            vec![row("t1", 7)],
            vec![row("t2", 7)],
            vec![row("t3", 7)],
        ]);
        let tables: Vec<&str> = batch.iter().map(|r| r.table.as_str()).collect();
        assert_eq!(tables, vec!["t1", "t2", "t3"]);
    }

    #[test]
    fn test_empty_input() {
        assert!(assemble_batch(vec![]).is_empty());
        assert!(assemble_batch(vec![vec![], vec![]]).is_empty());
    }
}
