//! Change source capability consumed by the poll loop.

use async_trait::async_trait;

use crate::error::Result;
use crate::event::ChangeRow;
use crate::position::Lsn;

/// Row filter mode for change fetches.
///
/// Maps to the `row_filter_option` argument of
/// `cdc.fn_cdc_get_all_changes_<capture_instance>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowFilter {
    /// All changes; updates appear as a before/after row pair
    All,
    /// All changes; updates collapsed to the before image only
    AllUpdateOld,
}

impl RowFilter {
    /// The T-SQL filter option string.
    pub fn as_sql(&self) -> &'static str {
        match self {
            RowFilter::All => "all",
            RowFilter::AllUpdateOld => "all update old",
        }
    }
}

/// Abstract change-capture query capability.
///
/// The poll loop only consumes these three operations; the query engine
/// behind them (connections, T-SQL, row decoding) is an external
/// collaborator. All three may fail with a source-unavailable or query
/// error, which the poll loop treats per its retry policy.
#[async_trait]
pub trait ChangeSource: Send {
    /// Current maximum position in the change log.
    async fn current_max_position(&mut self) -> Result<Lsn>;

    /// All change rows for `table` in the inclusive range `[low, high]`,
    /// in per-table stream order.
    async fn fetch_changes(
        &mut self,
        table: &str,
        low: &Lsn,
        high: &Lsn,
        filter: RowFilter,
    ) -> Result<Vec<ChangeRow>>;

    /// The position immediately following `pos`.
    async fn next_position(&mut self, pos: &Lsn) -> Result<Lsn>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_filter_sql() {
        assert_eq!(RowFilter::All.as_sql(), "all");
        assert_eq!(RowFilter::AllUpdateOld.as_sql(), "all update old");
    }
}
