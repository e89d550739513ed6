//! Consumer loop: drain the queue into a text sink.

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::info;

use crate::error::Result;
use crate::queue::BatchReceiver;

/// Drains change batches from the queue and renders each as indented JSON
/// to a line-oriented sink, one batch per emission followed by a blank
/// separator line. Performs no filtering, merging, or retry of its own.
pub struct BatchConsumer<W> {
    sink: W,
}

impl<W: AsyncWrite + Unpin + Send> BatchConsumer<W> {
    /// Create a consumer writing to the given sink.
    pub fn new(sink: W) -> Self {
        Self { sink }
    }

    /// Receive batches until the queue is exhausted and completion is
    /// marked, then terminate normally.
    pub async fn run(mut self, mut receiver: BatchReceiver) -> Result<()> {
        info!("starting to consume change batches");
        let mut batches = 0u64;
        while let Some(batch) = receiver.recv().await {
            let rendered = serde_json::to_string_pretty(&batch)?;
            self.sink.write_all(rendered.as_bytes()).await?;
            self.sink.write_all(b"\n\n").await?;
            self.sink.flush().await?;
            batches += 1;
        }
        info!("queue completed, consumer exiting after {} batches", batches);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ChangeOp, ChangeRow};
    use crate::position::Lsn;
    use crate::queue::{change_queue, QueueConfig};
    use serde_json::json;

    fn row(op: ChangeOp, seq: u64) -> ChangeRow {
        let mut values = serde_json::Map::new();
        values.insert("id".to_string(), json!(seq));
        ChangeRow {
            table: "dbo_Employee".to_string(),
            operation: op,
            sequence_value: Lsn::from_hex(&format!("{:020x}", seq)).unwrap(),
            commit_lsn: Lsn::min(),
            values,
        }
    }

    #[tokio::test]
    async fn test_renders_batches_with_separator() {
        let (tx, rx) = change_queue(QueueConfig::default());
        tx.send(vec![row(ChangeOp::Insert, 1), row(ChangeOp::UpdateBefore, 2)])
            .await
            .unwrap();
        tx.send(vec![row(ChangeOp::Delete, 3)]).await.unwrap();
        tx.complete();

        let mut out = Vec::new();
        BatchConsumer::new(&mut out).run(rx).await.unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("\"operation\": \"insert\""));
        assert!(text.contains("\"operation\": \"update_before\""));
        assert!(text.contains("\"operation\": \"delete\""));
        // One blank separator line after each batch
        assert_eq!(text.matches("\n\n").count(), 2);
        assert!(text.ends_with("\n\n"));
    }

    #[tokio::test]
    async fn test_exits_on_empty_completed_queue() {
        let (tx, rx) = change_queue(QueueConfig::default());
        tx.complete();

        let mut out = Vec::new();
        BatchConsumer::new(&mut out).run(rx).await.unwrap();
        assert!(out.is_empty());
    }
}
