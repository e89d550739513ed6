//! # changestream - poll-based change data capture streaming
//!
//! Continuously observes a CDC-enabled SQL Server database, incrementally
//! discovers row-level changes since the last observed log position, and
//! delivers them globally ordered to a downstream consumer.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌───────────────────────────┐   ┌──────────────┐
//! │ SQL Server │   │ ChangePoller              │   │ BatchConsumer│
//! │ CDC tables │──▶│  watermark ─▶ fetch ─▶    │──▶│  render to   │
//! │            │   │  assemble ─▶ queue        │   │  text sink   │
//! └────────────┘   └───────────────────────────┘   └──────────────┘
//!                        change source            bounded queue with
//!                        behind ChangeSource      completion signal
//! ```
//!
//! The poll loop owns the watermark: each cycle it measures the source's
//! current maximum position, fetches all per-table changes between the
//! watermark and that high bound, merges them into a single batch ordered
//! by sequence value, hands the batch to the queue, and advances the
//! watermark to the position after the high bound. Cancellation and
//! unrecoverable failures both end by marking the queue complete, so the
//! consumer always drains delivered batches before exiting.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # #[cfg(feature = "sqlserver")]
//! # async fn example() -> anyhow::Result<()> {
//! use changestream::sqlserver::{SqlServerConfig, SqlServerSource};
//! use changestream::{BatchConsumer, ChangePoller, PollerConfig};
//!
//! let config = SqlServerConfig::builder()
//!     .host("localhost")
//!     .port(1433)
//!     .username("sa")
//!     .password("YourPassword123!")
//!     .database("mydb")
//!     .build()?;
//!
//! let mut source = SqlServerSource::connect(&config).await?;
//! source.verify_cdc_enabled().await?;
//!
//! let poll_config = PollerConfig::builder()
//!     .table("dbo_Employee")
//!     .poll_interval_ms(1000)
//!     .build()?;
//!
//! let mut poller = ChangePoller::new(source, poll_config);
//! let receiver = poller.take_batch_receiver().expect("batch receiver");
//! poller.start().await?;
//!
//! BatchConsumer::new(tokio::io::stdout()).run(receiver).await?;
//! poller.join().await?;
//! # Ok(())
//! # }
//! ```

mod assemble;
mod consumer;
mod error;
mod event;
mod metrics;
mod poller;
mod position;
mod queue;
mod retry;
mod source;

pub use assemble::assemble_batch;
pub use consumer::BatchConsumer;
pub use error::{ChangeStreamError, Result};
pub use event::{ChangeBatch, ChangeOp, ChangeRow};
pub use metrics::{PollerMetrics, PollerMetricsSnapshot};
pub use poller::{ChangePoller, PollerConfig, PollerConfigBuilder};
pub use position::Lsn;
pub use queue::{change_queue, BatchReceiver, BatchSender, OverflowPolicy, QueueConfig, SendError};
pub use retry::RetryPolicy;
pub use source::{ChangeSource, RowFilter};

// SQL Server change source - feature-gated
#[cfg(feature = "sqlserver")]
pub mod sqlserver;
