//! # SQL Server change source
//!
//! [`ChangeSource`](crate::ChangeSource) implementation backed by the CDC
//! tables that the SQL Server Agent capture job populates. Positions are
//! 10-byte LSNs; changes are read through the
//! `cdc.fn_cdc_get_all_changes_<capture_instance>` table-valued functions
//! and the `sys.fn_cdc_get_max_lsn` / `sys.fn_cdc_increment_lsn` helpers.
//!
//! ## Requirements
//!
//! 1. CDC enabled on the database:
//!    ```sql
//!    EXEC sys.sp_cdc_enable_db;
//!    ```
//! 2. CDC enabled on each watched table:
//!    ```sql
//!    EXEC sys.sp_cdc_enable_table
//!        @source_schema = N'dbo',
//!        @source_name = N'Employee',
//!        @role_name = NULL;
//!    ```
//! 3. SQL Server Agent running (it writes the change tables).
//!
//! ## Example
//!
//! ```rust,ignore
//! use changestream::sqlserver::{SqlServerConfig, SqlServerSource};
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
//! ```

mod client;
mod config;

pub use client::SqlServerSource;
pub use config::{SqlServerConfig, SqlServerConfigBuilder};
