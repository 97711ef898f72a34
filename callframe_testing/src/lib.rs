//! Utilities for exercising [`InboundCall`](callframe::call::InboundCall)
//! and the `callframe` reactor in tests.
//!
//! [`RecordingConnection`] keeps answered calls in memory so their response
//! bytes can be inspected. [`drive_with_frames`] runs a handler behind
//! [`serve_connection`](callframe::server::serve_connection) on an
//! in-memory duplex stream and returns every byte written back.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use callframe::echo::EchoService;
//! use callframe_testing::{drive_with_frames, echo_request, split_responses};
//!
//! # async fn example() -> std::io::Result<()> {
//! let bytes = drive_with_frames(Arc::new(EchoService), vec![echo_request(1, b"hi")]).await?;
//! assert_eq!(split_responses(&bytes).len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod drive;
pub mod frames;
pub mod logging;
pub mod metrics;

pub use connection::{RecordingConnection, parse_with};
pub use drive::{drive_with_frames, drive_with_frames_config, split_responses};
pub use frames::{echo_request, request_frame};
pub use logging::{LoggerHandle, logger};
pub use metrics::{MetricEntry, counter_value, histogram_samples, recorder};
