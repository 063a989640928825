//! Testing utilities and mock implementations.
//!
//! This module provides mock implementations of the external service traits,
//! allowing the allocation and review workflows to be tested without a real
//! data source or remote store.
//!
//! # Example
//!
//! ```rust,ignore
//! use curator_core::testing::{MockArchiver, MockFetcher};
//! use curator_core::FetchError;
//!
//! let fetcher = MockFetcher::new("fetched_data", 3);
//! let archiver = MockArchiver::new("archive");
//!
//! // Make the next fetch fail
//! fetcher.set_next_error(FetchError::Timeout { timeout_secs: 1 }).await;
//! ```

mod mock_archiver;
mod mock_counter;
mod mock_fetcher;
mod mock_mirror;

pub use mock_archiver::{MockArchiver, RecordedArchive};
pub use mock_counter::MockCounter;
pub use mock_fetcher::{MockFetcher, RecordedFetch};
pub use mock_mirror::{MockMirror, RecordedUpload};
