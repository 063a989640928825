//! Review workflow for checked-out batch files.
//!
//! A [`ReviewSession`] belongs to one worker. It lists the worker's batch
//! files, keeps one of them open for editing, records every edited cell in
//! an [`EditLog`], and hands finished files to an
//! [`ArchiveMover`](crate::archive::ArchiveMover).

mod config;
mod edit_log;
mod error;
mod session;
mod types;

pub use config::ReviewConfig;
pub use edit_log::{CellRef, EditLog};
pub use error::ReviewError;
pub use session::{CurrentFile, ReviewSession};
pub use types::{ArchiveOutcome, BatchFileEntry, ReviewState, SaveOutcome};
