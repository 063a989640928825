pub mod archive;
pub mod auth;
pub mod batch;
pub mod config;
pub mod fetcher;
pub(crate) mod fsio;
pub mod metrics;
pub mod pairs;
pub mod review;
pub mod testing;

pub use archive::{
    create_archiver, ArchiveCategory, ArchiveConfig, ArchiveError, ArchiveMover, ArchiveReceipt,
    FsArchiver, HttpMirror, MirrorConfig, MirrorError, MirrorStatus, RemoteMirror,
};
pub use auth::{
    create_authenticator, ApiKeyAuthenticator, AuthError, AuthRequest, Authenticator, Identity,
    NoneAuthenticator,
};
pub use batch::{
    create_stores, Allocation, AllocationError, AllocationState, AllocatorConfig,
    AssignmentLedger, BatchAllocator, BatchCounter, BatchNumber, InvalidWorkerId,
    JsonAssignmentLedger, JsonBatchCounter, SqliteBatchStore, StoreError, WorkerId,
};
pub use config::{
    load_config, load_config_from_str, validate_config, AuthConfig, AuthMethod, BatchConfig,
    Config, ConfigError, SanitizedConfig, ServerConfig, StorageBackend, StorageConfig,
};
pub use fetcher::{
    create_fetcher, BatchFetcher, CommandFetcher, FetchError, FetchedBatch, FetcherBackend,
    FetcherConfig, SqliteDatasetFetcher,
};
pub use pairs::{read_pairs, write_pairs, PairColumn, PairRow, PairsError};
pub use review::{
    ArchiveOutcome, BatchFileEntry, CellRef, EditLog, ReviewConfig, ReviewError, ReviewSession,
    ReviewState, SaveOutcome,
};
