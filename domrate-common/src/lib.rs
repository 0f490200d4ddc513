//! Shared types, wire protocol, error catalog, configuration and persistence
//! primitives for the domain rating pipeline (coordinator, scanner, reviewer).

pub mod config;
pub mod dispatch_client;
pub mod dns;
pub mod errors;
pub mod logging;
pub mod notify_client;
pub mod persistence;
pub mod pidfile;
pub mod protocol;
pub mod queue;
pub mod session;
pub mod shutdown;
pub mod types;
pub mod wire;

pub use dispatch_client::{DispatchClient, Pulled};
pub use errors::{DomRateError, ErrorCategory, ErrorEntry, ModuleError};
pub use notify_client::send_notification;
pub use persistence::{JsonlPersistence, Persistence, PersistenceError};
pub use queue::{QueueStore, SnapshotValidator};
pub use session::{SessionRegistry, WorkerKind, WorkerSession};
pub use shutdown::Shutdown;
pub use wire::{WireError, read_message, write_message};
pub use types::{
    Access, Domain, ErrorRecord, HasDomainContext, ModuleRecord, ModuleVersion, Request,
    RequestState, RetryTask, ScanTask, ReviewTask,
};
