//! Domain types and models

pub mod sync;

pub use sync::{
    ConnectionKind, EntityKind, Priority, RequestMethod, SyncItem, SyncOperation, SyncRequest,
    SyncState, SyncStatus,
};
