//! Durable client-side state.
//!
//! The only thing that must survive a full browser hand-off is the record of
//! the connect flow in progress.

mod pending;

pub use pending::{
    FilePendingStore, MemoryPendingStore, PendingConnect, PendingConnectStore, PendingStoreError,
    Result,
};
