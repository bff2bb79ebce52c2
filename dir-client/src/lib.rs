//! A hierarchical key/value client over a directory store.
//!
//! `dir-client` presents a store of `/`-delimited keys as a small
//! filesystem: leaf values, directories, sorted listings, recursive
//! deletes, directories with a time to live and recursive watches that
//! resume from where they left off.
//!
//! # Features
//!
//! - [`DirClient`]: the async facade, generic over any [`Store`]
//! - [`GrpcStore`]: a store reached over the `dirstore` gRPC service
//! - [`MemStore`]: an in-process store with the same semantics, for tests
//! - [`WatchStream`]: a change stream that survives expired history
//! - [`blocking::DirClient`]: the same facade for synchronous callers
//!
//! # Example
//!
//! ```no_run
//! use dir_client::DirClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = DirClient::dial("localhost:50061").await?;
//!
//!     client.mkdir("/workers").await?;
//!     client.set("/workers/1", "idle").await?;
//!
//!     client
//!         .watch_recursive("/workers", |key, value| {
//!             println!("{key} is now {value:?}");
//!         })
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod blocking;
mod client;
mod error;
mod grpc;
mod mem;
mod node;
mod store;
mod watch;
pub mod wire;

pub use client::DirClient;
pub use error::{Conflict, Error};
pub use grpc::{GrpcStore, StoreAddr};
pub use mem::{DEFAULT_HISTORY_WINDOW, MemStore};
pub use node::{Action, ChangeEvent, Node, Response};
pub use store::{
    DeleteOptions, EventStream, GetOptions, PrevExist, SetOptions, Store, WatchOptions,
};
pub use watch::WatchStream;
