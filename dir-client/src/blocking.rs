//! A synchronous [`DirClient`](crate::DirClient).
//!
//! Each call drives the async client to completion on a runtime owned by
//! the client, so this must not be used from within an async context.

use std::time::Duration;

use futures_util::StreamExt;
use tokio::runtime::Runtime;

use crate::error::Error;
use crate::grpc::{GrpcStore, StoreAddr};
use crate::node::ChangeEvent;
use crate::store::Store;
use crate::watch::WatchStream;

pub struct DirClient<S> {
    inner: crate::DirClient<S>,
    rt: Runtime,
}

impl DirClient<GrpcStore> {
    pub fn dial(addr: impl Into<StoreAddr>) -> Result<Self, Error> {
        let rt = Runtime::new()?;
        let inner = rt.block_on(crate::DirClient::dial(addr))?;
        Ok(Self { inner, rt })
    }
}

impl<S: Store + 'static> DirClient<S> {
    pub fn new(store: S) -> Result<Self, Error> {
        Ok(Self {
            inner: crate::DirClient::new(store),
            rt: Runtime::new()?,
        })
    }

    pub fn store(&self) -> &S {
        self.inner.store()
    }

    /// See [`crate::DirClient::get`]: a missing key reads as `""`.
    pub fn get(&self, key: &str) -> Result<String, Error> {
        self.rt.block_on(self.inner.get(key))
    }

    pub fn get_opt(&self, key: &str) -> Result<Option<String>, Error> {
        self.rt.block_on(self.inner.get_opt(key))
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        self.rt.block_on(self.inner.set(key, value))
    }

    pub fn del(&self, key: &str) -> Result<(), Error> {
        self.rt.block_on(self.inner.del(key))
    }

    pub fn del_dir(&self, key: &str) -> Result<(), Error> {
        self.rt.block_on(self.inner.del_dir(key))
    }

    pub fn update_dir_with_ttl(&self, key: &str, ttl: Duration) -> Result<(), Error> {
        self.rt.block_on(self.inner.update_dir_with_ttl(key, ttl))
    }

    pub fn ls(&self, directory: &str) -> Result<Vec<String>, Error> {
        self.rt.block_on(self.inner.ls(directory))
    }

    pub fn ls_recursive(&self, directory: &str) -> Result<Vec<String>, Error> {
        self.rt.block_on(self.inner.ls_recursive(directory))
    }

    pub fn mkdir(&self, directory: &str) -> Result<(), Error> {
        self.rt.block_on(self.inner.mkdir(directory))
    }

    /// Blocks the calling thread, calling `on_change(key, new_value)` for
    /// every change beneath `directory`. Only returns on a store error.
    pub fn watch_recursive<F>(&self, directory: &str, on_change: F) -> Result<(), Error>
    where
        F: FnMut(&str, &str),
    {
        self.rt.block_on(self.inner.watch_recursive(directory, on_change))
    }

    /// Iterates over changes beneath `directory`; each `next` blocks
    /// until the store reports one.
    pub fn watch(&self, directory: &str) -> WatchIter<'_> {
        WatchIter {
            rt: &self.rt,
            events: self.inner.watch(directory),
        }
    }

    pub fn watch_from(&self, directory: &str, after_revision: u64) -> WatchIter<'_> {
        WatchIter {
            rt: &self.rt,
            events: self.inner.watch_from(directory, after_revision),
        }
    }
}

/// Blocking iterator over a [`WatchStream`].
pub struct WatchIter<'a> {
    rt: &'a Runtime,
    events: WatchStream,
}

impl WatchIter<'_> {
    pub fn cursor(&self) -> u64 {
        self.events.cursor()
    }
}

impl Iterator for WatchIter<'_> {
    type Item = Result<ChangeEvent, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.rt.block_on(self.events.next())
    }
}
