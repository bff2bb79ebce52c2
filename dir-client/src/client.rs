//! Directory semantics over a flat key/value store.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tracing::debug;

use crate::error::{Conflict, Error};
use crate::grpc::{GrpcStore, StoreAddr};
use crate::store::{DeleteOptions, GetOptions, PrevExist, SetOptions, Store};
use crate::watch::WatchStream;

/// A hierarchical key/value client.
///
/// `DirClient` turns a [`Store`] into a small filesystem-like API: leaf
/// values, directories, sorted listings and recursive watches. It keeps
/// no local copy of the tree, so every read is a round trip to the
/// store.
///
/// # Missing keys
///
/// Reads and deletes treat an absent key as empty rather than as an
/// error: [`get`](Self::get) returns `""`, [`ls`](Self::ls) returns an
/// empty list and [`del`](Self::del) succeeds. Note that this makes an
/// absent key indistinguishable from one holding the empty string; use
/// [`get_opt`](Self::get_opt) when the difference matters.
///
/// # Example
///
/// ```no_run
/// use dir_client::DirClient;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = DirClient::dial("localhost:50061").await?;
///
///     client.set("/services/web/1", "10.0.0.1:80").await?;
///     assert_eq!(client.ls("/services/web").await?, vec!["/services/web/1"]);
///
///     client.del_dir("/services").await?;
///     assert_eq!(client.get("/services/web/1").await?, "");
///
///     Ok(())
/// }
/// ```
pub struct DirClient<S> {
    store: Arc<S>,
}

impl DirClient<GrpcStore> {
    /// Connects to the store at a single endpoint URI.
    pub async fn dial(addr: impl Into<StoreAddr>) -> Result<Self, Error> {
        Ok(Self::new(GrpcStore::connect(addr).await?))
    }
}

impl<S: Store + 'static> DirClient<S> {
    pub fn new(store: S) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the value at `key`, or `""` if the key does not exist.
    pub async fn get(&self, key: &str) -> Result<String, Error> {
        Ok(self.get_opt(key).await?.unwrap_or_default())
    }

    /// Returns the value at `key`, or `None` if the key does not exist.
    /// Directories have an empty value.
    pub async fn get_opt(&self, key: &str) -> Result<Option<String>, Error> {
        match self.store.get(key, GetOptions::default()).await {
            Ok(response) => Ok(Some(response.node.value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Writes a leaf value, creating missing parent directories.
    pub async fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        self.store.set(key, value, SetOptions::default()).await?;
        Ok(())
    }

    /// Deletes a leaf. Deleting a missing key succeeds.
    pub async fn del(&self, key: &str) -> Result<(), Error> {
        ignore_not_found(self.store.delete(key, DeleteOptions::default()).await)
    }

    /// Deletes a directory and everything beneath it. Deleting a missing
    /// directory succeeds.
    pub async fn del_dir(&self, key: &str) -> Result<(), Error> {
        let options = DeleteOptions {
            dir: true,
            recursive: true,
        };
        ignore_not_found(self.store.delete(key, options).await)
    }

    /// Restarts the expiration countdown of an existing directory.
    ///
    /// Unlike [`set`](Self::set) this never creates anything: a missing
    /// directory is reported as [`Error::NotFound`].
    pub async fn update_dir_with_ttl(&self, key: &str, ttl: Duration) -> Result<(), Error> {
        let options = SetOptions {
            dir: true,
            ttl: Some(ttl),
            prev_exist: PrevExist::Exist,
        };
        self.store.set(key, "", options).await?;
        Ok(())
    }

    /// Full keys of the immediate children of `directory`, sorted.
    pub async fn ls(&self, directory: &str) -> Result<Vec<String>, Error> {
        self.list(directory, false).await
    }

    /// Full keys of everything beneath `directory`, each directory
    /// followed by its own subtree, siblings sorted.
    pub async fn ls_recursive(&self, directory: &str) -> Result<Vec<String>, Error> {
        self.list(directory, true).await
    }

    async fn list(&self, directory: &str, recursive: bool) -> Result<Vec<String>, Error> {
        let options = GetOptions {
            recursive,
            sorted: true,
        };
        match self.store.get(directory, options).await {
            Ok(response) => Ok(response.node.descendant_keys()),
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// Creates an empty directory unless one already exists.
    ///
    /// Fails with [`Error::TypeConflict`] if `directory` holds a value;
    /// the value is left untouched.
    pub async fn mkdir(&self, directory: &str) -> Result<(), Error> {
        match self.store.get(directory, GetOptions::default()).await {
            Ok(response) if response.node.dir => Ok(()),
            Ok(_) => Err(Error::conflict(directory, Conflict::LeafInTheWay)),
            Err(e) if e.is_not_found() => {
                let options = SetOptions {
                    dir: true,
                    ttl: None,
                    prev_exist: PrevExist::Ignore,
                };
                self.store.set(directory, "", options).await?;
                debug!(directory, "created directory");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Streams every change beneath `directory` from now on.
    pub fn watch(&self, directory: &str) -> WatchStream {
        self.watch_from(directory, 0)
    }

    /// Streams every change beneath `directory` committed after
    /// `after_revision`, e.g. the cursor of an earlier watch.
    pub fn watch_from(&self, directory: &str, after_revision: u64) -> WatchStream {
        WatchStream::new(Arc::clone(&self.store), directory.to_string(), after_revision)
    }

    /// Calls `on_change(key, new_value)` for every change beneath
    /// `directory`, in the order the store commits them.
    ///
    /// This runs until the store fails with an error other than an
    /// expired watch history, and then returns that error; it never
    /// returns `Ok`. Run it on a dedicated task.
    pub async fn watch_recursive<F>(&self, directory: &str, mut on_change: F) -> Result<(), Error>
    where
        F: FnMut(&str, &str),
    {
        let mut events = self.watch(directory);
        while let Some(event) = events.next().await {
            let event = event?;
            on_change(&event.key, &event.new_value);
        }
        Err(Error::WatchClosed)
    }

    /// Like [`watch_recursive`](Self::watch_recursive), but returns
    /// `Ok(())` once `shutdown` completes.
    pub async fn watch_recursive_until<F, C>(
        &self,
        directory: &str,
        mut on_change: F,
        shutdown: C,
    ) -> Result<(), Error>
    where
        F: FnMut(&str, &str),
        C: Future<Output = ()>,
    {
        let mut events = self.watch(directory);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => return Ok(()),
                event = events.next() => match event {
                    Some(event) => {
                        let event = event?;
                        on_change(&event.key, &event.new_value);
                    }
                    None => return Err(Error::WatchClosed),
                },
            }
        }
    }
}

fn ignore_not_found<T>(result: Result<T, Error>) -> Result<(), Error> {
    match result {
        Ok(_) => Ok(()),
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(e),
    }
}
