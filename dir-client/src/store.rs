//! The capability a directory store has to offer.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::Stream;

use crate::error::Error;
use crate::node::Response;

/// Changes delivered by [`Store::watch`], in revision order.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<Response, Error>> + Send>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GetOptions {
    /// Return the whole subtree instead of the immediate children.
    pub recursive: bool,
    /// Order children by key.
    pub sorted: bool,
}

/// Existence precondition for [`Store::set`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PrevExist {
    #[default]
    Ignore,
    Exist,
    NotExist,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    pub dir: bool,
    pub ttl: Option<Duration>,
    pub prev_exist: PrevExist,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    pub dir: bool,
    pub recursive: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchOptions {
    pub recursive: bool,
    /// Only changes committed after this revision are delivered. Zero
    /// means "from the current revision".
    pub after_revision: u64,
}

/// Request/response access to a hierarchical key/value store.
///
/// Absent keys surface as [`Error::NotFound`]; watches that ask for
/// revisions the store no longer retains fail with
/// [`Error::HistoryExpired`].
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, key: &str, options: GetOptions) -> Result<Response, Error>;

    async fn set(&self, key: &str, value: &str, options: SetOptions) -> Result<Response, Error>;

    async fn delete(&self, key: &str, options: DeleteOptions) -> Result<Response, Error>;

    async fn watch(&self, key: &str, options: WatchOptions) -> Result<EventStream, Error>;
}

#[async_trait]
impl<S: Store + ?Sized> Store for Arc<S> {
    async fn get(&self, key: &str, options: GetOptions) -> Result<Response, Error> {
        (**self).get(key, options).await
    }

    async fn set(&self, key: &str, value: &str, options: SetOptions) -> Result<Response, Error> {
        (**self).set(key, value, options).await
    }

    async fn delete(&self, key: &str, options: DeleteOptions) -> Result<Response, Error> {
        (**self).delete(key, options).await
    }

    async fn watch(&self, key: &str, options: WatchOptions) -> Result<EventStream, Error> {
        (**self).watch(key, options).await
    }
}
