//! [`Store`] over the `dirstore` gRPC service.

use async_trait::async_trait;
use dirstore_types::dirstore::dir_store_client::DirStoreClient;
use futures_util::StreamExt;
use tonic::transport::{Channel, Endpoint};
use tracing::debug;

use crate::error::Error;
use crate::node::Response;
use crate::store::{DeleteOptions, EventStream, GetOptions, SetOptions, Store, WatchOptions};
use crate::wire;

/// A store reached through a single gRPC endpoint.
///
/// Clones share the underlying channel.
#[derive(Clone)]
pub struct GrpcStore {
    client: DirStoreClient<Channel>,
}

impl GrpcStore {
    /// Connects to the store at `addr` (e.g. `"http://localhost:50061"`;
    /// a bare `host:port` is taken as plain HTTP).
    pub async fn connect(addr: impl Into<StoreAddr>) -> Result<Self, Error> {
        let addr = addr.into();
        let endpoint = Endpoint::from_shared(addr.uri())?;
        let channel = endpoint.connect().await?;
        debug!(uri = %addr.uri(), "connected to directory store");

        Ok(Self {
            client: DirStoreClient::new(channel),
        })
    }
}

#[async_trait]
impl Store for GrpcStore {
    async fn get(&self, key: &str, options: GetOptions) -> Result<Response, Error> {
        debug!(key, recursive = options.recursive, "get");
        let mut client = self.client.clone();
        let response = client.get(wire::get_request(key, options)).await?;
        Response::try_from(response.into_inner())
    }

    async fn set(&self, key: &str, value: &str, options: SetOptions) -> Result<Response, Error> {
        debug!(key, dir = options.dir, prev_exist = ?options.prev_exist, "set");
        let mut client = self.client.clone();
        let response = client.set(wire::set_request(key, value, options)).await?;
        Response::try_from(response.into_inner())
    }

    async fn delete(&self, key: &str, options: DeleteOptions) -> Result<Response, Error> {
        debug!(key, dir = options.dir, recursive = options.recursive, "delete");
        let mut client = self.client.clone();
        let response = client.delete(wire::delete_request(key, options)).await?;
        Response::try_from(response.into_inner())
    }

    async fn watch(&self, key: &str, options: WatchOptions) -> Result<EventStream, Error> {
        debug!(key, after_revision = options.after_revision, "watch");
        let mut client = self.client.clone();
        let events = client
            .watch(wire::watch_request(key, options))
            .await?
            .into_inner();

        Ok(Box::pin(events.map(|event| {
            event.map_err(Error::from).and_then(Response::try_from)
        })))
    }
}

/// Store address wrapper for type-safe connection.
#[derive(Clone, Debug)]
pub struct StoreAddr(pub String);

impl StoreAddr {
    pub fn uri(&self) -> String {
        if self.0.contains("://") {
            self.0.clone()
        } else {
            format!("http://{}", self.0)
        }
    }
}

impl From<String> for StoreAddr {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for StoreAddr {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
