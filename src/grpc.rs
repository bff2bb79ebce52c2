use std::pin::Pin;
use std::sync::Arc;

use dir_client::{wire, DeleteOptions, GetOptions, SetOptions, Store, WatchOptions};
use dirstore_types::dirstore::dir_store_server::{DirStore, DirStoreServer};
use dirstore_types::dirstore::{
    DeleteRequest, GetRequest, NodeResponse, SetRequest, WatchEvent, WatchRequest,
};
use futures_util::stream::{Stream, StreamExt};
use tonic::{Request, Response, Status};
use tracing::debug;

/// Serves any [`Store`] as the `dirstore.DirStore` gRPC service.
pub struct DirStoreService<S> {
    store: Arc<S>,
}

impl<S> DirStoreService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

type WatchStream = Pin<Box<dyn Stream<Item = Result<WatchEvent, Status>> + Send>>;

#[tonic::async_trait]
impl<S: Store + 'static> DirStore for DirStoreService<S> {
    type WatchStream = WatchStream;

    async fn get(&self, request: Request<GetRequest>) -> Result<Response<NodeResponse>, Status> {
        let req = request.into_inner();
        debug!(key = %req.key, recursive = req.recursive, "get");

        let response = self
            .store
            .get(&req.key, GetOptions::from(&req))
            .await
            .map_err(|e| wire::to_status(&e))?;
        Ok(Response::new(response.into()))
    }

    async fn set(&self, request: Request<SetRequest>) -> Result<Response<NodeResponse>, Status> {
        let req = request.into_inner();
        debug!(key = %req.key, dir = req.dir, "set");

        let response = self
            .store
            .set(&req.key, &req.value, SetOptions::from(&req))
            .await
            .map_err(|e| wire::to_status(&e))?;
        Ok(Response::new(response.into()))
    }

    async fn delete(
        &self,
        request: Request<DeleteRequest>,
    ) -> Result<Response<NodeResponse>, Status> {
        let req = request.into_inner();
        debug!(key = %req.key, dir = req.dir, recursive = req.recursive, "delete");

        let response = self
            .store
            .delete(&req.key, DeleteOptions::from(&req))
            .await
            .map_err(|e| wire::to_status(&e))?;
        Ok(Response::new(response.into()))
    }

    async fn watch(
        &self,
        request: Request<WatchRequest>,
    ) -> Result<Response<Self::WatchStream>, Status> {
        let req = request.into_inner();
        debug!(key = %req.key, after_revision = req.after_revision, "watch");

        let events = self
            .store
            .watch(&req.key, WatchOptions::from(&req))
            .await
            .map_err(|e| wire::to_status(&e))?;

        let output = async_stream::stream! {
            let mut events = events;
            while let Some(event) = events.next().await {
                match event {
                    Ok(event) => {
                        yield Ok(WatchEvent::from(event));
                    }
                    Err(e) => {
                        yield Err(wire::to_status(&e));
                        break;
                    }
                }
            }
        };

        Ok(Response::new(Box::pin(output)))
    }
}

pub fn create_server<S: Store + 'static>(store: S) -> DirStoreServer<DirStoreService<S>> {
    DirStoreServer::new(DirStoreService::new(Arc::new(store)))
}
