//! Conversions between the store model and the `dirstore` wire types.
//!
//! Store errors travel as a [`tonic::Status`] carrying a numeric
//! `dirstore-error-code` entry in its metadata, so both ends can rebuild
//! the exact [`Error`] variant instead of matching on messages.

use std::time::Duration;

use chrono::DateTime;
use dirstore_types::dirstore as pb;
use tonic::Status;
use tonic::metadata::{Binary, MetadataMap, MetadataValue};

use crate::error::{Conflict, Error};
use crate::node::{Action, Node, Response};
use crate::store::{DeleteOptions, GetOptions, PrevExist, SetOptions, WatchOptions};

const ERROR_CODE: &str = "dirstore-error-code";
const ERROR_KEY: &str = "dirstore-key-bin";
const REQUESTED_REVISION: &str = "dirstore-requested-revision";
const COMPACTED_REVISION: &str = "dirstore-compacted-revision";
const CURRENT_REVISION: &str = "dirstore-current-revision";

const KEY_NOT_FOUND: u64 = 100;
const NOT_A_FILE: u64 = 102;
const NOT_A_DIRECTORY: u64 = 104;
const NODE_EXISTS: u64 = 105;
const ROOT_READ_ONLY: u64 = 107;
const DIR_NOT_EMPTY: u64 = 108;
const HISTORY_EXPIRED: u64 = 401;

/// Encodes a store error for the wire.
pub fn to_status(err: &Error) -> Status {
    let (mut status, code, key) = match err {
        Error::Status(status) => return status.clone(),
        Error::NotFound { key } => (Status::not_found(err.to_string()), KEY_NOT_FOUND, Some(key)),
        Error::TypeConflict { key, conflict } => {
            let code = match conflict {
                Conflict::NotADirectory => NOT_A_DIRECTORY,
                Conflict::NotAFile | Conflict::LeafInTheWay => NOT_A_FILE,
            };
            (Status::failed_precondition(err.to_string()), code, Some(key))
        }
        Error::NodeExists { key } => (Status::already_exists(err.to_string()), NODE_EXISTS, Some(key)),
        Error::DirNotEmpty { key } => {
            (Status::failed_precondition(err.to_string()), DIR_NOT_EMPTY, Some(key))
        }
        Error::RootReadOnly => (Status::failed_precondition(err.to_string()), ROOT_READ_ONLY, None),
        Error::HistoryExpired {
            requested,
            compacted,
            current,
        } => {
            let mut status = Status::out_of_range(err.to_string());
            insert_number(status.metadata_mut(), REQUESTED_REVISION, *requested);
            insert_number(status.metadata_mut(), COMPACTED_REVISION, *compacted);
            insert_number(status.metadata_mut(), CURRENT_REVISION, *current);
            (status, HISTORY_EXPIRED, None)
        }
        other => return Status::internal(other.to_string()),
    };

    insert_number(status.metadata_mut(), ERROR_CODE, code);
    if let Some(key) = key {
        status
            .metadata_mut()
            .insert_bin(ERROR_KEY, MetadataValue::<Binary>::from_bytes(key.as_bytes()));
    }
    status
}

impl From<Status> for Error {
    fn from(status: Status) -> Self {
        let metadata = status.metadata();
        let code = number(metadata, ERROR_CODE);
        let requested = number(metadata, REQUESTED_REVISION).unwrap_or_default();
        let compacted = number(metadata, COMPACTED_REVISION).unwrap_or_default();
        let current = number(metadata, CURRENT_REVISION).unwrap_or_default();
        let key = metadata
            .get_bin(ERROR_KEY)
            .and_then(|value| value.to_bytes().ok())
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default();

        match code {
            Some(KEY_NOT_FOUND) => Error::NotFound { key },
            Some(NOT_A_FILE) => Error::conflict(key, Conflict::NotAFile),
            Some(NOT_A_DIRECTORY) => Error::conflict(key, Conflict::NotADirectory),
            Some(NODE_EXISTS) => Error::NodeExists { key },
            Some(ROOT_READ_ONLY) => Error::RootReadOnly,
            Some(DIR_NOT_EMPTY) => Error::DirNotEmpty { key },
            Some(HISTORY_EXPIRED) => Error::HistoryExpired {
                requested,
                compacted,
                current,
            },
            _ => Error::Status(status),
        }
    }
}

fn insert_number(metadata: &mut MetadataMap, name: &'static str, value: u64) {
    if let Ok(value) = value.to_string().parse() {
        metadata.insert(name, value);
    }
}

fn number(metadata: &MetadataMap, name: &str) -> Option<u64> {
    metadata.get(name)?.to_str().ok()?.parse().ok()
}

impl From<pb::Node> for Node {
    fn from(node: pb::Node) -> Self {
        Self {
            key: node.key,
            value: node.value,
            dir: node.dir,
            nodes: node.nodes.into_iter().map(Node::from).collect(),
            created_revision: node.created_revision,
            modified_revision: node.modified_revision,
            ttl: node.ttl_seconds,
            expiration: node.expiration_millis.and_then(DateTime::from_timestamp_millis),
        }
    }
}

impl From<Node> for pb::Node {
    fn from(node: Node) -> Self {
        Self {
            key: node.key,
            value: node.value,
            dir: node.dir,
            nodes: node.nodes.into_iter().map(pb::Node::from).collect(),
            created_revision: node.created_revision,
            modified_revision: node.modified_revision,
            ttl_seconds: node.ttl,
            expiration_millis: node.expiration.map(|at| at.timestamp_millis()),
        }
    }
}

impl From<pb::Action> for Action {
    fn from(action: pb::Action) -> Self {
        match action {
            pb::Action::Unspecified | pb::Action::Get => Action::Get,
            pb::Action::Set => Action::Set,
            pb::Action::Create => Action::Create,
            pb::Action::Update => Action::Update,
            pb::Action::Delete => Action::Delete,
            pb::Action::Expire => Action::Expire,
        }
    }
}

impl From<Action> for pb::Action {
    fn from(action: Action) -> Self {
        match action {
            Action::Get => pb::Action::Get,
            Action::Set => pb::Action::Set,
            Action::Create => pb::Action::Create,
            Action::Update => pb::Action::Update,
            Action::Delete => pb::Action::Delete,
            Action::Expire => pb::Action::Expire,
        }
    }
}

impl TryFrom<pb::NodeResponse> for Response {
    type Error = Error;

    fn try_from(response: pb::NodeResponse) -> Result<Self, Error> {
        let action = Action::from(response.action());
        Ok(Self {
            action,
            node: response
                .node
                .ok_or(Error::MalformedResponse("response without node"))?
                .into(),
            prev_node: response.prev_node.map(Node::from),
            revision: response.revision,
        })
    }
}

impl TryFrom<pb::WatchEvent> for Response {
    type Error = Error;

    fn try_from(event: pb::WatchEvent) -> Result<Self, Error> {
        let action = Action::from(event.action());
        Ok(Self {
            action,
            node: event
                .node
                .ok_or(Error::MalformedResponse("watch event without node"))?
                .into(),
            prev_node: event.prev_node.map(Node::from),
            revision: event.revision,
        })
    }
}

impl From<Response> for pb::NodeResponse {
    fn from(response: Response) -> Self {
        Self {
            action: pb::Action::from(response.action) as i32,
            node: Some(response.node.into()),
            prev_node: response.prev_node.map(pb::Node::from),
            revision: response.revision,
        }
    }
}

impl From<Response> for pb::WatchEvent {
    fn from(response: Response) -> Self {
        Self {
            action: pb::Action::from(response.action) as i32,
            node: Some(response.node.into()),
            prev_node: response.prev_node.map(pb::Node::from),
            revision: response.revision,
        }
    }
}

impl From<PrevExist> for pb::PrevExist {
    fn from(prev_exist: PrevExist) -> Self {
        match prev_exist {
            PrevExist::Ignore => pb::PrevExist::Ignore,
            PrevExist::Exist => pb::PrevExist::Exist,
            PrevExist::NotExist => pb::PrevExist::NotExist,
        }
    }
}

impl From<pb::PrevExist> for PrevExist {
    fn from(prev_exist: pb::PrevExist) -> Self {
        match prev_exist {
            pb::PrevExist::Ignore => PrevExist::Ignore,
            pb::PrevExist::Exist => PrevExist::Exist,
            pb::PrevExist::NotExist => PrevExist::NotExist,
        }
    }
}

pub fn get_request(key: &str, options: GetOptions) -> pb::GetRequest {
    pb::GetRequest {
        key: key.to_string(),
        recursive: options.recursive,
        sorted: options.sorted,
    }
}

pub fn set_request(key: &str, value: &str, options: SetOptions) -> pb::SetRequest {
    pb::SetRequest {
        key: key.to_string(),
        value: value.to_string(),
        dir: options.dir,
        ttl_millis: options
            .ttl
            .map(|ttl| u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX)),
        prev_exist: pb::PrevExist::from(options.prev_exist) as i32,
    }
}

pub fn delete_request(key: &str, options: DeleteOptions) -> pb::DeleteRequest {
    pb::DeleteRequest {
        key: key.to_string(),
        dir: options.dir,
        recursive: options.recursive,
    }
}

pub fn watch_request(key: &str, options: WatchOptions) -> pb::WatchRequest {
    pb::WatchRequest {
        key: key.to_string(),
        recursive: options.recursive,
        after_revision: options.after_revision,
    }
}

impl From<&pb::GetRequest> for GetOptions {
    fn from(request: &pb::GetRequest) -> Self {
        Self {
            recursive: request.recursive,
            sorted: request.sorted,
        }
    }
}

impl From<&pb::SetRequest> for SetOptions {
    fn from(request: &pb::SetRequest) -> Self {
        Self {
            dir: request.dir,
            ttl: request.ttl_millis.map(Duration::from_millis),
            prev_exist: request.prev_exist().into(),
        }
    }
}

impl From<&pb::DeleteRequest> for DeleteOptions {
    fn from(request: &pb::DeleteRequest) -> Self {
        Self {
            dir: request.dir,
            recursive: request.recursive,
        }
    }
}

impl From<&pb::WatchRequest> for WatchOptions {
    fn from(request: &pb::WatchRequest) -> Self {
        Self {
            recursive: request.recursive,
            after_revision: request.after_revision,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_survive_the_wire() {
        let errors = [
            Error::not_found("/a/b"),
            Error::conflict("/a", Conflict::NotAFile),
            Error::conflict("/a/b", Conflict::NotADirectory),
            Error::NodeExists { key: "/n".into() },
            Error::DirNotEmpty { key: "/d".into() },
            Error::RootReadOnly,
            Error::HistoryExpired {
                requested: 3,
                compacted: 200,
                current: 1200,
            },
        ];

        for err in errors {
            let decoded = Error::from(to_status(&err));
            assert_eq!(decoded.to_string(), err.to_string());
        }
    }

    #[test]
    fn leaf_in_the_way_travels_as_not_a_file() {
        let status = to_status(&Error::conflict("/k", Conflict::LeafInTheWay));
        match Error::from(status) {
            Error::TypeConflict { key, conflict } => {
                assert_eq!(key, "/k");
                assert_eq!(conflict, Conflict::NotAFile);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn plain_status_stays_a_status() {
        let err = Error::from(Status::unavailable("store is down"));
        assert!(matches!(err, Error::Status(ref s) if s.code() == tonic::Code::Unavailable));
    }

    #[test]
    fn response_without_node_is_malformed() {
        let err = Response::try_from(pb::NodeResponse::default()).unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
    }

    #[test]
    fn set_request_carries_ttl_and_precondition() {
        let options = SetOptions {
            dir: true,
            ttl: Some(Duration::from_secs(5)),
            prev_exist: PrevExist::Exist,
        };
        let request = set_request("/d", "", options);
        assert_eq!(request.ttl_millis, Some(5000));
        assert_eq!(SetOptions::from(&request), options);
    }
}
