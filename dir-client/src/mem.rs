//! In-memory directory store.
//!
//! `MemStore` keeps the whole tree behind a mutex and mirrors the remote
//! store's rules: leaves and directories never turn into each other,
//! every mutation bumps a global revision, and a bounded history of
//! changes backs watches. Expired nodes are purged before every
//! operation, and a waiting watch wakes itself at the next expiry
//! deadline so that `Expire` events go out without other traffic.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::Notify;

use crate::error::{Conflict, Error};
use crate::node::{Action, Node, Response};
use crate::store::{
    DeleteOptions, EventStream, GetOptions, PrevExist, SetOptions, Store, WatchOptions,
};

/// Number of past changes kept for watches to resume from.
pub const DEFAULT_HISTORY_WINDOW: usize = 1000;

/// A store living entirely in process memory. Clones share the same tree.
#[derive(Clone)]
pub struct MemStore {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<State>,
    changed: Notify,
}

struct State {
    root: Entry,
    revision: u64,
    history: VecDeque<Response>,
    /// Highest revision dropped from `history`.
    evicted_through: u64,
    window: usize,
}

struct Entry {
    value: String,
    dir: bool,
    children: BTreeMap<String, Entry>,
    created: u64,
    modified: u64,
    expiration: Option<DateTime<Utc>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::with_history_window(DEFAULT_HISTORY_WINDOW)
    }

    pub fn with_history_window(window: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::new(window)),
                changed: Notify::new(),
            }),
        }
    }

    /// The revision of the most recent mutation.
    pub fn revision(&self) -> u64 {
        self.inner.lock().revision
    }

    /// Runs `f` against the purged tree and wakes watchers if anything
    /// was committed.
    fn mutate<R>(&self, f: impl FnOnce(&mut State, DateTime<Utc>) -> R) -> R {
        let now = Utc::now();
        let (result, changed) = {
            let mut state = self.inner.lock();
            let before = state.revision;
            state.purge_expired(now);
            let result = f(&mut state, now);
            (result, state.revision != before)
        };

        if changed {
            self.inner.changed.notify_waiters();
        }
        result
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Store for MemStore {
    async fn get(&self, key: &str, options: GetOptions) -> Result<Response, Error> {
        self.mutate(|state, now| state.get(key, options, now))
    }

    async fn set(&self, key: &str, value: &str, options: SetOptions) -> Result<Response, Error> {
        self.mutate(|state, now| state.set(key, value, options, now))
    }

    async fn delete(&self, key: &str, options: DeleteOptions) -> Result<Response, Error> {
        self.mutate(|state, now| state.delete(key, options, now))
    }

    async fn watch(&self, key: &str, options: WatchOptions) -> Result<EventStream, Error> {
        let key = normalize(key);
        let recursive = options.recursive;
        let mut cursor = self.mutate(|state, _| {
            if options.after_revision == 0 {
                return Ok(state.revision);
            }
            if options.after_revision < state.evicted_through {
                return Err(state.history_expired(options.after_revision));
            }
            Ok(options.after_revision)
        })?;

        let store = self.clone();
        Ok(Box::pin(async_stream::stream! {
            loop {
                let changed = store.inner.changed.notified();
                tokio::pin!(changed);
                changed.as_mut().enable();

                let (next, revision, deadline) = store.mutate(|state, now| {
                    let deadline = state
                        .next_expiration()
                        .map(|at| (at - now).to_std().unwrap_or_default());
                    (state.next_event(&key, recursive, cursor), state.revision, deadline)
                });
                match next {
                    Ok(Some(event)) => {
                        cursor = event.revision;
                        yield Ok(event);
                    }
                    Ok(None) => {
                        // Everything up to `revision` has been scanned.
                        cursor = revision;
                        match deadline {
                            Some(delay) => {
                                tokio::select! {
                                    _ = changed.as_mut() => {}
                                    _ = tokio::time::sleep(delay) => {}
                                }
                            }
                            None => changed.await,
                        }
                    }
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        }))
    }
}

impl State {
    fn new(window: usize) -> Self {
        Self {
            root: Entry::dir(0, None),
            revision: 0,
            history: VecDeque::new(),
            evicted_through: 0,
            window: window.max(1),
        }
    }

    fn find(&self, segments: &[&str]) -> Option<&Entry> {
        let mut entry = &self.root;
        for segment in segments {
            entry = entry.children.get(*segment)?;
        }
        Some(entry)
    }

    fn find_mut(&mut self, segments: &[&str]) -> Option<&mut Entry> {
        let mut entry = &mut self.root;
        for segment in segments {
            entry = entry.children.get_mut(*segment)?;
        }
        Some(entry)
    }

    fn bump(&mut self) -> u64 {
        self.revision += 1;
        self.revision
    }

    fn commit(&mut self, action: Action, node: Node, prev_node: Option<Node>) -> Response {
        let response = Response {
            action,
            node,
            prev_node,
            revision: self.revision,
        };
        self.history.push_back(response.clone());
        while self.history.len() > self.window {
            if let Some(evicted) = self.history.pop_front() {
                self.evicted_through = evicted.revision;
            }
        }
        response
    }

    fn get(&self, key: &str, options: GetOptions, now: DateTime<Utc>) -> Result<Response, Error> {
        let key = normalize(key);
        let entry = self
            .find(&segments(&key))
            .ok_or_else(|| Error::not_found(&key))?;

        // Children always come back in key order, so `sorted` needs no work.
        Ok(Response {
            action: Action::Get,
            node: entry.to_node(&key, true, options.recursive, now),
            prev_node: None,
            revision: self.revision,
        })
    }

    fn set(
        &mut self,
        key: &str,
        value: &str,
        options: SetOptions,
        now: DateTime<Utc>,
    ) -> Result<Response, Error> {
        let key = normalize(key);
        let segments = segments(&key);
        let Some((name, parents)) = segments.split_last() else {
            return Err(Error::RootReadOnly);
        };

        let mut ancestor = &self.root;
        for (depth, segment) in parents.iter().enumerate() {
            match ancestor.children.get(*segment) {
                Some(entry) if !entry.dir => {
                    let path = format!("/{}", parents[..=depth].join("/"));
                    return Err(Error::conflict(path, Conflict::NotADirectory));
                }
                Some(entry) => ancestor = entry,
                None => break,
            }
        }

        let existing = self
            .find(&segments)
            .map(|entry| (entry.dir, entry.to_node(&key, false, false, now)));
        match (&existing, options.prev_exist) {
            (None, PrevExist::Exist) => return Err(Error::not_found(&key)),
            (Some(_), PrevExist::NotExist) => return Err(Error::NodeExists { key: key.clone() }),
            (Some((true, _)), prev_exist) if !(options.dir && prev_exist == PrevExist::Exist) => {
                return Err(Error::conflict(&key, Conflict::NotAFile));
            }
            (Some((false, _)), _) if options.dir => {
                return Err(Error::conflict(&key, Conflict::NotADirectory));
            }
            _ => {}
        }

        let action = match (&existing, options.prev_exist) {
            (None, _) => Action::Create,
            (Some(_), PrevExist::Exist) => Action::Update,
            (Some(_), _) => Action::Set,
        };
        let expiration = options
            .ttl
            .and_then(|ttl| TimeDelta::from_std(ttl).ok())
            .and_then(|ttl| now.checked_add_signed(ttl));

        let revision = self.bump();
        let parent = ensure_dirs(&mut self.root, parents, revision);
        let entry = parent.children.entry((*name).to_string()).or_insert_with(|| {
            if options.dir {
                Entry::dir(revision, None)
            } else {
                Entry::leaf(revision)
            }
        });
        if !entry.dir {
            entry.value = value.to_string();
        }
        entry.modified = revision;
        entry.expiration = expiration;
        let node = entry.to_node(&key, false, false, now);

        Ok(self.commit(action, node, existing.map(|(_, prev)| prev)))
    }

    fn delete(
        &mut self,
        key: &str,
        options: DeleteOptions,
        now: DateTime<Utc>,
    ) -> Result<Response, Error> {
        let key = normalize(key);
        let segments = segments(&key);
        let Some((name, parents)) = segments.split_last() else {
            return Err(Error::RootReadOnly);
        };

        let (is_empty, prev) = self
            .find(&segments)
            .map(|entry| (entry.children.is_empty(), entry.to_node(&key, false, false, now)))
            .ok_or_else(|| Error::not_found(&key))?;
        if prev.dir {
            if !(options.dir || options.recursive) {
                return Err(Error::conflict(&key, Conflict::NotAFile));
            }
            if !is_empty && !options.recursive {
                return Err(Error::DirNotEmpty { key: key.clone() });
            }
        }

        let revision = self.bump();
        if let Some(parent) = self.find_mut(parents) {
            parent.children.remove(*name);
        }
        let node = tombstone(&key, &prev, revision);
        Ok(self.commit(Action::Delete, node, Some(prev)))
    }

    fn purge_expired(&mut self, now: DateTime<Utc>) {
        let mut expired = Vec::new();
        collect_expired(&self.root, "/", now, &mut expired);

        for key in expired {
            let segments = segments(&key);
            let Some((name, parents)) = segments.split_last() else {
                continue;
            };
            let Some(prev) = self.find(&segments).map(|e| e.to_node(&key, false, false, now)) else {
                continue;
            };

            let revision = self.bump();
            if let Some(parent) = self.find_mut(parents) {
                parent.children.remove(*name);
            }
            let node = tombstone(&key, &prev, revision);
            self.commit(Action::Expire, node, Some(prev));
        }
    }

    /// The earliest deadline of any node still in the tree.
    fn next_expiration(&self) -> Option<DateTime<Utc>> {
        earliest_expiration(&self.root)
    }

    fn history_expired(&self, requested: u64) -> Error {
        Error::HistoryExpired {
            requested,
            compacted: self.evicted_through,
            current: self.revision,
        }
    }

    /// The first retained change after `after` that a watch on `key`
    /// should see.
    fn next_event(&self, key: &str, recursive: bool, after: u64) -> Result<Option<Response>, Error> {
        if after < self.evicted_through {
            return Err(self.history_expired(after));
        }

        Ok(self
            .history
            .iter()
            .find(|event| event.revision > after && concerns(event, key, recursive))
            .cloned())
    }
}

impl Entry {
    fn leaf(revision: u64) -> Self {
        Self {
            value: String::new(),
            dir: false,
            children: BTreeMap::new(),
            created: revision,
            modified: revision,
            expiration: None,
        }
    }

    fn dir(revision: u64, expiration: Option<DateTime<Utc>>) -> Self {
        Self {
            dir: true,
            expiration,
            ..Self::leaf(revision)
        }
    }

    /// `expand` includes the immediate children; `recursive` includes
    /// every level below them too.
    fn to_node(&self, key: &str, expand: bool, recursive: bool, now: DateTime<Utc>) -> Node {
        let nodes = if self.dir && expand {
            self.children
                .iter()
                .map(|(name, child)| child.to_node(&child_key(key, name), recursive, recursive, now))
                .collect()
        } else {
            Vec::new()
        };

        Node {
            key: key.to_string(),
            value: self.value.clone(),
            dir: self.dir,
            nodes,
            created_revision: self.created,
            modified_revision: self.modified,
            ttl: self.expiration.map(|at| remaining_seconds(at, now)),
            expiration: self.expiration,
        }
    }
}

fn ensure_dirs<'a>(root: &'a mut Entry, segments: &[&str], revision: u64) -> &'a mut Entry {
    let mut entry = root;
    for segment in segments {
        entry = entry
            .children
            .entry((*segment).to_string())
            .or_insert_with(|| Entry::dir(revision, None));
    }
    entry
}

fn collect_expired(entry: &Entry, key: &str, now: DateTime<Utc>, expired: &mut Vec<String>) {
    for (name, child) in &entry.children {
        let child_key = child_key(key, name);
        if child.expiration.is_some_and(|at| at <= now) {
            expired.push(child_key);
        } else {
            collect_expired(child, &child_key, now, expired);
        }
    }
}

fn earliest_expiration(entry: &Entry) -> Option<DateTime<Utc>> {
    entry
        .children
        .values()
        .filter_map(|child| child.expiration.into_iter().chain(earliest_expiration(child)).min())
        .min()
}

fn tombstone(key: &str, prev: &Node, revision: u64) -> Node {
    Node {
        key: key.to_string(),
        dir: prev.dir,
        created_revision: prev.created_revision,
        modified_revision: revision,
        ..Node::default()
    }
}

/// Whether a watch on `key` sees `event`. Removing a directory is also
/// seen by watches on anything beneath it.
fn concerns(event: &Response, key: &str, recursive: bool) -> bool {
    let changed = event.node.key.as_str();
    changed == key
        || (recursive && is_within(changed, key))
        || (event.node.dir
            && matches!(event.action, Action::Delete | Action::Expire)
            && is_within(key, changed))
}

fn is_within(key: &str, dir: &str) -> bool {
    dir == "/"
        || key == dir
        || key
            .strip_prefix(dir)
            .is_some_and(|rest| rest.starts_with('/'))
}

fn remaining_seconds(at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let millis = (at - now).num_milliseconds().max(0);
    (millis + 999) / 1000
}

fn segments(key: &str) -> Vec<&str> {
    key.split('/').filter(|s| !s.is_empty()).collect()
}

fn normalize(key: &str) -> String {
    format!("/{}", segments(key).join("/"))
}

fn child_key(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}
