//! Staging areas
//!
//! A staging area holds proposed creates or updates so that "after"
//! queries can union them in without touching the real collection.
//!
//! `StagingArea` is a scoped handle: the area exists from `acquire` until
//! `release`. A handle dropped without `release` (an error path, or the
//! owning future being cancelled) schedules the drop on the current tokio
//! runtime; without a runtime the area leaks and a warning is logged.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::errors::StoreResult;
use super::DocumentStore;
use crate::observability::{log_event, Event};

/// What a staging area holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagingKind {
    Created,
    Updated,
}

impl StagingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StagingKind::Created => "created",
            StagingKind::Updated => "updated",
        }
    }
}

impl fmt::Display for StagingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Handle to a populated staging area
pub struct StagingArea {
    store: Arc<dyn DocumentStore>,
    name: String,
    released: bool,
}

impl StagingArea {
    /// Writes `records` to a fresh staging area and returns its handle.
    ///
    /// Updated records are upserted, so repeated identifiers collapse to
    /// the last one. If the write fails the area is dropped before the
    /// error is returned.
    pub async fn acquire(
        store: Arc<dyn DocumentStore>,
        prefix: &str,
        collection: &str,
        kind: StagingKind,
        records: Vec<Value>,
    ) -> StoreResult<Self> {
        let name = Self::area_name(prefix, collection, kind, &records);
        let area = Self {
            store,
            name,
            released: false,
        };

        let count = records.len().to_string();
        let written = match kind {
            StagingKind::Created => area.store.insert_many(&area.name, records).await,
            StagingKind::Updated => area.store.upsert_many(&area.name, records).await,
        };

        if let Err(e) = written {
            area.release().await;
            return Err(e);
        }

        log_event(
            Event::StagingAcquired,
            &[("area", area.name.as_str()), ("records", count.as_str())],
        );
        Ok(area)
    }

    /// Name of a staging area for `records`.
    ///
    /// `{prefix}_{collection}_{kind}_{content hash}_{nonce}`: the hash ties
    /// the name to the payload and the nonce keeps concurrent calls with
    /// identical payloads apart.
    pub fn area_name(prefix: &str, collection: &str, kind: StagingKind, records: &[Value]) -> String {
        format!(
            "{}_{}_{}_{}_{}",
            prefix,
            collection,
            kind,
            Self::content_hash(records),
            &Uuid::new_v4().simple().to_string()[..8]
        )
    }

    /// First 16 hex digits of the SHA-256 of the records' JSON text
    pub fn content_hash(records: &[Value]) -> String {
        let mut hasher = Sha256::new();
        for record in records {
            hasher.update(record.to_string().as_bytes());
            hasher.update(b"\n");
        }
        let digest = format!("{:x}", hasher.finalize());
        digest[..16].to_string()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Drops the area. Failures are logged, never returned.
    pub async fn release(mut self) {
        self.released = true;
        match self.store.drop_area(&self.name).await {
            Ok(()) => log_event(Event::StagingReleased, &[("area", self.name.as_str())]),
            Err(e) => log_event(
                Event::StagingCleanupFailed,
                &[("area", self.name.as_str()), ("reason", e.to_string().as_str())],
            ),
        }
    }
}

impl Drop for StagingArea {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let name = std::mem::take(&mut self.name);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let store = Arc::clone(&self.store);
                handle.spawn(async move {
                    match store.drop_area(&name).await {
                        Ok(()) => log_event(Event::StagingReleased, &[("area", name.as_str())]),
                        Err(e) => log_event(
                            Event::StagingCleanupFailed,
                            &[("area", name.as_str()), ("reason", e.to_string().as_str())],
                        ),
                    }
                });
            }
            Err(_) => log_event(
                Event::StagingLeaked,
                &[("area", name.as_str()), ("reason", "no runtime to drop area")],
            ),
        }
    }
}
