//! In-memory object store used by tests. Records every mutating call.

use super::object_store::{ClientError, ListPage, ListedObject, ObjectStoreClient};
use crate::manifest::ObjectBody;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Put(String),
    Delete(String),
}

pub struct MemoryObjectStore {
    bucket: String,
    page_size: usize,
    objects: Mutex<BTreeMap<String, (Bytes, DateTime<Utc>)>>,
    ops: Mutex<Vec<StoreOp>>,
    failing_puts: Mutex<HashSet<String>>,
    fail_listing: AtomicBool,
    list_calls: AtomicUsize,
}

impl MemoryObjectStore {
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            page_size: 1000,
            objects: Mutex::new(BTreeMap::new()),
            ops: Mutex::new(Vec::new()),
            failing_puts: Mutex::new(HashSet::new()),
            fail_listing: AtomicBool::new(false),
            list_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Seed an object without recording an operation.
    pub fn insert(&self, key: &str, data: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (Bytes::copy_from_slice(data), Utc::now()));
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.objects.lock().unwrap().get(key).map(|(data, _)| data.clone())
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn ops(&self) -> Vec<StoreOp> {
        self.ops.lock().unwrap().clone()
    }

    pub fn clear_ops(&self) {
        self.ops.lock().unwrap().clear();
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Make every put of `key` fail.
    pub fn fail_put(&self, key: &str) {
        self.failing_puts.lock().unwrap().insert(key.to_string());
    }

    pub fn fail_listing(&self) {
        self.fail_listing.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStoreClient for MemoryObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list_page(
        &self,
        prefix: &str,
        continuation: Option<String>,
    ) -> Result<ListPage, ClientError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err("listing refused".into());
        }

        let objects = self.objects.lock().unwrap();
        let start: usize = continuation.as_deref().unwrap_or("0").parse()?;
        let matching: Vec<_> = objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .collect();

        let page: Vec<ListedObject> = matching
            .iter()
            .skip(start)
            .take(self.page_size)
            .map(|(key, (data, modified))| ListedObject {
                key: (*key).clone(),
                size: data.len() as u64,
                last_modified: *modified,
            })
            .collect();

        let end = start + page.len();
        Ok(ListPage {
            objects: page,
            next: (end < matching.len()).then(|| end.to_string()),
        })
    }

    async fn get_object(&self, key: &str) -> Result<Bytes, ClientError> {
        self.get(key).ok_or_else(|| format!("no such key: {}", key).into())
    }

    async fn put_object(&self, key: &str, body: ObjectBody) -> Result<(), ClientError> {
        self.ops.lock().unwrap().push(StoreOp::Put(key.to_string()));
        if self.failing_puts.lock().unwrap().contains(key) {
            return Err(format!("put refused for {}", key).into());
        }

        let data = body.into_bytes().await?;
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (data, Utc::now()));
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<(), ClientError> {
        self.ops.lock().unwrap().push(StoreOp::Delete(key.to_string()));
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }
}
