//! In-memory stand-ins for the database, object storage and ticketing
//! database, used by unit tests.

use async_trait::async_trait;
use flate2::Compression;
use flate2::write::GzEncoder;
use parking_lot::Mutex;
use shared::models::{
    Artifact, Lease, NewArtifact, Request, RequestDetail, RequestKind, RequestStatus, Task,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Write;
use uuid::Uuid;

use crate::collectors::{GuildDataSource, SectionRow};
use crate::config::DownloadLimits;
use crate::db::{DOWNLOAD_WINDOW_MS, ExportRepository, QuotaCheck};
use crate::error::{ExportError, ExportResult};
use crate::storage::{ObjectStore, StorageError};

pub fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

// ========== Object storage ==========

type ObjectId = (String, String);

#[derive(Default)]
struct Objects {
    objects: BTreeMap<ObjectId, (Vec<u8>, HashMap<String, String>)>,
    failing: HashSet<ObjectId>,
    throttled: HashMap<ObjectId, usize>,
    gets: HashMap<ObjectId, usize>,
}

#[derive(Default)]
pub struct MemoryObjectStore {
    inner: Mutex<Objects>,
}

fn object_id(bucket: &str, key: &str) -> ObjectId {
    (bucket.to_string(), key.to_string())
}

impl MemoryObjectStore {
    pub fn insert(&self, bucket: &str, key: &str, body: Vec<u8>) {
        self.inner
            .lock()
            .objects
            .insert(object_id(bucket, key), (body, HashMap::new()));
    }

    /// Every get of this object fails with a non-retryable error
    pub fn fail_on(&self, bucket: &str, key: &str) {
        self.inner.lock().failing.insert(object_id(bucket, key));
    }

    /// The next get of this object is throttled
    pub fn throttle_once(&self, bucket: &str, key: &str) {
        *self.inner.lock().throttled.entry(object_id(bucket, key)).or_default() += 1;
    }

    pub fn get_count(&self, bucket: &str, key: &str) -> usize {
        self.inner
            .lock()
            .gets
            .get(&object_id(bucket, key))
            .copied()
            .unwrap_or(0)
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        let inner = self.inner.lock();
        inner.objects.get(&object_id(bucket, key)).map(|(body, _)| body.clone())
    }

    pub fn metadata(&self, bucket: &str, key: &str) -> Option<HashMap<String, String>> {
        let inner = self.inner.lock();
        inner.objects.get(&object_id(bucket, key)).map(|(_, meta)| meta.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().objects.len()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StorageError> {
        let inner = self.inner.lock();
        Ok(inner
            .objects
            .keys()
            .filter(|(b, k)| b == bucket && k.starts_with(prefix))
            .map(|(_, k)| k.clone())
            .collect())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let id = object_id(bucket, key);
        let mut inner = self.inner.lock();
        *inner.gets.entry(id.clone()).or_default() += 1;

        if let Some(remaining) = inner.throttled.get_mut(&id).filter(|n| **n > 0) {
            *remaining -= 1;
            return Err(StorageError::Throttled(format!("SlowDown: {key}")));
        }
        if inner.failing.contains(&id) {
            return Err(StorageError::Other(format!("connection reset reading {key}")));
        }

        inner
            .objects
            .get(&id)
            .map(|(body, _)| body.clone())
            .ok_or_else(|| StorageError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        metadata: HashMap<String, String>,
    ) -> Result<(), StorageError> {
        self.inner
            .lock()
            .objects
            .insert(object_id(bucket, key), (body, metadata));
        Ok(())
    }
}

// ========== Ticketing database ==========

/// Serves canned JSON rows per section
#[derive(Default)]
pub struct StaticGuildSource {
    rows: HashMap<&'static str, Vec<serde_json::Value>>,
    failing: HashSet<&'static str>,
    pages: Mutex<HashMap<&'static str, usize>>,
}

impl StaticGuildSource {
    pub fn with_rows(mut self, section: &'static str, rows: Vec<serde_json::Value>) -> Self {
        self.rows.insert(section, rows);
        self
    }

    pub fn failing(mut self, section: &'static str) -> Self {
        self.failing.insert(section);
        self
    }

    /// Number of page fetches issued for a section
    pub fn pages(&self, section: &str) -> usize {
        self.pages.lock().get(section).copied().unwrap_or(0)
    }
}

#[async_trait]
impl GuildDataSource for StaticGuildSource {
    async fn fetch_page<R: SectionRow>(
        &self,
        section: &'static str,
        _query: &'static str,
        _guild_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<R>, sqlx::Error> {
        *self.pages.lock().entry(section).or_default() += 1;
        if self.failing.contains(section) {
            return Err(sqlx::Error::Protocol(format!("{section}: connection closed")));
        }

        let rows = self.rows.get(section).map(Vec::as_slice).unwrap_or_default();
        rows.iter()
            .skip(offset as usize)
            .take(limit as usize)
            .map(|row| serde_json::from_value(row.clone()).map_err(|e| sqlx::Error::Decode(Box::new(e))))
            .collect()
    }
}

// ========== Export database ==========

#[derive(Default)]
struct Tables {
    requests: Vec<Request>,
    tasks: Vec<Task>,
    artifacts: Vec<Artifact>,
    /// (user_id, size, created_at)
    downloads: Vec<(i64, i64, i64)>,
}

impl Tables {
    fn detail(&self, request: &Request) -> RequestDetail {
        RequestDetail {
            request: request.clone(),
            artifact: self
                .artifacts
                .iter()
                .find(|a| a.request_id == request.id)
                .cloned(),
        }
    }

    fn take_leased(&mut self, lease: &Lease) -> ExportResult<()> {
        let index = self
            .tasks
            .iter()
            .position(|t| t.id == lease.task_id && t.lease_token == Some(lease.token))
            .ok_or(ExportError::LeaseLost(lease.task_id))?;
        self.tasks.remove(index);
        Ok(())
    }

    fn set_status(&mut self, request_id: Uuid, status: RequestStatus) {
        if let Some(request) = self.requests.iter_mut().find(|r| r.id == request_id) {
            request.status = status;
        }
    }
}

#[derive(Default)]
pub struct MemoryRepository {
    tables: Mutex<Tables>,
}

impl MemoryRepository {
    pub fn task_count(&self) -> usize {
        self.tables.lock().tasks.len()
    }

    pub fn request(&self, id: Uuid) -> Option<Request> {
        self.tables.lock().requests.iter().find(|r| r.id == id).cloned()
    }

    pub fn artifact_for(&self, request_id: Uuid) -> Option<Artifact> {
        let tables = self.tables.lock();
        tables.artifacts.iter().find(|a| a.request_id == request_id).cloned()
    }

    /// Add an artifact that belongs to no visible request
    pub fn seed_artifact(&self, size: i64, expires_at: i64) {
        self.tables.lock().artifacts.push(Artifact {
            id: Uuid::new_v4(),
            request_id: Uuid::new_v4(),
            key: "seeded".into(),
            expires_at,
            size,
            created_at: 0,
        });
    }

    pub fn seed_download(&self, user_id: i64, size: i64, created_at: i64) {
        self.tables.lock().downloads.push((user_id, size, created_at));
    }

    /// Bytes ever recorded for a user, regardless of age
    pub fn download_total(&self, user_id: i64) -> i64 {
        let tables = self.tables.lock();
        tables
            .downloads
            .iter()
            .filter(|(user, _, _)| *user == user_id)
            .map(|(_, size, _)| size)
            .sum()
    }
}

#[async_trait]
impl ExportRepository for MemoryRepository {
    async fn create_request(
        &self,
        user_id: i64,
        kind: RequestKind,
        guild_id: Option<i64>,
        now: i64,
    ) -> Result<Request, sqlx::Error> {
        let request = Request {
            id: Uuid::new_v4(),
            user_id,
            kind,
            guild_id,
            status: RequestStatus::Queued,
            created_at: now,
        };
        let mut tables = self.tables.lock();
        tables.requests.push(request.clone());
        tables.tasks.push(Task {
            id: Uuid::new_v4(),
            request_id: request.id,
            created_at: now,
            lease_token: None,
            lease_expires_at: None,
        });
        Ok(request)
    }

    async fn list_requests(&self, user_id: i64) -> Result<Vec<RequestDetail>, sqlx::Error> {
        let tables = self.tables.lock();
        let mut details: Vec<RequestDetail> = tables
            .requests
            .iter()
            .filter(|r| r.user_id == user_id)
            .map(|r| tables.detail(r))
            .collect();
        details.sort_by(|a, b| b.request.created_at.cmp(&a.request.created_at));
        Ok(details)
    }

    async fn get_request(&self, id: Uuid) -> Result<Option<RequestDetail>, sqlx::Error> {
        let tables = self.tables.lock();
        Ok(tables.requests.iter().find(|r| r.id == id).map(|r| tables.detail(r)))
    }

    async fn lease_next(
        &self,
        lease_duration_ms: i64,
        now: i64,
    ) -> Result<Option<(Request, Lease)>, sqlx::Error> {
        let mut tables = self.tables.lock();
        let Some(task) = tables
            .tasks
            .iter_mut()
            .filter(|t| t.lease_expires_at.is_none_or(|at| at <= now))
            .min_by_key(|t| t.created_at)
        else {
            return Ok(None);
        };

        let lease = Lease {
            task_id: task.id,
            token: Uuid::new_v4(),
            expires_at: now + lease_duration_ms,
        };
        task.lease_token = Some(lease.token);
        task.lease_expires_at = Some(lease.expires_at);
        let request_id = task.request_id;

        Ok(tables
            .requests
            .iter()
            .find(|r| r.id == request_id)
            .cloned()
            .map(|r| (r, lease)))
    }

    async fn active_artifact_size(&self, now: i64) -> Result<i64, sqlx::Error> {
        let tables = self.tables.lock();
        Ok(tables
            .artifacts
            .iter()
            .filter(|a| a.expires_at > now)
            .map(|a| a.size)
            .sum())
    }

    async fn complete(
        &self,
        lease: &Lease,
        request_id: Uuid,
        artifact: &NewArtifact,
        now: i64,
    ) -> ExportResult<Artifact> {
        let mut tables = self.tables.lock();
        tables.take_leased(lease)?;
        tables.set_status(request_id, RequestStatus::Completed);
        let artifact = Artifact {
            id: Uuid::new_v4(),
            request_id,
            key: artifact.key.clone(),
            expires_at: artifact.expires_at,
            size: artifact.size,
            created_at: now,
        };
        tables.artifacts.push(artifact.clone());
        Ok(artifact)
    }

    async fn fail(&self, lease: &Lease, request_id: Uuid) -> ExportResult<()> {
        let mut tables = self.tables.lock();
        tables.take_leased(lease)?;
        tables.set_status(request_id, RequestStatus::Failed);
        Ok(())
    }

    async fn delete_requests_before(&self, cutoff: i64) -> Result<u64, sqlx::Error> {
        let mut tables = self.tables.lock();
        let before = tables.requests.len();
        tables.requests.retain(|r| r.created_at >= cutoff);
        let deleted = (before - tables.requests.len()) as u64;

        let live: HashSet<Uuid> = tables.requests.iter().map(|r| r.id).collect();
        tables.tasks.retain(|t| live.contains(&t.request_id));
        tables.artifacts.retain(|a| live.contains(&a.request_id));
        tables.downloads.retain(|(_, _, at)| *at >= cutoff);
        Ok(deleted)
    }

    async fn record_download(
        &self,
        user_id: i64,
        artifact: &Artifact,
        limits: DownloadLimits,
        now: i64,
    ) -> Result<QuotaCheck, sqlx::Error> {
        let since = now - DOWNLOAD_WINDOW_MS;
        let mut tables = self.tables.lock();
        tables.downloads.push((user_id, artifact.size, now));

        let recent = tables.downloads.iter().filter(|(_, _, at)| *at > since);
        let (user, global) = recent.fold((0i64, 0i64), |(user, global), (u, size, _)| {
            (if *u == user_id { user + size } else { user }, global + size)
        });

        let check = if user > limits.user_daily_bytes {
            QuotaCheck::UserExceeded
        } else if global > limits.global_daily_bytes {
            QuotaCheck::GlobalExceeded
        } else {
            QuotaCheck::Allowed
        };
        if check != QuotaCheck::Allowed {
            tables.downloads.pop();
        }
        Ok(check)
    }
}
