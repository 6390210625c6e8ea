//! Transcript collector
//!
//! Lists every transcript object of a guild across the configured buckets
//! and downloads them with a fixed pool of workers fed from one queue.
//! Storage errors are fatal (after one retry when throttled); a blob that
//! fails to decompress or decrypt only lands in the failed list.

use export_cert::BlobCipher;
use flate2::read::GzDecoder;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::Collected;
use crate::config::TranscriptConfig;
use crate::error::{ExportError, ExportResult};
use crate::storage::{ObjectStore, StorageError};

pub type Transcripts = BTreeMap<i32, Vec<u8>>;

/// A listed transcript object
#[derive(Debug, Clone, PartialEq, Eq)]
struct TranscriptObject {
    bucket: String,
    key: String,
    ticket_id: i32,
}

pub struct TranscriptCollector {
    store: Arc<dyn ObjectStore>,
    cipher: BlobCipher,
    config: TranscriptConfig,
}

impl TranscriptCollector {
    pub fn new(store: Arc<dyn ObjectStore>, cipher: BlobCipher, config: TranscriptConfig) -> Self {
        Self {
            store,
            cipher,
            config,
        }
    }

    pub async fn collect(&self, guild_id: i64) -> ExportResult<Collected<Transcripts>> {
        let objects = self.list(guild_id).await?;
        tracing::info!(guild_id, transcript_count = objects.len(), "Found transcripts for guild");

        if objects.len() > self.config.max_transcripts {
            return Err(ExportError::TooManyTranscripts {
                guild_id,
                count: objects.len(),
                limit: self.config.max_transcripts,
            });
        }

        let (tx, rx) = flume::unbounded();
        let worker_count = self.config.download_workers.clamp(1, objects.len().max(1));
        for object in objects {
            // Receiver is alive until the workers below are spawned
            let _ = tx.send(object);
        }
        drop(tx);

        let results = Arc::new(Mutex::new(Collected::<Transcripts>::default()));
        let cancel = CancellationToken::new();
        let mut workers = JoinSet::new();
        for worker_id in 0..worker_count {
            workers.spawn(download_worker(DownloadWorker {
                worker_id,
                queue: rx.clone(),
                store: Arc::clone(&self.store),
                cipher: self.cipher.clone(),
                results: Arc::clone(&results),
                cancel: cancel.clone(),
                backoff: self.config.throttle_backoff,
                max_bytes: self.config.max_transcript_bytes,
            }));
        }
        drop(rx);

        while let Some(joined) = workers.join_next().await {
            let outcome = joined.map_err(ExportError::from).and_then(|r| r);
            if let Err(e) = outcome {
                cancel.cancel();
                workers.abort_all();
                return Err(e);
            }
        }

        let mut collected = match Arc::try_unwrap(results) {
            Ok(mutex) => mutex.into_inner(),
            Err(shared) => std::mem::take(&mut *shared.lock()),
        };
        let data = &collected.data;
        collected.failed.retain(|id| !data.contains_key(id));
        collected.failed.sort_unstable();
        collected.failed.dedup();

        tracing::info!(
            guild_id,
            downloaded = collected.data.len(),
            failed = collected.failed.len(),
            "Transcripts collected"
        );
        Ok(collected)
    }

    async fn list(&self, guild_id: i64) -> ExportResult<Vec<TranscriptObject>> {
        let prefix = format!("{guild_id}/");
        let mut objects = Vec::new();

        for bucket in &self.config.buckets {
            for key in self.store.list(bucket, &prefix).await? {
                let ticket_id = parse_ticket_id(&prefix, &key)
                    .ok_or_else(|| ExportError::UnexpectedKey(key.clone()))?;
                objects.push(TranscriptObject {
                    bucket: bucket.clone(),
                    key,
                    ticket_id,
                });
            }
        }

        Ok(objects)
    }
}

/// `{guild}/{ticket}` or `{guild}/free-{ticket}`
fn parse_ticket_id(prefix: &str, key: &str) -> Option<i32> {
    let rest = key.strip_prefix(prefix)?;
    let digits = rest.strip_prefix("free-").unwrap_or(rest);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Gunzip then decrypt. Inflation stops one byte past `max_bytes`.
fn decode(cipher: &BlobCipher, raw: &[u8], max_bytes: u64) -> Result<Vec<u8>, String> {
    let mut sealed = Vec::new();
    GzDecoder::new(raw)
        .take(max_bytes.saturating_add(1))
        .read_to_end(&mut sealed)
        .map_err(|e| format!("decompress: {e}"))?;
    if sealed.len() as u64 > max_bytes {
        return Err(format!("decompress: larger than {max_bytes} bytes"));
    }
    cipher.decrypt(&sealed).map_err(|e| format!("decrypt: {e}"))
}

struct DownloadWorker {
    worker_id: usize,
    queue: flume::Receiver<TranscriptObject>,
    store: Arc<dyn ObjectStore>,
    cipher: BlobCipher,
    results: Arc<Mutex<Collected<Transcripts>>>,
    cancel: CancellationToken,
    backoff: Duration,
    max_bytes: u64,
}

async fn download_worker(worker: DownloadWorker) -> ExportResult<()> {
    loop {
        let object = tokio::select! {
            _ = worker.cancel.cancelled() => return Err(ExportError::Cancelled),
            next = worker.queue.recv_async() => match next {
                Ok(object) => object,
                Err(_) => return Ok(()),
            },
        };

        let raw = worker.fetch(&object).await.inspect_err(|e| {
            tracing::error!(
                worker_id = worker.worker_id,
                key = %object.key,
                error = %e,
                "Failed to download transcript"
            );
        })?;

        let cipher = worker.cipher.clone();
        let max_bytes = worker.max_bytes;
        let decoded = tokio::task::spawn_blocking(move || decode(&cipher, &raw, max_bytes)).await?;

        match decoded {
            Ok(transcript) => {
                worker.results.lock().data.insert(object.ticket_id, transcript);
            }
            Err(reason) => {
                tracing::warn!(ticket_id = object.ticket_id, %reason, "Unreadable transcript");
                worker.results.lock().failed.push(object.ticket_id);
            }
        }
    }
}

impl DownloadWorker {
    /// Fetch with a single retry after a throttling response
    async fn fetch(&self, object: &TranscriptObject) -> Result<Vec<u8>, StorageError> {
        match self.store.get(&object.bucket, &object.key).await {
            Err(e) if e.is_throttled() => {
                tracing::warn!(worker_id = self.worker_id, error = %e, "Throttled, backing off");
                tokio::time::sleep(self.backoff).await;
                self.store.get(&object.bucket, &object.key).await
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryObjectStore, gzip};

    const BUCKET: &str = "transcripts";

    fn config(buckets: &[&str]) -> TranscriptConfig {
        let mut config = TranscriptConfig::with_buckets(
            buckets.iter().map(|b| b.to_string()).collect(),
            String::new(),
        );
        config.download_workers = 4;
        config.throttle_backoff = Duration::from_millis(10);
        config
    }

    fn seal(cipher: &BlobCipher, plaintext: &[u8]) -> Vec<u8> {
        gzip(&cipher.encrypt(plaintext).unwrap())
    }

    #[test]
    fn test_parse_ticket_id() {
        assert_eq!(parse_ticket_id("42/", "42/7"), Some(7));
        assert_eq!(parse_ticket_id("42/", "42/free-8"), Some(8));
        assert_eq!(parse_ticket_id("42/", "42/free-"), None);
        assert_eq!(parse_ticket_id("42/", "42/abc"), None);
        assert_eq!(parse_ticket_id("42/", "42/+7"), None);
        assert_eq!(parse_ticket_id("42/", "43/7"), None);
    }

    #[tokio::test]
    async fn test_corrupt_blob_goes_to_failed_list() {
        let cipher = BlobCipher::generate();
        let store = Arc::new(MemoryObjectStore::default());
        store.insert(BUCKET, "42/7", seal(&cipher, b"{\"ticket\":7}"));
        store.insert(BUCKET, "42/free-8", seal(&cipher, b"{\"ticket\":8}"));
        store.insert(BUCKET, "42/9", b"not gzip".to_vec());

        let collector = TranscriptCollector::new(store, cipher, config(&[BUCKET]));
        let collected = collector.collect(42).await.unwrap();

        assert_eq!(collected.data.len(), 2);
        assert_eq!(collected.data[&7], b"{\"ticket\":7}".to_vec());
        assert_eq!(collected.data[&8], b"{\"ticket\":8}".to_vec());
        assert_eq!(collected.failed, vec![9]);
    }

    #[tokio::test]
    async fn test_wrong_key_is_a_soft_failure() {
        let cipher = BlobCipher::generate();
        let store = Arc::new(MemoryObjectStore::default());
        store.insert(BUCKET, "5/1", seal(&BlobCipher::generate(), b"x"));

        let collector = TranscriptCollector::new(store, cipher, config(&[BUCKET]));
        let collected = collector.collect(5).await.unwrap();
        assert!(collected.data.is_empty());
        assert_eq!(collected.failed, vec![1]);
    }

    #[tokio::test]
    async fn test_collects_across_buckets() {
        let cipher = BlobCipher::generate();
        let store = Arc::new(MemoryObjectStore::default());
        store.insert("old", "3/1", seal(&cipher, b"one"));
        store.insert("new", "3/2", seal(&cipher, b"two"));
        store.insert("new", "4/2", seal(&cipher, b"other guild"));

        let collector = TranscriptCollector::new(store, cipher, config(&["old", "new"]));
        let collected = collector.collect(3).await.unwrap();
        assert_eq!(collected.data.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
        assert!(collected.failed.is_empty());
    }

    #[tokio::test]
    async fn test_storage_failure_aborts_collection() {
        let cipher = BlobCipher::generate();
        let store = Arc::new(MemoryObjectStore::default());
        for ticket in 1..=60 {
            store.insert(BUCKET, &format!("1/{ticket}"), seal(&cipher, b"t"));
        }
        store.fail_on(BUCKET, "1/40");

        let collector = TranscriptCollector::new(store, cipher, config(&[BUCKET]));
        let err = collector.collect(1).await.unwrap_err();
        assert!(matches!(err, ExportError::Storage(StorageError::Other(_))));
    }

    #[tokio::test]
    async fn test_throttled_fetch_is_retried_once() {
        let cipher = BlobCipher::generate();
        let store = Arc::new(MemoryObjectStore::default());
        store.insert(BUCKET, "1/1", seal(&cipher, b"t"));
        store.throttle_once(BUCKET, "1/1");

        let collector = TranscriptCollector::new(Arc::clone(&store) as _, cipher, config(&[BUCKET]));
        let collected = collector.collect(1).await.unwrap();
        assert_eq!(collected.data.len(), 1);
        assert_eq!(store.get_count(BUCKET, "1/1"), 2);
    }

    #[tokio::test]
    async fn test_second_throttle_is_fatal() {
        let cipher = BlobCipher::generate();
        let store = Arc::new(MemoryObjectStore::default());
        for ticket in 1..=20 {
            store.insert(BUCKET, &format!("1/{ticket}"), seal(&cipher, b"t"));
        }
        store.throttle_once(BUCKET, "1/1");
        store.throttle_once(BUCKET, "1/1");

        let collector = TranscriptCollector::new(Arc::clone(&store) as _, cipher, config(&[BUCKET]));
        let err = collector.collect(1).await.unwrap_err();
        assert!(matches!(err, ExportError::Storage(StorageError::Throttled(_))));
        assert_eq!(store.get_count(BUCKET, "1/1"), 2);
    }

    #[tokio::test]
    async fn test_oversized_transcript_is_a_soft_failure() {
        let cipher = BlobCipher::generate();
        let store = Arc::new(MemoryObjectStore::default());
        store.insert(BUCKET, "1/1", seal(&cipher, &vec![b'a'; 64 * 1024]));
        store.insert(BUCKET, "1/2", seal(&cipher, b"small"));

        let mut config = config(&[BUCKET]);
        config.max_transcript_bytes = 16 * 1024;
        let collector = TranscriptCollector::new(store, cipher, config);
        let collected = collector.collect(1).await.unwrap();

        assert_eq!(collected.data.keys().copied().collect::<Vec<_>>(), vec![2]);
        assert_eq!(collected.failed, vec![1]);
    }

    #[test]
    fn test_decode_stops_at_ceiling() {
        let cipher = BlobCipher::generate();
        let sealed = cipher.encrypt(&vec![0u8; 4096]).unwrap();
        let raw = gzip(&sealed);

        assert_eq!(decode(&cipher, &raw, sealed.len() as u64).unwrap(), vec![0u8; 4096]);
        let err = decode(&cipher, &raw, sealed.len() as u64 - 1).unwrap_err();
        assert!(err.starts_with("decompress"));
    }

    #[tokio::test]
    async fn test_unexpected_key_is_fatal() {
        let store = Arc::new(MemoryObjectStore::default());
        store.insert(BUCKET, "1/readme.txt", b"hi".to_vec());

        let collector = TranscriptCollector::new(store, BlobCipher::generate(), config(&[BUCKET]));
        let err = collector.collect(1).await.unwrap_err();
        assert!(matches!(err, ExportError::UnexpectedKey(key) if key == "1/readme.txt"));
    }

    #[tokio::test]
    async fn test_transcript_ceiling() {
        let store = Arc::new(MemoryObjectStore::default());
        for ticket in 1..=3 {
            store.insert(BUCKET, &format!("1/{ticket}"), Vec::new());
        }
        let mut config = config(&[BUCKET]);
        config.max_transcripts = 2;

        let collector = TranscriptCollector::new(store, BlobCipher::generate(), config);
        let err = collector.collect(1).await.unwrap_err();
        assert!(matches!(err, ExportError::TooManyTranscripts { count: 3, limit: 2, .. }));
    }

    #[tokio::test]
    async fn test_guild_without_transcripts() {
        let store = Arc::new(MemoryObjectStore::default());
        let collector = TranscriptCollector::new(store, BlobCipher::generate(), config(&[BUCKET]));
        let collected = collector.collect(1).await.unwrap();
        assert_eq!(collected, Collected::default());
    }
}
