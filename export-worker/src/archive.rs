//! Signed archive assembly
//!
//! Transcript signing fans out over a pool of blocking workers fed from a
//! single queue; the signed entries are then packed on a blocking thread.

use export_archive::ArchiveBuilder;
use export_archive::layout::{self, DATA_JSON, FAILED_TXT, GUILD_ID_TXT};
use export_cert::SigningKey;
use shared::guild_data::GuildData;
use std::sync::Arc;

use crate::collectors::Collected;
use crate::collectors::transcripts::Transcripts;
use crate::error::{ExportError, ExportResult};

/// A transcript with its signature over `guild|ticket|content`
struct SignedTranscript {
    ticket_id: i32,
    content: Vec<u8>,
    signature: Vec<u8>,
}

#[derive(Clone)]
pub struct ArchiveSigner {
    key: Arc<SigningKey>,
    workers: usize,
    compression_level: i64,
}

impl ArchiveSigner {
    pub fn new(key: Arc<SigningKey>, workers: usize, compression_level: i64) -> Self {
        Self {
            key,
            workers: workers.max(1),
            compression_level,
        }
    }

    /// `data.json` with its signature
    pub async fn guild_data(&self, data: &GuildData) -> ExportResult<Vec<u8>> {
        let document = serde_json::to_vec(data)?;
        let key = Arc::clone(&self.key);
        let level = self.compression_level;

        tokio::task::spawn_blocking(move || {
            let signature = key.sign(&document);
            let mut builder = ArchiveBuilder::new().with_compression_level(level);
            builder.insert_signed(DATA_JSON, document, &signature)?;
            builder.build().map_err(ExportError::from)
        })
        .await?
    }

    /// `guild_id.txt`, every transcript and, when non-empty, `failed.txt`,
    /// each with its signature
    pub async fn transcripts(
        &self,
        guild_id: i64,
        collected: Collected<Transcripts>,
    ) -> ExportResult<Vec<u8>> {
        let signed = self.sign_transcripts(guild_id, collected.data).await?;
        let key = Arc::clone(&self.key);
        let level = self.compression_level;
        let failed = collected.failed;

        tokio::task::spawn_blocking(move || {
            let mut builder = ArchiveBuilder::new().with_compression_level(level);

            let guild = guild_id.to_string().into_bytes();
            let signature = key.sign(&guild);
            builder.insert_signed(GUILD_ID_TXT, guild, &signature)?;

            for entry in signed {
                builder.insert_signed(
                    &layout::transcript_name(entry.ticket_id),
                    entry.content,
                    &entry.signature,
                )?;
            }

            if !failed.is_empty() {
                let body = layout::failed_list(&failed);
                let signature = key.sign(&body);
                builder.insert_signed(FAILED_TXT, body, &signature)?;
            }

            builder.build().map_err(ExportError::from)
        })
        .await?
    }

    async fn sign_transcripts(
        &self,
        guild_id: i64,
        transcripts: Transcripts,
    ) -> ExportResult<Vec<SignedTranscript>> {
        if transcripts.is_empty() {
            return Ok(Vec::new());
        }

        let worker_count = self.workers.min(transcripts.len());
        let (tx, rx) = flume::unbounded::<(i32, Vec<u8>)>();
        for item in transcripts {
            // Receiver is held right here, so the send cannot fail
            let _ = tx.send(item);
        }
        drop(tx);

        let mut handles = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let rx = rx.clone();
            let key = Arc::clone(&self.key);
            handles.push(tokio::task::spawn_blocking(move || {
                let mut signed = Vec::new();
                while let Ok((ticket_id, content)) = rx.recv() {
                    let payload = layout::transcript_payload(guild_id, ticket_id, &content);
                    signed.push(SignedTranscript {
                        ticket_id,
                        signature: key.sign(&payload),
                        content,
                    });
                }
                signed
            }));
        }
        drop(rx);

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await?);
        }
        tracing::debug!(guild_id, signed = all.len(), "Transcripts signed");
        Ok(all)
    }
}
