use crate::error::{ArchiveError, Result};
use crate::layout::{self, DATA_JSON, FAILED_TXT, GUILD_ID_TXT, SIG_SUFFIX};
use crate::limit::{Budget, Limits};
use crate::signature;
use export_cert::VerifyingKey;
use shared::guild_data::GuildData;
use std::collections::BTreeMap;
use std::io::{Read, Seek};

/// Contents of a transcript archive whose signatures all verified
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedTranscripts {
    pub guild_id: i64,
    pub transcripts: BTreeMap<i32, Vec<u8>>,
    pub failed: Vec<i32>,
}

/// Defensive reader for export archives
///
/// Every entry is read through a bounded reader, so an archive that lies
/// about its sizes cannot make the validator buffer more than the
/// configured limits. A payload is only returned once its signature has
/// been checked against the configured public key.
#[derive(Debug, Clone)]
pub struct ArchiveValidator {
    key: VerifyingKey,
    limits: Limits,
}

impl ArchiveValidator {
    pub fn new(key: VerifyingKey, limits: Limits) -> Self {
        Self { key, limits }
    }

    /// Validate a guild data archive and parse its document
    pub fn validate_guild_data<R: Read + Seek>(&self, reader: R) -> Result<GuildData> {
        let mut entries = self.read_entries(reader, |name| {
            name == DATA_JSON || name == layout::signature_name(DATA_JSON)
        })?;

        let data = take_entry(&mut entries, DATA_JSON)?;
        self.verify_entry(&mut entries, DATA_JSON, &data)?;

        Ok(serde_json::from_slice(&data)?)
    }

    /// Validate a transcript archive
    ///
    /// Each transcript signature is checked over `guild|ticket|content`
    /// rebuilt from the signed `guild_id.txt` and the entry path.
    pub fn validate_transcripts<R: Read + Seek>(&self, reader: R) -> Result<ValidatedTranscripts> {
        let mut entries = self.read_entries(reader, is_transcript_archive_entry)?;

        let guild_raw = take_entry(&mut entries, GUILD_ID_TXT)?;
        self.verify_entry(&mut entries, GUILD_ID_TXT, &guild_raw)?;
        let guild_id = std::str::from_utf8(&guild_raw)
            .ok()
            .and_then(|s| s.trim().parse::<i64>().ok())
            .ok_or_else(|| malformed(GUILD_ID_TXT, "not a decimal guild id"))?;

        let failed = match entries.remove(FAILED_TXT) {
            Some(body) => {
                self.verify_entry(&mut entries, FAILED_TXT, &body)?;
                layout::parse_failed_list(&body)
                    .ok_or_else(|| malformed(FAILED_TXT, "not a list of ticket ids"))?
            }
            None => Vec::new(),
        };

        let names: Vec<String> = entries
            .keys()
            .filter(|name| !name.ends_with(SIG_SUFFIX))
            .cloned()
            .collect();

        let mut transcripts = BTreeMap::new();
        for name in names {
            let Some(ticket_id) = layout::parse_transcript_name(&name) else {
                return Err(ArchiveError::UnexpectedEntry(name));
            };
            let content = take_entry(&mut entries, &name)?;
            let payload = layout::transcript_payload(guild_id, ticket_id, &content);
            self.verify_entry(&mut entries, &name, &payload)?;
            transcripts.insert(ticket_id, content);
        }

        // Whatever is left is a signature without its entry
        if let Some(orphan) = entries.into_keys().next() {
            return Err(ArchiveError::UnexpectedEntry(orphan));
        }

        Ok(ValidatedTranscripts {
            guild_id,
            transcripts,
            failed,
        })
    }

    fn read_entries<R: Read + Seek>(
        &self,
        reader: R,
        allowed: impl Fn(&str) -> bool,
    ) -> Result<BTreeMap<String, Vec<u8>>> {
        let mut archive = zip::ZipArchive::new(reader)?;
        let mut budget = Budget::new(self.limits);
        let mut entries = BTreeMap::new();

        for index in 0..archive.len() {
            let mut file = archive.by_index(index)?;
            if file.is_dir() {
                continue;
            }

            let name = file.name().to_string();
            if !allowed(&name) {
                return Err(ArchiveError::UnexpectedEntry(name));
            }
            if entries.contains_key(&name) {
                return Err(ArchiveError::DuplicateEntry(name));
            }

            budget.check_declared(&name, file.size())?;
            let bytes = budget.read_entry(&name, &mut file)?;
            entries.insert(name, bytes);
        }

        Ok(entries)
    }

    /// Check `name.sig` against `signed`, consuming the signature entry
    fn verify_entry(
        &self,
        entries: &mut BTreeMap<String, Vec<u8>>,
        name: &str,
        signed: &[u8],
    ) -> Result<()> {
        let sig_name = layout::signature_name(name);
        let encoded = take_entry(entries, &sig_name)?;
        let sig = signature::decode(&encoded)
            .ok_or_else(|| ArchiveError::SignatureEncoding(sig_name.clone()))?;

        self.key.verify(signed, &sig).map_err(|_| {
            tracing::warn!(entry = %name, "Signature verification failed");
            ArchiveError::BadSignature(name.to_string())
        })
    }
}

fn is_transcript_archive_entry(name: &str) -> bool {
    let base = name.strip_suffix(SIG_SUFFIX).unwrap_or(name);
    base == GUILD_ID_TXT || base == FAILED_TXT || layout::parse_transcript_name(base).is_some()
}

fn take_entry(entries: &mut BTreeMap<String, Vec<u8>>, name: &str) -> Result<Vec<u8>> {
    entries
        .remove(name)
        .ok_or_else(|| ArchiveError::MissingEntry(name.to_string()))
}

fn malformed(name: &str, reason: &str) -> ArchiveError {
    ArchiveError::Malformed {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}
