//! Entry names and signed payloads

pub const DATA_JSON: &str = "data.json";
pub const GUILD_ID_TXT: &str = "guild_id.txt";
pub const FAILED_TXT: &str = "failed.txt";
pub const TRANSCRIPTS_DIR: &str = "transcripts/";
pub const SIG_SUFFIX: &str = ".sig";

const TRANSCRIPT_EXT: &str = ".json";

pub fn signature_name(name: &str) -> String {
    format!("{name}{SIG_SUFFIX}")
}

pub fn transcript_name(ticket_id: i32) -> String {
    format!("{TRANSCRIPTS_DIR}{ticket_id}{TRANSCRIPT_EXT}")
}

/// Ticket id of a `transcripts/{id}.json` entry.
///
/// Only the canonical decimal form is accepted, so each ticket has exactly
/// one valid entry name.
pub fn parse_transcript_name(name: &str) -> Option<i32> {
    let id = name
        .strip_prefix(TRANSCRIPTS_DIR)?
        .strip_suffix(TRANSCRIPT_EXT)?;
    let ticket_id: i32 = id.parse().ok()?;
    (ticket_id.to_string() == id).then_some(ticket_id)
}

/// Bytes signed for a transcript: `guild|ticket|content`
pub fn transcript_payload(guild_id: i64, ticket_id: i32, content: &[u8]) -> Vec<u8> {
    let prefix = format!("{guild_id}|{ticket_id}|");
    let mut payload = Vec::with_capacity(prefix.len() + content.len());
    payload.extend_from_slice(prefix.as_bytes());
    payload.extend_from_slice(content);
    payload
}

/// `failed.txt` body: ascending ticket ids, one per line
pub fn failed_list(ticket_ids: &[i32]) -> Vec<u8> {
    let mut ids = ticket_ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids.iter().map(|id| format!("{id}\n")).collect::<String>().into_bytes()
}

pub fn parse_failed_list(body: &[u8]) -> Option<Vec<i32>> {
    let text = std::str::from_utf8(body).ok()?;
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.trim().parse().ok())
        .collect()
}
