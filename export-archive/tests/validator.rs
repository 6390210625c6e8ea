use export_archive::layout::{self, DATA_JSON, FAILED_TXT, GUILD_ID_TXT};
use export_archive::{ArchiveBuilder, ArchiveError, ArchiveValidator, Limits};
use export_cert::SigningKey;
use shared::guild_data::GuildData;
use std::io::Cursor;

fn signing_key() -> SigningKey {
    SigningKey::from_pem(&SigningKey::generate_pem().unwrap()).unwrap()
}

fn transcript_archive(
    key: &SigningKey,
    guild_id: i64,
    tickets: &[(i32, &[u8])],
    failed: &[i32],
) -> Vec<u8> {
    let mut builder = ArchiveBuilder::new();
    let guild = guild_id.to_string().into_bytes();
    builder
        .insert_signed(GUILD_ID_TXT, guild.clone(), &key.sign(&guild))
        .unwrap();
    for (ticket_id, content) in tickets {
        let payload = layout::transcript_payload(guild_id, *ticket_id, content);
        builder
            .insert_signed(
                &layout::transcript_name(*ticket_id),
                content.to_vec(),
                &key.sign(&payload),
            )
            .unwrap();
    }
    if !failed.is_empty() {
        let body = layout::failed_list(failed);
        builder
            .insert_signed(FAILED_TXT, body.clone(), &key.sign(&body))
            .unwrap();
    }
    builder.build().unwrap()
}

#[test]
fn test_single_ticket_export_verifies() {
    let key = signing_key();
    let bytes = transcript_archive(&key, 42, &[(7, br#"{"a":1}"#)], &[]);

    let validator = ArchiveValidator::new(key.verifying_key(), Limits::default());
    let result = validator
        .validate_transcripts(Cursor::new(bytes))
        .expect("archive should verify");

    assert_eq!(result.guild_id, 42);
    assert_eq!(result.transcripts.len(), 1);
    assert_eq!(result.transcripts[&7], br#"{"a":1}"#.to_vec());
    assert!(result.failed.is_empty());
}

#[test]
fn test_failed_list_verified_and_returned() {
    let key = signing_key();
    let tickets: Vec<(i32, &[u8])> = (1..=10).filter(|id| *id != 9).map(|id| (id, &b"{}"[..])).collect();
    let bytes = transcript_archive(&key, 42, &tickets, &[9]);

    let validator = ArchiveValidator::new(key.verifying_key(), Limits::default());
    let result = validator.validate_transcripts(Cursor::new(bytes)).unwrap();
    assert_eq!(result.transcripts.len(), 9);
    assert_eq!(result.failed, vec![9]);
}

#[test]
fn test_signature_bound_to_ticket_id() {
    let key = signing_key();
    let content = br#"{"a":1}"#;
    // Signed for ticket 7 but stored as ticket 8
    let mut builder = ArchiveBuilder::new();
    builder
        .insert_signed(GUILD_ID_TXT, b"42".to_vec(), &key.sign(b"42"))
        .unwrap();
    builder
        .insert_signed(
            &layout::transcript_name(8),
            content.to_vec(),
            &key.sign(&layout::transcript_payload(42, 7, content)),
        )
        .unwrap();
    let bytes = builder.build().unwrap();

    let validator = ArchiveValidator::new(key.verifying_key(), Limits::default());
    let err = validator.validate_transcripts(Cursor::new(bytes)).unwrap_err();
    assert!(matches!(err, ArchiveError::BadSignature(name) if name == "transcripts/8.json"));
}

#[test]
fn test_signature_bound_to_guild_id() {
    let key = signing_key();
    let content = br#"{"a":1}"#;
    // Transcript signed for guild 41 inside an archive for guild 42
    let mut builder = ArchiveBuilder::new();
    builder
        .insert_signed(GUILD_ID_TXT, b"42".to_vec(), &key.sign(b"42"))
        .unwrap();
    builder
        .insert_signed(
            &layout::transcript_name(7),
            content.to_vec(),
            &key.sign(&layout::transcript_payload(41, 7, content)),
        )
        .unwrap();
    let bytes = builder.build().unwrap();

    let validator = ArchiveValidator::new(key.verifying_key(), Limits::default());
    assert!(matches!(
        validator.validate_transcripts(Cursor::new(bytes)),
        Err(ArchiveError::BadSignature(_))
    ));
}

#[test]
fn test_wrong_public_key_rejected() {
    let key = signing_key();
    let other = signing_key();
    let bytes = transcript_archive(&key, 42, &[(7, b"{}")], &[]);

    let validator = ArchiveValidator::new(other.verifying_key(), Limits::default());
    assert!(matches!(
        validator.validate_transcripts(Cursor::new(bytes)),
        Err(ArchiveError::BadSignature(name)) if name == GUILD_ID_TXT
    ));
}

#[test]
fn test_guild_data_roundtrip() {
    let key = signing_key();
    let mut data = GuildData::new(42);
    data.ticket_limit = Some(5);
    data.guild_blacklisted_users = vec![1, 2, 3];
    let json = serde_json::to_vec(&data).unwrap();

    let mut builder = ArchiveBuilder::new();
    builder.insert_signed(DATA_JSON, json.clone(), &key.sign(&json)).unwrap();
    let bytes = builder.build().unwrap();

    let validator = ArchiveValidator::new(key.verifying_key(), Limits::default());
    let parsed = validator.validate_guild_data(Cursor::new(bytes)).unwrap();
    assert_eq!(parsed, data);
}

#[test]
fn test_guild_data_tampered_payload_discarded() {
    let key = signing_key();
    let json = br#"{"guild_id":42}"#.to_vec();
    let tampered = br#"{"guild_id":43}"#.to_vec();

    let mut builder = ArchiveBuilder::new();
    builder.insert_signed(DATA_JSON, tampered, &key.sign(&json)).unwrap();
    let bytes = builder.build().unwrap();

    let validator = ArchiveValidator::new(key.verifying_key(), Limits::default());
    assert!(matches!(
        validator.validate_guild_data(Cursor::new(bytes)),
        Err(ArchiveError::BadSignature(_))
    ));
}

#[test]
fn test_oversized_entry_rejected() {
    let key = signing_key();
    // Highly compressible: tiny on disk, 2 MiB once inflated
    let big = vec![b'a'; 2 * 1024 * 1024];
    let bytes = transcript_archive(&key, 42, &[(1, &big)], &[]);
    assert!(bytes.len() < 64 * 1024);

    let limits = Limits {
        max_total_size: 250 * 1024 * 1024,
        max_entry_size: 1024 * 1024,
    };
    let validator = ArchiveValidator::new(key.verifying_key(), limits);
    assert!(matches!(
        validator.validate_transcripts(Cursor::new(bytes)),
        Err(ArchiveError::EntryTooLarge { .. })
    ));
}

#[test]
fn test_total_budget_counts_signatures() {
    let key = signing_key();
    let content = vec![b'x'; 1000];
    let bytes = transcript_archive(&key, 42, &[(1, &content)], &[]);

    // guild id (2) + its sig (86) + transcript (1000) fits, its sig (86) does not
    let limits = Limits {
        max_total_size: 2 + 86 + 1000 + 50,
        max_entry_size: 4096,
    };
    let validator = ArchiveValidator::new(key.verifying_key(), limits);
    assert!(matches!(
        validator.validate_transcripts(Cursor::new(bytes)),
        Err(ArchiveError::ArchiveTooLarge { .. })
    ));
}

#[test]
fn test_unexpected_entry_rejected() {
    let key = signing_key();
    let mut builder = ArchiveBuilder::new();
    builder
        .insert_signed(GUILD_ID_TXT, b"42".to_vec(), &key.sign(b"42"))
        .unwrap();
    builder.insert("../escape.json", b"{}".to_vec()).unwrap();
    let bytes = builder.build().unwrap();

    let validator = ArchiveValidator::new(key.verifying_key(), Limits::default());
    assert!(matches!(
        validator.validate_transcripts(Cursor::new(bytes)),
        Err(ArchiveError::UnexpectedEntry(_))
    ));
}

#[test]
fn test_not_a_zip() {
    let key = signing_key();
    let validator = ArchiveValidator::new(key.verifying_key(), Limits::default());
    assert!(matches!(
        validator.validate_guild_data(Cursor::new(b"definitely not a zip".to_vec())),
        Err(ArchiveError::Zip(_))
    ));
}

/// Overwrite the uncompressed size recorded for `name` in its local and
/// central directory headers.
fn understate_size(bytes: &mut [u8], name: &str, size: u32) {
    let name = name.as_bytes();
    let mut patched = 0;
    for i in 0..bytes.len().saturating_sub(46) {
        let sig = u32::from_le_bytes(bytes[i..i + 4].try_into().unwrap());
        let (size_at, name_len_at, name_at) = match sig {
            0x0403_4b50 => (22, 26, 30),
            0x0201_4b50 => (24, 28, 46),
            _ => continue,
        };
        let name_len =
            u16::from_le_bytes(bytes[i + name_len_at..i + name_len_at + 2].try_into().unwrap())
                as usize;
        if name_len == name.len() && bytes.get(i + name_at..i + name_at + name_len) == Some(name) {
            bytes[i + size_at..i + size_at + 4].copy_from_slice(&size.to_le_bytes());
            patched += 1;
        }
    }
    assert_eq!(patched, 2, "expected one local and one central header");
}

#[test]
fn test_understated_entry_size_rejected_while_reading() {
    let key = signing_key();
    let big = vec![b'a'; 4 * 1024 * 1024];
    let mut bytes = transcript_archive(&key, 42, &[(1, &big)], &[]);
    understate_size(&mut bytes, &layout::transcript_name(1), 10);

    let mut archive = zip::ZipArchive::new(Cursor::new(bytes.clone())).unwrap();
    assert_eq!(archive.by_name(&layout::transcript_name(1)).unwrap().size(), 10);

    let validator = ArchiveValidator::new(key.verifying_key(), Limits::default());
    assert!(matches!(
        validator.validate_transcripts(Cursor::new(bytes)),
        Err(ArchiveError::EntryTooLarge { .. })
    ));
}
