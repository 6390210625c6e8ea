use crate::error::{ArchiveError, Result};
use crate::layout;
use crate::signature;
use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

/// Collects named entries and packs them into a zip container
///
/// Entries are written in name order so identical inputs produce identical
/// entry layouts.
#[derive(Debug, Default)]
pub struct ArchiveBuilder {
    files: BTreeMap<String, Vec<u8>>,
    compression_level: Option<i64>,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_compression_level(mut self, level: i64) -> Self {
        self.compression_level = Some(level);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, bytes: Vec<u8>) -> Result<()> {
        let name = name.into();
        if self.files.contains_key(&name) {
            return Err(ArchiveError::DuplicateEntry(name));
        }
        self.files.insert(name, bytes);
        Ok(())
    }

    /// Insert `name` plus its `name.sig` entry
    pub fn insert_signed(&mut self, name: &str, bytes: Vec<u8>, sig: &[u8]) -> Result<()> {
        self.insert(layout::signature_name(name), signature::encode(sig))?;
        self.insert(name, bytes)
    }

    pub fn build(self) -> Result<Vec<u8>> {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(self.compression_level);

        let mut buf = Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buf);
            for (name, bytes) in &self.files {
                zip.start_file(name.as_str(), options)?;
                zip.write_all(bytes)?;
            }
            zip.finish()?;
        }

        Ok(buf.into_inner())
    }
}
