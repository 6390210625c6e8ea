use crate::error::{ArchiveError, Result};
use std::io::Read;

/// Size bounds applied while reading an archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum uncompressed bytes across all entries, signatures included
    pub max_total_size: u64,
    /// Maximum uncompressed bytes of any single entry
    pub max_entry_size: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_total_size: 250 * 1024 * 1024,
            max_entry_size: 1024 * 1024,
        }
    }
}

/// Remaining byte allowance for one archive read
pub(crate) struct Budget {
    limits: Limits,
    consumed: u64,
}

impl Budget {
    pub(crate) fn new(limits: Limits) -> Self {
        Self {
            limits,
            consumed: 0,
        }
    }

    /// Reject an entry whose declared size already breaks a limit
    pub(crate) fn check_declared(&self, name: &str, declared: u64) -> Result<()> {
        if declared > self.limits.max_entry_size {
            return Err(ArchiveError::EntryTooLarge {
                name: name.to_string(),
                limit: self.limits.max_entry_size,
            });
        }
        if declared > self.remaining() {
            return Err(ArchiveError::ArchiveTooLarge {
                limit: self.limits.max_total_size,
            });
        }
        Ok(())
    }

    /// Read an entry, never buffering more than one byte past the allowance.
    pub(crate) fn read_entry<R: Read>(&mut self, name: &str, reader: R) -> Result<Vec<u8>> {
        let remaining = self.remaining();
        let cap = self.limits.max_entry_size.min(remaining);

        let mut buf = Vec::new();
        reader.take(cap.saturating_add(1)).read_to_end(&mut buf)?;
        let read = buf.len() as u64;

        if read > cap {
            return Err(if read > self.limits.max_entry_size {
                ArchiveError::EntryTooLarge {
                    name: name.to_string(),
                    limit: self.limits.max_entry_size,
                }
            } else {
                ArchiveError::ArchiveTooLarge {
                    limit: self.limits.max_total_size,
                }
            });
        }

        self.consumed += read;
        Ok(buf)
    }

    fn remaining(&self) -> u64 {
        self.limits.max_total_size.saturating_sub(self.consumed)
    }
}
