//! Binary index file format.
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │ HEADER (64 bytes, fixed)             │
//! │  magic: [u8; 8] = b"MAILIDX\0"      │
//! │  version: u32                        │
//! │  flags: u32                          │
//! │  document_count: u64                 │
//! │  (padding to 64 bytes)               │
//! ├──────────────────────────────────────┤
//! │ BODY (variable)                      │
//! │  bincode-serialized index state      │
//! └──────────────────────────────────────┘
//! ```

/// Magic bytes identifying a mailindex file.
pub const MAGIC: &[u8; 8] = b"MAILIDX\0";

/// Current index format version.
pub const VERSION: u32 = 2;

/// Fixed header size in bytes.
pub const HEADER_SIZE: usize = 64;

/// Feature flag: the index carries ghost records (placeholder documents
/// for referenced-but-not-yet-seen messages). Indexes without this flag
/// use the legacy per-message-ID metadata scheme instead.
pub const FLAG_GHOST_RECORDS: u32 = 1 << 0;

/// Serializable index header.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct IndexHeader {
    /// Magic bytes (must equal [`MAGIC`]).
    pub magic: [u8; 8],
    /// Format version (must equal [`VERSION`]).
    pub version: u32,
    /// Feature flags ([`FLAG_GHOST_RECORDS`]).
    pub flags: u32,
    /// Number of documents in the index.
    pub document_count: u64,
}

impl IndexHeader {
    /// Validate that the header is well-formed and matches the current format.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.magic != *MAGIC {
            return Err("Invalid magic bytes".into());
        }
        if self.version != VERSION {
            return Err(format!(
                "Incompatible version: expected {VERSION}, found {}",
                self.version
            ));
        }
        Ok(())
    }
}
