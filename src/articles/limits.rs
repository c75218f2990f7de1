//! Size limits for the hybrid row/object storage of article payloads.
//!
//! The thresholds are shared with every other writer of the `articles`
//! table and must not drift.

/// `content` longer than this many characters is moved to object storage
pub const STORAGE_THRESHOLD: usize = 4_000;

/// Serialized JSON size (bytes) above which a list field is moved to object storage
pub const FIELD_SIZE_LIMIT: usize = 100_000;

pub const MAX_MEDIA_ITEMS: usize = 20;
pub const MAX_SOURCES: usize = 50;

/// Ceiling on the serialized row payload after externalization
pub const TOTAL_PAYLOAD_LIMIT: usize = 1_000_000;

// Degraded in-row representation used when a list blob cannot be written
pub const FALLBACK_MAX_SECTIONS: usize = 5;
pub const FALLBACK_SECTION_CONTENT_CHARS: usize = 1_000;
pub const FALLBACK_SECTION_MEDIA: usize = 3;
pub const FALLBACK_SECTION_SOURCES: usize = 5;
pub const FALLBACK_MEDIA_URL_CHARS: usize = 2_000;
pub const FALLBACK_MEDIA_NAME_CHARS: usize = 500;

// Request validation
pub const MAX_TAGS: usize = 10;
pub const MAX_PAGE_SIZE: u32 = 100;
