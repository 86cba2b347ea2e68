/// Width of one metadata row: three little-endian 32-bit words.
pub(crate) const ROW_SIZE: usize = 12;

/// Sentinel stored in a container row's size word while the container is
/// still open during parsing.
pub(crate) const UNKNOWN_SIZE: i32 = -1;

/// Byte offsets are stored in 32-bit words; longer inputs are rejected at
/// parse entry.
pub(crate) const MAX_DOCUMENT_BYTES: usize = i32::MAX as usize;

/// Hard cap on row storage growth: the last whole row below `i32::MAX`.
pub(crate) const MAX_DATABASE_BYTES: usize = i32::MAX as usize - ROW_SIZE;

/// Worst-case input-to-output ratio while unescaping: a `\uXXXX` sequence
/// spends six input bytes per decoded byte.
pub(crate) const MAX_ESCAPE_EXPANSION: usize = 6;

/// Unescape scratch at or under this size stays on the stack.
pub(crate) const UNESCAPE_STACK_BYTES: usize = 256;

/// Default container nesting cap.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// RFC 3339 payload length window accepted before the date parser runs:
/// `YYYY-MM-DDTHH:MM:SSZ` up to nanosecond precision with a numeric offset.
pub(crate) const MIN_DATETIME_BYTES: usize = 20;
pub(crate) const MAX_DATETIME_BYTES: usize = 35;

/// Hyphenated GUID spelling, the only one accepted.
pub(crate) const GUID_BYTES: usize = 36;
