/// Version byte written at the start of every encoded entry.
pub const ENTRY_VERSION: u8 = 1;
/// Version byte written at the start of every frame.
pub const CHUNK_VERSION: u8 = 1;

/// Fixed bytes preceding the id in an encoded entry: version, type, id length.
pub const ENTRY_HEADER_SIZE: usize = 4;
/// Largest encoded entry the log accepts.
pub const MAX_ENTRY_SIZE: usize = u16::MAX as usize;

/// Length of random identifiers (parameter ids and frame grouping ids).
pub const RANDOM_ID_LENGTH: usize = 16;
/// Fixed frame header bytes excluding the grouping id:
/// version (1) + chunks (2) + index (2) + id length (2) + data length (2).
pub const CHUNK_FIXED_HEADER_SIZE: usize = 9;
/// Header overhead of a frame carrying a standard grouping id.
pub const CHUNK_HEADER_SIZE: usize = CHUNK_FIXED_HEADER_SIZE + RANDOM_ID_LENGTH;

/// Default maximum size of one physical frame, header included.
pub const DEFAULT_FRAME_SIZE: usize = 64;
/// Frames carry their data length in 16 bits.
pub const MAX_FRAME_SIZE: usize = CHUNK_HEADER_SIZE + u16::MAX as usize;
/// Frame counts are written as 16 bit values.
pub const MAX_CHUNKS: usize = u16::MAX as usize;
