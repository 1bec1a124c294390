//! Binary layout of logical entries and of the physical frames they are split into.
//!
//! ```text
//! entry: [ version (u8) | type (u8) | id len (u16 LE) | id | payload ... ]
//! frame: [ version (u8) | chunks (u16 LE) | index (u16 LE) | id len (u16 LE) | id
//!          | data len (u16 LE) | data ]
//! ```
//!
//! A frame's id is the grouping identifier shared by all frames of one entry,
//! not the id of the entry itself.

use std::fmt;
use std::io::{ErrorKind, Read};

use crate::{
    constants::{
        CHUNK_FIXED_HEADER_SIZE, CHUNK_HEADER_SIZE, CHUNK_VERSION, ENTRY_HEADER_SIZE,
        ENTRY_VERSION, MAX_CHUNKS, MAX_ENTRY_SIZE, MAX_FRAME_SIZE,
    },
    error::{Result, StoreError},
    util::random_id,
};

/// Kind of application object stored in an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EntryType {
    None = 0,
    Parameters = 1,
    ParameterSet = 2,
}

impl TryFrom<u8> for EntryType {
    type Error = StoreError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Parameters),
            2 => Ok(Self::ParameterSet),
            other => Err(StoreError::malformed(format!("unknown entry type {other}"))),
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Parameters => "parameters",
            Self::ParameterSet => "parameter-set",
        };
        f.write_str(name)
    }
}

/// A logical record: a typed, identified byte payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataEntry {
    pub kind: EntryType,
    pub id: Vec<u8>,
    pub data: Vec<u8>,
}

impl DataEntry {
    #[must_use]
    pub fn new(kind: EntryType, id: impl Into<Vec<u8>>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            id: id.into(),
            data: data.into(),
        }
    }

    /// Size of the encoded entry in bytes.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        ENTRY_HEADER_SIZE + self.id.len() + self.data.len()
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let id_len = u16::try_from(self.id.len()).map_err(|_| StoreError::RecordTooLarge {
            size: self.id.len(),
            limit: u16::MAX as usize,
        })?;
        let size = self.encoded_len();
        if size > MAX_ENTRY_SIZE {
            return Err(StoreError::RecordTooLarge {
                size,
                limit: MAX_ENTRY_SIZE,
            });
        }

        let mut buf = Vec::with_capacity(size);
        buf.push(ENTRY_VERSION);
        buf.push(self.kind as u8);
        buf.extend_from_slice(&id_len.to_le_bytes());
        buf.extend_from_slice(&self.id);
        buf.extend_from_slice(&self.data);
        Ok(buf)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let Some(&version) = bytes.first() else {
            return Err(StoreError::malformed("empty entry"));
        };
        if version != ENTRY_VERSION {
            return Err(StoreError::UnsupportedVersion {
                context: "entry",
                found: version,
                expected: ENTRY_VERSION,
            });
        }
        if bytes.len() < ENTRY_HEADER_SIZE {
            return Err(StoreError::malformed("entry header is incomplete"));
        }
        let kind = EntryType::try_from(bytes[1])?;
        let id_len = usize::from(u16::from_le_bytes([bytes[2], bytes[3]]));
        let id_end = ENTRY_HEADER_SIZE + id_len;
        if id_end > bytes.len() {
            return Err(StoreError::malformed(format!(
                "id length {id_len} exceeds entry of {} bytes",
                bytes.len()
            )));
        }
        Ok(Self {
            kind,
            id: bytes[ENTRY_HEADER_SIZE..id_end].to_vec(),
            data: bytes[id_end..].to_vec(),
        })
    }

    /// Splits the encoded entry into frames of at most `frame_size` bytes each,
    /// all tagged with a fresh random grouping id.
    pub fn split(&self, frame_size: usize) -> Result<Vec<DataChunk>> {
        self.split_with_group(&random_id(), frame_size)
    }

    fn split_with_group(
        &self,
        group: &[u8],
        frame_size: usize,
    ) -> Result<Vec<DataChunk>> {
        let capacity = frame_capacity(frame_size)?;
        let bytes = self.encode()?;
        let count = bytes.len().div_ceil(capacity);
        if count > MAX_CHUNKS {
            return Err(StoreError::RecordTooLarge {
                size: bytes.len(),
                limit: capacity * MAX_CHUNKS,
            });
        }
        // Bounded by MAX_CHUNKS above.
        let total = count as u16;
        let chunks: Vec<DataChunk> = bytes
            .chunks(capacity)
            .enumerate()
            .map(|(index, slice)| DataChunk {
                chunks: total,
                index: index as u16,
                id: group.to_vec(),
                data: slice.to_vec(),
            })
            .collect();
        tracing::debug!(chunks = chunks.len(), "split entry into frames");
        Ok(chunks)
    }
}

/// Number of entry bytes a frame of `frame_size` bytes can carry.
pub fn frame_capacity(frame_size: usize) -> Result<usize> {
    if frame_size <= CHUNK_HEADER_SIZE || frame_size > MAX_FRAME_SIZE {
        return Err(StoreError::InvalidConfig {
            reason: format!(
                "frame size must be between {} and {MAX_FRAME_SIZE} bytes, got {frame_size}",
                CHUNK_HEADER_SIZE + 1
            )
            .into(),
        });
    }
    Ok(frame_size - CHUNK_HEADER_SIZE)
}

/// One physical fragment of an encoded entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataChunk {
    /// Total number of frames for the owning entry.
    pub chunks: u16,
    /// Position of this frame, starting at 0.
    pub index: u16,
    /// Grouping id shared by all frames of the owning entry.
    pub id: Vec<u8>,
    pub data: Vec<u8>,
}

impl DataChunk {
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        CHUNK_FIXED_HEADER_SIZE + self.id.len() + self.data.len()
    }

    /// Appends the encoded frame to `buf`.
    pub fn encode_into(&self, buf: &mut Vec<u8>) -> Result<()> {
        let id_len = u16::try_from(self.id.len())
            .map_err(|_| StoreError::malformed("frame id is too long"))?;
        let data_len = u16::try_from(self.data.len())
            .map_err(|_| StoreError::malformed("frame data is too long"))?;
        buf.reserve(self.encoded_len());
        buf.push(CHUNK_VERSION);
        buf.extend_from_slice(&self.chunks.to_le_bytes());
        buf.extend_from_slice(&self.index.to_le_bytes());
        buf.extend_from_slice(&id_len.to_le_bytes());
        buf.extend_from_slice(&self.id);
        buf.extend_from_slice(&data_len.to_le_bytes());
        buf.extend_from_slice(&self.data);
        Ok(())
    }

    /// Reads the next frame.
    ///
    /// Returns `Ok(None)` when not a single byte is available for the version
    /// byte, which marks the clean end of the log. Any other short read is a
    /// [`StoreError::TruncatedFrame`] reported at `start`, the offset of the
    /// frame within the log.
    pub fn read_from<R: Read>(mut reader: R, start: u64) -> Result<Option<Self>> {
        let mut version = [0u8; 1];
        loop {
            match reader.read(&mut version) {
                Ok(0) => return Ok(None),
                Ok(_) => break,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
        if version[0] != CHUNK_VERSION {
            return Err(StoreError::UnsupportedVersion {
                context: "frame",
                found: version[0],
                expected: CHUNK_VERSION,
            });
        }

        let chunks = read_u16(&mut reader, start)?;
        let index = read_u16(&mut reader, start)?;
        let id_len = read_u16(&mut reader, start)?;
        let mut id = vec![0u8; usize::from(id_len)];
        read_exact(&mut reader, &mut id, start)?;
        let data_len = read_u16(&mut reader, start)?;
        let mut data = vec![0u8; usize::from(data_len)];
        read_exact(&mut reader, &mut data, start)?;

        Ok(Some(Self {
            chunks,
            index,
            id,
            data,
        }))
    }
}

fn read_u16<R: Read>(reader: &mut R, start: u64) -> Result<u16> {
    let mut buf = [0u8; 2];
    read_exact(reader, &mut buf, start)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8], start: u64) -> Result<()> {
    reader.read_exact(buf).map_err(|err| {
        if err.kind() == ErrorKind::UnexpectedEof {
            StoreError::TruncatedFrame { offset: start }
        } else {
            err.into()
        }
    })
}
