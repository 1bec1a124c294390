//! Rebuilds logical entries from frames that may arrive interleaved.
//!
//! Frames are bucketed by grouping id. A bucket is complete once it holds
//! exactly the indices `0..chunks`; complete buckets are decoded and returned
//! in the order their first frame was seen. Incomplete buckets are handed back
//! so the caller can retry once the rest of their frames have been appended.

use std::collections::HashMap;

use super::codec::{DataChunk, DataEntry};

/// Outcome of a reassembly pass.
#[derive(Debug, Default)]
pub struct Reassembled {
    /// Decoded entries, ordered by the position of their first frame.
    pub entries: Vec<DataEntry>,
    /// Frames of entries that are not complete yet.
    pub remaining: Vec<DataChunk>,
}

enum Assembly {
    Complete(Vec<u8>),
    Incomplete,
    Corrupt(&'static str),
}

/// Groups `chunks` by grouping id and decodes every complete group.
///
/// Groups whose bytes fail to decode, or whose frames contradict each other,
/// can never become valid and are logged and dropped.
#[must_use]
pub fn reassemble(chunks: Vec<DataChunk>) -> Reassembled {
    let mut groups: Vec<Vec<DataChunk>> = Vec::new();
    let mut slots: HashMap<Vec<u8>, usize> = HashMap::new();
    for chunk in chunks {
        if let Some(&slot) = slots.get(&chunk.id) {
            groups[slot].push(chunk);
        } else {
            slots.insert(chunk.id.clone(), groups.len());
            groups.push(vec![chunk]);
        }
    }

    let mut result = Reassembled::default();
    for mut group in groups {
        match assemble(&mut group) {
            Assembly::Complete(bytes) => match DataEntry::decode(&bytes) {
                Ok(entry) => result.entries.push(entry),
                Err(err) => {
                    tracing::warn!(
                        group = %hex::encode(&group[0].id),
                        %err,
                        "skipping undecodable entry"
                    );
                }
            },
            Assembly::Incomplete => result.remaining.extend(group),
            Assembly::Corrupt(reason) => {
                tracing::warn!(
                    group = %hex::encode(&group[0].id),
                    reason,
                    "dropping inconsistent frame group"
                );
            }
        }
    }

    tracing::debug!(
        entries = result.entries.len(),
        remaining = result.remaining.len(),
        "reassembled frames"
    );
    result
}

fn assemble(group: &mut [DataChunk]) -> Assembly {
    let total = usize::from(group[0].chunks);
    if total == 0 {
        return Assembly::Corrupt("frame count is zero");
    }
    if group.iter().any(|chunk| usize::from(chunk.chunks) != total) {
        return Assembly::Corrupt("frames disagree on frame count");
    }
    if group.len() > total {
        return Assembly::Corrupt("more frames than announced");
    }

    // Frames of one writer arrive in order; sorting only matters for
    // leftovers merged with frames read later.
    group.sort_by_key(|chunk| chunk.index);
    for pair in group.windows(2) {
        if pair[0].index == pair[1].index {
            return Assembly::Corrupt("duplicate frame index");
        }
    }
    if group.len() < total
        || group
            .iter()
            .enumerate()
            .any(|(position, chunk)| usize::from(chunk.index) != position)
    {
        return Assembly::Incomplete;
    }

    let size = group.iter().map(|chunk| chunk.data.len()).sum();
    let mut bytes = Vec::with_capacity(size);
    for chunk in group.iter() {
        bytes.extend_from_slice(&chunk.data);
    }
    Assembly::Complete(bytes)
}
