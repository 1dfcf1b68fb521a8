//! Sparse cluster index and timecode lookup.
//!
//! Entries come from the seek head in discovery order with their timecodes
//! unresolved. Timecodes are filled in lazily, either by a probe that reads
//! just the cluster's `Timestamp` or by the frame queue when it reads the
//! whole cluster.

use crate::error::Result;

/// One indexed cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClusterEntry {
    /// Ordinal in discovery order.
    pub cluster_no: u32,
    /// Absolute file offset of the cluster header.
    pub position: u64,
    /// Cluster timecode in nanoseconds, once resolved.
    pub timecode: Option<u64>,
}

/// Resolves the timecode of the cluster at a file position.
pub trait TimecodeProbe {
    /// Timecode in nanoseconds of the cluster whose header is at `position`.
    fn probe(&mut self, position: u64) -> Result<u64>;
}

impl<F> TimecodeProbe for F
where
    F: FnMut(u64) -> Result<u64>,
{
    fn probe(&mut self, position: u64) -> Result<u64> {
        self(position)
    }
}

/// Cluster positions with lazily resolved timecodes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterIndex {
    entries: Vec<ClusterEntry>,
}

impl ClusterIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a cluster position. Positions already present are ignored.
    pub fn push(&mut self, position: u64) -> bool {
        if self.entries.iter().any(|e| e.position == position) {
            return false;
        }
        self.entries.push(ClusterEntry {
            cluster_no: self.entries.len() as u32,
            position,
            timecode: None,
        });
        true
    }

    /// Renumber entries in discovery order.
    pub fn finalize(&mut self) {
        for (i, entry) in self.entries.iter_mut().enumerate() {
            entry.cluster_no = i as u32;
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry at `index`.
    pub fn get(&self, index: usize) -> Option<&ClusterEntry> {
        self.entries.get(index)
    }

    /// All entries.
    pub fn entries(&self) -> &[ClusterEntry] {
        &self.entries
    }

    /// Index of the entry at a file position.
    pub fn index_of(&self, position: u64) -> Option<usize> {
        self.entries.iter().position(|e| e.position == position)
    }

    /// Store the timecode of the entry at `index`.
    pub fn set_timecode(&mut self, index: usize, timecode: u64) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.timecode = Some(timecode);
        }
    }

    /// Timecode of the entry at `index`, probing it if still unresolved.
    pub fn resolve<P: TimecodeProbe + ?Sized>(&mut self, index: usize, probe: &mut P) -> Option<u64> {
        let entry = self.entries.get_mut(index)?;
        if let Some(timecode) = entry.timecode {
            return Some(timecode);
        }
        match probe.probe(entry.position) {
            Ok(timecode) => {
                entry.timecode = Some(timecode);
                Some(timecode)
            }
            Err(e) => {
                tracing::warn!(
                    position = entry.position,
                    error = %e,
                    "failed to resolve cluster timecode"
                );
                None
            }
        }
    }

    /// Find the cluster holding `target` (nanoseconds).
    ///
    /// Starts from a linear interpolation over `duration` and walks towards
    /// the target one entry at a time. A `duration` of 0 means unknown: any
    /// target short of `u64::MAX` may then land on the last cluster.
    pub fn find<P: TimecodeProbe + ?Sized>(
        &mut self,
        target: u64,
        duration: u64,
        probe: &mut P,
    ) -> Option<usize> {
        let count = self.entries.len();
        if count == 0 {
            return None;
        }
        if target == 0 {
            return Some(0);
        }

        let mut index = if duration > 0 {
            ((count as f64 / duration as f64) * target as f64) as usize
        } else {
            0
        };
        index = index.min(count - 1);

        for _ in 0..=count {
            let current = self.resolve(index, probe)?;
            if current == target {
                return Some(index);
            }

            if index > 0 {
                let prev = self.resolve(index - 1, probe)?;
                if current > target && target > prev {
                    return Some(index - 1);
                }
                if prev == target {
                    return Some(index - 1);
                }
                if target < prev {
                    index -= 1;
                    continue;
                }
            }

            if index + 1 < count {
                let next = self.resolve(index + 1, probe)?;
                if current < target && target < next {
                    return Some(index);
                }
                if next == target {
                    return Some(index + 1);
                }
                if target > next {
                    index += 1;
                    continue;
                }
            }

            let in_range = if duration == 0 {
                target != u64::MAX
            } else {
                target <= duration
            };
            return in_range.then_some(index);
        }

        None
    }
}
