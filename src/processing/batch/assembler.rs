//! Per-archive result buffer.
//!
//! Members finish in any order; results are slotted by their original
//! position and handed out once, in order, when the last member lands.

use std::path::PathBuf;
use parking_lot::Mutex;
use tracing::warn;
use crate::core::ArchiveId;
use crate::processing::ArchiveEntry;

#[derive(Debug)]
enum Slot {
    Pending,
    Done(Vec<u8>),
    Failed,
}

#[derive(Debug)]
struct AssemblyInner {
    slots: Vec<Slot>,
    remaining: usize,
}

/// Members of a finished archive, ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedArchive {
    /// Successful members in original order
    pub entries: Vec<ArchiveEntry>,
    /// Members that failed or were never dispatched
    pub failed: usize,
}

#[derive(Debug)]
pub struct ArchiveAssembly {
    pub id: ArchiveId,
    pub source: PathBuf,
    pub destination: PathBuf,
    /// Output entry name for each position
    names: Vec<String>,
    inner: Mutex<AssemblyInner>,
}

impl ArchiveAssembly {
    pub fn new(id: ArchiveId, source: PathBuf, destination: PathBuf, names: Vec<String>) -> Self {
        let slots = names.iter().map(|_| Slot::Pending).collect();
        let remaining = names.len();
        Self {
            id,
            source,
            destination,
            names,
            inner: Mutex::new(AssemblyInner { slots, remaining }),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn output_name(&self, position: usize) -> Option<&str> {
        self.names.get(position).map(String::as_str)
    }

    /// Store the result for `position` (`None` marks a failure).
    ///
    /// Returns the assembled archive to exactly one caller: the one that
    /// filled the last pending slot.
    pub fn complete(&self, position: usize, result: Option<Vec<u8>>) -> Option<CompletedArchive> {
        let mut inner = self.inner.lock();
        match inner.slots.get(position) {
            Some(Slot::Pending) => {}
            Some(_) => {
                warn!("Member {} of {} completed twice, ignoring", position, self.source.display());
                return None;
            }
            None => {
                warn!("Member {} is out of range for {}", position, self.source.display());
                return None;
            }
        }

        inner.slots[position] = match result {
            Some(data) => Slot::Done(data),
            None => Slot::Failed,
        };
        inner.remaining -= 1;
        if inner.remaining > 0 {
            return None;
        }

        let slots = std::mem::take(&mut inner.slots);
        drop(inner);

        let mut entries = Vec::with_capacity(slots.len());
        let mut failed = 0;
        for (slot, name) in slots.into_iter().zip(&self.names) {
            match slot {
                Slot::Done(data) => entries.push(ArchiveEntry::new(name.clone(), data)),
                Slot::Failed | Slot::Pending => failed += 1,
            }
        }
        Some(CompletedArchive { entries, failed })
    }

    /// Mark every still-pending slot from `position` on as failed.
    /// Used when dispatch stops partway through an archive.
    pub fn abandon_from(&self, position: usize) -> Option<CompletedArchive> {
        let mut completed = None;
        for pos in position..self.len() {
            let pending = matches!(self.inner.lock().slots.get(pos), Some(Slot::Pending));
            if pending {
                if let Some(done) = self.complete(pos, None) {
                    completed = Some(done);
                }
            }
        }
        completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn assembly(n: usize) -> ArchiveAssembly {
        let names = (0..n).map(|i| format!("p{}.png", i)).collect();
        ArchiveAssembly::new(ArchiveId(0), "in.cbz".into(), "out.cbz".into(), names)
    }

    #[test]
    fn reassembles_in_original_order() {
        let assembly = assembly(4);
        for pos in [2, 0, 3] {
            assert!(assembly.complete(pos, Some(vec![pos as u8])).is_none());
        }
        let done = assembly.complete(1, Some(vec![1])).unwrap();

        let names: Vec<_> = done.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["p0.png", "p1.png", "p2.png", "p3.png"]);
        let data: Vec<_> = done.entries.iter().map(|e| e.data[0]).collect();
        assert_eq!(data, vec![0, 1, 2, 3]);
        assert_eq!(done.failed, 0);
    }

    #[test]
    fn failed_members_are_skipped() {
        let assembly = assembly(3);
        assembly.complete(0, Some(vec![0]));
        assembly.complete(1, None);
        let done = assembly.complete(2, Some(vec![2])).unwrap();
        assert_eq!(done.failed, 1);
        assert_eq!(done.entries.len(), 2);
        assert_eq!(done.entries[1].name, "p2.png");
    }

    #[test]
    fn duplicate_completion_is_ignored() {
        let assembly = assembly(2);
        assembly.complete(0, Some(vec![0]));
        assert!(assembly.complete(0, Some(vec![9])).is_none());
        assert!(assembly.complete(7, None).is_none());
        assert!(assembly.complete(1, Some(vec![1])).is_some());
    }

    #[test]
    fn concurrent_completion_hands_out_once() {
        let assembly = Arc::new(assembly(64));
        let handed_out = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..64)
                .rev()
                .map(|pos| {
                    let assembly = Arc::clone(&assembly);
                    scope.spawn(move || assembly.complete(pos, Some(vec![pos as u8])))
                })
                .collect();
            handles
                .into_iter()
                .filter_map(|h| h.join().unwrap())
                .collect::<Vec<_>>()
        });

        assert_eq!(handed_out.len(), 1);
        let order: Vec<_> = handed_out[0].entries.iter().map(|e| e.data[0]).collect();
        assert_eq!(order, (0..64).map(|i| i as u8).collect::<Vec<_>>());
    }

    #[test]
    fn abandoning_finishes_the_archive() {
        let assembly = assembly(4);
        assembly.complete(0, Some(vec![0]));
        assembly.complete(1, Some(vec![1]));
        let done = assembly.abandon_from(2).unwrap();
        assert_eq!(done.failed, 2);
        assert_eq!(done.entries.len(), 2);
    }
}
