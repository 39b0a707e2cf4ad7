//! Work item definition.

use std::path::{Path, PathBuf};
use serde::Serialize;

/// Identifies one archive container within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ArchiveId(pub usize);

/// Where a work item comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemKind {
    /// A standalone image file in the source tree
    LooseImage,
    /// One member of an archive container
    ArchiveMember {
        archive_id: ArchiveId,
        /// Index of the member in the original archive order
        position: usize,
        /// Entry name inside the archive
        member_name: String,
    },
}

/// A single unit of batch work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    /// The image file, or the archive containing the member
    pub source_path: PathBuf,
    pub kind: ItemKind,
}

impl WorkItem {
    pub fn loose(source_path: impl Into<PathBuf>) -> Self {
        Self {
            source_path: source_path.into(),
            kind: ItemKind::LooseImage,
        }
    }

    pub fn member(
        archive_path: impl Into<PathBuf>,
        archive_id: ArchiveId,
        position: usize,
        member_name: impl Into<String>,
    ) -> Self {
        Self {
            source_path: archive_path.into(),
            kind: ItemKind::ArchiveMember {
                archive_id,
                position,
                member_name: member_name.into(),
            },
        }
    }

    pub fn archive_id(&self) -> Option<ArchiveId> {
        match &self.kind {
            ItemKind::ArchiveMember { archive_id, .. } => Some(*archive_id),
            ItemKind::LooseImage => None,
        }
    }

    pub fn position_in_archive(&self) -> Option<usize> {
        match &self.kind {
            ItemKind::ArchiveMember { position, .. } => Some(*position),
            ItemKind::LooseImage => None,
        }
    }

    /// Path used in logs and error records: the file itself, or `archive/member`.
    pub fn display_path(&self) -> PathBuf {
        match &self.kind {
            ItemKind::LooseImage => self.source_path.clone(),
            ItemKind::ArchiveMember { member_name, .. } => self.source_path.join(member_name),
        }
    }

    pub fn source(&self) -> &Path {
        &self.source_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn members_carry_archive_position() {
        let item = WorkItem::member("/in/vol1.cbz", ArchiveId(3), 7, "p08.jpg");
        assert_eq!(item.archive_id(), Some(ArchiveId(3)));
        assert_eq!(item.position_in_archive(), Some(7));
        assert_eq!(item.display_path(), PathBuf::from("/in/vol1.cbz/p08.jpg"));

        let loose = WorkItem::loose("/in/cover.png");
        assert_eq!(loose.archive_id(), None);
        assert_eq!(loose.position_in_archive(), None);
        assert_eq!(loose.display_path(), PathBuf::from("/in/cover.png"));
    }
}
