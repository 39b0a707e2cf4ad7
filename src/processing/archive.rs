//! Zip-based comic archives: reading members in order and writing them back.

use std::collections::HashSet;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};
use crate::utils::{OUTPUT_EXTENSION, PressError, PressResult, is_image, write_atomic_blocking};

/// One member of an archive, in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Entry name, `/`-separated
    pub name: String,
    pub data: Vec<u8>,
}

impl ArchiveEntry {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub fn is_image(&self) -> bool {
        is_image(&self.name)
    }
}

fn zip_error(path: &Path, err: ZipError) -> PressError {
    let transient = matches!(err, ZipError::Io(_));
    PressError::archive(path, err, transient)
}

/// Read every file entry of a zip archive in stored order. Directory entries are dropped.
pub fn read_archive(path: &Path) -> PressResult<Vec<ArchiveEntry>> {
    let file = std::fs::File::open(path)
        .map_err(|e| PressError::archive(path, format!("cannot open: {}", e), true))?;
    let mut archive = ZipArchive::new(file).map_err(|e| zip_error(path, e))?;

    let mut entries = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let mut member = archive.by_index(index).map_err(|e| zip_error(path, e))?;
        if member.is_dir() {
            continue;
        }
        let name = member.name().to_string();
        let mut data = Vec::with_capacity(member.size() as usize);
        member
            .read_to_end(&mut data)
            .map_err(|e| PressError::archive(path, format!("cannot read member {}: {}", name, e), true))?;
        entries.push(ArchiveEntry { name, data });
    }
    debug!("Read {} members from {}", entries.len(), path.display());
    Ok(entries)
}

/// Collect the images below `dir` as archive members, sorted by relative path.
pub fn read_directory(dir: &Path) -> PressResult<Vec<ArchiveEntry>> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(|e| PressError::archive(dir, e, true))?;
        if !entry.file_type().is_file() || !is_image(entry.path()) {
            continue;
        }
        let rel = entry.path().strip_prefix(dir).unwrap_or(entry.path());
        let name = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let data = std::fs::read(entry.path()).map_err(|e| PressError::io(entry.path(), e))?;
        entries.push(ArchiveEntry { name, data });
    }
    Ok(entries)
}

/// Write `entries` as a new zip at `path`, deflated at `level` (1..=9).
/// Returns the size of the written archive.
pub fn write_archive(path: &Path, entries: &[ArchiveEntry], level: u8) -> PressResult<u64> {
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(i64::from(level.clamp(1, 9))));

    write_atomic_blocking(path, |file| {
        let mut writer = ZipWriter::new(file);
        for entry in entries {
            writer
                .start_file(entry.name.as_str(), options)
                .map_err(|e| zip_error(path, e))?;
            writer
                .write_all(&entry.data)
                .map_err(|e| PressError::archive(path, format!("cannot write {}: {}", entry.name, e), true))?;
        }
        writer.finish().map_err(|e| zip_error(path, e))?;
        Ok(())
    })?;

    let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    debug!("Wrote {} members to {} ({} bytes)", entries.len(), path.display(), size);
    Ok(size)
}

/// Output names for `entries`: images get the output extension, other
/// members keep their name. A rename that would clash keeps the original
/// name and appends the extension.
pub fn output_names(entries: &[ArchiveEntry]) -> Vec<String> {
    let originals: HashSet<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    let mut taken: HashSet<String> = HashSet::new();

    entries
        .iter()
        .map(|entry| {
            let name = if entry.is_image() {
                let renamed = PathBuf::from(&entry.name)
                    .with_extension(OUTPUT_EXTENSION)
                    .to_string_lossy()
                    .replace('\\', "/");
                let clashes = taken.contains(&renamed)
                    || (renamed != entry.name && originals.contains(renamed.as_str()));
                if clashes {
                    format!("{}.{}", entry.name, OUTPUT_EXTENSION)
                } else {
                    renamed
                }
            } else {
                entry.name.clone()
            };
            taken.insert(name.clone());
            name
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_zip(path: &Path, members: &[(&str, &[u8])]) {
        let file = std::fs::File::create(path).unwrap();
        let mut writer = ZipWriter::new(file);
        writer.add_directory("pages/", SimpleFileOptions::default()).unwrap();
        for (name, data) in members {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn reads_members_in_stored_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vol.cbz");
        write_zip(&path, &[("pages/b.jpg", b"b"), ("pages/a.jpg", b"a"), ("ComicInfo.xml", b"<x/>")]);

        let entries = read_archive(&path).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["pages/b.jpg", "pages/a.jpg", "ComicInfo.xml"]);
        assert!(entries[0].is_image());
        assert!(!entries[2].is_image());
    }

    #[test]
    fn written_archive_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/vol.cbz");
        let entries = vec![
            ArchiveEntry::new("p2.png", vec![2; 64]),
            ArchiveEntry::new("p1.png", vec![1; 64]),
        ];
        assert!(write_archive(&path, &entries, 6).unwrap() > 0);
        assert_eq!(read_archive(&path).unwrap(), entries);
    }

    #[test]
    fn corrupt_archive_is_permanent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.cbz");
        std::fs::write(&path, b"not a zip at all").unwrap();

        let err = read_archive(&path).unwrap_err();
        assert!(matches!(err, PressError::Archive { transient: false, .. }));
    }

    #[test]
    fn missing_archive_is_transient() {
        let err = read_archive(Path::new("/nonexistent/vol.cbz")).unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn renames_images_without_collisions() {
        let entries = vec![
            ArchiveEntry::new("01.jpg", vec![]),
            ArchiveEntry::new("01.png", vec![]),
            ArchiveEntry::new("ComicInfo.xml", vec![]),
            ArchiveEntry::new("sub/02.webp", vec![]),
        ];
        assert_eq!(
            output_names(&entries),
            vec!["01.jpg.png", "01.png", "ComicInfo.xml", "sub/02.png"]
        );
    }

    #[test]
    fn directory_members_are_sorted_images() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("ch2")).unwrap();
        std::fs::write(dir.path().join("ch2/01.png"), b"c").unwrap();
        std::fs::write(dir.path().join("02.jpg"), b"b").unwrap();
        std::fs::write(dir.path().join("01.jpg"), b"a").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"skip").unwrap();

        let names: Vec<_> = read_directory(dir.path()).unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["01.jpg", "02.jpg", "ch2/01.png"]);
    }
}
