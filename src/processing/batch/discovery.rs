//! Enumerating the source tree.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};
use crate::reporting::ErrorRecord;
use crate::utils::{ErrorKind, OUTPUT_EXTENSION, is_archive, is_image, mirror_path};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Loose image file
    Image,
    /// Zip-based archive
    Archive,
    /// Directory packed into a new archive
    Directory,
}

/// Something found in the source tree, with where its output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub path: PathBuf,
    pub kind: SourceKind,
    pub destination: PathBuf,
}

/// Sources in deterministic order plus a warning for each unreadable entry.
#[derive(Debug, Default)]
pub struct Discovery {
    pub sources: Vec<Source>,
    pub warnings: Vec<ErrorRecord>,
}

fn with_appended_extension(path: &Path, ext: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

fn classify(path: &Path, src_root: &Path, dest_root: &Path) -> Option<Source> {
    if is_image(path) {
        Some(Source {
            path: path.to_path_buf(),
            kind: SourceKind::Image,
            destination: mirror_path(path, src_root, dest_root, None),
        })
    } else if is_archive(path) {
        Some(Source {
            path: path.to_path_buf(),
            kind: SourceKind::Archive,
            destination: mirror_path(path, src_root, dest_root, None),
        })
    } else {
        debug!("Ignoring {}", path.display());
        None
    }
}

/// Give loose images the output extension. A rename onto another source's
/// name, or onto a name an earlier image already took, keeps the original
/// extension and appends the output one instead.
fn assign_image_outputs(sources: &mut [Source]) {
    let originals: HashSet<PathBuf> = sources.iter().map(|s| s.destination.clone()).collect();
    let mut taken: HashSet<PathBuf> = HashSet::new();

    for source in sources.iter_mut() {
        if source.kind == SourceKind::Image {
            let renamed = source.destination.with_extension(OUTPUT_EXTENSION);
            let clashes = taken.contains(&renamed)
                || (renamed != source.destination && originals.contains(&renamed));
            let destination = if clashes {
                with_appended_extension(&source.destination, OUTPUT_EXTENSION)
            } else {
                renamed
            };
            if clashes {
                debug!("{} would clash, writing {}", source.path.display(), destination.display());
            }
            source.destination = destination;
        }
        taken.insert(source.destination.clone());
    }
}

fn walk_warning(err: walkdir::Error, src_root: &Path) -> ErrorRecord {
    let path = err.path().map(Path::to_path_buf).unwrap_or_else(|| src_root.to_path_buf());
    ErrorRecord::warning(path, ErrorKind::Io, format!("cannot read directory entry: {}", err))
        .with_step("discover")
}

/// Walk `src_root` in file-name order.
///
/// With `pack_directories`, every top-level directory becomes a single
/// [`SourceKind::Directory`] and is not descended into. `dest_root` is skipped
/// when it lives inside the source tree.
pub fn discover(src_root: &Path, dest_root: &Path, pack_directories: bool) -> Discovery {
    let mut discovery = Discovery::default();
    let skip_dest = |entry: &DirEntry| entry.path() != dest_root;

    let max_depth = if pack_directories { 1 } else { usize::MAX };
    let walker = WalkDir::new(src_root)
        .min_depth(1)
        .max_depth(max_depth)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(skip_dest);

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                discovery.warnings.push(walk_warning(err, src_root));
                continue;
            }
        };
        let path = entry.path();

        if entry.file_type().is_dir() {
            if pack_directories {
                let destination = with_appended_extension(&mirror_path(path, src_root, dest_root, None), "cbz");
                discovery.sources.push(Source {
                    path: path.to_path_buf(),
                    kind: SourceKind::Directory,
                    destination,
                });
            }
            continue;
        }

        if let Some(source) = classify(path, src_root, dest_root) {
            discovery.sources.push(source);
        }
    }
    assign_image_outputs(&mut discovery.sources);

    debug!(
        "Discovered {} sources under {} ({} unreadable entries)",
        discovery.sources.len(),
        src_root.display(),
        discovery.warnings.len()
    );
    discovery
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("Vol.1")).unwrap();
        fs::write(root.join("Vol.1/01.jpg"), b"").unwrap();
        fs::write(root.join("b.png"), b"").unwrap();
        fs::write(root.join("a.cbz"), b"").unwrap();
        fs::write(root.join("readme.txt"), b"").unwrap();
        dir
    }

    #[test]
    fn finds_images_and_archives_in_order() {
        let dir = tree();
        let dest = Path::new("/out");
        let found = discover(dir.path(), dest, false);

        let kinds: Vec<_> = found.sources.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![SourceKind::Image, SourceKind::Archive, SourceKind::Image]);
        assert!(found.sources[0].path.ends_with("Vol.1/01.jpg"));
        assert_eq!(found.sources[0].destination, PathBuf::from("/out/Vol.1/01.png"));
        assert_eq!(found.sources[1].destination, PathBuf::from("/out/a.cbz"));
        assert!(found.warnings.is_empty());
    }

    #[test]
    fn packs_top_level_directories() {
        let dir = tree();
        let found = discover(dir.path(), Path::new("/out"), true);

        let packed: Vec<_> = found
            .sources
            .iter()
            .filter(|s| s.kind == SourceKind::Directory)
            .collect();
        assert_eq!(packed.len(), 1);
        assert_eq!(packed[0].destination, PathBuf::from("/out/Vol.1.cbz"));
        // images inside packed directories are not loose sources
        assert!(!found.sources.iter().any(|s| s.path.ends_with("01.jpg")));
    }

    #[test]
    fn same_stem_images_get_distinct_outputs() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["page.png", "page.bmp", "page.jpg", "cover.jpg"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        let found = discover(dir.path(), Path::new("/out"), false);

        let outputs: Vec<_> = found.sources.iter().map(|s| s.destination.clone()).collect();
        assert_eq!(
            outputs,
            vec![
                PathBuf::from("/out/cover.png"),
                PathBuf::from("/out/page.bmp.png"),
                PathBuf::from("/out/page.jpg.png"),
                PathBuf::from("/out/page.png"),
            ]
        );
    }

    #[test]
    fn skips_destination_inside_source() {
        let dir = tree();
        let dest = dir.path().join("converted");
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("old.png"), b"").unwrap();

        let found = discover(dir.path(), &dest, false);
        assert!(!found.sources.iter().any(|s| s.path.starts_with(&dest)));
    }
}
