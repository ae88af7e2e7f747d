//! Directory traversal for manifest building and watch registration.
//!
//! Walking is iterative (walkdir keeps an explicit stack of open
//! directories) and paths are always built with `Path::join`.

use std::fs::Metadata;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Options for directory walking
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// Follow symbolic links into directories
    pub follow_links: bool,

    /// Maximum depth (None = unlimited)
    pub max_depth: Option<usize>,

    /// File-name substrings to skip, together with everything below them
    pub exclude_patterns: Vec<String>,
}

impl WalkOptions {
    pub fn with_excludes(exclude_patterns: Vec<String>) -> Self {
        Self {
            exclude_patterns,
            ..Self::default()
        }
    }
}

/// A regular file discovered during walking
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// Full path to the file
    pub path: PathBuf,

    /// Relative path from the root
    pub relative_path: PathBuf,

    /// Metadata of the file, or of the symlink target
    pub metadata: Metadata,

    /// Is this a symlink?
    pub is_symlink: bool,
}

impl FileInfo {
    /// Returns None for directories, symlinks to directories and broken symlinks.
    fn from_entry(entry: &DirEntry, root: &Path) -> std::io::Result<Option<Self>> {
        let path = entry.path().to_path_buf();
        let relative_path = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
        let is_symlink = entry.path_is_symlink();

        let metadata = if is_symlink {
            match std::fs::metadata(&path) {
                Ok(resolved) => resolved,
                Err(_) => return Ok(None),
            }
        } else {
            entry.metadata()?
        };

        if !metadata.is_file() {
            return Ok(None);
        }

        Ok(Some(Self {
            path,
            relative_path,
            metadata,
            is_symlink,
        }))
    }
}

fn walker(root: &Path, options: &WalkOptions) -> impl Iterator<Item = walkdir::Result<DirEntry>> {
    let mut walker = WalkDir::new(root).follow_links(options.follow_links);

    if let Some(max_depth) = options.max_depth {
        walker = walker.max_depth(max_depth);
    }

    let patterns = options.exclude_patterns.clone();
    walker
        .into_iter()
        .filter_entry(move |entry| entry.depth() == 0 || !should_exclude(entry, &patterns))
}

/// Walk a directory tree and collect all regular files
pub fn walk_files(root: &Path, options: &WalkOptions) -> std::io::Result<Vec<FileInfo>> {
    let mut files = Vec::new();

    for entry in walker(root, options) {
        let entry = entry?;

        if entry.file_type().is_dir() {
            continue;
        }

        if let Some(file_info) = FileInfo::from_entry(&entry, root)? {
            files.push(file_info);
        }
    }

    Ok(files)
}

/// Walk a directory tree and collect every directory below `root` (not `root` itself)
pub fn walk_directories(root: &Path, options: &WalkOptions) -> std::io::Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();

    for entry in walker(root, options) {
        let entry = entry?;
        if entry.depth() > 0 && entry.file_type().is_dir() {
            dirs.push(entry.into_path());
        }
    }

    Ok(dirs)
}

/// Check if any component of `path` matches one of the exclude patterns
pub fn is_excluded(path: &Path, patterns: &[String]) -> bool {
    path.iter()
        .any(|name| name_matches(&name.to_string_lossy(), patterns))
}

fn should_exclude(entry: &DirEntry, patterns: &[String]) -> bool {
    name_matches(&entry.file_name().to_string_lossy(), patterns)
}

fn name_matches(file_name: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|pattern| file_name.contains(pattern.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_walk_empty_directory() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let files = walk_files(temp_dir.path(), &WalkOptions::default())?;
        assert_eq!(files.len(), 0);
        Ok(())
    }

    #[test]
    fn test_walk_with_subdirectories() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::create_dir_all(temp_dir.path().join("subdir/deeper"))?;
        fs::write(temp_dir.path().join("file1.txt"), b"content1")?;
        fs::write(temp_dir.path().join("subdir/file2.txt"), b"content22")?;
        fs::write(temp_dir.path().join("subdir/deeper/file3.txt"), b"c")?;

        let mut files = walk_files(temp_dir.path(), &WalkOptions::default())?;
        files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

        let relative: Vec<_> = files.iter().map(|f| f.relative_path.clone()).collect();
        assert_eq!(
            relative,
            vec![
                PathBuf::from("file1.txt"),
                PathBuf::from("subdir/deeper/file3.txt"),
                PathBuf::from("subdir/file2.txt"),
            ]
        );
        assert_eq!(files[2].metadata.len(), 9);

        Ok(())
    }

    #[test]
    fn test_walk_directories() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::create_dir_all(temp_dir.path().join("a/b"))?;
        fs::create_dir(temp_dir.path().join("c"))?;
        fs::write(temp_dir.path().join("a/file.txt"), b"x")?;

        let mut dirs = walk_directories(temp_dir.path(), &WalkOptions::default())?;
        dirs.sort();

        assert_eq!(
            dirs,
            vec![
                temp_dir.path().join("a"),
                temp_dir.path().join("a/b"),
                temp_dir.path().join("c"),
            ]
        );

        Ok(())
    }

    #[test]
    fn test_exclude_patterns_prune_subtrees() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::create_dir(temp_dir.path().join(".git"))?;
        fs::write(temp_dir.path().join(".git/HEAD"), b"ref")?;
        fs::write(temp_dir.path().join("file.txt"), b"keep")?;
        fs::write(temp_dir.path().join(".DS_Store"), b"exclude")?;

        let options = WalkOptions::with_excludes(vec![".git".to_string(), ".DS_Store".to_string()]);
        let files = walk_files(temp_dir.path(), &options)?;
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative_path, PathBuf::from("file.txt"));

        assert!(walk_directories(temp_dir.path(), &options)?.is_empty());

        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn test_symlinks_resolve_to_target_size() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::write(temp_dir.path().join("target.txt"), b"12345")?;
        std::os::unix::fs::symlink(temp_dir.path().join("target.txt"), temp_dir.path().join("link.txt"))?;
        std::os::unix::fs::symlink(temp_dir.path().join("missing"), temp_dir.path().join("broken"))?;

        let files = walk_files(temp_dir.path(), &WalkOptions::default())?;
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.metadata.len() == 5));
        assert!(files.iter().any(|f| f.is_symlink));

        Ok(())
    }

    #[test]
    fn test_is_excluded() {
        let patterns = vec!["~".to_string()];
        assert!(is_excluded(Path::new("/data/notes.txt~"), &patterns));
        assert!(!is_excluded(Path::new("/data/notes.txt"), &patterns));

        let patterns = vec![".git".to_string()];
        assert!(is_excluded(Path::new(".git/objects/ab"), &patterns));
        assert!(!is_excluded(Path::new("src/main.rs"), &patterns));
    }
}
