//! Directory tree traversal for recursive registration.
//!
//! [`DirectoryWalker`] uses the `ignore` crate's walker with every filter
//! disabled: hidden directories and directories listed in `.gitignore` are
//! still part of the tree being watched. Symbolic links below the root are
//! never followed; a root given as a link to a directory is walked through
//! the link.
//!
//! Directories are yielded in pre-order (a directory before any of its
//! descendants) so that a directory is always watched before its children.
//!
//! # Examples
//!
//! ```no_run
//! use camino::Utf8Path;
//! use dw_watcher::DirectoryWalker;
//!
//! let walker = DirectoryWalker::new(Utf8Path::new("/srv/dic"));
//! for dir in walker.directories() {
//!     match dir {
//!         Ok(dir) => println!("directory: {dir}"),
//!         Err(err) => eprintln!("skipped: {err}"),
//!     }
//! }
//! ```

use camino::{Utf8Path, Utf8PathBuf};
use ignore::{DirEntry, WalkBuilder};

use crate::error::WatchError;

/// Walks a directory tree, yielding every directory in pre-order.
#[derive(Debug, Clone)]
pub struct DirectoryWalker {
    /// The directory the walk starts from (yielded first).
    root: Utf8PathBuf,
}

impl DirectoryWalker {
    /// Creates a walker rooted at `root`.
    #[must_use]
    pub fn new(root: &Utf8Path) -> Self {
        Self {
            root: root.to_owned(),
        }
    }

    /// Returns the root directory being walked.
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Iterates over the root and all descendant directories.
    ///
    /// Entries that cannot be read (permission denied, removed mid-walk) are
    /// yielded as errors; the walk continues past them.
    pub fn directories(&self) -> impl Iterator<Item = Result<Utf8PathBuf, WatchError>> + use<> {
        self.build_walker().filter_map(|entry| match entry {
            Ok(entry) if is_directory(&entry) => Some(
                Utf8PathBuf::from_path_buf(entry.into_path()).map_err(WatchError::non_utf8_path),
            ),
            Ok(_) => None,
            Err(err) => Some(Err(WatchError::Walk(err))),
        })
    }

    /// Builds the ignore walker with every filter disabled.
    fn build_walker(&self) -> ignore::Walk {
        WalkBuilder::new(&self.root)
            // Watch everything: hidden entries, ignored entries, all of it
            .standard_filters(false)
            .follow_links(false)
            // Stable sibling order keeps registration order reproducible
            .sort_by_file_name(|a, b| a.cmp(b))
            .build()
    }
}

/// Returns `true` for real directories, and for a root that links to one.
fn is_directory(entry: &DirEntry) -> bool {
    if entry.depth() == 0 {
        return entry.path().is_dir();
    }
    entry.file_type().is_some_and(|ft| ft.is_dir())
}
