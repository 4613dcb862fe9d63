//! Labelled image folders.
//!
//! The expected layout is one sub-directory per class:
//!
//! ```text
//! dataset/
//!   MildDemented/       *.jpg
//!   ModerateDemented/   *.jpg
//!   NonDemented/        *.jpg
//!   VeryMildDemented/   *.jpg
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{DataError, Result};

/// File extensions recognised as images (compared case-insensitively).
pub const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "bmp", "tif", "tiff"];

/// Check whether a path has one of the [`IMAGE_EXTENSIONS`].
#[must_use]
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// One labelled image file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderEntry {
    /// Path to the image file.
    pub path: PathBuf,
    /// Index into the declared class list.
    pub label: usize,
}

/// Result of scanning a class-per-directory dataset.
#[derive(Debug, Clone)]
pub struct ImageFolder {
    root: PathBuf,
    class_names: Vec<String>,
    entries: Vec<FolderEntry>,
}

impl ImageFolder {
    /// Scan `root` for class directories and their images.
    ///
    /// Class directories are sorted by name and hidden entries are skipped.
    /// When every declared class name matches a directory, labels follow the
    /// declared order; otherwise directories are mapped to the declared
    /// classes by position.
    ///
    /// # Errors
    ///
    /// - [`DataError::MissingDirectory`] if `root` is not a directory
    /// - [`DataError::ClassCountMismatch`] if the number of class directories
    ///   differs from `class_names.len()`
    /// - [`DataError::EmptyClass`] if a class directory holds no images
    pub fn scan(root: impl AsRef<Path>, class_names: &[String]) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(DataError::MissingDirectory(root.to_path_buf()));
        }

        let class_dirs = sorted_children(root, |path| path.is_dir())?;
        let found_names: Vec<String> = class_dirs.iter().map(|dir| file_name(dir)).collect();

        if class_dirs.len() != class_names.len() {
            return Err(DataError::ClassCountMismatch {
                dir: root.to_path_buf(),
                expected: class_names.len(),
                found: class_dirs.len(),
                found_names,
            });
        }

        let by_name = class_names
            .iter()
            .all(|name| found_names.iter().any(|found| found == name));
        if !by_name {
            tracing::warn!(
                "Class directories {:?} do not match declared classes {:?}; mapping by position",
                found_names,
                class_names
            );
        }

        let mut entries = Vec::new();
        for (position, dir) in class_dirs.iter().enumerate() {
            let label = if by_name {
                let name = &found_names[position];
                class_names
                    .iter()
                    .position(|declared| declared == name)
                    .unwrap_or(position)
            } else {
                position
            };

            let files = sorted_children(dir, |path| path.is_file() && is_image_file(path))?;
            if files.is_empty() {
                return Err(DataError::EmptyClass(dir.clone()));
            }
            tracing::debug!(
                "{}: {} images -> class {} ({})",
                dir.display(),
                files.len(),
                label,
                class_names[label]
            );
            entries.extend(files.into_iter().map(|path| FolderEntry { path, label }));
        }

        entries.sort_by_key(|entry| entry.label);

        Ok(Self {
            root: root.to_path_buf(),
            class_names: class_names.to_vec(),
            entries,
        })
    }

    /// Dataset root that was scanned.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Declared class names, in label order.
    #[must_use]
    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    /// All labelled files, grouped by label.
    #[must_use]
    pub fn entries(&self) -> &[FolderEntry] {
        &self.entries
    }

    /// Number of images found.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no images were found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of images per class, in label order.
    #[must_use]
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.class_names.len()];
        for entry in &self.entries {
            counts[entry.label] += 1;
        }
        counts
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn sorted_children(dir: &Path, keep: impl Fn(&Path) -> bool) -> Result<Vec<PathBuf>> {
    let mut children = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if file_name(&path).starts_with('.') {
            continue;
        }
        if keep(&path) {
            children.push(path);
        }
    }
    children.sort();
    Ok(children)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch_images(dir: &Path, n: usize) {
        fs::create_dir_all(dir).unwrap();
        for i in 0..n {
            image::RgbImage::new(4, 4)
                .save(dir.join(format!("img_{i}.png")))
                .unwrap();
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_image_extensions() {
        assert!(is_image_file(Path::new("a/b.PNG")));
        assert!(is_image_file(Path::new("scan.jpeg")));
        assert!(!is_image_file(Path::new("notes.txt")));
        assert!(!is_image_file(Path::new("no_extension")));
    }

    #[test]
    fn test_scan_follows_declared_order() {
        let root = tempdir().unwrap();
        touch_images(&root.path().join("alpha"), 2);
        touch_images(&root.path().join("beta"), 3);
        fs::write(root.path().join("beta").join("readme.txt"), "x").unwrap();

        let folder = ImageFolder::scan(root.path(), &names(&["beta", "alpha"])).unwrap();
        assert_eq!(folder.len(), 5);
        // "beta" is declared first, so it receives label 0.
        assert_eq!(folder.class_counts(), vec![3, 2]);
        assert!(folder.entries()[0].path.starts_with(root.path().join("beta")));
    }

    #[test]
    fn test_scan_positional_fallback() {
        let root = tempdir().unwrap();
        touch_images(&root.path().join("a"), 1);
        touch_images(&root.path().join("b"), 2);

        let folder = ImageFolder::scan(root.path(), &names(&["first", "second"])).unwrap();
        assert_eq!(folder.class_counts(), vec![1, 2]);
    }

    #[test]
    fn test_class_count_mismatch() {
        let root = tempdir().unwrap();
        touch_images(&root.path().join("a"), 1);
        touch_images(&root.path().join("b"), 1);
        touch_images(&root.path().join("c"), 1);

        let err = ImageFolder::scan(root.path(), &names(&["a", "b", "c", "d"])).unwrap_err();
        match err {
            DataError::ClassCountMismatch {
                expected, found, ..
            } => {
                assert_eq!(expected, 4);
                assert_eq!(found, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_class_and_missing_root() {
        let root = tempdir().unwrap();
        touch_images(&root.path().join("a"), 1);
        fs::create_dir_all(root.path().join("b")).unwrap();

        let err = ImageFolder::scan(root.path(), &names(&["a", "b"])).unwrap_err();
        assert!(matches!(err, DataError::EmptyClass(_)));

        let err = ImageFolder::scan(root.path().join("nope"), &names(&["a"])).unwrap_err();
        assert!(matches!(err, DataError::MissingDirectory(_)));
    }
}
