//! Generators for input image trees.
//!
//! ```
//! use imagebench_test::fixtures::ImageTree;
//!
//! let tree = ImageTree::new();
//! tree.folder("w512", 3, 512, 384);
//! assert!(tree.input_dir().join("w512/img0.jpg").exists());
//! ```

use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use tempfile::TempDir;

/// A temporary benchmark layout with `input`, `output` and `summary` directories.
///
/// Everything is deleted when the tree is dropped.
#[derive(Debug)]
pub struct ImageTree {
    root: TempDir,
}

impl ImageTree {
    /// Creates an empty tree with an existing input directory.
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("input")).unwrap();
        Self { root }
    }

    /// Root directory of the tree.
    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Directory holding one subfolder per group.
    pub fn input_dir(&self) -> PathBuf {
        self.root().join("input")
    }

    /// Directory for processed results. Not created up front.
    pub fn output_dir(&self) -> PathBuf {
        self.root().join("output")
    }

    /// Directory for result tables. Not created up front.
    pub fn summary_dir(&self) -> PathBuf {
        self.root().join("summary")
    }

    /// Writes `count` JPEG images named `img{i}.jpg` into the input folder `name`.
    pub fn folder(&self, name: &str, count: usize, width: u32, height: u32) -> Vec<PathBuf> {
        let dir = self.input_dir().join(name);
        std::fs::create_dir_all(&dir).unwrap();

        (0..count)
            .map(|i| {
                let path = dir.join(format!("img{i}.jpg"));
                write_image(&path, width, height);
                path
            })
            .collect()
    }
}

impl Default for ImageTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes a solid-color image, encoded according to the extension of `path`.
pub fn write_image(path: &Path, width: u32, height: u32) {
    RgbImage::from_pixel(width, height, Rgb([200, 120, 40]))
        .save(path)
        .unwrap();
}
