// src/fs/paths.rs

//! Lexical path helpers.
//!
//! Nothing here touches the filesystem, so the same code works against
//! [`MockFileSystem`](super::mock::MockFileSystem) in tests.

use std::path::{Component, Path, PathBuf};

/// Source extension of compiling units.
pub const SOURCE_EXTENSION: &str = "less";
/// Extension of generated output and of foreign (plain CSS) stylesheets.
pub const OUTPUT_EXTENSION: &str = "css";

/// Resolve `.` and `..` components without consulting the filesystem.
///
/// `..` at the root is dropped, matching how a shell resolves `/..`.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }

    if out.is_empty() {
        return PathBuf::from(".");
    }
    out.iter().map(|c| c.as_os_str()).collect()
}

/// Join `specifier` onto `base` and normalize lexically. An absolute specifier replaces `base`.
pub fn resolve(base: &Path, specifier: &str) -> PathBuf {
    normalize(&base.join(specifier))
}

/// Append the source extension unless the file name already carries it.
///
/// `baz/qux` becomes `baz/qux.less`, `foo/bar.less` is returned unchanged and
/// `foo/bar.min` becomes `foo/bar.min.less`.
pub fn with_source_extension(path: &Path) -> PathBuf {
    if has_extension(path, SOURCE_EXTENSION) {
        return path.to_path_buf();
    }
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(SOURCE_EXTENSION);
    path.with_file_name(name)
}

pub fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(ext)
}

/// Path of `to` relative to the directory `from_dir`, using `..` segments.
///
/// Both inputs are normalized first; when they share no prefix at all
/// (different roots) `to` is returned as-is.
pub fn relative_path(from_dir: &Path, to: &Path) -> PathBuf {
    let from = normalize(from_dir);
    let to = normalize(to);

    let from_parts: Vec<_> = from.components().collect();
    let to_parts: Vec<_> = to.components().collect();

    let common = from_parts
        .iter()
        .zip(to_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    if common == 0 && from.has_root() != to.has_root() {
        return to;
    }

    let mut rel = PathBuf::new();
    for _ in common..from_parts.len() {
        rel.push("..");
    }
    for part in &to_parts[common..] {
        rel.push(part.as_os_str());
    }

    if rel.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        rel
    }
}

/// Render a path with forward slashes, as used inside stylesheets.
pub fn to_slash(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Convert a path into a string relative to `root`, with forward slashes.
///
/// Returns `None` if `path` does not live under `root`.
pub fn relative_str(root: &Path, path: &Path) -> Option<String> {
    path.strip_prefix(root).ok().map(to_slash)
}

/// Output location of `file`: its layout relative to `source_root`, placed
/// under `output_root`, with the source extension swapped for the output one.
///
/// Files outside `source_root` keep only their file name.
pub fn destination_for(file: &Path, source_root: &Path, output_root: &Path) -> PathBuf {
    let rel = match file.strip_prefix(source_root) {
        Ok(rel) => rel.to_path_buf(),
        Err(_) => file.file_name().map(PathBuf::from).unwrap_or_default(),
    };

    let rel = if has_extension(&rel, SOURCE_EXTENSION) {
        rel.with_extension(OUTPUT_EXTENSION)
    } else {
        rel
    };

    output_root.join(rel)
}
