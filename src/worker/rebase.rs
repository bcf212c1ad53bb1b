// src/worker/rebase.rs

//! Rewriting of relative `url(...)` references in imported content.

use std::borrow::Cow;
use std::path::Path;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::fs::paths::{normalize, relative_path, to_slash};

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"url\(\s*(["']?)([^"')\s]+)(["']?)\s*\)"#).expect("valid url regex")
});

/// Rewrite every relative `url(...)` in `content` so that a reference
/// written relative to `from_dir` resolves the same way from `base_dir`.
///
/// Absolute paths, schemes (`http://`, `data:`), fragments and
/// interpolated values are left alone.
pub fn rebase_urls<'a>(content: &'a str, from_dir: &Path, base_dir: &Path) -> Cow<'a, str> {
    if from_dir == base_dir {
        return Cow::Borrowed(content);
    }

    URL_RE.replace_all(content, |caps: &Captures<'_>| {
        let whole = &caps[0];
        let target = &caps[2];
        if !is_relative_reference(target) {
            return whole.to_string();
        }
        let absolute = normalize(&from_dir.join(target));
        let rebased = to_slash(&relative_path(base_dir, &absolute));
        format!("url({}{}{})", &caps[1], rebased, &caps[3])
    })
}

fn is_relative_reference(target: &str) -> bool {
    !(target.starts_with('/')
        || target.starts_with('#')
        || target.starts_with('@')
        || target.starts_with('~')
        || target.starts_with("data:")
        || target.contains("://")
        || target.contains("@{"))
}
