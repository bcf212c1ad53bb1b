// src/deps/directives.rs

//! Extraction of `@import` directives.
//!
//! Only the directive itself is understood: an optional `(option)` and a
//! quoted specifier, optionally followed by a media list, up to `;`. The
//! media list may span several lines.

use std::fmt;
use std::ops::Range;
use std::path::Path;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::fs::paths::{has_extension, OUTPUT_EXTENSION};

static IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?m)^[ \t]*@import\s+(?:\((less|css|multiple|once|inline|reference)\)\s*)?["']([^"'\n]+)["'][^;]*;"#,
    )
    .expect("import directive pattern is valid")
});

/// The parenthesised option of an import directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImportOption {
    Less,
    Css,
    Multiple,
    Once,
    Inline,
    Reference,
}

impl FromStr for ImportOption {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "less" => Ok(ImportOption::Less),
            "css" => Ok(ImportOption::Css),
            "multiple" => Ok(ImportOption::Multiple),
            "once" => Ok(ImportOption::Once),
            "inline" => Ok(ImportOption::Inline),
            "reference" => Ok(ImportOption::Reference),
            other => Err(format!("unknown import option: {other}")),
        }
    }
}

impl fmt::Display for ImportOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ImportOption::Less => "less",
            ImportOption::Css => "css",
            ImportOption::Multiple => "multiple",
            ImportOption::Once => "once",
            ImportOption::Inline => "inline",
            ImportOption::Reference => "reference",
        };
        f.write_str(s)
    }
}

/// One `@import` found in a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDirective<'a> {
    pub option: Option<ImportOption>,
    pub specifier: &'a str,
    /// Byte range of the whole directive (including leading indentation and
    /// the trailing `;`) within the scanned text.
    pub span: Range<usize>,
}

impl ImportDirective<'_> {
    /// True when the import points at a plain stylesheet outside the
    /// compilation domain: `(css)`, `(inline)` or a `.css` specifier.
    ///
    /// Such imports never become graph edges.
    pub fn is_foreign(&self) -> bool {
        matches!(self.option, Some(ImportOption::Css) | Some(ImportOption::Inline))
            || has_extension(Path::new(self.specifier), OUTPUT_EXTENSION)
    }
}

/// Scan `content` for import directives, in source order.
pub fn scan_imports(content: &str) -> Vec<ImportDirective<'_>> {
    IMPORT_RE
        .captures_iter(content)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let specifier = caps.get(2)?.as_str();
            let option = caps.get(1).and_then(|m| m.as_str().parse().ok());
            Some(ImportDirective {
                option,
                specifier,
                span: whole.range(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_specifier_and_option() {
        let src = "@import \"a.less\";\n  @import (reference) 'mixins';\n.x { color: red; }\n";
        let found = scan_imports(src);

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].specifier, "a.less");
        assert_eq!(found[0].option, None);
        assert_eq!(found[1].specifier, "mixins");
        assert_eq!(found[1].option, Some(ImportOption::Reference));
        assert_eq!(&src[found[0].span.clone()], "@import \"a.less\";");
    }

    #[test]
    fn media_list_is_allowed_after_specifier() {
        let found = scan_imports("@import \"print.less\" print, screen;\n");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].specifier, "print.less");
    }

    #[test]
    fn media_list_may_continue_on_next_line() {
        let src = "@import \"print.less\" print,\n  screen;\na{}\n";
        let found = scan_imports(src);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].specifier, "print.less");
        assert_eq!(&src[found[0].span.clone()], "@import \"print.less\" print,\n  screen;");
    }

    #[test]
    fn foreign_imports_are_flagged() {
        let found = scan_imports(
            "@import (css) \"x.less\";\n@import (inline) \"y.less\";\n@import \"z.css\";\n@import (less) \"w\";\n",
        );
        let foreign: Vec<bool> = found.iter().map(|d| d.is_foreign()).collect();
        assert_eq!(foreign, vec![true, true, true, false]);
    }

    #[test]
    fn directives_must_start_a_line() {
        assert!(scan_imports(".a { content: '@import \"b.less\";' }").is_empty());
    }
}
