// src/worker/compiler.rs

//! Stylesheet compilers used by workers.
//!
//! Compilation itself sits behind [`StylesheetCompiler`]. Whatever the
//! compiler, import resolution is delegated back to the worker through
//! [`ImportResolver`] so the worker's path cache and rebase handling apply.

use std::collections::HashSet;
use std::fmt::Debug;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::Context;
use tracing::{debug, trace, warn};

use crate::config::WorkerOptions;
use crate::deps::{scan_imports, ImportOption};
use crate::errors::{ClusterError, Result};

/// A resolved import: where it lives and the text to splice in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImport {
    pub path: PathBuf,
    pub content: String,
}

/// Callback through which a compiler locates and loads imports.
pub trait ImportResolver {
    fn resolve_import(&mut self, specifier: &str, importer: &Path) -> Result<ResolvedImport>;
}

pub trait StylesheetCompiler: Send + Sync + Debug {
    /// Compile `source` (the contents of `file`) into CSS text.
    fn compile(
        &self,
        file: &Path,
        source: &str,
        imports: &mut dyn ImportResolver,
    ) -> Result<String>;
}

/// Pick the compiler described by the worker options.
pub fn compiler_from_options(options: &WorkerOptions) -> Box<dyn StylesheetCompiler> {
    match options.compiler.as_deref() {
        Some(command) => Box::new(CommandCompiler::new(command)),
        None => Box::new(ImportInliner),
    }
}

/// Built-in compiler: splices imported stylesheets into the importer.
///
/// - `(css)` and `.css` imports are kept as directives.
/// - `(inline)` splices the raw file.
/// - `(reference)` is kept as a directive pointing at the resolved file.
/// - `(once)`, the default, includes a file at most once per build;
///   `(multiple)` includes it every time it is imported.
///
/// Circular imports are skipped at the point where they would recurse.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImportInliner;

struct InlineState {
    included: HashSet<PathBuf>,
    stack: Vec<PathBuf>,
}

impl ImportInliner {
    fn expand(
        &self,
        file: &Path,
        source: &str,
        imports: &mut dyn ImportResolver,
        state: &mut InlineState,
    ) -> Result<String> {
        let mut out = String::with_capacity(source.len());
        let mut last = 0;

        for directive in scan_imports(source) {
            out.push_str(&source[last..directive.span.start]);
            last = directive.span.end;
            let verbatim = &source[directive.span.clone()];

            match directive.option {
                Some(ImportOption::Inline) => {
                    let resolved = resolve_in(imports, directive.specifier, file)?;
                    out.push_str(&resolved.content);
                }
                Some(ImportOption::Reference) => {
                    let resolved = resolve_in(imports, directive.specifier, file)?;
                    out.push_str(&format!(
                        "@import (reference) \"{}\";",
                        resolved.path.to_string_lossy()
                    ));
                }
                _ if directive.is_foreign() => out.push_str(verbatim.trim_start()),
                option => {
                    let resolved = resolve_in(imports, directive.specifier, file)?;
                    if state.stack.contains(&resolved.path) {
                        debug!(importer = ?file, import = ?resolved.path, "skipping circular import");
                        continue;
                    }
                    let first = state.included.insert(resolved.path.clone());
                    if !first && option != Some(ImportOption::Multiple) {
                        trace!(import = ?resolved.path, "already included");
                        continue;
                    }

                    state.stack.push(resolved.path.clone());
                    let expanded = self.expand(&resolved.path, &resolved.content, imports, state)?;
                    state.stack.pop();
                    out.push_str(&expanded);
                }
            }
        }

        out.push_str(&source[last..]);
        Ok(out)
    }
}

impl StylesheetCompiler for ImportInliner {
    fn compile(
        &self,
        file: &Path,
        source: &str,
        imports: &mut dyn ImportResolver,
    ) -> Result<String> {
        let mut state = InlineState {
            included: HashSet::from([file.to_path_buf()]),
            stack: vec![file.to_path_buf()],
        };
        self.expand(file, source, imports, &mut state)
    }
}

fn resolve_in(
    imports: &mut dyn ImportResolver,
    specifier: &str,
    importer: &Path,
) -> Result<ResolvedImport> {
    imports
        .resolve_import(specifier, importer)
        .map_err(|err| match err {
            ClusterError::ResolveError { .. } => ClusterError::CompileError {
                path: importer.to_path_buf(),
                message: err.to_string(),
            },
            other => other,
        })
}

/// Runs an external command on the inlined source.
///
/// The command line is run through the platform shell; the stylesheet is
/// written to its stdin and the CSS read back from its stdout.
#[derive(Debug, Clone)]
pub struct CommandCompiler {
    command: String,
    inliner: ImportInliner,
}

impl CommandCompiler {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            inliner: ImportInliner,
        }
    }

    fn shell(&self) -> Command {
        if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&self.command);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&self.command);
            c
        }
    }
}

impl StylesheetCompiler for CommandCompiler {
    fn compile(
        &self,
        file: &Path,
        source: &str,
        imports: &mut dyn ImportResolver,
    ) -> Result<String> {
        let input = self.inliner.compile(file, source, imports)?;

        let mut child = self
            .shell()
            .current_dir(file.parent().unwrap_or(Path::new(".")))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("spawning compiler '{}'", self.command))?;

        // Feed stdin from a separate thread so a chatty compiler can't
        // deadlock against a full stdout pipe.
        let mut stdin = child
            .stdin
            .take()
            .context("compiler stdin was not captured")?;
        let writer = std::thread::spawn(move || stdin.write_all(input.as_bytes()));

        let output = child
            .wait_with_output()
            .with_context(|| format!("waiting for compiler '{}'", self.command))?;
        let written = writer.join();

        if !output.status.success() {
            return Err(ClusterError::CompileError {
                path: file.to_path_buf(),
                message: format!(
                    "'{}' exited with {}: {}",
                    self.command,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        match written {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!(file = ?file, error = %err, "compiler '{}' did not take all input", self.command)
            }
            Err(_) => warn!(file = ?file, "stdin writer for '{}' panicked", self.command),
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    /// Resolves specifiers against a fixed table keyed by specifier.
    struct TableResolver(HashMap<&'static str, (&'static str, &'static str)>);

    impl ImportResolver for TableResolver {
        fn resolve_import(&mut self, specifier: &str, importer: &Path) -> Result<ResolvedImport> {
            self.0
                .get(specifier)
                .map(|(path, content)| ResolvedImport {
                    path: PathBuf::from(path),
                    content: content.to_string(),
                })
                .ok_or_else(|| ClusterError::ResolveError {
                    specifier: specifier.to_string(),
                    importer: importer.to_path_buf(),
                })
        }
    }

    fn table(entries: &[(&'static str, &'static str, &'static str)]) -> TableResolver {
        TableResolver(entries.iter().map(|(s, p, c)| (*s, (*p, *c))).collect())
    }

    fn compile(source: &str, resolver: &mut TableResolver) -> Result<String> {
        ImportInliner.compile(Path::new("/p/main.less"), source, resolver)
    }

    #[test]
    fn splices_imports_in_place() {
        let mut r = table(&[("vars", "/p/vars.less", "@c: red;")]);
        let out = compile("@import \"vars\";\na { color: @c; }\n", &mut r).unwrap();
        assert_eq!(out, "@c: red;\na { color: @c; }\n");
    }

    #[test]
    fn once_is_default_and_multiple_repeats() {
        let mut r = table(&[("m", "/p/m.less", "x;")]);
        let out = compile("@import \"m\";\n@import \"m\";\n", &mut r).unwrap();
        assert_eq!(out, "x;\n\n");

        let out = compile("@import \"m\";\n@import (multiple) \"m\";\n", &mut r).unwrap();
        assert_eq!(out, "x;\nx;\n");
    }

    #[test]
    fn css_imports_stay_directives() {
        let mut r = table(&[]);
        let src = "@import (css) \"theme\";\n@import \"reset.css\";\n";
        assert_eq!(compile(src, &mut r).unwrap(), src);
    }

    #[test]
    fn inline_and_reference() {
        let mut r = table(&[
            ("raw.css", "/p/raw.css", "@import \"ignored\"; b{}"),
            ("mixins", "/lib/mixins.less", ".m(){}"),
        ]);
        let out = compile(
            "@import (inline) \"raw.css\";\n@import (reference) \"mixins\";\n",
            &mut r,
        )
        .unwrap();
        assert_eq!(
            out,
            "@import \"ignored\"; b{}\n@import (reference) \"/lib/mixins.less\";\n"
        );
    }

    #[test]
    fn circular_import_is_skipped() {
        let mut r = table(&[("b", "/p/b.less", "@import \"main\";\nb{}")]);
        r.0.insert("main", ("/p/main.less", "unused"));
        let out = compile("@import \"b\";\na{}", &mut r).unwrap();
        assert_eq!(out, "\nb{}\na{}");
    }

    #[test]
    fn missing_import_is_a_compile_error() {
        let mut r = table(&[]);
        let err = compile("@import \"nope\";", &mut r).unwrap_err();
        assert!(matches!(err, ClusterError::CompileError { ref path, .. } if path == Path::new("/p/main.less")));
    }

    #[cfg(unix)]
    #[test]
    fn command_compiler_pipes_through_shell() {
        let compiler = CommandCompiler::new("tr a-z A-Z");
        let mut r = table(&[("v", "/tmp/v.less", "b{}")]);
        let out = compiler
            .compile(Path::new("/tmp/main.less"), "@import \"v\";\na{}", &mut r)
            .unwrap();
        assert_eq!(out, "B{}\nA{}");
    }

    #[cfg(unix)]
    #[test]
    fn command_compiler_ignoring_stdin_still_succeeds() {
        // The command exits without reading, so feeding stdin may fail.
        let compiler = CommandCompiler::new("echo fixed");
        let mut r = table(&[]);
        let big = "a{}\n".repeat(200_000);
        let out = compiler
            .compile(Path::new("/tmp/main.less"), &big, &mut r)
            .unwrap();
        assert_eq!(out, "fixed\n");
    }

    #[cfg(unix)]
    #[test]
    fn command_compiler_failure_carries_stderr() {
        let compiler = CommandCompiler::new("echo broken >&2; exit 3");
        let mut r = table(&[]);
        let err = compiler
            .compile(Path::new("/tmp/main.less"), "a{}", &mut r)
            .unwrap_err();
        match err {
            ClusterError::CompileError { message, .. } => assert!(message.contains("broken")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
