//! Turning executable files into programs.
//!
//! An executable's content is either a stub naming a registered program
//! (`# @program: /bin/cat`), a script with a recognised shebang, or plain
//! data. Scripts are compiled once per exact source text and cached by
//! absolute path.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use super::context::ProgramContext;
use crate::parser::{ParseError, ParsedCommand, parse};
use crate::program::{Program, ProgramError, ProgramRegistry};
use crate::vfs::{FsError, VirtualFs};

/// Marker line prefix in generated stubs.
pub const PROGRAM_MARKER: &str = "# @program:";

const SCRIPT_SHEBANGS: [&str; 4] = [
    "#!/bin/sh",
    "#!/bin/bash",
    "#!/usr/bin/env sh",
    "#!/usr/bin/env whelk",
];

/// Failures turning a file into a program.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// The file could not be read by the invoking user.
    #[error("unable to read executable source ({0})")]
    Unreadable(FsError),
    /// A script line failed to parse.
    #[error("unable to compile executable source at {path} (line {line}: {error})")]
    Compile {
        /// Script path.
        path: String,
        /// 1-based line number.
        line: usize,
        /// Parser failure.
        error: ParseError,
    },
}

/// Content of the stub written for a registered program.
pub fn stub_source(path: &str, description: &str) -> String {
    format!("#!/usr/bin/env whelk\n{PROGRAM_MARKER} {path}\n# {description}\n")
}

/// The program path a stub refers to.
fn program_target(source: &str) -> Option<&str> {
    source
        .lines()
        .find_map(|line| line.trim().strip_prefix(PROGRAM_MARKER))
        .map(str::trim)
        .filter(|target| !target.is_empty())
}

/// Whether `source` is a generated stub.
pub(super) fn is_generated(source: &str) -> bool {
    program_target(source).is_some()
}

fn is_script(source: &str) -> bool {
    let first = source.lines().next().unwrap_or("").trim_end();
    SCRIPT_SHEBANGS.contains(&first)
}

struct ScriptLine {
    stages: Vec<ParsedCommand>,
}

/// A compiled script: one pipeline per non-blank, non-comment line.
pub struct ScriptProgram {
    name: String,
    path: String,
    description: String,
    lines: Vec<ScriptLine>,
}

impl fmt::Debug for ScriptProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptProgram")
            .field("path", &self.path)
            .field("lines", &self.lines.len())
            .finish_non_exhaustive()
    }
}

impl ScriptProgram {
    /// Parse every line of `source`.
    pub fn compile(path: &str, source: &str) -> Result<Self, LoadError> {
        let mut lines = Vec::new();
        for (idx, raw) in source.lines().enumerate().skip(1) {
            let text = raw.trim();
            if text.is_empty() || text.starts_with('#') {
                continue;
            }
            let stages = parse(text).map_err(|error| LoadError::Compile {
                path: path.to_string(),
                line: idx + 1,
                error,
            })?;
            lines.push(ScriptLine { stages });
        }
        let name = path.rsplit('/').next().unwrap_or(path).to_string();
        Ok(Self {
            name,
            path: path.to_string(),
            description: format!("script loaded from {path}"),
            lines,
        })
    }

    /// Path the script was compiled from.
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Replace `$0`..`$9`, `$#` and `$@` in `word`. A word that is exactly
/// `$@` expands to one word per argument.
fn substitute(word: &str, name: &str, args: &[String]) -> Vec<String> {
    if word == "$@" {
        return args.to_vec();
    }
    let mut out = String::with_capacity(word.len());
    let mut chars = word.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some('#') => {
                chars.next();
                out.push_str(&args.len().to_string());
            }
            Some('@') => {
                chars.next();
                out.push_str(&args.join(" "));
            }
            Some(d) if d.is_ascii_digit() => {
                chars.next();
                let index = d.to_digit(10).unwrap_or(0) as usize;
                if index == 0 {
                    out.push_str(name);
                } else if let Some(arg) = args.get(index - 1) {
                    out.push_str(arg);
                }
            }
            _ => out.push('$'),
        }
    }
    vec![out]
}

fn bind_arguments(stage: &ParsedCommand, name: &str, args: &[String]) -> ParsedCommand {
    let argv = stage
        .argv
        .iter()
        .flat_map(|word| substitute(word, name, args))
        .collect();
    let redirect = stage.redirect.clone().map(|mut redirect| {
        redirect.path = substitute(&redirect.path, name, args).join(" ");
        redirect
    });
    ParsedCommand { argv, redirect }
}

#[async_trait]
impl Program for ScriptProgram {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn run(&self, ctx: &mut ProgramContext<'_>) -> Result<i32, ProgramError> {
        let name = ctx.name().to_string();
        let args = ctx.args().to_vec();
        for line in &self.lines {
            let stages: Vec<ParsedCommand> = line
                .stages
                .iter()
                .map(|stage| bind_arguments(stage, &name, &args))
                .filter(|stage| !stage.argv.is_empty())
                .collect();
            if !ctx.run_stages(stages).await {
                return Ok(1);
            }
        }
        Ok(0)
    }
}

struct CachedScript {
    source: String,
    program: Arc<ScriptProgram>,
}

/// Compiled scripts keyed by absolute path.
#[derive(Default)]
pub(super) struct ProgramLoader {
    cache: HashMap<String, CachedScript>,
}

impl fmt::Debug for ProgramLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgramLoader")
            .field("cached", &self.cache.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ProgramLoader {
    /// The program behind the executable at `path`.
    ///
    /// `Ok(None)` means the file is neither a stub nor a script, or is a
    /// stub whose target is not registered.
    pub(super) fn load(
        &mut self,
        fs: &VirtualFs,
        registry: &ProgramRegistry,
        path: &str,
    ) -> Result<Option<Arc<dyn Program>>, LoadError> {
        let source = match fs.read_file(path) {
            Ok(source) => source,
            Err(e) => {
                self.cache.remove(path);
                return Err(LoadError::Unreadable(e));
            }
        };

        if let Some(target) = program_target(&source) {
            self.cache.remove(path);
            return Ok(registry.get(target));
        }
        if !is_script(&source) {
            self.cache.remove(path);
            return Ok(None);
        }

        if let Some(cached) = self.cache.get(path) {
            if cached.source == source {
                tracing::debug!(path, "script cache hit");
                return Ok(Some(cached.program.clone()));
            }
        }

        tracing::debug!(path, "compiling script");
        let program = match ScriptProgram::compile(path, &source) {
            Ok(program) => Arc::new(program),
            Err(e) => {
                self.cache.remove(path);
                return Err(e);
            }
        };
        self.cache.insert(
            path.to_string(),
            CachedScript {
                source,
                program: program.clone(),
            },
        );
        Ok(Some(program))
    }

    #[cfg(test)]
    fn is_cached(&self, path: &str) -> bool {
        self.cache.contains_key(path)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::vfs::WriteOptions;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_stub_detection() {
        let stub = stub_source("/bin/cat", "concatenate files");
        assert!(stub.starts_with("#!/usr/bin/env whelk\n"));
        assert_eq!(program_target(&stub), Some("/bin/cat"));
        assert!(is_generated(&stub));
        assert!(!is_generated("#!/bin/sh\necho hi\n"));
        assert!(is_script("#!/bin/sh\necho hi\n"));
        assert!(!is_script("echo hi\n"));
    }

    #[test]
    fn test_substitution() {
        let a = args(&["x", "y z"]);
        assert_eq!(substitute("$1-$2", "greet", &a), vec!["x-y z"]);
        assert_eq!(substitute("$0:$#", "greet", &a), vec!["greet:2"]);
        assert_eq!(substitute("$@", "greet", &a), a);
        assert_eq!(substitute("[$@]", "greet", &a), vec!["[x y z]"]);
        assert_eq!(substitute("$5$", "greet", &a), vec!["$"]);
        assert_eq!(substitute("cost $x", "greet", &a), vec!["cost $x"]);
    }

    #[test]
    fn test_compile_reports_line() {
        let err = ScriptProgram::compile("/tmp/s", "#!/bin/sh\necho ok\n\necho |\n").unwrap_err();
        assert_eq!(
            err.to_string(),
            "unable to compile executable source at /tmp/s (line 4: syntax error near unexpected token `newline`)"
        );
        let script = ScriptProgram::compile("/tmp/s", "#!/bin/sh\n# note\necho a | cat\n").unwrap();
        assert_eq!(script.lines.len(), 1);
        assert_eq!(script.name(), "s");
        assert_eq!(script.description(), "script loaded from /tmp/s");
    }

    #[test]
    fn test_loader_caches_by_source() {
        let mut fs = VirtualFs::new();
        fs.mkdir("/tmp").unwrap();
        let exec = WriteOptions {
            executable: Some(true),
        };
        fs.write_file("/tmp/s", "#!/bin/sh\necho one\n", exec).unwrap();
        let registry = ProgramRegistry::new();
        let mut loader = ProgramLoader::default();

        let first = loader.load(&fs, &registry, "/tmp/s").unwrap().unwrap();
        let second = loader.load(&fs, &registry, "/tmp/s").unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        fs.write_file("/tmp/s", "#!/bin/sh\necho two\n", exec).unwrap();
        let third = loader.load(&fs, &registry, "/tmp/s").unwrap().unwrap();
        assert!(!Arc::ptr_eq(&first, &third));

        fs.write_file("/tmp/s", "plain data", exec).unwrap();
        assert!(loader.load(&fs, &registry, "/tmp/s").unwrap().is_none());
        assert!(!loader.is_cached("/tmp/s"));

        fs.write_file("/tmp/s", "#!/bin/sh\necho >\n", exec).unwrap();
        assert!(matches!(
            loader.load(&fs, &registry, "/tmp/s"),
            Err(LoadError::Compile { line: 2, .. })
        ));
        assert!(matches!(
            loader.load(&fs, &registry, "/tmp/missing"),
            Err(LoadError::Unreadable(_))
        ));
    }
}
