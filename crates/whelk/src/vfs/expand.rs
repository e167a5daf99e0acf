//! Single-level wildcard expansion over directory listings.
//!
//! The command parser never globs; commands that accept file operands call
//! [`expand_wildcards`] themselves.

use glob::{MatchOptions, Pattern};

use super::filesystem::VirtualFs;

const WILDCARDS: &[char] = &['*', '?', '['];

/// Expand `*`, `?` and `[...]` in the last path segment of each operand.
///
/// Operands without wildcards, with wildcards in a directory segment, or
/// with no matches are passed through unchanged. Hidden entries only match
/// patterns that start with `.`.
pub fn expand_wildcards(fs: &VirtualFs, operands: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(operands.len());
    for operand in operands {
        match expand_one(fs, operand) {
            Some(matches) if !matches.is_empty() => out.extend(matches),
            _ => out.push(operand.clone()),
        }
    }
    out
}

fn expand_one(fs: &VirtualFs, operand: &str) -> Option<Vec<String>> {
    let (dir, leaf) = match operand.rfind('/') {
        Some(idx) => (&operand[..=idx], &operand[idx + 1..]),
        None => ("", operand),
    };
    if !leaf.contains(WILDCARDS) || dir.contains(WILDCARDS) {
        return None;
    }

    let pattern = Pattern::new(leaf).ok()?;
    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: !leaf.starts_with('.'),
    };
    let listing = fs.list(Some(if dir.is_empty() { "." } else { dir })).ok()?;
    if listing.single_file {
        return None;
    }

    Some(
        listing
            .entries
            .iter()
            .filter(|entry| pattern.matches_with(&entry.name, options))
            .map(|entry| format!("{dir}{}", entry.name))
            .collect(),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::vfs::WriteOptions;

    fn tree() -> VirtualFs {
        let mut fs = VirtualFs::new();
        fs.mkdir("/docs").unwrap();
        for name in ["a.txt", "b.txt", "c.md", ".hidden.txt"] {
            fs.write_file(&format!("/docs/{name}"), "", WriteOptions::default())
                .unwrap();
        }
        fs
    }

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_expands_relative_and_absolute() {
        let mut fs = tree();
        assert_eq!(
            expand_wildcards(&fs, &args(&["/docs/*.txt"])),
            args(&["/docs/a.txt", "/docs/b.txt"])
        );
        fs.cd("/docs").unwrap();
        assert_eq!(
            expand_wildcards(&fs, &args(&["-n", "?.md"])),
            args(&["-n", "c.md"])
        );
    }

    #[test]
    fn test_hidden_needs_leading_dot() {
        let fs = tree();
        assert_eq!(
            expand_wildcards(&fs, &args(&["/docs/.*"])),
            args(&["/docs/.hidden.txt"])
        );
    }

    #[test]
    fn test_no_match_is_literal() {
        let fs = tree();
        assert_eq!(
            expand_wildcards(&fs, &args(&["/docs/*.rs", "/nope/*"])),
            args(&["/docs/*.rs", "/nope/*"])
        );
    }
}
