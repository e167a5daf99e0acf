//! Shell environment variables.

use std::collections::BTreeMap;

/// Directories searched for bare command names, in order.
pub const PATH_DIRS: [&str; 3] = ["/bin", "/usr/bin", "/usr/local/bin"];

/// Whether `name` matches `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Name to value mapping, iterated in name order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    /// An empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// The defaults every session starts from.
    pub fn initial() -> Self {
        let mut env = Self::new();
        env.set("PATH", PATH_DIRS.join(":"));
        env.set("LANG", "en_US.UTF-8");
        env.set("TERM", "xterm-256color");
        env.set("SHLVL", "1");
        env
    }

    /// Value of `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Set `name`. The caller validates the name.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    /// Remove `name`, returning its old value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.vars.remove(name)
    }

    /// Drop every variable.
    pub fn clear(&mut self) {
        self.vars.clear();
    }

    /// `(name, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of variables.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Whether no variable is set.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        for name in ["PATH", "_x", "a1_B"] {
            assert!(is_valid_name(name), "{name}");
        }
        for name in ["", "1A", "A-B", "A B", "é"] {
            assert!(!is_valid_name(name), "{name}");
        }
    }

    #[test]
    fn test_initial_environment() {
        let env = Environment::initial();
        assert_eq!(env.get("PATH"), Some("/bin:/usr/bin:/usr/local/bin"));
        assert_eq!(env.get("SHLVL"), Some("1"));
        let names: Vec<_> = env.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["LANG", "PATH", "SHLVL", "TERM"]);
    }
}
