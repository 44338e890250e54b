//! Ordered path prefix substitution rules.

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// One `old -> new` substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixRule {
    /// Prefix to match
    pub old: String,
    /// Replacement, no longer than `old`
    pub new: String,
}

/// Prefix rules applied to embedded paths.
///
/// When several rules match a path, the one with the longest `old` prefix
/// wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefixMap {
    rules: Vec<PrefixRule>,
}

impl PrefixMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a map with a single rule.
    pub fn single(old: impl Into<String>, new: impl Into<String>) -> Result<Self> {
        let mut map = Self::new();
        map.insert(old, new)?;
        Ok(map)
    }

    /// Adds a rule, replacing any rule with the same `old` prefix.
    ///
    /// Fails if `new` is longer than `old`: sections are patched in place
    /// and cannot grow.
    pub fn insert(&mut self, old: impl Into<String>, new: impl Into<String>) -> Result<()> {
        let (old, new) = (old.into(), new.into());
        if new.len() > old.len() {
            return Err(Error::PrefixGrows { old, new });
        }

        match self.rules.iter_mut().find(|r| r.old == old) {
            Some(rule) => rule.new = new,
            None => self.rules.push(PrefixRule { old, new }),
        }
        Ok(())
    }

    /// Loads rules from a sed-style map file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| Error::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path)
    }

    /// Parses sed-style rules, one per line: `,old,new,`.
    ///
    /// The first character of a line is its delimiter. Lines of three
    /// characters or fewer are ignored.
    pub fn parse(text: &str, path: &Path) -> Result<Self> {
        let mut map = Self::new();

        for (index, line) in text.lines().enumerate() {
            if line.chars().count() <= 3 {
                continue;
            }
            let invalid = |reason: &str| Error::InvalidPrefixMap {
                path: path.to_path_buf(),
                line: index + 1,
                reason: reason.to_string(),
            };

            let mut chars = line.chars();
            let delimiter = chars.next().ok_or_else(|| invalid("empty line"))?;
            let mut fields = chars.as_str().split(delimiter);
            match (fields.next(), fields.next()) {
                (Some(old), Some(new)) => map.insert(old, new)?,
                _ => return Err(invalid("expected <d>old<d>new<d>")),
            }
        }

        Ok(map)
    }

    /// Applies the longest matching rule to `path`.
    ///
    /// Returns `None` when no rule matches.
    pub fn rewrite(&self, path: &[u8]) -> Option<Vec<u8>> {
        let rule = self
            .rules
            .iter()
            .filter(|r| path.starts_with(r.old.as_bytes()))
            .max_by_key(|r| r.old.len())?;

        let mut out = Vec::with_capacity(path.len());
        out.extend_from_slice(rule.new.as_bytes());
        out.extend_from_slice(&path[rule.old.len()..]);
        Some(out)
    }

    /// The rules, in insertion order.
    pub fn rules(&self) -> &[PrefixRule] {
        &self.rules
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the map has no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
