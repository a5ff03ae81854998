use std::collections::{HashMap, HashSet};

/// Hands out table aliases that are unique within one compilation.
///
/// The first request for a hint gets the hint itself, later ones get
/// `hint1`, `hint2`, ... skipping anything already taken.
#[derive(Debug, Clone)]
pub struct AliasGenerator {
    default_alias: String,
    used: HashSet<String>,
    counters: HashMap<String, usize>,
}

impl AliasGenerator {
    pub fn new(default_alias: &str) -> Self {
        let default_alias = if is_usable(default_alias) {
            default_alias.to_string()
        } else {
            "t".to_string()
        };
        Self {
            default_alias,
            used: HashSet::new(),
            counters: HashMap::new(),
        }
    }

    pub fn fresh(&mut self, hint: &str) -> String {
        let base = if is_usable(hint) {
            hint.to_string()
        } else {
            self.default_alias.clone()
        };
        if self.used.insert(base.clone()) {
            return base;
        }
        let counter = self.counters.entry(base.clone()).or_insert(0);
        loop {
            *counter += 1;
            let candidate = format!("{}{}", base, counter);
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
        }
    }

    /// Alias for a base table: its lowercased initial.
    pub fn for_table(&mut self, table: &str) -> String {
        let hint: String = table
            .chars()
            .next()
            .map(|c| c.to_lowercase().collect())
            .unwrap_or_default();
        self.fresh(&hint)
    }
}

/// Compiler-generated names (`<>h__TransparentIdentifier0` and the like) and
/// anything that is not a plain identifier fall back to the default alias.
fn is_usable(hint: &str) -> bool {
    match hint.chars().next() {
        Some(c) if c.is_alphabetic() || c == '_' => {
            hint.chars().all(|c| c.is_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_hints_are_numbered() {
        let mut aliases = AliasGenerator::new("t");
        assert_eq!(aliases.fresh("c"), "c");
        assert_eq!(aliases.fresh("c"), "c1");
        assert_eq!(aliases.fresh("c"), "c2");
        assert_eq!(aliases.fresh("o"), "o");
    }

    #[test]
    fn test_numbering_skips_taken_names() {
        let mut aliases = AliasGenerator::new("t");
        assert_eq!(aliases.fresh("t1"), "t1");
        assert_eq!(aliases.fresh("t"), "t");
        assert_eq!(aliases.fresh("t"), "t2");
    }

    #[test]
    fn test_reserved_hints_use_default() {
        let mut aliases = AliasGenerator::new("t");
        assert_eq!(aliases.fresh("<>h__TransparentIdentifier0"), "t");
        assert_eq!(aliases.fresh(""), "t1");
        assert_eq!(aliases.fresh("$g"), "t2");
    }

    #[test]
    fn test_table_initial() {
        let mut aliases = AliasGenerator::new("t");
        assert_eq!(aliases.for_table("Customers"), "c");
        assert_eq!(aliases.for_table("categories"), "c1");
    }
}
