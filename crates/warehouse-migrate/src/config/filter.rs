//! Include/exclude table filters.

use regex::Regex;

use crate::error::{MigrateError, Result};

/// Glob-style table name filter (`*` and `?`, case-insensitive).
///
/// A name passes when it matches any include pattern (or there are none) and
/// matches no exclude pattern.
#[derive(Debug, Clone, Default)]
pub struct TableFilter {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl TableFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        Ok(Self {
            include: compile_all(include)?,
            exclude: compile_all(exclude)?,
        })
    }

    pub fn matches(&self, name: &str) -> bool {
        let included = self.include.is_empty() || self.include.iter().any(|r| r.is_match(name));
        included && !self.exclude.iter().any(|r| r.is_match(name))
    }
}

fn compile_all(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns.iter().map(|p| compile(p)).collect()
}

fn compile(pattern: &str) -> Result<Regex> {
    let mut re = String::from("(?i)^");
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re)
        .map_err(|e| MigrateError::Config(format!("Invalid table pattern {:?}: {}", pattern, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = TableFilter::default();
        assert!(filter.matches("ORDERS"));
    }

    #[test]
    fn test_include_and_exclude() {
        let filter = TableFilter::new(
            &["ORD*".to_string(), "CUSTOMER?".to_string()],
            &["*_TMP".to_string()],
        )
        .unwrap();
        assert!(filter.matches("orders"));
        assert!(filter.matches("CUSTOMERS"));
        assert!(!filter.matches("ORDERS_TMP"));
        assert!(!filter.matches("LINE_ITEMS"));
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let filter = TableFilter::new(&["A.B".to_string()], &[]).unwrap();
        assert!(filter.matches("A.B"));
        assert!(!filter.matches("AXB"));
    }
}
