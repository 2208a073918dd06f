use anyhow::{Context, Result};
use regex::{Captures, Regex};

use crate::util::char_prefix;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Scope {
    /// Only the first match of the pattern is offered to the validator.
    First,
    /// Every match is offered in order until one validates.
    All,
}

#[derive(Debug, Clone)]
pub struct Strategy {
    pub method: &'static str,
    regex: Regex,
    scope: Scope,
    window: Option<usize>,
}

impl Strategy {
    pub fn new(method: &'static str, pattern: &str, scope: Scope) -> Result<Self> {
        let regex = Regex::new(pattern)
            .with_context(|| format!("invalid {method} pattern: {pattern}"))?;
        Ok(Self {
            method,
            regex,
            scope,
            window: None,
        })
    }

    /// Restricts the search to the first `chars` characters of the text.
    pub fn within(mut self, chars: usize) -> Self {
        self.window = Some(chars);
        self
    }

    fn matches<'t>(&self, text: &'t str) -> impl Iterator<Item = Captures<'t>> {
        let haystack = match self.window {
            Some(limit) => char_prefix(text, limit),
            None => text,
        };
        let take = match self.scope {
            Scope::First => 1,
            Scope::All => usize::MAX,
        };
        self.regex.captures_iter(haystack).take(take)
    }
}

/// An ordered list of strategies evaluated with early exit.
#[derive(Debug, Clone, Default)]
pub struct Cascade {
    strategies: Vec<Strategy>,
}

impl Cascade {
    pub fn new(strategies: Vec<Strategy>) -> Self {
        Self { strategies }
    }

    pub fn from_patterns(method: &'static str, patterns: &[&str], scope: Scope) -> Result<Self> {
        let strategies = patterns
            .iter()
            .map(|pattern| Strategy::new(method, pattern, scope))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { strategies })
    }

    /// Returns the first accepted value and the method of the strategy that produced it.
    pub fn first_accepted<T>(
        &self,
        text: &str,
        mut accept: impl FnMut(&Strategy, &Captures<'_>) -> Option<T>,
    ) -> Option<(T, &'static str)> {
        for strategy in &self.strategies {
            for captures in strategy.matches(text) {
                if let Some(value) = accept(strategy, &captures) {
                    return Some((value, strategy.method));
                }
            }
        }
        None
    }
}

/// Capture groups that participated in the match, joined with `-`.
///
/// Single-group patterns yield the group itself; split digit-group patterns yield
/// a dashed value.
pub fn joined_groups(captures: &Captures<'_>) -> Option<String> {
    let parts: Vec<&str> = captures
        .iter()
        .skip(1)
        .flatten()
        .map(|group| group.as_str())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("-"))
    }
}

pub fn group<'t>(captures: &Captures<'t>, index: usize) -> Option<&'t str> {
    captures.get(index).map(|value| value.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_scope_offers_only_the_first_match() {
        let cascade =
            Cascade::from_patterns("digits", &[r"(\d+)"], Scope::First).expect("pattern compiles");
        let accepted = cascade.first_accepted("1 22 333", |_, captures| {
            group(captures, 1).filter(|value| value.len() == 3).map(str::to_string)
        });
        assert_eq!(accepted, None);
    }

    #[test]
    fn all_scope_keeps_looking_until_accepted() {
        let cascade =
            Cascade::from_patterns("digits", &[r"(\d+)"], Scope::All).expect("pattern compiles");
        let accepted = cascade.first_accepted("1 22 333", |_, captures| {
            group(captures, 1).filter(|value| value.len() == 3).map(str::to_string)
        });
        assert_eq!(accepted, Some(("333".to_string(), "digits")));
    }

    #[test]
    fn window_limits_the_searched_prefix() {
        let cascade = Cascade::new(vec![
            Strategy::new("late", r"(\d{3})", Scope::First)
                .expect("pattern compiles")
                .within(5),
        ]);
        assert_eq!(cascade.first_accepted("abcdefgh 123", |_, c| joined_groups(c)), None);
        assert_eq!(
            cascade.first_accepted("123 abc", |_, c| joined_groups(c)),
            Some(("123".to_string(), "late"))
        );
    }

    #[test]
    fn joined_groups_dashes_split_digit_groups() {
        let regex = Regex::new(r"(\d{3})\s*(\d{2})\s*(\d{4})").expect("pattern compiles");
        let captures = regex.captures("123 45 6789").expect("should match");
        assert_eq!(joined_groups(&captures).as_deref(), Some("123-45-6789"));
    }
}
