//! Wildcard file masks for the retrieve admission pipeline.
//!
//! A mask is a shell-style pattern with `*` and `?`; a leading `!` makes
//! it an explicit exclude. Patterns given on one invocation form one mask
//! group, evaluated in order.

use listing::{FileMask, MaskMatch};

/// One compiled pattern.
#[derive(Debug, Clone)]
pub struct WildcardMask {
    pattern: String,
    exclude: bool,
}

impl WildcardMask {
    /// Compiles one pattern; a leading `!` marks an exclude.
    #[must_use]
    pub fn compile(raw: &str) -> Self {
        match raw.strip_prefix('!') {
            Some(rest) => Self {
                pattern: rest.to_owned(),
                exclude: true,
            },
            None => Self {
                pattern: raw.to_owned(),
                exclude: false,
            },
        }
    }
}

impl FileMask for WildcardMask {
    fn matches(&self, name: &str) -> MaskMatch {
        if wildcard_match(self.pattern.as_bytes(), name.as_bytes()) {
            if self.exclude {
                MaskMatch::Exclude
            } else {
                MaskMatch::Match
            }
        } else {
            MaskMatch::NoMatch
        }
    }
}

/// Builds the single mask group of a command-line invocation.
#[must_use]
pub fn compile_group(patterns: &[String]) -> Vec<Vec<Box<dyn FileMask>>> {
    let group: Vec<Box<dyn FileMask>> = patterns
        .iter()
        .map(|p| Box::new(WildcardMask::compile(p)) as Box<dyn FileMask>)
        .collect();
    vec![group]
}

fn wildcard_match(pattern: &[u8], name: &[u8]) -> bool {
    match (pattern.first(), name.first()) {
        (None, None) => true,
        (Some(b'*'), _) => {
            wildcard_match(&pattern[1..], name)
                || (!name.is_empty() && wildcard_match(pattern, &name[1..]))
        }
        (Some(b'?'), Some(_)) => wildcard_match(&pattern[1..], &name[1..]),
        (Some(&p), Some(&n)) if p == n => wildcard_match(&pattern[1..], &name[1..]),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_and_question_wildcards() {
        let mask = WildcardMask::compile("*.grib");
        assert_eq!(mask.matches("wx_0600.grib"), MaskMatch::Match);
        assert_eq!(mask.matches("wx_0600.txt"), MaskMatch::NoMatch);

        let mask = WildcardMask::compile("chart_??.png");
        assert_eq!(mask.matches("chart_12.png"), MaskMatch::Match);
        assert_eq!(mask.matches("chart_1.png"), MaskMatch::NoMatch);
    }

    #[test]
    fn leading_bang_excludes() {
        let mask = WildcardMask::compile("!*.tmp");
        assert_eq!(mask.matches("a.tmp"), MaskMatch::Exclude);
        assert_eq!(mask.matches("a.dat"), MaskMatch::NoMatch);
    }

    #[test]
    fn group_evaluates_in_order() {
        let group = compile_group(&["!*.tmp".to_owned(), "*".to_owned()]);
        assert_eq!(group.len(), 1);
        assert_eq!(group[0][0].matches("x.tmp"), MaskMatch::Exclude);
        assert_eq!(group[0][1].matches("x.dat"), MaskMatch::Match);
    }
}
