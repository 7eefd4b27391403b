//! Regular-expression seam for `matches`, `replace` and `tokenize`.
//!
//! The engine itself is an external collaborator; the default provider is
//! backed by fancy-regex, which supports the backreferences XPath patterns
//! may use.

use crate::error::Error;
use std::sync::OnceLock;

pub trait RegexEngine {
    fn matches(&self, pattern: &str, flags: &str, text: &str) -> Result<bool, Error>;
    fn replace(
        &self,
        pattern: &str,
        flags: &str,
        text: &str,
        replacement: &str,
    ) -> Result<String, Error>;
    fn tokenize(&self, pattern: &str, flags: &str, text: &str) -> Result<Vec<String>, Error>;
}

/// Backtracking engine with backreference support.
pub struct FancyRegexEngine;

impl FancyRegexEngine {
    fn build(pattern: &str, flags: &str) -> Result<fancy_regex::Regex, Error> {
        let mut builder = fancy_regex::RegexBuilder::new(pattern);
        for flag in flags.chars() {
            match flag {
                'i' => {
                    builder.case_insensitive(true);
                }
                'm' => {
                    builder.multi_line(true);
                }
                's' => {
                    builder.dot_matches_new_line(true);
                }
                'x' => {
                    builder.verbose_mode(true);
                }
                other => {
                    return Err(Error::invalid_value(format!("unsupported regex flag '{other}'")));
                }
            }
        }
        builder
            .build()
            .map_err(|_| Error::invalid_value(format!("invalid regular expression '{pattern}'")))
    }
}

impl RegexEngine for FancyRegexEngine {
    fn matches(&self, pattern: &str, flags: &str, text: &str) -> Result<bool, Error> {
        let regex = Self::build(pattern, flags)?;
        regex
            .is_match(text)
            .map_err(|_| Error::failed("regular expression evaluation failed"))
    }

    fn replace(
        &self,
        pattern: &str,
        flags: &str,
        text: &str,
        replacement: &str,
    ) -> Result<String, Error> {
        let regex = Self::build(pattern, flags)?;
        let mut out = String::new();
        let mut last = 0;
        for capture in regex.captures_iter(text) {
            let capture =
                capture.map_err(|_| Error::failed("regular expression evaluation failed"))?;
            let whole = capture.get(0).ok_or_else(|| Error::failed("match without group 0"))?;
            if whole.start() == whole.end() {
                return Err(Error::invalid_value(
                    "pattern matches a zero-length string in replace",
                ));
            }
            out.push_str(&text[last..whole.start()]);
            fancy_regex::Expander::default().append_expansion(&mut out, replacement, &capture);
            last = whole.end();
        }
        out.push_str(&text[last..]);
        Ok(out)
    }

    fn tokenize(&self, pattern: &str, flags: &str, text: &str) -> Result<Vec<String>, Error> {
        if text.is_empty() {
            return Ok(Vec::new());
        }
        let regex = Self::build(pattern, flags)?;
        let mut tokens = Vec::new();
        for part in regex.split(text) {
            match part {
                Ok(token) => tokens.push(token.to_string()),
                Err(_) => return Err(Error::failed("regular expression evaluation failed")),
            }
        }
        Ok(tokens)
    }
}

static ENGINE: OnceLock<FancyRegexEngine> = OnceLock::new();

/// The process-wide default engine.
pub fn engine() -> &'static dyn RegexEngine {
    ENGINE.get_or_init(|| FancyRegexEngine)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_with_flags() {
        let engine = engine();
        assert!(engine.matches("^ab", "", "abc").unwrap());
        assert!(engine.matches("^AB", "i", "abc").unwrap());
        assert!(!engine.matches("^b", "", "abc").unwrap());
        assert!(engine.matches("a.c", "s", "a\nc").unwrap());
    }

    #[test]
    fn replace_expands_groups() {
        let engine = engine();
        let result = engine.replace("(a+)", "", "aaa bb aa", "[$1]").unwrap();
        assert_eq!(result, "[aaa] bb [aa]");
    }

    #[test]
    fn tokenize_splits_on_pattern() {
        let engine = engine();
        let tokens = engine.tokenize(r",\s*", "", "a, b,c").unwrap();
        assert_eq!(tokens, vec!["a", "b", "c"]);
        assert!(engine.tokenize(",", "", "").unwrap().is_empty());
    }

    #[test]
    fn invalid_flags_are_rejected() {
        let engine = engine();
        assert!(engine.matches("a", "q", "a").is_err());
        assert!(engine.matches("(", "", "a").is_err());
    }
}
