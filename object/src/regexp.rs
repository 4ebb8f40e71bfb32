use std::{
    fmt,
    sync::atomic::{AtomicBool, Ordering},
};

use bitflags::bitflags;
use regex::{Regex, RegexBuilder};

use crate::RuntimeError;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RegexpOptions: u32 {
        const IGNORECASE = 1;
        const EXTENDED = 2;
        const MULTILINE = 4;
        const FIXED_ENCODING = 16;
        const NO_ENCODING = 32;
    }
}

pub struct RRegexp {
    source: String,
    options: RegexpOptions,
    regex: Regex,
    literal: AtomicBool,
}

impl RRegexp {
    pub fn new(source: &str, options: RegexpOptions) -> Result<Self, RuntimeError> {
        let regex = RegexBuilder::new(source)
            .case_insensitive(options.contains(RegexpOptions::IGNORECASE))
            .ignore_whitespace(options.contains(RegexpOptions::EXTENDED))
            .dot_matches_new_line(options.contains(RegexpOptions::MULTILINE))
            .multi_line(true)
            .build()
            .map_err(|err| RuntimeError::Regexp {
                message: err.to_string(),
            })?;
        Ok(Self {
            source: source.to_owned(),
            options,
            regex,
            literal: AtomicBool::new(false),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn options(&self) -> RegexpOptions {
        self.options
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// Marks the regexp as coming from source text rather than `Regexp.new`.
    pub fn set_literal(&self) {
        self.literal.store(true, Ordering::Release);
    }

    pub fn is_literal(&self) -> bool {
        self.literal.load(Ordering::Acquire)
    }
}

impl fmt::Debug for RRegexp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/", self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_map_to_engine_flags() {
        let re = RRegexp::new("a.b", RegexpOptions::IGNORECASE | RegexpOptions::MULTILINE)
            .expect("regexp");
        assert!(re.is_match("A\nB"));
        let plain = RRegexp::new("a.b", RegexpOptions::empty()).expect("regexp");
        assert!(!plain.is_match("A\nB"));
    }

    #[test]
    fn invalid_pattern_is_an_error() {
        let err = RRegexp::new("(", RegexpOptions::empty()).unwrap_err();
        assert!(matches!(err, RuntimeError::Regexp { .. }));
    }
}
