use std::{fmt, sync::Arc};

use crate::Encoding;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CodeRange {
    #[default]
    Unknown,
    SevenBit,
    Valid,
    Broken,
}

impl CodeRange {
    pub const fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::SevenBit,
            2 => Self::Valid,
            3 => Self::Broken,
            _ => Self::Unknown,
        }
    }

    /// Scans `bytes` for the range they fall in under `encoding`.
    pub fn scan(bytes: &[u8], encoding: Encoding) -> Self {
        if bytes.is_ascii() {
            return Self::SevenBit;
        }
        match encoding {
            Encoding::Utf8 if std::str::from_utf8(bytes).is_ok() => Self::Valid,
            Encoding::Ascii8Bit => Self::Valid,
            _ => Self::Broken,
        }
    }
}

/// String value over a shared byte buffer. Literal strings created from the
/// same cached bytes share storage until one of them is copied.
#[derive(Clone)]
pub struct RString {
    bytes: Arc<[u8]>,
    encoding: Encoding,
    code_range: CodeRange,
    frozen: bool,
}

impl RString {
    pub fn new(text: &str) -> Self {
        Self {
            bytes: Arc::from(text.as_bytes()),
            encoding: Encoding::Utf8,
            code_range: CodeRange::scan(text.as_bytes(), Encoding::Utf8),
            frozen: false,
        }
    }

    pub fn shared(bytes: Arc<[u8]>, encoding: Encoding, code_range: CodeRange) -> Self {
        Self {
            bytes,
            encoding,
            code_range,
            frozen: false,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn shared_bytes(&self) -> Arc<[u8]> {
        self.bytes.clone()
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn code_range(&self) -> CodeRange {
        self.code_range
    }

    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.bytes).ok()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn freeze(mut self) -> Self {
        self.frozen = true;
        self
    }

    pub fn shares_bytes_with(&self, other: &RString) -> bool {
        Arc::ptr_eq(&self.bytes, &other.bytes)
    }
}

impl fmt::Debug for RString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(&self.bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scans_code_range() {
        assert_eq!(CodeRange::scan(b"abc", Encoding::Utf8), CodeRange::SevenBit);
        assert_eq!(
            CodeRange::scan("é".as_bytes(), Encoding::Utf8),
            CodeRange::Valid
        );
        assert_eq!(CodeRange::scan(&[0xff], Encoding::Utf8), CodeRange::Broken);
        assert_eq!(CodeRange::from_raw(2), CodeRange::Valid);
    }

    #[test]
    fn shared_strings_share_bytes() {
        let bytes: Arc<[u8]> = Arc::from(&b"hi"[..]);
        let a = RString::shared(bytes.clone(), Encoding::Utf8, CodeRange::SevenBit);
        let b = RString::shared(bytes, Encoding::Utf8, CodeRange::SevenBit);
        assert!(a.shares_bytes_with(&b));
        assert!(!a.is_frozen());
        assert!(a.freeze().is_frozen());
    }
}
