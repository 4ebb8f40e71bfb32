use std::fmt;

/// Separator between call-site names, call-type tags and the counts piece.
pub const SEPARATOR: char = '\u{FFFF}';

/// Per-unit cache kinds, in descriptor order. New kinds are only ever
/// appended, so a shorter counts piece is an older unit with zero of the
/// missing kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CacheKind {
    Scope,
    Symbol,
    Fixnum,
    Float,
    Constant,
    Regexp,
    BigInteger,
    VariableReader,
    VariableWriter,
    Method,
    String,
    Encoding,
    FrozenString,
}

impl CacheKind {
    pub const COUNT: usize = 13;

    pub const ALL: [CacheKind; Self::COUNT] = [
        CacheKind::Scope,
        CacheKind::Symbol,
        CacheKind::Fixnum,
        CacheKind::Float,
        CacheKind::Constant,
        CacheKind::Regexp,
        CacheKind::BigInteger,
        CacheKind::VariableReader,
        CacheKind::VariableWriter,
        CacheKind::Method,
        CacheKind::String,
        CacheKind::Encoding,
        CacheKind::FrozenString,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallType {
    /// `recv.foo`: private methods are not reachable.
    Normal,
    /// `foo(...)` with implicit self.
    Functional,
    /// Bare `foo` that could have been a local variable.
    Variable,
    Super,
}

impl CallType {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "N" => Some(Self::Normal),
            "F" => Some(Self::Functional),
            "V" => Some(Self::Variable),
            "S" => Some(Self::Super),
            _ => None,
        }
    }

    pub const fn tag(self) -> char {
        match self {
            Self::Normal => 'N',
            Self::Functional => 'F',
            Self::Variable => 'V',
            Self::Super => 'S',
        }
    }

    /// Calls with an implicit self may reach private methods.
    pub const fn allows_private(self) -> bool {
        !matches!(self, Self::Normal)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSiteDesc {
    pub name: String,
    pub call_type: CallType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    UnknownCallType { name: String, tag: String },
    DanglingCallSite { name: String },
    InvalidName { name: String },
    CountOutOfRange { kind: CacheKind, count: usize },
    TooManyCounts { found: usize },
    MalformedScope { descriptor: String },
    UnknownScopeKind { kind: String },
}

impl fmt::Display for DescriptorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DescriptorError::UnknownCallType { name, tag } => {
                write!(f, "unknown call type {tag:?} for method {name}")
            }
            DescriptorError::DanglingCallSite { name } => {
                write!(f, "call site {name} has no call type")
            }
            DescriptorError::InvalidName { name } => {
                write!(f, "invalid call-site name {name:?}")
            }
            DescriptorError::CountOutOfRange { kind, count } => {
                write!(f, "{count} {kind:?} caches cannot be encoded")
            }
            DescriptorError::TooManyCounts { found } => write!(
                f,
                "descriptor has {found} cache counts, at most {} are known",
                CacheKind::COUNT
            ),
            DescriptorError::MalformedScope { descriptor } => {
                write!(f, "malformed scope descriptor {descriptor:?}")
            }
            DescriptorError::UnknownScopeKind { kind } => {
                write!(f, "unknown scope kind {kind:?}")
            }
        }
    }
}

impl std::error::Error for DescriptorError {}

/// Sizes of every cache a compiled unit needs, plus its call sites.
///
/// Encoded form: `name SEP tag SEP name SEP tag ... SEP counts`, where each
/// char of `counts` carries one count as its code point. A unit without call
/// sites encodes as `SEP counts`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitDescriptor {
    call_sites: Vec<CallSiteDesc>,
    counts: [usize; CacheKind::COUNT],
}

impl UnitDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_call_site(mut self, name: &str, call_type: CallType) -> Self {
        self.call_sites.push(CallSiteDesc {
            name: name.to_owned(),
            call_type,
        });
        self
    }

    pub fn with_count(mut self, kind: CacheKind, count: usize) -> Self {
        self.counts[kind.index()] = count;
        self
    }

    pub fn call_sites(&self) -> &[CallSiteDesc] {
        &self.call_sites
    }

    pub fn count(&self, kind: CacheKind) -> usize {
        self.counts[kind.index()]
    }

    pub fn parse(descriptor: &str) -> Result<Self, DescriptorError> {
        let pieces: Vec<&str> = descriptor.split(SEPARATOR).collect();
        let (sites, counts) = pieces.split_at(pieces.len() - 1);

        let mut call_sites = Vec::new();
        if !sites.is_empty() && !sites[0].is_empty() {
            for pair in sites.chunks(2) {
                let name = pair[0];
                let Some(tag) = pair.get(1) else {
                    return Err(DescriptorError::DanglingCallSite {
                        name: name.to_owned(),
                    });
                };
                let call_type =
                    CallType::from_tag(tag).ok_or_else(|| DescriptorError::UnknownCallType {
                        name: name.to_owned(),
                        tag: (*tag).to_owned(),
                    })?;
                call_sites.push(CallSiteDesc {
                    name: name.to_owned(),
                    call_type,
                });
            }
        }

        let counts_piece = counts[0];
        let found = counts_piece.chars().count();
        if found > CacheKind::COUNT {
            return Err(DescriptorError::TooManyCounts { found });
        }
        let mut out = [0usize; CacheKind::COUNT];
        for (slot, ch) in out.iter_mut().zip(counts_piece.chars()) {
            *slot = ch as usize;
        }
        Ok(Self {
            call_sites,
            counts: out,
        })
    }

    pub fn encode(&self) -> Result<String, DescriptorError> {
        let mut out = String::new();
        for site in &self.call_sites {
            if site.name.is_empty() || site.name.contains(SEPARATOR) {
                return Err(DescriptorError::InvalidName {
                    name: site.name.clone(),
                });
            }
            out.push_str(&site.name);
            out.push(SEPARATOR);
            out.push(site.call_type.tag());
            out.push(SEPARATOR);
        }
        if self.call_sites.is_empty() {
            out.push(SEPARATOR);
        }
        for kind in CacheKind::ALL {
            let count = self.count(kind);
            let ch = u32::try_from(count)
                .ok()
                .filter(|&c| c < 0xD800)
                .and_then(char::from_u32)
                .ok_or(DescriptorError::CountOutOfRange { kind, count })?;
            out.push(ch);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_call_sites_and_counts() {
        let text = format!(
            "foo{SEPARATOR}N{SEPARATOR}bar{SEPARATOR}F{SEPARATOR}\u{2}\u{0}\u{5}"
        );
        let desc = UnitDescriptor::parse(&text).expect("parse");
        assert_eq!(desc.call_sites().len(), 2);
        assert_eq!(desc.call_sites()[1].name, "bar");
        assert_eq!(desc.call_sites()[1].call_type, CallType::Functional);
        assert_eq!(desc.count(CacheKind::Scope), 2);
        assert_eq!(desc.count(CacheKind::Fixnum), 5);
        assert_eq!(desc.count(CacheKind::FrozenString), 0);
    }

    #[test]
    fn short_counts_mean_zero() {
        let desc = UnitDescriptor::parse(&format!("{SEPARATOR}\u{1}")).expect("parse");
        assert!(desc.call_sites().is_empty());
        assert_eq!(desc.count(CacheKind::Scope), 1);
        assert_eq!(desc.count(CacheKind::Method), 0);

        let empty = UnitDescriptor::parse("").expect("parse");
        assert_eq!(empty, UnitDescriptor::new());
    }

    #[test]
    fn rejects_bad_call_types() {
        let text = format!("foo{SEPARATOR}X{SEPARATOR}");
        assert!(matches!(
            UnitDescriptor::parse(&text),
            Err(DescriptorError::UnknownCallType { .. })
        ));
        let dangling = format!("foo{SEPARATOR}N{SEPARATOR}bar{SEPARATOR}");
        assert!(matches!(
            UnitDescriptor::parse(&dangling),
            Err(DescriptorError::DanglingCallSite { .. })
        ));
        let too_many = format!("{SEPARATOR}{}", "\u{1}".repeat(14));
        assert!(matches!(
            UnitDescriptor::parse(&too_many),
            Err(DescriptorError::TooManyCounts { found: 14 })
        ));
    }

    #[test]
    fn encode_matches_parse() {
        let desc = UnitDescriptor::new()
            .with_call_site("each", CallType::Normal)
            .with_call_site("super", CallType::Super)
            .with_count(CacheKind::Method, 3)
            .with_count(CacheKind::FrozenString, 1);
        let text = desc.encode().expect("encode");
        assert_eq!(UnitDescriptor::parse(&text).expect("parse"), desc);

        let bad = UnitDescriptor::new().with_count(CacheKind::Symbol, 0xD800);
        assert!(bad.encode().is_err());
    }
}
