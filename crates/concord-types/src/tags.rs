//! Classification tags: memory type, visibility scope and functional domain.
//!
//! The string forms returned by `as_str` are exactly the serde forms, so they
//! can be used directly in payload filters.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseTagError;

// ─────────────────────────────────────────────────────────────────────────────
// Memory Type
// ─────────────────────────────────────────────────────────────────────────────

/// Which store a record lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    /// Session-scoped scratch state, never persisted.
    Working,
    /// Time-stamped experiences.
    Episodic,
    /// Facts, preferences and entities.
    Semantic,
    /// Learned trigger→action patterns.
    Procedural,
}

impl MemoryType {
    /// Every memory type, in store order.
    pub const ALL: [MemoryType; 4] = [
        MemoryType::Working,
        MemoryType::Episodic,
        MemoryType::Semantic,
        MemoryType::Procedural,
    ];

    /// The long-term types that can be recalled through the vector index.
    pub const RECALLABLE: [MemoryType; 3] = [
        MemoryType::Episodic,
        MemoryType::Semantic,
        MemoryType::Procedural,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Working => "working",
            Self::Episodic => "episodic",
            Self::Semantic => "semantic",
            Self::Procedural => "procedural",
        }
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryType {
    type Err = ParseTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "working" => Ok(Self::Working),
            "episodic" => Ok(Self::Episodic),
            "semantic" => Ok(Self::Semantic),
            "procedural" => Ok(Self::Procedural),
            _ => Err(ParseTagError::new("memory type", s)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Memory Scope
// ─────────────────────────────────────────────────────────────────────────────

/// Visibility class of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryScope {
    /// Visible to every agent.
    Global,
    /// Visible to agents registered in the record's domain, and to
    /// General-domain agents.
    Domain,
    /// Visible only to the owning agent.
    Private,
}

impl MemoryScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Domain => "domain",
            Self::Private => "private",
        }
    }
}

impl fmt::Display for MemoryScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryScope {
    type Err = ParseTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "global" => Ok(Self::Global),
            "domain" => Ok(Self::Domain),
            "private" => Ok(Self::Private),
            _ => Err(ParseTagError::new("scope", s)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Memory Domain
// ─────────────────────────────────────────────────────────────────────────────

/// Functional area a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryDomain {
    Email,
    Social,
    Finance,
    Home,
    Pet,
    /// Catch-all domain; General agents see every Domain-scoped record.
    General,
}

impl MemoryDomain {
    pub const ALL: [MemoryDomain; 6] = [
        MemoryDomain::Email,
        MemoryDomain::Social,
        MemoryDomain::Finance,
        MemoryDomain::Home,
        MemoryDomain::Pet,
        MemoryDomain::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Social => "social",
            Self::Finance => "finance",
            Self::Home => "home",
            Self::Pet => "pet",
            Self::General => "general",
        }
    }

    /// Whether this is the catch-all domain.
    pub fn is_general(&self) -> bool {
        matches!(self, Self::General)
    }
}

impl fmt::Display for MemoryDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryDomain {
    type Err = ParseTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "email" => Ok(Self::Email),
            "social" => Ok(Self::Social),
            "finance" => Ok(Self::Finance),
            "home" => Ok(Self::Home),
            "pet" => Ok(Self::Pet),
            "general" => Ok(Self::General),
            _ => Err(ParseTagError::new("domain", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_str_matches_serde() {
        for t in MemoryType::ALL {
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(json, format!("\"{}\"", t.as_str()));
        }
        for d in MemoryDomain::ALL {
            let json = serde_json::to_string(&d).unwrap();
            assert_eq!(json, format!("\"{}\"", d.as_str()));
        }
        for s in [MemoryScope::Global, MemoryScope::Domain, MemoryScope::Private] {
            let json = serde_json::to_string(&s).unwrap();
            assert_eq!(json, format!("\"{}\"", s.as_str()));
        }
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("Email".parse::<MemoryDomain>().unwrap(), MemoryDomain::Email);
        assert_eq!(" PRIVATE ".parse::<MemoryScope>().unwrap(), MemoryScope::Private);
        assert_eq!(
            "procedural".parse::<MemoryType>().unwrap(),
            MemoryType::Procedural
        );
    }

    #[test]
    fn test_parse_rejects_unknown() {
        let err = "crypto".parse::<MemoryDomain>().unwrap_err();
        assert_eq!(err.kind, "domain");
        assert_eq!(err.to_string(), "unknown domain: crypto");
    }
}
