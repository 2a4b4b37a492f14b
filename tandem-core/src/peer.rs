//! Peer identity.
//!
//! A peer is identified by an opaque, stable string of the form `name@ip`,
//! chosen once at startup. Identifiers are compared bytewise; that order is
//! the tiebreak everywhere concurrent edits collide.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AddrError;

/// Stable, globally-unique peer identifier (`name@a.b.c.d`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerId(String);

impl PeerId {
    /// Builds an identifier from its parts without re-validating.
    #[must_use]
    pub fn new(name: &str, host: Ipv4Addr) -> Self {
        Self(format!("{name}@{host}"))
    }

    /// Parses and validates `name@a.b.c.d`.
    ///
    /// The name part is one or more of `[A-Za-z0-9_]`; the host part is four
    /// dot-separated runs of one to three digits.
    ///
    /// # Errors
    ///
    /// Returns [`AddrError`] if the input does not match that shape.
    pub fn parse(input: &str) -> Result<Self, AddrError> {
        let (name, host) = input.split_once('@').ok_or_else(|| AddrError::new(input))?;
        let name_ok = !name.is_empty()
            && name
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_');
        if !name_ok || !host_shape_ok(host) {
            return Err(AddrError::new(input));
        }
        Ok(Self(input.to_owned()))
    }

    /// The author tag reserved for the document sentinels. Sorts before every
    /// valid peer name, so sentinel digits never collide with real ones.
    #[must_use]
    pub fn sentinel() -> Self {
        Self("$".to_owned())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The name part, up to the `@`.
    #[must_use]
    pub fn name(&self) -> &str {
        self.0.split_once('@').map_or(self.0.as_str(), |(n, _)| n)
    }

    /// The host part as an address, when it parses as one. Octets above 255
    /// pass shape validation but are unroutable.
    #[must_use]
    pub fn host(&self) -> Option<Ipv4Addr> {
        let (_, host) = self.0.split_once('@')?;
        Ipv4Addr::from_str(host).ok()
    }
}

fn host_shape_ok(host: &str) -> bool {
    let mut octets = 0usize;
    for part in host.split('.') {
        if part.is_empty() || part.len() > 3 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
        octets += 1;
    }
    octets == 4
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PeerId {
    type Err = AddrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_valid_ids() {
        for input in ["alice@10.0.0.1", "bob_2@192.168.1.250", "X@1.2.3.4"] {
            assert!(PeerId::parse(input).is_ok(), "{input} should parse");
        }
    }

    #[test]
    fn parse_rejects_malformed_ids() {
        for input in [
            "",
            "alice",
            "@1.2.3.4",
            "alice@",
            "ali ce@1.2.3.4",
            "alice@1.2.3",
            "alice@1.2.3.4.5",
            "alice@1.2.3.abcd",
            "alice@1.2.3.1234",
            "al-ice@1.2.3.4",
        ] {
            assert!(PeerId::parse(input).is_err(), "{input} should be rejected");
        }
    }

    #[test]
    fn shape_validation_is_not_octet_range_validation() {
        // Matches the address grammar even though 999 is not a routable octet.
        let id = PeerId::parse("alice@999.0.0.1").unwrap();
        assert!(id.host().is_none());
    }

    #[test]
    fn sentinel_sorts_before_real_peers() {
        let sentinel = PeerId::sentinel();
        let alice = PeerId::parse("Alice@1.2.3.4").unwrap();
        let zed = PeerId::parse("zed@1.2.3.4").unwrap();
        assert!(sentinel < alice);
        assert!(sentinel < zed);
    }

    #[test]
    fn ordering_is_bytewise() {
        let a = PeerId::parse("a@1.1.1.1").unwrap();
        let b = PeerId::parse("b@1.1.1.1").unwrap();
        assert!(a < b);
    }

    #[test]
    fn accessors() {
        let id = PeerId::parse("alice@10.0.0.7").unwrap();
        assert_eq!(id.name(), "alice");
        assert_eq!(id.host(), Some(Ipv4Addr::new(10, 0, 0, 7)));
        assert_eq!(id.to_string(), "alice@10.0.0.7");
    }
}
