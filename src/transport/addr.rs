//! Peer addressing.

use std::fmt;
use std::str::FromStr;

use crate::core::AddrParseError;
use crate::crypto::PublicKey;

/// Where a peer can be reached and who it is.
///
/// Text form: `<transport>:<address>@<hex public key>`, for example
/// `tcps:127.0.0.1:9000@3b6a27bc...`. The address part is whatever the named
/// transport understands (`host:port` for TCP).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerAddr {
    transport: String,
    address: String,
    public_key: PublicKey,
}

impl PeerAddr {
    /// Create a peer address.
    pub fn new(
        transport: impl Into<String>,
        address: impl Into<String>,
        public_key: PublicKey,
    ) -> Self {
        Self {
            transport: transport.into(),
            address: address.into(),
            public_key,
        }
    }

    /// Transport name (`tcps`, `mem`, ...).
    pub fn transport(&self) -> &str {
        &self.transport
    }

    /// Transport-specific address string.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// The peer's public key.
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.transport, self.address, self.public_key)
    }
}

impl FromStr for PeerAddr {
    type Err = AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (location, key) = s.rsplit_once('@').ok_or(AddrParseError::MissingKey)?;
        let (transport, address) = location
            .split_once(':')
            .filter(|(transport, _)| !transport.is_empty())
            .ok_or(AddrParseError::MissingTransport)?;

        Ok(Self {
            transport: transport.to_string(),
            address: address.to_string(),
            public_key: key.parse()?,
        })
    }
}
