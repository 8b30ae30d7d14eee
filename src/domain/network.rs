// Copyright (c) 2025 - Cowboy AI, Inc.
//! Network Value Objects with Validation Invariants

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use thiserror::Error;

/// Network validation error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Invalid IPv4 address format: {0}")]
    InvalidIpAddress(String),

    #[error("Invalid CIDR notation: {0}")]
    InvalidCidr(String),

    #[error("Invalid prefix length: {0} (must be 0-32)")]
    InvalidPrefixLength(u8),

    #[error("Host bits set in network address: {0}")]
    HostBitsSet(String),

    #[error("Invalid port range: {start}-{end}")]
    InvalidPortRange { start: u16, end: u16 },
}

/// IPv4 network in CIDR notation value object
///
/// Invariants:
/// - Valid IPv4 address format
/// - Prefix length 0-32
/// - Network address has no host bits set (canonical form)
///
/// # Examples
///
/// ```rust
/// use stackform::domain::Cidr;
///
/// let net = Cidr::new("10.0.0.0/24").unwrap();
/// assert_eq!(net.prefix_len(), 24);
/// assert_eq!(net.to_string(), "10.0.0.0/24");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cidr {
    network: Ipv4Addr,
    prefix_len: u8,
}

impl Cidr {
    /// Create a new CIDR network with validation
    ///
    /// # Invariants
    /// - Must be `a.b.c.d/len` form
    /// - Prefix length 0-32
    /// - Host bits must be zero
    pub fn new(cidr: impl AsRef<str>) -> Result<Self, NetworkError> {
        let cidr = cidr.as_ref();

        let (addr_str, prefix_str) = cidr
            .split_once('/')
            .ok_or_else(|| NetworkError::InvalidCidr(cidr.to_string()))?;

        let network = Ipv4Addr::from_str(addr_str)
            .map_err(|_| NetworkError::InvalidIpAddress(addr_str.to_string()))?;

        let prefix_len = prefix_str
            .parse::<u8>()
            .map_err(|_| NetworkError::InvalidCidr(cidr.to_string()))?;

        if prefix_len > 32 {
            return Err(NetworkError::InvalidPrefixLength(prefix_len));
        }

        // Invariant: canonical network address, no host bits
        let mask = Self::mask_for(prefix_len);
        if u32::from(network) & !mask != 0 {
            return Err(NetworkError::HostBitsSet(cidr.to_string()));
        }

        Ok(Self {
            network,
            prefix_len,
        })
    }

    fn mask_for(prefix_len: u8) -> u32 {
        if prefix_len == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(prefix_len))
        }
    }

    /// Get the network address
    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    /// Get the prefix length
    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Check whether an address falls inside this network
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        let mask = Self::mask_for(self.prefix_len);
        u32::from(addr) & mask == u32::from(self.network)
    }

    /// The unrestricted network (0.0.0.0/0)
    pub fn any() -> Self {
        Self {
            network: Ipv4Addr::UNSPECIFIED,
            prefix_len: 0,
        }
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

impl FromStr for Cidr {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Cidr {
    type Error = NetworkError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Cidr> for String {
    fn from(value: Cidr) -> Self {
        value.to_string()
    }
}

/// Inclusive TCP/UDP port range value object
///
/// Invariants:
/// - `start <= end`
/// - `start > 0` (port 0 is not a routable service port)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRange {
    start: u16,
    end: u16,
}

impl PortRange {
    /// SSH service port
    pub const SSH: PortRange = PortRange { start: 22, end: 22 };

    /// HTTP service port
    pub const HTTP: PortRange = PortRange { start: 80, end: 80 };

    /// HTTPS service port
    pub const HTTPS: PortRange = PortRange {
        start: 443,
        end: 443,
    };

    /// Create a range covering a single port
    pub fn single(port: u16) -> Result<Self, NetworkError> {
        Self::new(port, port)
    }

    /// Create a new port range with validation
    pub fn new(start: u16, end: u16) -> Result<Self, NetworkError> {
        if start == 0 || start > end {
            return Err(NetworkError::InvalidPortRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// The full service port range (1-65535)
    pub fn all() -> Self {
        Self {
            start: 1,
            end: u16::MAX,
        }
    }

    /// Lowest port in the range
    pub fn start(&self) -> u16 {
        self.start
    }

    /// Highest port in the range
    pub fn end(&self) -> u16 {
        self.end
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}
