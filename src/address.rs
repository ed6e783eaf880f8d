//! Address encoding for range artifacts.
//!
//! Every accepted line of an `ip` blocklist becomes an [`EncodedRange`]:
//! the last address of the block (`upper`) and the first one (`lower`),
//! both as raw network-order bytes. IPv4 stays 4 bytes, IPv6 is 16.

use ipnet::IpNet;
use std::net::IpAddr;

use crate::error::EncodeError;

/// Minimum accepted prefix length per address family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PrefixPolicy {
    ipv4_min: u8,
    ipv6_min: u8,
}

impl PrefixPolicy {
    /// Create a policy rejecting IPv4 prefixes shorter than `ipv4_min`
    /// and IPv6 prefixes shorter than `ipv6_min`.
    pub fn new(ipv4_min: u8, ipv6_min: u8) -> Self {
        Self { ipv4_min, ipv6_min }
    }

    fn check(&self, net: &IpNet, token: &str) -> Result<(), EncodeError> {
        let (family, minimum) = match net {
            IpNet::V4(_) => ("IPv4", self.ipv4_min),
            IpNet::V6(_) => ("IPv6", self.ipv6_min),
        };
        if net.prefix_len() < minimum {
            return Err(EncodeError::PrefixTooBroad {
                family,
                range: token.to_string(),
                minimum,
            });
        }
        Ok(())
    }
}

/// An address range as stored in the range map: key `upper`, value `lower`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedRange {
    pub upper: IpAddr,
    pub lower: IpAddr,
}

impl EncodedRange {
    /// Range covering a single address.
    pub fn single(addr: IpAddr) -> Self {
        Self {
            upper: addr,
            lower: addr,
        }
    }

    /// Range covering a whole CIDR block, host bits ignored.
    pub fn from_net(net: IpNet) -> Self {
        Self {
            upper: net.broadcast(),
            lower: net.network(),
        }
    }

    /// Key bytes (last address of the range).
    pub fn upper_bytes(&self) -> Vec<u8> {
        addr_bytes(self.upper)
    }

    /// Value bytes (first address of the range).
    pub fn lower_bytes(&self) -> Vec<u8> {
        addr_bytes(self.lower)
    }
}

/// Network-order bytes of an address, 4 or 16 long.
pub fn addr_bytes(addr: IpAddr) -> Vec<u8> {
    match addr {
        IpAddr::V4(v4) => v4.octets().to_vec(),
        IpAddr::V6(v6) => v6.octets().to_vec(),
    }
}

/// Encode a canonical blocklist token (`addr` or `addr/prefix`).
pub fn encode(token: &str, policy: &PrefixPolicy) -> Result<EncodedRange, EncodeError> {
    if token.contains('/') {
        let net: IpNet = token
            .parse()
            .map_err(|_| EncodeError::AddressParseFailed(token.to_string()))?;
        policy.check(&net, token)?;
        return Ok(EncodedRange::from_net(net));
    }

    let addr: IpAddr = token
        .parse()
        .map_err(|_| EncodeError::AddressParseFailed(token.to_string()))?;
    Ok(EncodedRange::single(addr))
}
