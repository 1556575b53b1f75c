//! CIDR - Parsing and containment for rule sources and blocked networks

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// Address family of a CIDR block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    V4,
    V6,
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Family::V4 => f.write_str("IPv4"),
            Family::V6 => f.write_str("IPv6"),
        }
    }
}

/// A parsed CIDR block (e.g., "10.0.0.0/16" or "2001:db8::/32")
///
/// Host bits are allowed and ignored, the way AWS normalises rule CIDRs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cidr {
    addr: IpAddr,
    prefix: u8,
}

impl Cidr {
    pub fn family(&self) -> Family {
        match self.addr {
            IpAddr::V4(_) => Family::V4,
            IpAddr::V6(_) => Family::V6,
        }
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Whether every address of `other` also belongs to this network
    pub fn contains(&self, other: &Cidr) -> bool {
        if self.prefix > other.prefix {
            return false;
        }
        match (self.addr, other.addr) {
            (IpAddr::V4(a), IpAddr::V4(b)) => {
                let mask = mask_v4(self.prefix);
                u32::from(a) & mask == u32::from(b) & mask
            }
            (IpAddr::V6(a), IpAddr::V6(b)) => {
                let mask = mask_v6(self.prefix);
                u128::from(a) & mask == u128::from(b) & mask
            }
            _ => false,
        }
    }
}

fn mask_v4(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

fn mask_v6(prefix: u8) -> u128 {
    if prefix == 0 {
        0
    } else {
        u128::MAX << (128 - u32::from(prefix))
    }
}

impl FromStr for Cidr {
    type Err = String;

    fn from_str(cidr: &str) -> Result<Self, Self::Err> {
        let (ip, prefix) = cidr
            .split_once('/')
            .ok_or_else(|| format!("Invalid CIDR format '{}': expected IP/prefix", cidr))?;

        let addr = if ip.contains(':') {
            let v6 = Ipv6Addr::from_str(ip)
                .map_err(|_| format!("Invalid IPv6 address '{}'", ip))?;
            IpAddr::V6(v6)
        } else {
            let octets: Vec<&str> = ip.split('.').collect();
            if octets.len() != 4 {
                return Err(format!("Invalid IP address '{}': expected 4 octets", ip));
            }
            for octet in &octets {
                if octet.parse::<u8>().is_err() {
                    return Err(format!(
                        "Invalid octet '{}' in IP address: must be 0-255",
                        octet
                    ));
                }
            }
            let v4 = Ipv4Addr::from_str(ip)
                .map_err(|_| format!("Invalid IPv4 address '{}'", ip))?;
            IpAddr::V4(v4)
        };

        let max = match addr {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        match prefix.parse::<u8>() {
            Ok(p) if p <= max => Ok(Self { addr, prefix: p }),
            Ok(p) => Err(format!("Invalid prefix length '{}': must be 0-{}", p, max)),
            Err(_) => Err(format!(
                "Invalid prefix length '{}': must be a number",
                prefix
            )),
        }
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

/// Parse a CIDR block and require a specific address family
pub fn parse_cidr(cidr: &str, family: Family) -> Result<Cidr, String> {
    let parsed: Cidr = cidr.parse()?;
    if parsed.family() != family {
        return Err(format!(
            "'{}' is an {} block, expected {}",
            cidr,
            parsed.family(),
            family
        ));
    }
    Ok(parsed)
}
