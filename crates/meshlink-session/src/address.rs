//! Address codec for overlay virtual addresses.
//!
//! The engine reports IPv4 addresses as packed big-endian `u32`. These helpers
//! render them and validate user-entered addresses and CIDR blocks.
use std::net::Ipv4Addr;

/// Sentinel used by the engine for "no address assigned".
pub const UNASSIGNED: &str = "0.0.0.0";

/// Render a packed address as dotted-quad text.
pub fn address_to_text(addr: u32) -> String {
    Ipv4Addr::from(addr).to_string()
}

/// Parse an address the way [`is_valid_address`] accepts it.
///
/// Rejects the unspecified address, the limited broadcast address and the
/// whole `127.0.0.0/8` loopback block.
pub fn parse_address(text: &str) -> Option<Ipv4Addr> {
    let addr: Ipv4Addr = text.trim().parse().ok()?;
    if addr.is_unspecified() || addr.is_broadcast() || addr.is_loopback() {
        return None;
    }
    Some(addr)
}

/// True if `text` is a usable host address.
pub fn is_valid_address(text: &str) -> bool {
    parse_address(text).is_some()
}

/// Parse `address/prefix` into its parts.
pub fn parse_cidr(text: &str) -> Option<(Ipv4Addr, u8)> {
    let (addr, prefix) = text.trim().split_once('/')?;
    if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let prefix: u8 = prefix.parse().ok()?;
    if prefix > 32 {
        return None;
    }
    Some((parse_address(addr)?, prefix))
}

/// True if `text` is `address/prefix` with `0 <= prefix <= 32` and a valid address.
pub fn is_valid_cidr(text: &str) -> bool {
    parse_cidr(text).is_some()
}
