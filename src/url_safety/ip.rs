use std::net::{Ipv4Addr, Ipv6Addr};

use crate::error::{FetchError, Result};

/// Decode an IPv4 literal in any `inet_aton` form.
///
/// Accepts dotted notation with one to four parts, where each part may be
/// decimal, hex (`0x..`) or octal (leading `0`), and the pure 32-bit forms
/// (`2130706433`, `0x7f000001`, `017700000001`). Returns `None` for anything
/// that is a hostname rather than a number.
#[must_use]
pub fn parse_ipv4_literal(host: &str) -> Option<Ipv4Addr> {
    let host = host.strip_suffix('.').unwrap_or(host);
    if host.is_empty() {
        return None;
    }

    let parts: Vec<&str> = host.split('.').collect();
    if parts.len() > 4 {
        return None;
    }

    let numbers = parts
        .iter()
        .map(|p| parse_part(p))
        .collect::<Option<Vec<u64>>>()?;

    let (last, head) = numbers.split_last()?;
    if head.iter().any(|&n| n > 255) {
        return None;
    }

    // Last part fills all remaining bytes
    let remaining_bytes = 4 - head.len() as u32;
    if *last >= 1u64 << (8 * remaining_bytes) {
        return None;
    }

    let mut value: u64 = 0;
    for (i, &n) in head.iter().enumerate() {
        value |= n << (8 * (3 - i as u32));
    }
    value |= *last;

    u32::try_from(value).ok().map(Ipv4Addr::from)
}

fn parse_part(part: &str) -> Option<u64> {
    if part.is_empty() {
        return None;
    }
    if let Some(hex) = part.strip_prefix("0x").or_else(|| part.strip_prefix("0X")) {
        if hex.is_empty() {
            return Some(0);
        }
        return u64::from_str_radix(hex, 16).ok().filter(|&n| n <= u64::from(u32::MAX));
    }
    if part.len() > 1 && part.starts_with('0') {
        return u64::from_str_radix(&part[1..], 8)
            .ok()
            .filter(|&n| n <= u64::from(u32::MAX));
    }
    if part.bytes().all(|b| b.is_ascii_digit()) {
        return part.parse::<u64>().ok().filter(|&n| n <= u64::from(u32::MAX));
    }
    None
}

/// Reject loopback, private, link-local, "this network" and broadcast IPv4.
pub fn check_ipv4(ip: Ipv4Addr) -> Result<()> {
    let [a, b, _, _] = ip.octets();

    let reason = if a == 127 {
        Some("loopback")
    } else if a == 10 || (a == 172 && (16..=31).contains(&b)) || (a == 192 && b == 168) {
        Some("private")
    } else if a == 169 && b == 254 {
        Some("link-local")
    } else if a == 0 {
        Some("\"this network\"")
    } else if ip.is_broadcast() {
        Some("broadcast")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(FetchError::security(format!(
            "Access to {reason} address {ip} is not allowed"
        ))),
        None => Ok(()),
    }
}

/// Reject loopback, unspecified, IPv4-mapped, unique-local and link-local IPv6.
pub fn check_ipv6(ip: Ipv6Addr) -> Result<()> {
    if ip.is_loopback() || ip.is_unspecified() {
        return Err(FetchError::security(format!(
            "Access to loopback address {ip} is not allowed"
        )));
    }

    if let Some(mapped) = ip.to_ipv4_mapped() {
        // Mapped addresses are refused whatever they embed; the embedded
        // address only sharpens the message.
        let detail = check_ipv4(mapped)
            .err()
            .map_or_else(|| "public".to_string(), |e| e.to_string());
        return Err(FetchError::security(format!(
            "IPv4-mapped IPv6 address {ip} is not allowed ({detail})"
        )));
    }

    let segments = ip.segments();

    // Deprecated IPv4-compatible form ::a.b.c.d
    if segments[..6].iter().all(|&s| s == 0) {
        let embedded = Ipv4Addr::new(
            (segments[6] >> 8) as u8,
            segments[6] as u8,
            (segments[7] >> 8) as u8,
            segments[7] as u8,
        );
        check_ipv4(embedded)?;
    }

    if segments[0] & 0xfe00 == 0xfc00 {
        return Err(FetchError::security(format!(
            "Access to unique-local address {ip} is not allowed"
        )));
    }
    if segments[0] & 0xffc0 == 0xfe80 {
        return Err(FetchError::security(format!(
            "Access to link-local address {ip} is not allowed"
        )));
    }
    Ok(())
}
