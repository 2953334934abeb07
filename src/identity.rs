//! Client identity extraction from request headers.

use std::net::IpAddr;

/// Headers consulted for the client address, in priority order.
pub const IDENTITY_HEADERS: [&str; 4] = [
    "x-forwarded-for",
    "x-real-ip",
    "x-client-ip",
    "cf-connecting-ip",
];

/// Derive the identity used to bucket a request.
///
/// Checks [`IDENTITY_HEADERS`] in order, matching header names
/// case-insensitively. A header holding a list yields its first entry.
/// Falls back to the transport-level remote address.
pub fn extract_identity<'a, I>(headers: I, remote_addr: Option<IpAddr>) -> Option<String>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let headers: Vec<(&str, &str)> = headers.into_iter().collect();

    for wanted in IDENTITY_HEADERS {
        let value = headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(wanted))
            .map(|(_, value)| *value);

        if let Some(first) = value.and_then(first_listed) {
            return Some(first.to_string());
        }
    }

    remote_addr.map(|addr| addr.to_string())
}

fn first_listed(value: &str) -> Option<&str> {
    let first = value.split(',').next()?.trim();
    if first.is_empty() {
        None
    } else {
        Some(first)
    }
}
