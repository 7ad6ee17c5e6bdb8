//! Primary-domain extraction for the same-domain confinement policy.

use crate::error::Error;
use std::net::IpAddr;

/// Derives the primary domain of a host: the public suffix plus the label
/// immediately preceding it (`a.b.example.co.uk` -> `example.co.uk`).
///
/// An optional `:port` is stripped first. IP-literal hosts and hosts whose
/// suffix is not on the public-suffix list fall back to the full host.
pub fn primary_domain(host: &str) -> Result<String, Error> {
    let trimmed = host.trim();
    if trimmed.is_empty() {
        return Err(Error::PrimaryDomain(host.to_string()));
    }
    let bare = strip_port(trimmed);
    if bare.is_empty() {
        return Err(Error::PrimaryDomain(host.to_string()));
    }
    if bare
        .trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<IpAddr>()
        .is_ok()
    {
        return Ok(bare.to_string());
    }
    let lower = bare.to_ascii_lowercase();
    Ok(psl::domain_str(&lower)
        .map(str::to_owned)
        .unwrap_or(lower))
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        // bracketed IPv6 literal, possibly followed by a port
        match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        }
    } else if let Some((name, port)) = host.rsplit_once(':') {
        if !name.is_empty()
            && !name.contains(':')
            && !port.is_empty()
            && port.bytes().all(|b| b.is_ascii_digit())
        {
            name
        } else {
            host
        }
    } else {
        host
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_plus_one_label() {
        assert_eq!(primary_domain("a.b.example.co.uk").unwrap(), "example.co.uk");
        assert_eq!(primary_domain("www.example.com").unwrap(), "example.com");
        assert_eq!(primary_domain("example.com").unwrap(), "example.com");
    }

    #[test]
    fn ports_are_stripped() {
        assert_eq!(primary_domain("www.example.com:8080").unwrap(), "example.com");
        assert_eq!(primary_domain("example.com:80").unwrap(), "example.com");
    }

    #[test]
    fn case_is_normalised() {
        assert_eq!(primary_domain("WWW.Example.COM").unwrap(), "example.com");
    }

    #[test]
    fn ip_literals_fall_back_to_the_full_host() {
        assert_eq!(primary_domain("127.0.0.1").unwrap(), "127.0.0.1");
        assert_eq!(primary_domain("127.0.0.1:8080").unwrap(), "127.0.0.1");
        assert_eq!(primary_domain("[::1]").unwrap(), "[::1]");
        assert_eq!(primary_domain("[::1]:9000").unwrap(), "[::1]");
    }

    #[test]
    fn unlisted_hosts_fall_back_to_the_full_host() {
        assert_eq!(primary_domain("myhost.internal").unwrap(), "myhost.internal");
        assert_eq!(primary_domain("localhost").unwrap(), "localhost");
    }

    #[test]
    fn empty_hosts_are_rejected() {
        assert!(primary_domain("").is_err());
        assert!(primary_domain("   ").is_err());
    }
}
