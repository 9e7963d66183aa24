//! Host identity.
//!
//! A [`HostAddress`] is what the pool keys hosts by and what a released
//! connection is matched back against. Two addresses are the same host only
//! when scheme, host, port, local bind address and proxy all agree.

use std::fmt;
use std::net::IpAddr;

use serde::{Serialize, Serializer};
use url::Url;

/// Error type for address parsing.
#[derive(Debug, thiserror::Error)]
pub enum AddressError {
    #[error("invalid address `{input}`: {source}")]
    InvalidUrl {
        input: String,
        #[source]
        source: url::ParseError,
    },
    #[error("address `{0}` has no host")]
    MissingHost(String),
    #[error("address `{0}` has no port and no default for its scheme")]
    MissingPort(String),
}

/// Proxy a host is reached through.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxyAddress {
    pub host: String,
    pub port: u16,
}

impl ProxyAddress {
    /// Parse `host:port` or a full `http://host:port` URL.
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let (_, host, port) = split_url(input)?;
        Ok(Self { host, port })
    }
}

impl fmt::Display for ProxyAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Identity of one backend host.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostAddress {
    scheme: String,
    host: String,
    port: u16,
    local_address: Option<IpAddr>,
    proxy: Option<ProxyAddress>,
}

impl HostAddress {
    /// Plain `http` address with no bind address and no proxy.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: "http".to_string(),
            host: host.into(),
            port,
            local_address: None,
            proxy: None,
        }
    }

    /// Parse `scheme://host[:port]` (a bare `host:port` is taken as `http`).
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let (scheme, host, port) = split_url(input)?;
        Ok(Self {
            scheme,
            host,
            port,
            local_address: None,
            proxy: None,
        })
    }

    pub fn with_local_address(mut self, local_address: IpAddr) -> Self {
        self.local_address = Some(local_address);
        self
    }

    pub fn with_proxy(mut self, proxy: ProxyAddress) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn local_address(&self) -> Option<IpAddr> {
        self.local_address
    }

    pub fn proxy(&self) -> Option<&ProxyAddress> {
        self.proxy.as_ref()
    }

    /// `host:port`, as used in the `Host` header.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Where the TCP connection actually goes: the proxy when there is one.
    pub fn connect_target(&self) -> (&str, u16) {
        match &self.proxy {
            Some(proxy) => (proxy.host.as_str(), proxy.port),
            None => (self.host.as_str(), self.port),
        }
    }
}

impl fmt::Display for HostAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)?;
        if let Some(proxy) = &self.proxy {
            write!(f, " via {}", proxy)?;
        }
        Ok(())
    }
}

impl Serialize for HostAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

fn split_url(input: &str) -> Result<(String, String, u16), AddressError> {
    let normalized = if input.contains("://") {
        input.to_string()
    } else {
        format!("http://{}", input)
    };
    let url = Url::parse(&normalized).map_err(|source| AddressError::InvalidUrl {
        input: input.to_string(),
        source,
    })?;
    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| AddressError::MissingHost(input.to_string()))?
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_string();
    let port = url
        .port_or_known_default()
        .ok_or_else(|| AddressError::MissingPort(input.to_string()))?;
    Ok((url.scheme().to_string(), host, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_and_bare_addresses() {
        let full = HostAddress::parse("http://10.0.0.1:8080").unwrap();
        assert_eq!(full.scheme(), "http");
        assert_eq!(full.host(), "10.0.0.1");
        assert_eq!(full.port(), 8080);

        let bare = HostAddress::parse("backend.local:9000").unwrap();
        assert_eq!(bare, HostAddress::new("backend.local", 9000));
    }

    #[test]
    fn default_port_comes_from_scheme() {
        let addr = HostAddress::parse("http://backend.local").unwrap();
        assert_eq!(addr.port(), 80);
    }

    #[test]
    fn proxy_and_bind_address_are_part_of_identity() {
        let plain = HostAddress::new("a", 80);
        let proxied = plain
            .clone()
            .with_proxy(ProxyAddress::parse("proxy.local:3128").unwrap());
        let bound = plain.clone().with_local_address("127.0.0.1".parse().unwrap());

        assert_ne!(plain, proxied);
        assert_ne!(plain, bound);
        assert_eq!(proxied.connect_target(), ("proxy.local", 3128));
        assert_eq!(plain.connect_target(), ("a", 80));
    }

    #[test]
    fn display_is_url_like() {
        assert_eq!(HostAddress::new("h", 81).to_string(), "http://h:81");
    }

    #[test]
    fn rejects_garbage() {
        assert!(HostAddress::parse("http://").is_err());
        assert!(HostAddress::parse("::::").is_err());
    }
}
