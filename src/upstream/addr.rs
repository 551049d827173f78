//! Textual upstream addresses.
//!
//! Upstreams are configured through strings of the form
//!
//! ```text
//! address[%scope][@port][#tls_port][~tls_auth_name]
//! ```
//!
//! where `address` is an IPv4 or IPv6 address, the latter optionally in
//! square brackets, `scope` is a numeric IPv6 scope identifier, `port` and
//! `tls_port` override the ports used for plain and TLS transports, and
//! `tls_auth_name` is the name the certificate of a TLS upstream is
//! authenticated against.

use core::{fmt, str::FromStr};
use std::net::IpAddr;
use std::string::{String, ToString};

//------------ EndpointAddr --------------------------------------------------

/// A parsed upstream address.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EndpointAddr {
    /// The IP address of the upstream.
    addr: IpAddr,

    /// The IPv6 scope identifier.
    scope_id: Option<u32>,

    /// The port for plain transports, if given.
    port: Option<u16>,

    /// The port for TLS, if given.
    tls_port: Option<u16>,

    /// The name to authenticate a TLS upstream against.
    tls_auth_name: Option<String>,
}

impl EndpointAddr {
    /// Creates a new address without any of the optional parts.
    pub fn new(addr: IpAddr) -> Self {
        EndpointAddr {
            addr,
            scope_id: None,
            port: None,
            tls_port: None,
            tls_auth_name: None,
        }
    }

    /// Returns the IP address.
    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    /// Returns the IPv6 scope identifier if one was given.
    pub fn scope_id(&self) -> Option<u32> {
        self.scope_id
    }

    /// Returns the port for plain transports if one was given.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Returns the port for TLS if one was given.
    pub fn tls_port(&self) -> Option<u16> {
        self.tls_port
    }

    /// Returns the TLS authentication name if one was given.
    pub fn tls_auth_name(&self) -> Option<&str> {
        self.tls_auth_name.as_deref()
    }

    /// Sets the port for plain transports.
    pub fn set_port(&mut self, port: u16) {
        self.port = Some(port)
    }

    /// Sets the port for TLS.
    pub fn set_tls_port(&mut self, port: u16) {
        self.tls_port = Some(port)
    }

    /// Sets the TLS authentication name.
    pub fn set_tls_auth_name(&mut self, name: impl Into<String>) {
        self.tls_auth_name = Some(name.into())
    }

    /// Takes the TLS authentication name out of the address.
    pub(super) fn take_tls_auth_name(&mut self) -> Option<String> {
        self.tls_auth_name.take()
    }
}

impl From<IpAddr> for EndpointAddr {
    fn from(addr: IpAddr) -> Self {
        Self::new(addr)
    }
}

impl FromStr for EndpointAddr {
    type Err = AddrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // The parts are split off from the back so that the address
        // itself, which may contain colons, is dealt with last.
        let (s, tls_auth_name) = match s.split_once('~') {
            Some((_, "")) => return Err(AddrError::EmptyAuthName),
            Some((s, name)) => (s, Some(name.to_string())),
            None => (s, None),
        };
        let (s, tls_port) = match s.split_once('#') {
            Some((s, port)) => (s, Some(parse_port(port)?)),
            None => (s, None),
        };
        let (s, port) = match s.split_once('@') {
            Some((s, port)) => (s, Some(parse_port(port)?)),
            None => (s, None),
        };
        let (s, scope) = match s.split_once('%') {
            Some((s, scope)) => (s, Some(scope)),
            None => (s, None),
        };
        let s = s
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
            .unwrap_or(s);
        let addr = IpAddr::from_str(s).map_err(|_| AddrError::BadAddress)?;
        let scope_id = match (scope, addr) {
            (None, _) => None,
            (Some(scope), IpAddr::V6(_)) => {
                Some(scope.parse().map_err(|_| AddrError::BadScope)?)
            }
            (Some(_), IpAddr::V4(_)) => return Err(AddrError::BadScope),
        };
        Ok(EndpointAddr {
            addr,
            scope_id,
            port,
            tls_port,
            tls_auth_name,
        })
    }
}

impl fmt::Display for EndpointAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.addr)?;
        if let Some(scope) = self.scope_id {
            write!(f, "%{}", scope)?;
        }
        if let Some(port) = self.port {
            write!(f, "@{}", port)?;
        }
        if let Some(port) = self.tls_port {
            write!(f, "#{}", port)?;
        }
        if let Some(name) = self.tls_auth_name.as_ref() {
            write!(f, "~{}", name)?;
        }
        Ok(())
    }
}

/// Parses a port number, rejecting port 0.
fn parse_port(s: &str) -> Result<u16, AddrError> {
    match s.parse::<u16>() {
        Ok(0) | Err(_) => Err(AddrError::BadPort),
        Ok(port) => Ok(port),
    }
}

//------------ AddrError -----------------------------------------------------

/// An upstream address could not be parsed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AddrError {
    /// The address part is not an IP address.
    BadAddress,

    /// The scope is not numeric or was given for an IPv4 address.
    BadScope,

    /// A port is not a number between 1 and 65535.
    BadPort,

    /// The TLS authentication name is empty.
    EmptyAuthName,
}

impl fmt::Display for AddrError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            AddrError::BadAddress => "invalid IP address",
            AddrError::BadScope => "invalid scope identifier",
            AddrError::BadPort => "invalid port",
            AddrError::EmptyAuthName => "empty TLS authentication name",
        })
    }
}

impl std::error::Error for AddrError {}

//============ Testing =======================================================
