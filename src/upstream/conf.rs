//! Upstream configuration.
//!
//! This module contains the [`Transport`] protocols an upstream can be
//! reached over and the [`Config`] of an upstream collection.

use super::caps::Caps;
use core::{cmp, fmt};

//------------ Module Configuration ------------------------------------------

/// The default port for plain DNS transports.
const DEF_PORT: u16 = 53;

/// The default port for DNS over TLS.
const DEF_TLS_PORT: u16 = 853;

/// The maximum number of upstreams in a collection.
const MAX_UPSTREAMS: DefMinMax<usize> = DefMinMax::new(256, 1, 65535);

//------------ Transport -----------------------------------------------------

/// The transport protocol to be used for an upstream.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum Transport {
    /// Unencrypted UDP transport.
    Udp,

    /// Unencrypted TCP transport.
    Tcp,

    /// DNS over TLS.
    Tls,
}

impl Transport {
    /// Returns whether the transport is a streaming protocol.
    pub fn is_stream(self) -> bool {
        match self {
            Transport::Udp => false,
            Transport::Tcp | Transport::Tls => true,
        }
    }

    /// Returns whether the transport is encrypted.
    pub fn is_encrypted(self) -> bool {
        matches!(self, Transport::Tls)
    }

    /// Returns the capabilities an upstream using this transport may have.
    ///
    /// An encrypted upstream can only ever be authenticated if there is
    /// something to authenticate it against, which is what
    /// `authenticate` says.
    pub fn may(self, authenticate: bool) -> Caps {
        let mut res = Caps::EDNS0 | Caps::QNAME_MIN | Caps::DNSSEC_VALIDATION;
        if self.is_stream() {
            res |= Caps::STATEFUL | Caps::KEEPALIVE | Caps::OOOR;
        }
        if self.is_encrypted() {
            res |= Caps::ENCRYPTED | Caps::PADDING;
            if authenticate {
                res |= Caps::AUTHENTICATED;
            }
        }
        res
    }

    /// Returns the name used when describing an upstream.
    pub fn as_str(self) -> &'static str {
        match self {
            Transport::Udp => "UDP",
            Transport::Tcp => "TCP",
            Transport::Tls => "TLS",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//------------ Config --------------------------------------------------------

/// Configuration of an upstream collection.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct Config {
    /// The port used by plain upstreams unless their address says otherwise.
    default_port: u16,

    /// The port used by TLS upstreams unless their address says otherwise.
    default_tls_port: u16,

    /// The maximum number of upstreams in the collection.
    #[cfg_attr(
        feature = "serde",
        serde(deserialize_with = "deserialize_max_upstreams")
    )]
    max_upstreams: usize,

    /// Whether selection starts with the upstream selected last.
    sticky: bool,
}

impl Config {
    /// Creates a new config with default values.
    pub fn new() -> Self {
        Default::default()
    }

    /// Returns the default port for plain transports.
    pub fn default_port(&self) -> u16 {
        self.default_port
    }

    /// Sets the default port for plain transports.
    pub fn set_default_port(&mut self, port: u16) {
        self.default_port = port
    }

    /// Returns the default port for TLS.
    pub fn default_tls_port(&self) -> u16 {
        self.default_tls_port
    }

    /// Sets the default port for TLS.
    pub fn set_default_tls_port(&mut self, port: u16) {
        self.default_tls_port = port
    }

    /// Returns the maximum number of upstreams.
    pub fn max_upstreams(&self) -> usize {
        self.max_upstreams
    }

    /// Sets the maximum number of upstreams.
    ///
    /// The value is limited to between 1 and 65535.
    pub fn set_max_upstreams(&mut self, value: usize) {
        self.max_upstreams = MAX_UPSTREAMS.limit(value)
    }

    /// Returns whether selection is sticky.
    pub fn sticky(&self) -> bool {
        self.sticky
    }

    /// Sets whether selection is sticky.
    ///
    /// If it is, selection for a transport class starts with the upstream
    /// last selected for that class. Otherwise it always starts with the
    /// first upstream.
    pub fn set_sticky(&mut self, value: bool) {
        self.sticky = value
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_port: DEF_PORT,
            default_tls_port: DEF_TLS_PORT,
            max_upstreams: MAX_UPSTREAMS.default(),
            sticky: true,
        }
    }
}

/// Deserializes the maximum number of upstreams, limiting it to its range.
#[cfg(feature = "serde")]
fn deserialize_max_upstreams<'de, D: serde::Deserializer<'de>>(
    deserializer: D,
) -> Result<usize, D::Error> {
    <usize as serde::Deserialize>::deserialize(deserializer)
        .map(|value| MAX_UPSTREAMS.limit(value))
}

//------------ DefMinMax -----------------------------------------------------

/// The default, minimum, and maximum values for a config variable.
#[derive(Clone, Copy)]
struct DefMinMax<T> {
    /// The default value.
    def: T,

    /// The minimum value.
    min: T,

    /// The maximum value.
    max: T,
}

impl<T: Copy + Ord> DefMinMax<T> {
    /// Creates a new value.
    const fn new(def: T, min: T, max: T) -> Self {
        Self { def, min, max }
    }

    /// Returns the default value.
    fn default(self) -> T {
        self.def
    }

    /// Trims the given value to fit into the minimum/maximum range.
    fn limit(self, value: T) -> T {
        cmp::max(self.min, cmp::min(self.max, value))
    }
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn transport_ceilings() {
        let udp = Transport::Udp.may(true);
        assert!(udp.contains(Caps::EDNS0 | Caps::QNAME_MIN));
        assert_eq!(udp & Caps::TRANSPORT, Caps::NONE);
        assert!(!udp.contains(Caps::KEEPALIVE));

        let tcp = Transport::Tcp.may(true);
        assert_eq!(tcp & Caps::TRANSPORT, Caps::STATEFUL);
        assert!(tcp.contains(Caps::KEEPALIVE | Caps::OOOR));
        assert!(!tcp.contains(Caps::PADDING));

        assert_eq!(
            Transport::Tls.may(false) & Caps::TRANSPORT,
            Caps::STATEFUL | Caps::ENCRYPTED
        );
        assert_eq!(
            Transport::Tls.may(true) & Caps::TRANSPORT,
            Caps::TRANSPORT
        );
        assert!(Transport::Tls.may(false).contains(Caps::PADDING));
    }

    #[test]
    fn limits_max_upstreams() {
        let mut config = Config::new();
        assert_eq!(config.max_upstreams(), 256);
        config.set_max_upstreams(0);
        assert_eq!(config.max_upstreams(), 1);
        config.set_max_upstreams(1_000_000);
        assert_eq!(config.max_upstreams(), 65535);
        config.set_max_upstreams(12);
        assert_eq!(config.max_upstreams(), 12);
    }
}
