//! Individual upstreams.
//!
//! An [`Upstream`] is a node in the upstream forest kept by
//! [`Upstreams`][super::Upstreams]. Its links to parent, children, and
//! siblings are handles into that collection, so an upstream on its own
//! only knows about itself: its [kind][UpstreamKind] and its capabilities.
//!
//! There are two kinds of upstreams. A [`Group`] represents a named server
//! and typically has one child for each transport the server can be
//! reached through. An [`Endpoint`] is a concrete address and transport
//! that queries can be sent to.

use super::addr::EndpointAddr;
use super::caps::Caps;
use super::conf::{Config, Transport};
use super::dict::{Dict, Value};
use super::error::Error;
use core::fmt;
use std::boxed::Box;
use std::net::{IpAddr, SocketAddr, SocketAddrV6};
use std::string::String;
use tracing::trace;

/// The length of the longest textual IP address.
///
/// This is an IPv6 address with an embedded IPv4 address.
const ADDR_DATA_LEN: usize = 45;

//------------ UpstreamId ----------------------------------------------------

/// A handle to an upstream in a collection.
///
/// Handles stay valid for as long as the upstream they refer to. Once it
/// has been released, the handle becomes stale and is never handed out
/// again, even if the slot is reused for a new upstream.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct UpstreamId {
    /// The index of the slot in the collection.
    index: u32,

    /// The generation of the slot the upstream was created in.
    generation: u32,
}

impl UpstreamId {
    pub(super) fn new(index: u32, generation: u32) -> Self {
        UpstreamId { index, generation }
    }

    pub(super) fn index(self) -> usize {
        self.index as usize
    }

    pub(super) fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for UpstreamId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

//------------ Connection ----------------------------------------------------

/// A live connection to an endpoint.
///
/// Connections are owned by the transport layer's view of an endpoint and
/// attached to it via
/// [`Upstreams::attach_connection`][super::Upstreams::attach_connection].
/// When the endpoint is released, the connection is closed.
pub trait Connection {
    /// Closes the connection and releases its buffers.
    fn close(&mut self);
}

//------------ Upstream ------------------------------------------------------

/// An upstream.
#[derive(Debug)]
pub struct Upstream {
    /// The parent, or `None` for a top-level upstream.
    pub(super) parent: Option<UpstreamId>,

    /// The first child.
    pub(super) first_child: Option<UpstreamId>,

    /// The last child.
    pub(super) last_child: Option<UpstreamId>,

    /// The next sibling.
    pub(super) next: Option<UpstreamId>,

    /// What kind of upstream this is.
    kind: UpstreamKind,

    /// The capabilities this upstream may have.
    may: Caps,

    /// The capabilities this upstream has been seen to have.
    can: Caps,
}

impl Upstream {
    pub(super) fn new(kind: UpstreamKind, may: Caps) -> Self {
        Upstream {
            parent: None,
            first_child: None,
            last_child: None,
            next: None,
            kind,
            may,
            can: Caps::NONE,
        }
    }

    /// Returns the kind of the upstream.
    pub fn kind(&self) -> &UpstreamKind {
        &self.kind
    }

    /// Returns the parent of the upstream.
    ///
    /// Returns `None` for a top-level upstream.
    pub fn parent(&self) -> Option<UpstreamId> {
        self.parent
    }

    /// Returns the first child of the upstream.
    pub fn first_child(&self) -> Option<UpstreamId> {
        self.first_child
    }

    /// Returns the next sibling of the upstream.
    pub fn next(&self) -> Option<UpstreamId> {
        self.next
    }

    /// Returns whether the upstream has children.
    pub fn has_children(&self) -> bool {
        self.first_child.is_some()
    }

    /// Returns the capabilities the upstream may have.
    pub fn may(&self) -> Caps {
        self.may
    }

    /// Returns the capabilities the upstream has been seen to have.
    pub fn can(&self) -> Caps {
        self.can
    }

    /// Replaces the capabilities the upstream may have.
    ///
    /// Confirmed capabilities beyond the new ceiling are dropped.
    pub fn set_may(&mut self, may: Caps) {
        self.may = may;
        self.can &= Self::ceiling(may);
    }

    /// Records capabilities seen in an exchange with the upstream.
    ///
    /// Capabilities the upstream may not have are ignored, except for the
    /// DNSSEC observations.
    pub fn confirm(&mut self, caps: Caps) {
        let allowed = caps & Self::ceiling(self.may);
        if allowed != caps {
            trace!(
                "ignoring capabilities '{}' beyond ceiling '{}'",
                caps & !allowed,
                self.may
            );
        }
        self.can |= allowed;
    }

    /// Forgets previously confirmed capabilities.
    pub fn revoke(&mut self, caps: Caps) {
        self.can &= !caps;
    }

    /// Returns the group if this is a group upstream.
    pub fn as_group(&self) -> Option<&Group> {
        match self.kind {
            UpstreamKind::Group(ref group) => Some(group),
            UpstreamKind::Endpoint(_) => None,
        }
    }

    /// Returns the endpoint if this is an endpoint upstream.
    pub fn as_endpoint(&self) -> Option<&Endpoint> {
        match self.kind {
            UpstreamKind::Group(_) => None,
            UpstreamKind::Endpoint(ref endpoint) => Some(endpoint),
        }
    }

    pub(super) fn as_endpoint_mut(&mut self) -> Option<&mut Endpoint> {
        match self.kind {
            UpstreamKind::Group(_) => None,
            UpstreamKind::Endpoint(ref mut endpoint) => Some(endpoint),
        }
    }

    /// The bits `can` may ever contain given `may`.
    fn ceiling(may: Caps) -> Caps {
        may | Caps::DNSSEC_OBSERVATIONS
    }
}

/// # Kind-specific Behaviour
///
/// These only ever affect the upstream itself. Applying them to the
/// children is left to the collection.
impl Upstream {
    /// Releases whatever the upstream holds on to.
    pub(super) fn cleanup(&mut self) {
        match self.kind {
            UpstreamKind::Group(_) => {}
            UpstreamKind::Endpoint(ref mut endpoint) => endpoint.cleanup(),
        }
    }

    /// Applies a port for plain transports.
    pub(super) fn set_port(&mut self, port: u16) {
        match self.kind {
            UpstreamKind::Group(_) => {}
            UpstreamKind::Endpoint(ref mut endpoint) => endpoint.port = port,
        }
    }

    /// Applies a port for TLS.
    pub(super) fn set_tls_port(&mut self, port: u16) {
        match self.kind {
            UpstreamKind::Group(_) => {}
            UpstreamKind::Endpoint(ref mut endpoint) => {
                endpoint.tls_port = port
            }
        }
    }

    /// Describes the upstream without its children.
    pub(super) fn describe(&self) -> Result<Dict, Error> {
        let mut res = match self.kind {
            UpstreamKind::Group(ref group) => group.describe()?,
            UpstreamKind::Endpoint(ref endpoint) => endpoint.describe()?,
        };
        res.push("may", Value::try_caps(self.may)?)?;
        res.push("can", Value::try_caps(self.can)?)?;
        Ok(res)
    }
}

//------------ UpstreamKind --------------------------------------------------

/// The kinds of upstreams.
#[derive(Debug)]
pub enum UpstreamKind {
    /// A named server.
    Group(Group),

    /// A concrete address and transport.
    Endpoint(Endpoint),
}

//------------ Group ---------------------------------------------------------

/// A named server.
#[derive(Clone, Debug)]
pub struct Group {
    /// The name of the server.
    name: String,
}

impl Group {
    pub(super) fn new(name: String) -> Self {
        Group { name }
    }

    /// Returns the name of the server.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn describe(&self) -> Result<Dict, Error> {
        let mut res = Dict::with_capacity(4)?;
        res.push("name", Value::try_str(&self.name)?)?;
        Ok(res)
    }
}

//------------ Endpoint ------------------------------------------------------

/// A concrete address and transport.
pub struct Endpoint {
    /// The address of the endpoint.
    addr: IpAddr,

    /// The IPv6 scope identifier.
    scope_id: Option<u32>,

    /// The transport used to reach the endpoint.
    transport: Transport,

    /// The port used if the transport is plain.
    port: u16,

    /// The port used if the transport is TLS.
    tls_port: u16,

    /// The name to authenticate a TLS endpoint against.
    tls_auth_name: Option<String>,

    /// The live connection, if there is one.
    conn: Option<Box<dyn Connection>>,
}

impl Endpoint {
    /// Creates a new endpoint from a parsed address.
    ///
    /// Ports not given in the address are taken from `config`.
    pub(super) fn new(
        mut addr: EndpointAddr,
        transport: Transport,
        config: &Config,
    ) -> Self {
        Endpoint {
            addr: addr.addr(),
            scope_id: addr.scope_id(),
            transport,
            port: addr.port().unwrap_or(config.default_port()),
            tls_port: addr.tls_port().unwrap_or(config.default_tls_port()),
            tls_auth_name: addr.take_tls_auth_name(),
            conn: None,
        }
    }

    /// Returns the IP address.
    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    /// Returns the IPv6 scope identifier.
    pub fn scope_id(&self) -> Option<u32> {
        self.scope_id
    }

    /// Returns the transport.
    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// Returns the port for plain transports.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the port for TLS.
    pub fn tls_port(&self) -> u16 {
        self.tls_port
    }

    /// Returns the TLS authentication name.
    pub fn tls_auth_name(&self) -> Option<&str> {
        self.tls_auth_name.as_deref()
    }

    /// Returns the socket address to connect to.
    ///
    /// The port depends on whether the transport is encrypted.
    pub fn socket_addr(&self) -> SocketAddr {
        let port = if self.transport.is_encrypted() {
            self.tls_port
        } else {
            self.port
        };
        match (self.addr, self.scope_id) {
            (IpAddr::V6(addr), Some(scope_id)) => {
                SocketAddrV6::new(addr, port, 0, scope_id).into()
            }
            (addr, _) => SocketAddr::new(addr, port),
        }
    }

    /// Returns whether a live connection is attached.
    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Attaches a live connection, returning the previous one.
    pub(super) fn attach(
        &mut self,
        conn: Box<dyn Connection>,
    ) -> Option<Box<dyn Connection>> {
        self.conn.replace(conn)
    }

    fn cleanup(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            trace!("closing connection to {}", self.socket_addr());
            conn.close();
        }
    }

    /// Returns the textual form of the address.
    fn addr_data(&self) -> Result<String, Error> {
        use core::fmt::Write;

        let mut res = String::new();
        res.try_reserve_exact(ADDR_DATA_LEN)?;
        write!(res, "{}", self.addr).map_err(|_| Error::OutOfMemory)?;
        Ok(res)
    }

    fn describe(&self) -> Result<Dict, Error> {
        let mut res = Dict::with_capacity(8)?;
        res.push(
            "address_type",
            Value::try_str(match self.addr {
                IpAddr::V4(_) => "IPv4",
                IpAddr::V6(_) => "IPv6",
            })?,
        )?;
        res.push("address_data", Value::Str(self.addr_data()?))?;
        if let Some(scope_id) = self.scope_id {
            res.push("scope_id", Value::Int(scope_id))?;
        }
        res.push("transport", Value::try_str(self.transport.as_str())?)?;
        if self.transport.is_encrypted() {
            res.push("tls_port", Value::Int(self.tls_port.into()))?;
        } else {
            res.push("port", Value::Int(self.port.into()))?;
        }
        if let Some(name) = self.tls_auth_name.as_ref() {
            res.push("tls_auth_name", Value::try_str(name)?)?;
        }
        Ok(res)
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("addr", &self.socket_addr())
            .field("transport", &self.transport)
            .field("tls_auth_name", &self.tls_auth_name)
            .field("connected", &self.conn.is_some())
            .finish()
    }
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;

    fn endpoint(addr: &str, transport: Transport) -> Upstream {
        let addr: EndpointAddr = addr.parse().unwrap();
        let may = transport.may(addr.tls_auth_name().is_some());
        Upstream::new(
            UpstreamKind::Endpoint(Endpoint::new(
                addr,
                transport,
                &Config::default(),
            )),
            may,
        )
    }

    #[test]
    fn can_stays_below_may() {
        let mut upstream = endpoint("192.0.2.1", Transport::Udp);
        upstream.confirm(
            Caps::STATEFUL | Caps::EDNS0 | Caps::PADDING | Caps::DNSSEC_SIGS,
        );
        assert_eq!(upstream.can(), Caps::EDNS0 | Caps::DNSSEC_SIGS);

        upstream.confirm(Caps::DNSSEC_WILDCARDS | Caps::QNAME_MIN);
        assert_eq!(
            upstream.can(),
            Caps::EDNS0
                | Caps::DNSSEC_SIGS
                | Caps::DNSSEC_WILDCARDS
                | Caps::QNAME_MIN
        );

        upstream.revoke(Caps::EDNS0 | Caps::DNSSEC_SIGS);
        assert_eq!(
            upstream.can(),
            Caps::DNSSEC_WILDCARDS | Caps::QNAME_MIN
        );

        upstream.set_may(Caps::EDNS0);
        assert_eq!(upstream.can(), Caps::DNSSEC_WILDCARDS);
        let ceiling = upstream.may() | Caps::DNSSEC_OBSERVATIONS;
        assert!(ceiling.contains(upstream.can()));
    }

    #[test]
    fn ports() {
        let mut upstream = endpoint("192.0.2.1@5353", Transport::Tcp);
        let ep = upstream.as_endpoint().unwrap();
        assert_eq!(ep.port(), 5353);
        assert_eq!(ep.tls_port(), 853);
        assert_eq!(
            ep.socket_addr(),
            "192.0.2.1:5353".parse::<SocketAddr>().unwrap()
        );

        upstream.set_tls_port(8853);
        upstream.set_port(54);
        let ep = upstream.as_endpoint().unwrap();
        assert_eq!(
            ep.socket_addr(),
            "192.0.2.1:54".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(ep.tls_port(), 8853);

        let upstream = endpoint("2001:db8::1%2", Transport::Tls);
        assert_eq!(
            upstream.as_endpoint().unwrap().socket_addr(),
            SocketAddr::from(SocketAddrV6::new(
                "2001:db8::1".parse().unwrap(),
                853,
                0,
                2
            ))
        );
    }

    #[test]
    fn group_ignores_ports() {
        let mut upstream = Upstream::new(
            UpstreamKind::Group(Group::new("dns.example".into())),
            Caps::NONE,
        );
        upstream.set_port(1);
        upstream.set_tls_port(2);
        assert!(upstream.as_endpoint().is_none());
        assert_eq!(upstream.as_group().unwrap().name(), "dns.example");
    }

    #[test]
    fn describe_endpoint() {
        let mut upstream =
            endpoint("192.0.2.7#8853~dns.example", Transport::Tls);
        upstream.confirm(Caps::STATEFUL | Caps::ENCRYPTED);
        let dict = upstream.describe().unwrap();
        assert_eq!(
            dict.keys().collect::<std::vec::Vec<_>>(),
            [
                "address_type",
                "address_data",
                "transport",
                "tls_port",
                "tls_auth_name",
                "may",
                "can"
            ]
        );
        assert_eq!(dict.get("address_type").unwrap().as_str(), Some("IPv4"));
        assert_eq!(
            dict.get("address_data").unwrap().as_str(),
            Some("192.0.2.7")
        );
        assert_eq!(dict.get("tls_port").unwrap().as_int(), Some(8853));
        assert_eq!(dict.get("can").unwrap().as_list().unwrap().len(), 2);
    }

    #[test]
    fn addr_data_fits() {
        for addr in [
            "1111:2222:3333:4444:5555:6666:7777:8888",
            "::ffff:192.0.2.1",
            "255.255.255.255",
        ] {
            let upstream = endpoint(addr, Transport::Udp);
            let data = upstream.as_endpoint().unwrap().addr_data().unwrap();
            assert_eq!(data, addr);
            assert!(data.capacity() >= ADDR_DATA_LEN);
            assert!(data.len() <= ADDR_DATA_LEN);
        }
    }
}
