//! Selecting upstream servers.
//!
//! A stub resolver forwards its queries to a configured set of recursive
//! resolvers, its _upstreams._ Each upstream may be able to do a number of
//! things: talk over a stateful transport, encrypt and authenticate, keep
//! connections alive, pad messages, or return what is needed to validate
//! DNSSEC. These are the [capabilities][Caps] of an upstream.
//!
//! Every upstream carries two sets of capabilities. What it _may_ do is
//! the ceiling derived from its configuration. What it _can_ do is the part
//! of that ceiling the transport layer has actually confirmed. Selection
//! only looks at the former, since an upstream needs to be tried before
//! anything about it can be confirmed.
//!
//! Upstreams are kept in a forest owned by an [`Upstreams`] collection.
//! Typically, a top-level [`Group`] stands for a named server and has an
//! [`Endpoint`] child for each address and transport it can be reached
//! over. Upstreams are referred to via [`UpstreamId`] handles.
//!
//! To find an upstream for a query, the resolver determines the
//! capabilities it requires and calls [`Upstreams::select`]. If that
//! upstream fails, [`Upstreams::fail_over`] moves on to the next one. For
//! more control, an [`UpstreamIter`] walks over all complying upstreams.
//!
//! ```
//! use domain_upstreams::upstream::{Caps, Parent, Transport, Upstreams};
//!
//! let mut upstreams = Upstreams::new(());
//! let quad9 = upstreams.append_server(
//!     Parent::Root,
//!     "quad9",
//!     "9.9.9.9~dns.quad9.net",
//!     &[Transport::Udp, Transport::Tls],
//! ).unwrap();
//!
//! let secure = Caps::ENCRYPTED | Caps::AUTHENTICATED;
//! assert_eq!(upstreams.select(secure), Some(quad9));
//! assert_eq!(upstreams.select(Caps::PADDING | Caps::STATEFUL), Some(quad9));
//! ```

pub use self::addr::{AddrError, EndpointAddr};
pub use self::caps::{complies, Caps, CapsFromStrError};
pub use self::conf::{Config, Transport};
pub use self::dict::{Dict, Value};
pub use self::error::Error;
pub use self::iter::{Iter, UpstreamIter};
pub use self::node::{
    Connection, Endpoint, Group, Upstream, UpstreamId, UpstreamKind,
};
pub use self::upstreams::{Children, Parent, Upstreams};

mod addr;
mod caps;
mod conf;
mod dict;
mod error;
mod iter;
mod node;
mod upstreams;
