//! The collection of all upstreams of a resolver.

use super::addr::EndpointAddr;
use super::caps::Caps;
use super::conf::{Config, Transport};
use super::dict::{Dict, Value};
use super::error::Error;
use super::iter::{Iter, UpstreamIter};
use super::node::{
    Connection, Endpoint, Group, Upstream, UpstreamId, UpstreamKind,
};
use core::fmt;
use std::boxed::Box;
use std::string::String;
use std::vec::Vec;
use tracing::{debug, trace};

//------------ Parent --------------------------------------------------------

/// Where to append a new upstream.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Parent {
    /// At the top level of the collection.
    Root,

    /// As a child of the given upstream.
    Node(UpstreamId),
}

impl From<UpstreamId> for Parent {
    fn from(id: UpstreamId) -> Self {
        Parent::Node(id)
    }
}

impl From<Option<UpstreamId>> for Parent {
    fn from(id: Option<UpstreamId>) -> Self {
        id.map_or(Parent::Root, Parent::Node)
    }
}

//------------ Upstreams -----------------------------------------------------

/// The upstreams of a resolver.
///
/// The collection owns a forest of [`Upstream`]s. Top-level upstreams
/// typically are named servers with a child for each concrete endpoint,
/// but any upstream can have children. Upstreams are referred to by
/// [`UpstreamId`] handles that become stale once the upstream is released.
///
/// The collection is bound to the resolver context given when creating it.
/// Every upstream can reach it via [`context_of`][Self::context_of].
///
/// For each of the eight combinations of the transport class capabilities
/// (see [`Caps::TRANSPORT`]), the collection remembers the upstream last
/// selected. Selections for the same class start there, so that an
/// upstream with an established connection keeps being used. These
/// remembered upstreams are only handles and are checked each time they
/// are used.
///
/// Dropping the collection releases all upstreams in the same order as
/// [`cleanup`][Self::cleanup].
pub struct Upstreams<C> {
    /// The resolver context.
    context: C,

    /// Configuration.
    config: Config,

    /// The slots holding upstreams.
    slots: Vec<Slot>,

    /// The indexes of empty slots.
    free: Vec<u32>,

    /// The number of live upstreams.
    len: usize,

    /// The first top-level upstream.
    first: Option<UpstreamId>,

    /// The last top-level upstream.
    last: Option<UpstreamId>,

    /// The upstream selected last for each transport class.
    current: [Option<UpstreamId>; Caps::TRANSPORT_CLASSES],
}

/// # Creation and Access
///
impl<C> Upstreams<C> {
    /// Creates an empty collection bound to the given context.
    pub fn new(context: C) -> Self {
        Self::with_config(context, Config::default())
    }

    /// Creates an empty collection with the given configuration.
    pub fn with_config(context: C, config: Config) -> Self {
        Upstreams {
            context,
            config,
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
            first: None,
            last: None,
            current: [None; Caps::TRANSPORT_CLASSES],
        }
    }

    /// Returns the resolver context.
    pub fn context(&self) -> &C {
        &self.context
    }

    /// Returns the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the number of upstreams.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns whether there are no upstreams.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns whether `id` refers to a live upstream.
    pub fn contains(&self, id: UpstreamId) -> bool {
        self.get(id).is_some()
    }

    /// Returns the upstream for the given handle.
    ///
    /// Returns `None` if the handle is stale.
    pub fn get(&self, id: UpstreamId) -> Option<&Upstream> {
        self.slots
            .get(id.index())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.upstream.as_ref())
    }

    /// Returns the upstream for the given handle mutably.
    ///
    /// This is how the transport layer reports capabilities.
    pub fn get_mut(&mut self, id: UpstreamId) -> Option<&mut Upstream> {
        self.slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.upstream.as_mut())
    }

    /// Returns the first top-level upstream.
    pub fn first(&self) -> Option<UpstreamId> {
        self.first
    }

    /// Returns the parent of an upstream.
    ///
    /// Returns `None` for top-level upstreams and stale handles.
    pub fn parent(&self, id: UpstreamId) -> Option<UpstreamId> {
        self.get(id).and_then(Upstream::parent)
    }

    /// Returns an iterator over the children of `parent`.
    ///
    /// For [`Parent::Root`], these are the top-level upstreams. The
    /// iterator is empty if the parent is stale.
    pub fn children(&self, parent: impl Into<Parent>) -> Children<'_, C> {
        let next = match parent.into() {
            Parent::Root => self.first,
            Parent::Node(id) => self.get(id).and_then(Upstream::first_child),
        };
        Children {
            upstreams: self,
            next,
        }
    }

    /// Returns the resolver context for an upstream.
    ///
    /// The context is found by following the parents up to the top level.
    /// Returns `None` if the handle is stale.
    pub fn context_of(&self, id: UpstreamId) -> Option<&C> {
        let mut upstream = self.get(id)?;
        while let Some(parent) = upstream.parent {
            upstream = self.get(parent)?;
        }
        Some(&self.context)
    }

    /// Returns a live upstream, panicking otherwise.
    fn live(&self, id: UpstreamId) -> &Upstream {
        match self.get(id) {
            Some(upstream) => upstream,
            None => panic!("use of released upstream {}", id),
        }
    }

    /// Returns a live upstream mutably, panicking otherwise.
    fn live_mut(&mut self, id: UpstreamId) -> &mut Upstream {
        match self.get_mut(id) {
            Some(upstream) => upstream,
            None => panic!("use of released upstream {}", id),
        }
    }
}

/// # Building the Forest
///
impl<C> Upstreams<C> {
    /// Appends a new endpoint given as a string.
    ///
    /// The string is parsed as an [`EndpointAddr`]. The new endpoint
    /// becomes the last child of `parent`. What it may do is derived from
    /// the transport; nothing has been confirmed yet.
    ///
    /// # Panics
    ///
    /// If `parent` refers to a released upstream.
    pub fn append_endpoint(
        &mut self,
        parent: impl Into<Parent>,
        addr: &str,
        transport: Transport,
    ) -> Result<UpstreamId, Error> {
        let addr = addr.parse::<EndpointAddr>()?;
        self.append_endpoint_addr(parent, addr, transport)
    }

    /// Appends a new endpoint given as a parsed address.
    ///
    /// # Panics
    ///
    /// If `parent` refers to a released upstream.
    pub fn append_endpoint_addr(
        &mut self,
        parent: impl Into<Parent>,
        addr: EndpointAddr,
        transport: Transport,
    ) -> Result<UpstreamId, Error> {
        let may = transport.may(addr.tls_auth_name().is_some());
        let endpoint = Endpoint::new(addr, transport, &self.config);
        self.insert(
            parent.into(),
            Upstream::new(UpstreamKind::Endpoint(endpoint), may),
        )
    }

    /// Appends a new named server without any endpoints.
    ///
    /// # Panics
    ///
    /// If `parent` refers to a released upstream.
    pub fn append_group(
        &mut self,
        parent: impl Into<Parent>,
        name: &str,
        may: Caps,
    ) -> Result<UpstreamId, Error> {
        let mut owned = String::new();
        owned.try_reserve_exact(name.len())?;
        owned.push_str(name);
        self.insert(
            parent.into(),
            Upstream::new(UpstreamKind::Group(Group::new(owned)), may),
        )
    }

    /// Appends a named server with an endpoint for each transport.
    ///
    /// The server may do whatever any of its endpoints may do. Either the
    /// server and all its endpoints are added or, if an error is returned,
    /// nothing is.
    ///
    /// # Panics
    ///
    /// If `parent` refers to a released upstream.
    pub fn append_server(
        &mut self,
        parent: impl Into<Parent>,
        name: &str,
        addr: &str,
        transports: &[Transport],
    ) -> Result<UpstreamId, Error> {
        let addr = addr.parse::<EndpointAddr>()?;
        if self.len + 1 + transports.len() > self.config.max_upstreams() {
            return Err(Error::ResourceExhausted);
        }
        let authenticate = addr.tls_auth_name().is_some();
        let may = transports.iter().fold(Caps::NONE, |may, transport| {
            may | transport.may(authenticate)
        });
        let group = self.append_group(parent, name, may)?;
        for transport in transports {
            if let Err(err) =
                self.append_endpoint_addr(group, addr.clone(), *transport)
            {
                self.release(group);
                return Err(err);
            }
        }
        Ok(group)
    }

    /// Attaches a live connection to an endpoint.
    ///
    /// Returns the connection previously attached, if any. If the upstream
    /// is not an endpoint, the connection is handed back.
    ///
    /// # Panics
    ///
    /// If `id` refers to a released upstream.
    pub fn attach_connection(
        &mut self,
        id: UpstreamId,
        conn: Box<dyn Connection>,
    ) -> Option<Box<dyn Connection>> {
        match self.live_mut(id).as_endpoint_mut() {
            Some(endpoint) => endpoint.attach(conn),
            None => Some(conn),
        }
    }

    /// Inserts an upstream as the last child of `parent`.
    fn insert(
        &mut self,
        parent: Parent,
        mut upstream: Upstream,
    ) -> Result<UpstreamId, Error> {
        if let Parent::Node(parent) = parent {
            assert!(
                self.contains(parent),
                "append to released upstream {}",
                parent
            );
        }
        if self.len >= self.config.max_upstreams() {
            return Err(Error::ResourceExhausted);
        }

        upstream.parent = match parent {
            Parent::Root => None,
            Parent::Node(parent) => Some(parent),
        };
        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.upstream = Some(upstream);
                UpstreamId::new(index, slot.generation)
            }
            None => {
                self.slots.try_reserve(1)?;
                let index = match u32::try_from(self.slots.len()) {
                    Ok(index) => index,
                    Err(_) => return Err(Error::ResourceExhausted),
                };
                self.slots.push(Slot {
                    generation: 0,
                    upstream: Some(upstream),
                });
                UpstreamId::new(index, 0)
            }
        };
        self.len += 1;

        let prev = match parent {
            Parent::Root => self.last.replace(id),
            Parent::Node(parent) => {
                let parent = self.live_mut(parent);
                if parent.first_child.is_none() {
                    parent.first_child = Some(id);
                }
                parent.last_child.replace(id)
            }
        };
        match prev {
            Some(prev) => self.live_mut(prev).next = Some(id),
            None => {
                if let Parent::Root = parent {
                    self.first = Some(id)
                }
            }
        }

        debug!("added upstream {} under {:?}", id, parent);
        Ok(id)
    }
}

/// # Tearing Down
///
impl<C> Upstreams<C> {
    /// Releases an upstream and all its descendants.
    ///
    /// The upstream is removed from its parent. It then releases whatever
    /// it holds, most importantly a live connection, before its children
    /// are released in order. All handles to any of these upstreams become
    /// stale.
    ///
    /// # Panics
    ///
    /// If `id` refers to an upstream that has already been released.
    pub fn release(&mut self, id: UpstreamId) {
        let upstream = self.live(id);
        let (parent, next) = (upstream.parent, upstream.next);

        // Find the previous sibling and unlink.
        let mut prev = None;
        let mut cursor = match parent {
            None => self.first,
            Some(parent) => self.live(parent).first_child,
        };
        while let Some(sibling) = cursor {
            if sibling == id {
                break;
            }
            prev = Some(sibling);
            cursor = self.live(sibling).next;
        }
        match prev {
            Some(prev) => self.live_mut(prev).next = next,
            None => match parent {
                None => self.first = next,
                Some(parent) => self.live_mut(parent).first_child = next,
            },
        }
        if next.is_none() {
            match parent {
                None => self.last = prev,
                Some(parent) => self.live_mut(parent).last_child = prev,
            }
        }

        self.release_tree(id);
    }

    /// Releases all upstreams.
    ///
    /// Top-level upstreams are released in order, each before its
    /// descendants. Afterwards, the collection is empty and remembers no
    /// selections.
    pub fn cleanup(&mut self) {
        let mut cursor = self.first.take();
        self.last = None;
        while let Some(id) = cursor {
            cursor = self.live(id).next;
            self.release_tree(id);
        }
        self.current = [None; Caps::TRANSPORT_CLASSES];
        debug_assert_eq!(self.len, 0);
    }

    /// Releases an already unlinked upstream and its descendants.
    ///
    /// Upstreams are released in pre-order. The next siblings still to be
    /// dealt with are kept on a stack, so nesting depth is not limited by
    /// the call stack.
    fn release_tree(&mut self, id: UpstreamId) {
        let mut pending = Vec::new();
        let mut cursor = Some(id);
        loop {
            let current = match cursor {
                Some(current) => current,
                None => match pending.pop() {
                    Some(next) => next,
                    None => break,
                },
            };
            let mut upstream = self.take(current);
            trace!("releasing upstream {}", current);
            upstream.cleanup();
            if current != id {
                if let Some(next) = upstream.next {
                    pending.push(next);
                }
            }
            cursor = upstream.first_child;
        }
    }

    /// Removes an upstream from its slot.
    fn take(&mut self, id: UpstreamId) -> Upstream {
        let slot = &mut self.slots[id.index()];
        debug_assert_eq!(slot.generation, id.generation());
        let upstream = match slot.upstream.take() {
            Some(upstream) => upstream,
            None => panic!("double release of upstream {}", id),
        };
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index() as u32);
        self.len -= 1;
        upstream
    }
}

impl<C> Drop for Upstreams<C> {
    fn drop(&mut self) {
        self.cleanup()
    }
}

/// # Ports
///
impl<C> Upstreams<C> {
    /// Applies a port for plain transports to all upstreams.
    pub fn set_port(&mut self, port: u16) {
        let mut cursor = self.first;
        while let Some(id) = cursor {
            self.apply_port(id, port);
            cursor = self.live(id).next;
        }
    }

    /// Applies a port for TLS to all upstreams.
    pub fn set_tls_port(&mut self, port: u16) {
        let mut cursor = self.first;
        while let Some(id) = cursor {
            self.apply_tls_port(id, port);
            cursor = self.live(id).next;
        }
    }

    /// Applies a port for plain transports to an upstream.
    ///
    /// An endpoint uses the port if its transport is plain. The port is
    /// also applied to all descendants.
    ///
    /// # Panics
    ///
    /// If `id` refers to a released upstream.
    pub fn apply_port(&mut self, id: UpstreamId, port: u16) {
        self.for_each_in_tree(id, |upstream| upstream.set_port(port))
    }

    /// Applies a port for TLS to an upstream and all its descendants.
    ///
    /// # Panics
    ///
    /// If `id` refers to a released upstream.
    pub fn apply_tls_port(&mut self, id: UpstreamId, port: u16) {
        self.for_each_in_tree(id, |upstream| upstream.set_tls_port(port))
    }

    /// Calls `op` on an upstream and then on all descendants in order.
    fn for_each_in_tree<F>(&mut self, id: UpstreamId, mut op: F)
    where
        F: FnMut(&mut Upstream),
    {
        let stop_at = self.successor_outside(id);
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            op(self.live_mut(current));
            cursor = self.successor(current, false);
            if cursor == stop_at {
                break;
            }
        }
    }
}

/// # Traversal
///
impl<C> Upstreams<C> {
    /// Returns the upstream following `id` in pre-order.
    ///
    /// This is the first child if there is one, otherwise the next
    /// sibling of `id` or of its closest ancestor that has one. If there
    /// is no such upstream, the result is the first top-level upstream if
    /// `wrap` is `true` and `None` otherwise. It also is `None` if `id` is
    /// stale.
    pub fn successor(&self, id: UpstreamId, wrap: bool) -> Option<UpstreamId> {
        let upstream = self.get(id)?;
        if upstream.first_child.is_some() {
            return upstream.first_child;
        }
        match self.successor_outside(id) {
            Some(next) => Some(next),
            None if wrap => self.first,
            None => None,
        }
    }

    /// Returns the first upstream after `id` in pre-order that is not one
    /// of its descendants.
    fn successor_outside(&self, id: UpstreamId) -> Option<UpstreamId> {
        let mut upstream = self.get(id)?;
        loop {
            if upstream.next.is_some() {
                return upstream.next;
            }
            upstream = self.get(upstream.parent?)?;
        }
    }
}

/// # Selection
///
impl<C> Upstreams<C> {
    /// Returns the upstream last selected for the transport class of `cap`.
    ///
    /// Only the transport class bits of `cap` are considered. Returns
    /// `None` if nothing was selected yet or the upstream has since been
    /// released.
    pub fn current(&self, cap: Caps) -> Option<UpstreamId> {
        self.current[cap.transport_index()].filter(|id| self.contains(*id))
    }

    /// Returns an iterator over all upstreams complying with `cap`.
    ///
    /// The iterator starts where [`select`][Self::select] would start
    /// looking. Iterating does not change the remembered selection.
    pub fn iter(&self, cap: Caps) -> Iter<'_, C> {
        Iter::new(self, UpstreamIter::new(self, cap))
    }

    /// Selects an upstream complying with `cap`.
    ///
    /// If an upstream was selected for the transport class of `cap`
    /// before and it is still around, the search starts there. Otherwise,
    /// it starts with the first upstream. Every upstream is considered at
    /// most once.
    ///
    /// If nothing is remembered for the transport class of `cap` yet, or
    /// the remembered upstream has been released, the selected upstream is
    /// remembered. Otherwise the remembered upstream stays, even if this
    /// requirement led elsewhere; only [`fail_over`][Self::fail_over]
    /// moves it. Returns `None` if no upstream complies. This isn’t an
    /// error but means that a different requirement should be tried.
    pub fn select(&mut self, cap: Caps) -> Option<UpstreamId> {
        let found = UpstreamIter::new(self, cap).next(self);
        if let Some(id) = found {
            if self.current(cap).is_none() {
                self.remember(cap, id);
            }
        }
        found
    }

    /// Selects the next upstream after the current one.
    ///
    /// This is used when the upstream currently selected for the transport
    /// class of `cap` has failed. The search starts after that upstream,
    /// wraps around at the end, and stops before getting back to it. If
    /// there is no other complying upstream, returns `None` and keeps the
    /// current selection. If there is no current selection, this is the
    /// same as [`select`][Self::select].
    pub fn fail_over(&mut self, cap: Caps) -> Option<UpstreamId> {
        let current = match self.current(cap) {
            Some(current) => current,
            None => return self.select(cap),
        };
        let found = UpstreamIter::after(current, cap, Some(current)).next(self);
        match found {
            Some(id) => {
                debug!("failing over from upstream {} to {}", current, id);
                self.remember(cap, id);
            }
            None => {
                debug!("no upstream to fail over to from {}", current);
            }
        }
        found
    }

    /// Remembers the selected upstream for the transport class of `cap`.
    fn remember(&mut self, cap: Caps, id: UpstreamId) {
        let slot = &mut self.current[cap.transport_index()];
        if *slot != Some(id) {
            trace!(
                "upstream {} now current for class {}",
                id,
                cap.transport_index()
            );
            *slot = Some(id);
        }
    }
}

/// # Introspection
///
impl<C> Upstreams<C> {
    /// Describes an upstream and its descendants.
    ///
    /// If the upstream has children, their descriptions are added as a
    /// list under `"children"`.
    ///
    /// # Panics
    ///
    /// If `id` refers to a released upstream.
    pub fn describe(&self, id: UpstreamId) -> Result<Dict, Error> {
        let mut root = Record::new(self.live(id))?;
        let mut stack: Vec<Record> = Vec::new();
        loop {
            let record = stack.last_mut().unwrap_or(&mut root);
            match record.next_child {
                Some(child) => {
                    let upstream = self.live(child);
                    record.next_child = upstream.next;
                    let record = Record::new(upstream)?;
                    stack.try_reserve(1)?;
                    stack.push(record);
                }
                None => {
                    let done = match stack.pop() {
                        Some(done) => done.finish()?,
                        None => return root.finish(),
                    };
                    stack.last_mut().unwrap_or(&mut root).push(done)?;
                }
            }
        }
    }

    /// Describes all upstreams.
    ///
    /// Returns one record per top-level upstream in order.
    pub fn to_list(&self) -> Result<Vec<Dict>, Error> {
        let mut res = Vec::new();
        for id in self.children(Parent::Root) {
            res.try_reserve(1)?;
            res.push(self.describe(id)?);
        }
        Ok(res)
    }
}

impl<C: fmt::Debug> fmt::Debug for Upstreams<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upstreams")
            .field("context", &self.context)
            .field("config", &self.config)
            .field("len", &self.len)
            .field("current", &self.current)
            .finish()
    }
}

//------------ Slot ----------------------------------------------------------

/// A place for an upstream.
struct Slot {
    /// The generation of the slot.
    ///
    /// This is increased every time an upstream is released so that old
    /// handles can be told from new ones.
    generation: u32,

    /// The upstream if the slot is in use.
    upstream: Option<Upstream>,
}

//------------ Record --------------------------------------------------------

/// A description of an upstream whose children are still being described.
struct Record {
    /// The description of the upstream itself.
    dict: Dict,

    /// The descriptions of the children so far.
    children: Vec<Value>,

    /// The next child to describe.
    next_child: Option<UpstreamId>,
}

impl Record {
    fn new(upstream: &Upstream) -> Result<Self, Error> {
        Ok(Record {
            dict: upstream.describe()?,
            children: Vec::new(),
            next_child: upstream.first_child,
        })
    }

    fn push(&mut self, child: Dict) -> Result<(), Error> {
        self.children.try_reserve(1)?;
        self.children.push(Value::Dict(child));
        Ok(())
    }

    fn finish(mut self) -> Result<Dict, Error> {
        if !self.children.is_empty() {
            self.dict.push("children", Value::List(self.children))?;
        }
        Ok(self.dict)
    }
}

//------------ Children ------------------------------------------------------

/// An iterator over the children of an upstream.
pub struct Children<'a, C> {
    /// The collection.
    upstreams: &'a Upstreams<C>,

    /// The next child.
    next: Option<UpstreamId>,
}

impl<'a, C> Iterator for Children<'a, C> {
    type Item = UpstreamId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        self.next = self.upstreams.get(id).and_then(Upstream::next);
        Some(id)
    }
}

//============ Testing =======================================================
