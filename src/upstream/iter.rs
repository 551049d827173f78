//! Iterating over upstreams complying with a requirement.
//!
//! An [`UpstreamIter`] walks the upstream forest in pre-order: an upstream
//! first, then its children, then its next sibling. Only upstreams whose
//! [`may`][super::Upstream::may] capabilities comply with the requirement
//! are returned, since an upstream has to be tried for its capabilities to
//! ever be confirmed.
//!
//! The iterator does not borrow the collection. Instead, it is handed the
//! collection on every step, so the resolver can report capabilities in
//! between. This mirrors how a failed attempt with one upstream leads to
//! the next one being asked for.
//!
//! An iterator can be given an upstream to stop at. When it gets there, it
//! is exhausted. Having a stop also makes the walk wrap around from the end
//! of the forest to its beginning, so that starting somewhere in the middle
//! still visits everything. In any case, an iterator never considers more
//! upstreams than there are in the collection, so it always terminates.

use super::caps::{complies, Caps};
use super::node::UpstreamId;
use super::upstreams::Upstreams;

//------------ UpstreamIter --------------------------------------------------

/// A cursor over the upstreams complying with a requirement.
#[derive(Clone, Copy, Debug)]
pub struct UpstreamIter {
    /// The upstream the iterator is at.
    ///
    /// If this is `None`, the iterator is exhausted.
    current: Option<UpstreamId>,

    /// The capabilities an upstream must comply with.
    cap: Caps,

    /// The upstream to stop at.
    stop_at: Option<UpstreamId>,

    /// Whether `current` still needs to be looked at.
    pending: bool,

    /// The number of upstreams looked at so far.
    visited: usize,
}

impl UpstreamIter {
    /// Creates an iterator for the collection.
    ///
    /// If an upstream has been selected for the transport class of `cap`
    /// and the collection’s selection is sticky, the iterator starts with
    /// that upstream and stops when it gets back to it. Otherwise it
    /// starts with the first upstream and stops at the end.
    pub fn new<C>(upstreams: &Upstreams<C>, cap: Caps) -> Self {
        let current = if upstreams.config().sticky() {
            upstreams.current(cap)
        } else {
            None
        };
        match current {
            Some(current) => Self::starting_at(current, cap, Some(current)),
            None => Self {
                current: upstreams.first(),
                cap,
                stop_at: None,
                pending: true,
                visited: 0,
            },
        }
    }

    /// Creates an iterator that starts with the given upstream.
    ///
    /// The iterator will stop when it gets to `stop_at`. The start itself
    /// is looked at first, even if it is `stop_at`.
    pub fn starting_at(
        start: UpstreamId,
        cap: Caps,
        stop_at: Option<UpstreamId>,
    ) -> Self {
        UpstreamIter {
            current: Some(start),
            cap,
            stop_at,
            pending: true,
            visited: 0,
        }
    }

    /// Creates an iterator that starts after the given upstream.
    ///
    /// The iterator will stop when it gets to `stop_at`.
    pub fn after(
        current: UpstreamId,
        cap: Caps,
        stop_at: Option<UpstreamId>,
    ) -> Self {
        UpstreamIter {
            current: Some(current),
            cap,
            stop_at,
            pending: false,
            visited: 0,
        }
    }

    /// Returns the capabilities upstreams must comply with.
    pub fn cap(&self) -> Caps {
        self.cap
    }

    /// Returns the upstream the iterator stops at.
    pub fn stop_at(&self) -> Option<UpstreamId> {
        self.stop_at
    }

    /// Returns the upstream last returned, if any.
    ///
    /// Before the first call to [`next`][Self::next] this is where the
    /// iterator starts. Once it is exhausted, this is `None`.
    pub fn current(&self) -> Option<UpstreamId> {
        self.current
    }

    /// Returns the next complying upstream.
    ///
    /// Returns `None` once there are no more. From then on, the iterator
    /// stays exhausted. If the upstream the iterator is at has been
    /// released since the last call, the iterator is exhausted, too.
    #[allow(clippy::should_implement_trait)]
    pub fn next<C>(&mut self, upstreams: &Upstreams<C>) -> Option<UpstreamId> {
        loop {
            let id = match self.step(upstreams) {
                Some(id) => id,
                None => {
                    self.current = None;
                    return None;
                }
            };
            self.current = Some(id);
            self.visited += 1;
            match upstreams.get(id) {
                Some(upstream) if complies(self.cap, upstream.may()) => {
                    return Some(id)
                }
                Some(_) => {}
                None => {
                    self.current = None;
                    return None;
                }
            }
        }
    }

    /// Moves on to the next upstream to look at.
    fn step<C>(&mut self, upstreams: &Upstreams<C>) -> Option<UpstreamId> {
        let current = self.current?;
        if self.visited >= upstreams.len() {
            return None;
        }
        if self.pending {
            self.pending = false;
            return Some(current);
        }
        let next = upstreams.successor(current, self.stop_at.is_some())?;
        if Some(next) == self.stop_at {
            None
        } else {
            Some(next)
        }
    }
}

//------------ Iter ----------------------------------------------------------

/// An iterator over the upstreams complying with a requirement.
///
/// This is an [`UpstreamIter`] bundled with the collection. It is returned
/// by [`Upstreams::iter`].
pub struct Iter<'a, C> {
    /// The collection.
    upstreams: &'a Upstreams<C>,

    /// The cursor.
    inner: UpstreamIter,
}

impl<'a, C> Iter<'a, C> {
    pub(super) fn new(upstreams: &'a Upstreams<C>, inner: UpstreamIter) -> Self {
        Iter { upstreams, inner }
    }

    /// Returns the cursor of the iterator.
    pub fn cursor(&self) -> UpstreamIter {
        self.inner
    }
}

impl<'a, C> Iterator for Iter<'a, C> {
    type Item = UpstreamId;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next(self.upstreams)
    }
}

//============ Testing =======================================================
