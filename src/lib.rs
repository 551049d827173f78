//! Upstream selection for a DNS stub resolver.
//!
//! A stub resolver doesn’t resolve names itself but forwards its queries
//! to one of a configured set of recursive resolvers, its upstreams. Which
//! one is picked depends on what the query needs: a stateful or encrypted
//! transport, an authenticated server, or one that returns the records
//! needed for DNSSEC validation. This crate keeps track of the upstreams
//! and what each of them may and can do, and selects the ones suitable
//! for a query.
//!
//! All functionality lives in the [upstream] module.
//!
//! # Reference of Feature Flags
//!
//! The following is the complete list of the feature flags available.
//!
//! * `logging`: Adds the
#![cfg_attr(feature = "logging", doc = "  [logging]")]
#![cfg_attr(not(feature = "logging"), doc = "  logging")]
//!   module with a helper that sets up a
//!   [tracing-subscriber](https://github.com/tokio-rs/tracing) for
//!   applications and tests.
//! * `serde`: Enables serde serialization for a number of basic types,
//!   including the introspection records describing the upstreams.

#![no_std]
#![allow(renamed_and_removed_lints)]
#![allow(clippy::unknown_clippy_lints)]
#![cfg_attr(docsrs, feature(doc_cfg))]

#[allow(unused_imports)] // Import macros even if unused.
#[macro_use]
extern crate std;

#[macro_use]
extern crate core;

#[cfg(feature = "logging")]
#[cfg_attr(docsrs, doc(cfg(feature = "logging")))]
pub mod logging;
pub mod upstream;
