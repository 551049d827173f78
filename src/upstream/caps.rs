//! Upstream capabilities.
//!
//! Every upstream carries two sets of capabilities: those it may offer
//! according to its configuration and those it has been seen to actually
//! provide. Both are represented by [`Caps`], a small bit set over a closed
//! vocabulary.
//!
//! The three lowest bits describe the transport class of an upstream:
//! whether it is [stateful][Caps::STATEFUL], [encrypted][Caps::ENCRYPTED],
//! and [authenticated][Caps::AUTHENTICATED]. Together they form an index
//! into the eight possible combinations that is used for remembering the
//! upstream currently in use for each class.

use core::{fmt, ops, str};
#[cfg(feature = "serde")]
use std::string::String;

//------------ Caps ----------------------------------------------------------

/// A set of upstream capabilities.
#[derive(Clone, Copy, Default, Eq, Hash, PartialEq)]
pub struct Caps(u16);

impl Caps {
    /// No capabilities at all.
    ///
    /// Every upstream complies with this requirement.
    pub const NONE: Self = Caps(0);

    /// The upstream keeps a connection open across queries.
    pub const STATEFUL: Self = Caps(0x0001);

    /// The connection to the upstream is encrypted.
    pub const ENCRYPTED: Self = Caps(0x0002);

    /// The identity of the upstream has been authenticated.
    pub const AUTHENTICATED: Self = Caps(0x0004);

    /// The upstream can be used for QNAME minimisation.
    pub const QNAME_MIN: Self = Caps(0x0008);

    /// The upstream may answer queries out of order.
    pub const OOOR: Self = Caps(0x0010);

    /// The upstream supports EDNS0.
    pub const EDNS0: Self = Caps(0x0020);

    /// The upstream supports the EDNS0 TCP keepalive option.
    pub const KEEPALIVE: Self = Caps(0x0040);

    /// The upstream supports the EDNS0 padding option.
    pub const PADDING: Self = Caps(0x0080);

    /// The upstream performs DNSSEC validation.
    pub const DNSSEC_VALIDATION: Self = Caps(0x0100);

    /// The upstream has been seen to return DNSSEC signatures.
    pub const DNSSEC_SIGS: Self = Caps(0x0200);

    /// The upstream has been seen to return NSEC or NSEC3 records.
    pub const DNSSEC_NSECS: Self = Caps(0x0400);

    /// The upstream has been seen to mangle wildcard expansion proofs.
    pub const DNSSEC_WILDCARDS: Self = Caps(0x0800);

    /// The transport class bits.
    pub const TRANSPORT: Self = Caps(0x0007);

    /// The bits that are only ever learned from responses.
    ///
    /// These are not bounded by what an upstream may do.
    pub const DNSSEC_OBSERVATIONS: Self = Caps(0x0E00);

    /// Everything an upstream might conceivably offer.
    ///
    /// This is every bit but the transport class bits.
    pub const MIGHT: Self = Caps(0xFFF8);

    /// The number of distinct transport classes.
    pub const TRANSPORT_CLASSES: usize = 8;

    /// Creates a value from its raw bits.
    #[must_use]
    pub const fn from_bits(bits: u16) -> Self {
        Caps(bits)
    }

    /// Returns the raw bits.
    #[must_use]
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Returns whether no capability is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns whether all capabilities in `other` are also in `self`.
    #[must_use]
    pub const fn contains(self, other: Caps) -> bool {
        complies(other, self)
    }

    /// Returns the transport class index between 0 and 7.
    #[must_use]
    pub const fn transport_index(self) -> usize {
        (self.0 & Self::TRANSPORT.0) as usize
    }

    /// Returns the transport class for the given index.
    ///
    /// Only the lowest three bits of `index` are considered.
    #[must_use]
    pub const fn from_transport_index(index: usize) -> Self {
        Caps((index as u16) & Self::TRANSPORT.0)
    }

    /// Returns an iterator over the names of the capabilities in the set.
    ///
    /// Bits outside the known vocabulary are skipped.
    pub fn names(self) -> impl Iterator<Item = &'static str> {
        NAMES
            .iter()
            .filter(move |(cap, _)| self.contains(*cap))
            .map(|(_, name)| *name)
    }

    /// Returns the name of a single capability.
    ///
    /// Returns `None` if `self` does not consist of exactly one known bit.
    #[must_use]
    pub fn name(self) -> Option<&'static str> {
        NAMES
            .iter()
            .find(|(cap, _)| *cap == self)
            .map(|(_, name)| *name)
    }
}

/// Returns whether `have` complies with the requirement `req`.
///
/// This is the case if every capability in `req` is also present in
/// `have`.
#[must_use]
pub const fn complies(req: Caps, have: Caps) -> bool {
    req.0 & have.0 == req.0
}

/// The textual names of the capabilities in bit order.
static NAMES: [(Caps, &str); 12] = [
    (Caps::STATEFUL, "stateful"),
    (Caps::ENCRYPTED, "encrypted"),
    (Caps::AUTHENTICATED, "authenticated"),
    (Caps::QNAME_MIN, "qname-minimisation"),
    (Caps::OOOR, "out-of-order"),
    (Caps::EDNS0, "edns0"),
    (Caps::KEEPALIVE, "keepalive"),
    (Caps::PADDING, "padding"),
    (Caps::DNSSEC_VALIDATION, "dnssec-validation"),
    (Caps::DNSSEC_SIGS, "dnssec-signatures"),
    (Caps::DNSSEC_NSECS, "dnssec-nsecs"),
    (Caps::DNSSEC_WILDCARDS, "dnssec-wildcards"),
];

//--- Bit operations

impl ops::BitOr for Caps {
    type Output = Self;

    fn bitor(self, other: Self) -> Self {
        Caps(self.0 | other.0)
    }
}

impl ops::BitOrAssign for Caps {
    fn bitor_assign(&mut self, other: Self) {
        self.0 |= other.0
    }
}

impl ops::BitAnd for Caps {
    type Output = Self;

    fn bitand(self, other: Self) -> Self {
        Caps(self.0 & other.0)
    }
}

impl ops::BitAndAssign for Caps {
    fn bitand_assign(&mut self, other: Self) {
        self.0 &= other.0
    }
}

impl ops::Not for Caps {
    type Output = Self;

    fn not(self) -> Self {
        Caps(!self.0)
    }
}

//--- From

impl From<u16> for Caps {
    fn from(bits: u16) -> Self {
        Caps(bits)
    }
}

impl From<Caps> for u16 {
    fn from(caps: Caps) -> Self {
        caps.0
    }
}

//--- Display, Debug, and FromStr

impl fmt::Display for Caps {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut sep = "";
        for name in self.names() {
            write!(f, "{}{}", sep, name)?;
            sep = " ";
        }
        Ok(())
    }
}

impl fmt::Debug for Caps {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Caps({:#06x}: {})", self.0, self)
    }
}

impl str::FromStr for Caps {
    type Err = CapsFromStrError;

    /// Parses a whitespace separated list of capability names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut res = Caps::NONE;
        for token in s.split_whitespace() {
            match NAMES
                .iter()
                .find(|(_, name)| name.eq_ignore_ascii_case(token))
            {
                Some((cap, _)) => res |= *cap,
                None => return Err(CapsFromStrError),
            }
        }
        Ok(res)
    }
}

//--- Serialize and Deserialize

#[cfg(feature = "serde")]
impl serde::Serialize for Caps {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeSeq;

        let mut seq = serializer.serialize_seq(Some(self.names().count()))?;
        for name in self.names() {
            seq.serialize_element(name)?;
        }
        seq.end()
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Caps {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Self, D::Error> {
        struct Visitor;

        impl<'de> serde::de::Visitor<'de> for Visitor {
            type Value = Caps;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a list of upstream capabilities")
            }

            fn visit_seq<A: serde::de::SeqAccess<'de>>(
                self,
                mut seq: A,
            ) -> Result<Self::Value, A::Error> {
                let mut res = Caps::NONE;
                while let Some(name) = seq.next_element::<String>()? {
                    res |= name
                        .parse::<Caps>()
                        .map_err(serde::de::Error::custom)?;
                }
                Ok(res)
            }
        }

        deserializer.deserialize_seq(Visitor)
    }
}

//------------ CapsFromStrError ----------------------------------------------

/// A capability name was not recognized.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CapsFromStrError;

impl fmt::Display for CapsFromStrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown upstream capability")
    }
}

impl std::error::Error for CapsFromStrError {}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use std::string::ToString;

    const ALL: [Caps; 12] = [
        Caps::STATEFUL,
        Caps::ENCRYPTED,
        Caps::AUTHENTICATED,
        Caps::QNAME_MIN,
        Caps::OOOR,
        Caps::EDNS0,
        Caps::KEEPALIVE,
        Caps::PADDING,
        Caps::DNSSEC_VALIDATION,
        Caps::DNSSEC_SIGS,
        Caps::DNSSEC_NSECS,
        Caps::DNSSEC_WILDCARDS,
    ];

    #[test]
    fn empty_requirement_always_complies() {
        for bits in [0u16, 1, 0x0007, 0x0abc, 0xfff8, 0xffff] {
            assert!(complies(Caps::NONE, Caps::from_bits(bits)));
        }
    }

    #[test]
    fn complies_is_monotonic() {
        let req = Caps::ENCRYPTED | Caps::PADDING;
        let have = Caps::STATEFUL | Caps::ENCRYPTED | Caps::PADDING;
        assert!(complies(req, have));
        for extra in ALL {
            assert!(complies(req, have | extra));
        }
        assert!(!complies(req, Caps::ENCRYPTED));
        assert!(!complies(req, Caps::NONE));
    }

    #[test]
    fn transport_index() {
        assert_eq!(Caps::NONE.transport_index(), 0);
        assert_eq!(Caps::STATEFUL.transport_index(), 1);
        assert_eq!(
            (Caps::ENCRYPTED | Caps::PADDING).transport_index(),
            2
        );
        assert_eq!(
            (Caps::STATEFUL | Caps::ENCRYPTED | Caps::AUTHENTICATED)
                .transport_index(),
            7
        );
        for index in 0..Caps::TRANSPORT_CLASSES {
            assert_eq!(
                Caps::from_transport_index(index).transport_index(),
                index
            );
        }
    }

    #[test]
    fn might_excludes_transport_class() {
        assert!(!Caps::MIGHT.contains(Caps::STATEFUL));
        assert!(!Caps::MIGHT.contains(Caps::ENCRYPTED));
        assert!(!Caps::MIGHT.contains(Caps::AUTHENTICATED));
        for cap in &ALL[3..] {
            assert!(Caps::MIGHT.contains(*cap));
        }
        assert!(Caps::MIGHT.contains(Caps::DNSSEC_OBSERVATIONS));
    }

    #[test]
    fn display_and_parse() {
        let caps = Caps::STATEFUL | Caps::EDNS0 | Caps::DNSSEC_NSECS;
        assert_eq!(caps.to_string(), "stateful edns0 dnssec-nsecs");
        assert_eq!("stateful edns0 dnssec-nsecs".parse::<Caps>(), Ok(caps));
        assert_eq!(
            "  EDNS0\tstateful ".parse::<Caps>(),
            Ok(Caps::STATEFUL | Caps::EDNS0)
        );
        assert_eq!("".parse::<Caps>(), Ok(Caps::NONE));
        assert_eq!(Caps::NONE.to_string(), "");
        assert_eq!("stateful tcp".parse::<Caps>(), Err(CapsFromStrError));
    }

    #[test]
    fn single_names() {
        for cap in ALL {
            let name = cap.name().unwrap();
            assert_eq!(name.parse::<Caps>(), Ok(cap));
        }
        assert_eq!((Caps::STATEFUL | Caps::ENCRYPTED).name(), None);
        assert_eq!(Caps::from_bits(0x1000).name(), None);
        assert_eq!(Caps::from_bits(0x1000).names().count(), 0);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn ser_de() {
        use serde_test::{assert_tokens, Token};

        assert_tokens(
            &(Caps::ENCRYPTED | Caps::PADDING),
            &[
                Token::Seq { len: Some(2) },
                Token::Str("encrypted"),
                Token::Str("padding"),
                Token::SeqEnd,
            ],
        );
    }
}
