//! Core VRP record and collection types.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use ipnet::IpNet;

use super::aggregate::{minimal_cover, FilterEntry};

/// Address family of a prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Afi {
    Ipv4,
    Ipv6,
}

impl Afi {
    pub const ALL: [Afi; 2] = [Afi::Ipv4, Afi::Ipv6];

    pub fn as_str(self) -> &'static str {
        match self {
            Afi::Ipv4 => "ipv4",
            Afi::Ipv6 => "ipv6",
        }
    }
}

impl fmt::Display for Afi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not a recognised address family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownAfi(pub String);

impl fmt::Display for UnknownAfi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognised address family '{}'", self.0)
    }
}

impl std::error::Error for UnknownAfi {}

impl FromStr for Afi {
    type Err = UnknownAfi;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ipv4" => Ok(Afi::Ipv4),
            "ipv6" => Ok(Afi::Ipv6),
            other => Err(UnknownAfi(other.to_string())),
        }
    }
}

/// An autonomous system number, carried on the wire as `"AS<number>"`.
///
/// `AS0` is the reserved disallow sentinel: a VRP with this origin forbids
/// every origin for its prefix range, so AS0 never appears in origin sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Asn(u32);

impl Asn {
    pub const DISALLOW: Asn = Asn(0);

    pub fn new(number: u32) -> Self {
        Asn(number)
    }

    /// Bare numeric view, without the `AS` prefix.
    pub fn bare(self) -> u32 {
        self.0
    }

    pub fn is_disallow(self) -> bool {
        self == Asn::DISALLOW
    }
}

impl fmt::Display for Asn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AS{}", self.0)
    }
}

impl FromStr for Asn {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let Some(number) = s.strip_prefix("AS") else {
            bail!("ASN '{s}' is not in 'AS<number>' form");
        };
        let number = number
            .parse::<u32>()
            .with_context(|| format!("ASN '{s}' has a non-numeric AS number"))?;
        Ok(Asn(number))
    }
}

/// A validated ROA payload: the assertion that `asn` may originate prefixes
/// within `prefix` up to `max_length` bits, as seen under trust anchor `ta`.
///
/// Immutable after construction. Identity (equality and hashing) is the full
/// (asn, prefix, max_length, ta) tuple: two VRPs with the same tuple are the
/// same fact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Vrp {
    asn: Asn,
    prefix: IpNet,
    max_length: u8,
    ta: String,
}

impl Vrp {
    /// Validates and builds a VRP from its wire fields.
    ///
    /// Rejects ASNs not in `AS<number>` form, malformed CIDR strings,
    /// prefixes with host bits set, and max lengths beyond the family's bit
    /// width.
    pub fn new(asn: &str, prefix: &str, max_length: u8, ta: impl Into<String>) -> Result<Self> {
        let asn = asn.parse::<Asn>()?;
        let prefix = prefix
            .parse::<IpNet>()
            .with_context(|| format!("prefix '{prefix}' is not a valid CIDR"))?;
        if prefix.addr() != prefix.network() {
            bail!("prefix '{prefix}' has host bits set");
        }
        if max_length > prefix.max_prefix_len() {
            bail!(
                "maxLength {} exceeds the {} bit width of '{}'",
                max_length,
                prefix.max_prefix_len(),
                prefix
            );
        }
        Ok(Self {
            asn,
            prefix,
            max_length,
            ta: ta.into(),
        })
    }

    pub fn asn(&self) -> Asn {
        self.asn
    }

    pub fn prefix(&self) -> IpNet {
        self.prefix
    }

    pub fn max_length(&self) -> u8 {
        self.max_length
    }

    pub fn ta(&self) -> &str {
        &self.ta
    }

    /// Address family, derived from the prefix.
    pub fn afi(&self) -> Afi {
        match self.prefix {
            IpNet::V4(_) => Afi::Ipv4,
            IpNet::V6(_) => Afi::Ipv6,
        }
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix.prefix_len()
    }

    /// Whether the record covers a range of prefix lengths rather than the
    /// announced prefix alone.
    pub fn covers_range(&self) -> bool {
        self.max_length > self.prefix_len()
    }

    fn filter_entry(&self) -> FilterEntry {
        FilterEntry {
            prefix: self.prefix,
            max_length: self.max_length,
        }
    }
}

/// An unordered collection of unique VRPs.
///
/// Built once per fetch cycle and read-only afterwards; a newer fetch
/// supersedes it wholesale rather than mutating it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VrpSet {
    elements: HashSet<Vrp>,
}

impl VrpSet {
    pub fn new<I: IntoIterator<Item = Vrp>>(iter: I) -> Self {
        Self {
            elements: iter.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn contains(&self, vrp: &Vrp) -> bool {
        self.elements.contains(vrp)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Vrp> {
        self.elements.iter()
    }

    /// The minimal covering set for one address family, in stable render
    /// order.
    pub fn covered(&self, afi: Afi) -> Vec<FilterEntry> {
        minimal_cover(
            self.iter()
                .filter(|vrp| vrp.afi() == afi)
                .map(Vrp::filter_entry)
                .collect(),
        )
    }

    /// All origins with at least one record in the family, excluding the AS0
    /// disallow sentinel.
    pub fn origins(&self, afi: Afi) -> BTreeSet<Asn> {
        self.iter()
            .filter(|vrp| vrp.afi() == afi && !vrp.asn().is_disallow())
            .map(Vrp::asn)
            .collect()
    }

    /// The minimal covering set scoped to one origin and address family.
    pub fn prefixes_by_origin(&self, origin: Asn, afi: Afi) -> Vec<FilterEntry> {
        minimal_cover(
            self.iter()
                .filter(|vrp| vrp.asn() == origin && vrp.afi() == afi)
                .map(Vrp::filter_entry)
                .collect(),
        )
    }
}

impl FromIterator<Vrp> for VrpSet {
    fn from_iter<I: IntoIterator<Item = Vrp>>(iter: I) -> Self {
        Self::new(iter)
    }
}

impl<'a> IntoIterator for &'a VrpSet {
    type Item = &'a Vrp;
    type IntoIter = std::collections::hash_set::Iter<'a, Vrp>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}
