//! The served policy view: pre-rendered response bodies derived from the
//! current VRP set.
//!
//! Rebuilt in full whenever a new set arrives, never patched in place; a
//! stale entry can therefore never outlive the set that produced it.

use std::collections::{BTreeSet, HashMap};

use crate::vrp::{Afi, Asn, PrefixRule, VrpSet};

#[derive(Debug, Default)]
pub struct PolicyView {
    covered: HashMap<Afi, String>,
    by_origin: HashMap<(Afi, Asn), String>,
    origins: BTreeSet<Asn>,
}

impl PolicyView {
    /// The view served before any delivery: known families with empty rule
    /// bodies, no origins.
    pub fn empty() -> Self {
        let mut covered = HashMap::new();
        for afi in Afi::ALL {
            covered.insert(afi, String::new());
        }
        Self {
            covered,
            by_origin: HashMap::new(),
            origins: BTreeSet::new(),
        }
    }

    /// Derives the full view from one VRP set.
    pub fn build(vrps: &VrpSet) -> Self {
        let mut view = Self::empty();
        for afi in Afi::ALL {
            tracing::info!(afi = %afi, "building prefix lists");
            view.covered.insert(afi, render(&vrps.covered(afi)));
            let origins = vrps.origins(afi);
            for &origin in &origins {
                view.by_origin.insert(
                    (afi, origin),
                    render(&vrps.prefixes_by_origin(origin, afi)),
                );
            }
            view.origins.extend(origins);
        }
        view
    }

    /// Covering rules for a family. Present for every known family, possibly
    /// empty.
    pub fn covered_body(&self, afi: Afi) -> &str {
        self.covered.get(&afi).map(String::as_str).unwrap_or("")
    }

    /// Rules for one (family, origin) pair, or `None` for an unknown origin.
    pub fn origin_body(&self, afi: Afi, origin: Asn) -> Option<&str> {
        self.by_origin.get(&(afi, origin)).map(String::as_str)
    }

    /// The AS-path filter line for an origin with at least one valid VRP.
    pub fn as_path_body(&self, origin: Asn) -> Option<String> {
        self.origins
            .contains(&origin)
            .then(|| format!("permit _{}$ any\n", origin.bare()))
    }

    pub fn origin_count(&self) -> usize {
        self.origins.len()
    }
}

fn render(entries: &[crate::vrp::FilterEntry]) -> String {
    PrefixRule::number(entries)
        .iter()
        .map(PrefixRule::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}
