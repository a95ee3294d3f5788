//! Prefix aggregation and filter-rule rendering.
//!
//! The covering set is minimal in the containment sense: an entry whose
//! announced range (prefixes inside `prefix` of length `prefix_len()` to
//! `max_length`) falls inside another entry's range is redundant and is
//! dropped. Sibling prefixes are never merged into their common supernet,
//! since a `permit <supernet> le <n>` rule would also admit the supernet
//! itself, which no input authorised.

use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Context};
use ipnet::IpNet;

/// One covering entry: a prefix plus the upper bound on announced lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FilterEntry {
    pub prefix: IpNet,
    pub max_length: u8,
}

/// Collapses `entries` into the minimal covering set, sorted by network
/// address and prefix length.
///
/// Entries are sorted so that a containing prefix precedes everything inside
/// it; a stack of the current containment chain then carries the largest
/// `max_length` seen along the chain, and any entry not exceeding that bound
/// is dominated.
pub fn minimal_cover(mut entries: Vec<FilterEntry>) -> Vec<FilterEntry> {
    entries.sort_unstable_by(|a, b| {
        a.prefix
            .cmp(&b.prefix)
            .then(b.max_length.cmp(&a.max_length))
    });
    entries.dedup();

    let mut kept = Vec::with_capacity(entries.len());
    // (prefix, largest max_length on the chain down to and including it)
    let mut chain: Vec<(IpNet, u8)> = Vec::new();
    for entry in entries {
        while let Some((ancestor, _)) = chain.last() {
            if ancestor.contains(&entry.prefix) {
                break;
            }
            chain.pop();
        }
        let inherited = chain.last().map(|(_, bound)| *bound);
        if inherited.is_some_and(|bound| bound >= entry.max_length) {
            continue;
        }
        kept.push(entry);
        let bound = inherited.map_or(entry.max_length, |b| b.max(entry.max_length));
        chain.push((entry.prefix, bound));
    }
    kept
}

/// A rendered prefix-list rule: `seq {n} permit {prefix} le {max_length}`.
///
/// Sequence numbers are positional and recomputed on every rebuild; they
/// carry no identity across rebuilds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefixRule {
    pub seq: usize,
    pub prefix: IpNet,
    pub max_length: u8,
}

impl PrefixRule {
    /// Numbers `entries` with ascending 0-based sequence numbers.
    pub fn number(entries: &[FilterEntry]) -> Vec<PrefixRule> {
        entries
            .iter()
            .enumerate()
            .map(|(seq, entry)| PrefixRule {
                seq,
                prefix: entry.prefix,
                max_length: entry.max_length,
            })
            .collect()
    }
}

impl fmt::Display for PrefixRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "seq {} permit {} le {}",
            self.seq, self.prefix, self.max_length
        )
    }
}

impl FromStr for PrefixRule {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let fields: Vec<&str> = s.split_whitespace().collect();
        let [seq_kw, seq, permit_kw, prefix, le_kw, max_length] = fields.as_slice() else {
            bail!("rule '{s}' does not have the six fields of a prefix rule");
        };
        if *seq_kw != "seq" || *permit_kw != "permit" || *le_kw != "le" {
            bail!("rule '{s}' is not a 'seq .. permit .. le ..' rule");
        }
        Ok(PrefixRule {
            seq: seq.parse().with_context(|| format!("bad seq in '{s}'"))?,
            prefix: prefix
                .parse()
                .with_context(|| format!("bad prefix in '{s}'"))?,
            max_length: max_length
                .parse()
                .with_context(|| format!("bad max length in '{s}'"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(prefix: &str, max_length: u8) -> FilterEntry {
        FilterEntry {
            prefix: prefix.parse().unwrap(),
            max_length,
        }
    }

    #[test]
    fn drops_entries_inside_a_wider_range() {
        let cover = minimal_cover(vec![
            entry("10.0.0.0/8", 24),
            entry("10.1.0.0/16", 20),
            entry("10.1.1.0/24", 24),
        ]);
        assert_eq!(cover, vec![entry("10.0.0.0/8", 24)]);
    }

    #[test]
    fn keeps_subnets_that_extend_the_length_bound() {
        let cover = minimal_cover(vec![
            entry("10.0.0.0/8", 16),
            entry("10.1.0.0/16", 24),
        ]);
        assert_eq!(cover, vec![entry("10.0.0.0/8", 16), entry("10.1.0.0/16", 24)]);
    }

    #[test]
    fn domination_skips_over_intermediate_entries() {
        // the /16 is dominated by the /8, but must not shadow the /24's
        // larger bound
        let cover = minimal_cover(vec![
            entry("10.0.0.0/8", 20),
            entry("10.0.0.0/16", 18),
            entry("10.0.0.0/24", 28),
        ]);
        assert_eq!(cover, vec![entry("10.0.0.0/8", 20), entry("10.0.0.0/24", 28)]);
    }

    #[test]
    fn never_merges_siblings_into_a_supernet() {
        let cover = minimal_cover(vec![
            entry("10.0.0.0/24", 24),
            entry("10.0.1.0/24", 24),
        ]);
        assert_eq!(cover.len(), 2);
    }

    #[test]
    fn same_prefix_keeps_only_the_widest_bound() {
        let cover = minimal_cover(vec![
            entry("10.0.0.0/24", 24),
            entry("10.0.0.0/24", 26),
        ]);
        assert_eq!(cover, vec![entry("10.0.0.0/24", 26)]);
    }

    #[test]
    fn families_never_interact() {
        let cover = minimal_cover(vec![
            entry("10.0.0.0/8", 32),
            entry("2001:db8::/32", 48),
        ]);
        assert_eq!(cover.len(), 2);
    }

    #[test]
    fn output_is_a_cover_with_no_contained_element() {
        let input = vec![
            entry("192.0.2.0/24", 24),
            entry("192.0.2.0/25", 25),
            entry("192.0.2.128/25", 26),
            entry("198.51.100.0/24", 32),
            entry("198.51.100.0/28", 30),
        ];
        let cover = minimal_cover(input.clone());
        // every input range lies inside some output range
        for e in &input {
            assert!(
                cover
                    .iter()
                    .any(|c| c.prefix.contains(&e.prefix) && c.max_length >= e.max_length),
                "{e:?} is not covered"
            );
        }
        // no output range lies strictly inside another
        for a in &cover {
            for b in &cover {
                if a != b {
                    assert!(
                        !(b.prefix.contains(&a.prefix) && b.max_length >= a.max_length),
                        "{a:?} is contained in {b:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn rule_lines_round_trip() {
        let rules = PrefixRule::number(&[entry("10.0.0.0/24", 28), entry("2001:db8::/32", 48)]);
        assert_eq!(rules[0].to_string(), "seq 0 permit 10.0.0.0/24 le 28");
        assert_eq!(rules[1].to_string(), "seq 1 permit 2001:db8::/32 le 48");
        for rule in rules {
            let parsed: PrefixRule = rule.to_string().parse().unwrap();
            assert_eq!(parsed, rule);
        }
    }

    #[test]
    fn rejects_malformed_rule_lines() {
        assert!("seq x permit 10.0.0.0/24 le 24".parse::<PrefixRule>().is_err());
        assert!("seq 0 deny 10.0.0.0/24 le 24".parse::<PrefixRule>().is_err());
        assert!("seq 0 permit 10.0.0.0/24".parse::<PrefixRule>().is_err());
    }
}
