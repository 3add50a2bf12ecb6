use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// The set of symbol identifiers within K hops of a change.
///
/// Backed by a sorted set so that two components built from the same input
/// compare, serialize and iterate identically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Component {
    symbols: BTreeSet<String>,
}

impl Component {
    pub fn new<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            symbols: symbols.into_iter().map(Into::into).collect(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.contains(symbol)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.symbols.iter().map(String::as_str)
    }

    /// Union of two components; used when a commit touches several files.
    pub fn union(&self, other: &Component) -> Component {
        Component {
            symbols: self.symbols.union(&other.symbols).cloned().collect(),
        }
    }

    pub fn overlap(&self, other: &Component) -> f64 {
        overlap(self, other)
    }
}

impl FromIterator<String> for Component {
    fn from_iter<T: IntoIterator<Item = String>>(iter: T) -> Self {
        Self {
            symbols: iter.into_iter().collect(),
        }
    }
}

/// Jaccard similarity `|a ∩ b| / |a ∪ b|`.
///
/// Any empty operand scores 0: an unparseable change is treated as carrying
/// no evidence of relatedness.
pub fn overlap(a: &Component, b: &Component) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let intersection = small
        .symbols
        .iter()
        .filter(|symbol| large.symbols.contains(*symbol))
        .count();
    let union = a.len() + b.len() - intersection;

    (intersection as f64 / union as f64).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(prefix: &str, range: std::ops::Range<usize>) -> Vec<String> {
        range.map(|idx| format!("{prefix}{idx}")).collect()
    }

    #[test]
    fn overlap_is_symmetric() {
        let a = Component::new(["handleRequest", "validate", "log"]);
        let b = Component::new(["validate", "checkLength"]);
        assert_eq!(overlap(&a, &b), overlap(&b, &a));
        assert!((overlap(&a, &b) - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn overlap_with_itself_is_one_for_non_empty_components() {
        let a = Component::new(["ssl3_read_bytes", "tls1_process_heartbeat"]);
        assert_eq!(overlap(&a, &a), 1.0);
    }

    #[test]
    fn empty_components_never_overlap() {
        let empty = Component::empty();
        let a = Component::new(["memcpy"]);
        assert_eq!(overlap(&empty, &empty), 0.0);
        assert_eq!(overlap(&empty, &a), 0.0);
        assert_eq!(overlap(&a, &empty), 0.0);
    }

    #[test]
    fn three_shared_symbols_out_of_thirty_seven_scores_below_ten_percent() {
        let mut reference = numbered("ref_", 0..27);
        reference.extend(numbered("shared_", 0..3));
        let mut candidate = numbered("cand_", 0..7);
        candidate.extend(numbered("shared_", 0..3));

        let reference = Component::new(reference);
        let candidate = Component::new(candidate);
        assert_eq!(reference.len(), 30);
        assert_eq!(candidate.len(), 10);

        let score = overlap(&reference, &candidate);
        assert!((score - 3.0 / 37.0).abs() < 1e-12);
        assert!(score < 0.10);
    }

    #[test]
    fn union_merges_members() {
        let a = Component::new(["a", "b"]);
        let b = Component::new(["b", "c"]);
        let merged = a.union(&b);
        assert_eq!(merged.iter().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }
}
