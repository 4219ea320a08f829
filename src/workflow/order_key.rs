//! Dotted-decimal task ordering (§4.D: `"1" < "2" < "2.1" < "2.2" < "10"`).

use std::cmp::Ordering;

/// Parsed dotted-decimal order key. Comparison is segment-by-segment numeric, not lexical —
/// `"10"` sorts after `"2"`, and `"2.1"` sorts between `"2"` and `"3"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderKey(Vec<u32>);

impl OrderKey {
    /// Parse a dotted-decimal string. Non-numeric or empty segments are treated as `0`, so a
    /// malformed order key degrades gracefully rather than panicking the interpreter.
    pub fn parse(raw: &str) -> Self {
        let segments = raw
            .split('.')
            .map(|segment| segment.parse::<u32>().unwrap_or(0))
            .collect();
        Self(segments)
    }
}

impl PartialOrd for OrderKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderKey {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.0.len().max(other.0.len());
        for i in 0..len {
            let a = self.0.get(i).copied().unwrap_or(0);
            let b = other.0.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        Ordering::Equal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_segments_outrank_lexical_order() {
        let mut keys = vec!["10", "2", "2.1", "1", "2.2"]
            .into_iter()
            .map(OrderKey::parse)
            .collect::<Vec<_>>();
        keys.sort();
        let rendered: Vec<Vec<u32>> = keys.into_iter().map(|k| k.0).collect();
        assert_eq!(
            rendered,
            vec![vec![1], vec![2], vec![2, 1], vec![2, 2], vec![10]]
        );
    }

    #[test]
    fn shorter_prefix_sorts_before_its_extension() {
        assert!(OrderKey::parse("2") < OrderKey::parse("2.1"));
    }
}
