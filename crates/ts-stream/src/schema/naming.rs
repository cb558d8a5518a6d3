//! Capacity rounding and field-name de-duplication.

use std::collections::HashSet;

/// Round a declared max count to a buffer capacity.
///
/// `c < 1` maps to `default`, `1` stays `1`, and larger counts get
/// `floor(c + 5*sqrt(c))` rounded up to a multiple of 5. A padded count
/// already on a multiple of 5 is kept, so 7 gives 20 and 50 gives 85.
pub fn round_max_count(count: i64, default: usize) -> usize {
    if count < 1 {
        return default;
    }
    if count == 1 {
        return 1;
    }
    let c = count as f64;
    let padded = (c + 5.0 * c.sqrt()).floor() as usize;
    padded.div_ceil(5) * 5
}

/// Hands out unique field names in input order.
///
/// Collisions take a suffix from one counter shared by the whole schema,
/// so the output only depends on the input order.
#[derive(Debug, Default)]
pub struct NameRegistry {
    used: HashSet<String>,
    suffix: usize,
}

impl NameRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self { used: HashSet::new(), suffix: 1 }
    }

    /// Reserve `name` or a suffixed variant. Returns the name actually used.
    pub fn claim(&mut self, name: &str) -> String {
        if self.used.insert(name.to_string()) {
            return name.to_string();
        }
        loop {
            self.suffix += 1;
            let candidate = format!("{name}{}", self.suffix);
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
        }
    }

    /// Whether `name` is taken.
    pub fn contains(&self, name: &str) -> bool {
        self.used.contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding_regimes() {
        assert_eq!(round_max_count(0, 100), 100);
        assert_eq!(round_max_count(-3, 50), 50);
        assert_eq!(round_max_count(1, 100), 1);
        assert_eq!(round_max_count(7, 100), 20);
        assert_eq!(round_max_count(50, 100), 85);
        assert_eq!(round_max_count(1000, 100), 1160);
        assert_eq!(round_max_count(2, 100), 10);
        // 25 + 5*5 lands on 50 exactly.
        assert_eq!(round_max_count(25, 100), 50);
    }

    #[test]
    fn rounding_is_multiple_of_five_and_covers_count() {
        for c in 2..500i64 {
            let r = round_max_count(c, 100);
            assert_eq!(r % 5, 0, "c={c}");
            assert!(r as i64 >= c, "c={c}");
        }
    }

    #[test]
    fn duplicates_get_shared_increasing_suffix() {
        let mut reg = NameRegistry::new();
        assert_eq!(reg.claim("pt"), "pt");
        assert_eq!(reg.claim("pt"), "pt2");
        assert_eq!(reg.claim("eta"), "eta");
        assert_eq!(reg.claim("eta"), "eta3");
        assert_eq!(reg.claim("pt"), "pt4");
    }

    #[test]
    fn suffix_skips_existing_names() {
        let mut reg = NameRegistry::new();
        reg.claim("x2");
        reg.claim("x");
        assert_eq!(reg.claim("x"), "x3");
    }
}
