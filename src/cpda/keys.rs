//! Key pool selection and per-neighbor key sets.

use rand::Rng;
use rand::seq::index;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

/// Pick `count` distinct keys uniformly from `1..=total`.
///
/// `count` is clamped to `total`.
pub fn select_keys<R: Rng + ?Sized>(rng: &mut R, total: u16, count: u16) -> Vec<u16> {
    let count = count.min(total) as usize;
    index::sample(rng, total as usize, count)
        .into_iter()
        .map(|i| i as u16 + 1)
        .collect()
}

/// First key of `ours` that also appears in `theirs`.
pub fn find_matching_key(ours: &[u16], theirs: &[u16]) -> Option<u16> {
    ours.iter()
        .copied()
        .find(|k| *k != 0 && theirs.contains(k))
}

/// Key sets advertised by neighbors.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyMap {
    keys: BTreeMap<Ipv4Addr, Vec<u16>>,
}

impl KeyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store (or replace) the key set of `addr`.
    pub fn insert(&mut self, addr: Ipv4Addr, keys: Vec<u16>) -> Option<Vec<u16>> {
        self.keys.insert(addr, keys)
    }

    pub fn remove(&mut self, addr: &Ipv4Addr) -> Option<Vec<u16>> {
        self.keys.remove(addr)
    }

    pub fn keys_of(&self, addr: &Ipv4Addr) -> Option<&[u16]> {
        self.keys.get(addr).map(Vec::as_slice)
    }

    /// Key shared between `ours` and what `addr` advertised.
    pub fn match_with(&self, ours: &[u16], addr: &Ipv4Addr) -> Option<u16> {
        self.keys_of(addr)
            .and_then(|theirs| find_matching_key(ours, theirs))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Ipv4Addr, &[u16])> {
        self.keys.iter().map(|(a, k)| (a, k.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;

    #[test]
    fn test_find_matching_key() {
        assert_eq!(find_matching_key(&[3, 7, 9], &[2, 7, 5]), Some(7));
        assert_eq!(find_matching_key(&[1, 2], &[3, 4]), None);
        assert_eq!(find_matching_key(&[], &[3, 4]), None);
        // First match in our order wins
        assert_eq!(find_matching_key(&[9, 3], &[3, 9]), Some(9));
    }

    #[test]
    fn test_select_keys_distinct_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        let keys = select_keys(&mut rng, 50, 20);
        assert_eq!(keys.len(), 20);
        let unique: HashSet<u16> = keys.iter().copied().collect();
        assert_eq!(unique.len(), 20);
        assert!(keys.iter().all(|&k| (1..=50).contains(&k)));
    }

    #[test]
    fn test_select_keys_clamped() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut keys = select_keys(&mut rng, 5, 10);
        keys.sort_unstable();
        assert_eq!(keys, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_key_map() {
        let a = Ipv4Addr::new(10, 0, 0, 1);
        let b = Ipv4Addr::new(10, 0, 0, 2);
        let mut map = KeyMap::new();
        map.insert(a, vec![2, 7, 5]);

        assert_eq!(map.match_with(&[3, 7, 9], &a), Some(7));
        assert_eq!(map.match_with(&[3, 7, 9], &b), None);

        map.insert(a, vec![1]);
        assert_eq!(map.keys_of(&a), Some(&[1u16][..]));
        assert_eq!(map.len(), 1);
        assert!(map.remove(&a).is_some());
        assert!(map.is_empty());
    }
}
