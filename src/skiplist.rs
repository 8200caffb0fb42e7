use crate::error::Result;
use crate::node::{Link, Node};
use crate::options::{Options, DEFAULT_MAX_LEVEL};
use log::{debug, trace};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::fmt::{Debug, Display};
use std::iter::FromIterator;
use std::marker::PhantomData;
use std::ptr::{null_mut, NonNull};

/// An ordered map backed by a probabilistic skip list.
///
/// The header is a bare tower of `max_level + 1` links with no key or value.
/// Every real node is reachable from `head[0]` and is owned by the list;
/// forward links between nodes never own their targets.
pub struct SkipList<K, V> {
    head: NonNull<[Link<K, V>]>,
    max_level: usize,
    level: usize,
    len: usize,
    rng: StdRng,
    _marker: PhantomData<Box<Node<K, V>>>,
}

// SAFETY: the list exclusively owns the header and every node, so moving it to
// another thread moves all of them. There is no interior mutability.
unsafe impl<K: Send, V: Send> Send for SkipList<K, V> {}

impl<K, V> SkipList<K, V> {
    /// Creates an empty list whose towers reach at most `max_level`.
    ///
    /// Panics if `max_level` is zero; use [`SkipList::with_options`] for a
    /// fallible constructor.
    pub fn new(max_level: usize) -> Self {
        assert!(max_level > 0, "max_level must be positive, got {}", max_level);
        Self::build(Options::new().max_level(max_level))
    }

    pub fn with_options(options: Options) -> Result<Self> {
        options.validate()?;
        Ok(Self::build(options))
    }

    fn build(options: Options) -> Self {
        let rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let head = vec![None; options.max_level + 1].into_boxed_slice();
        trace!("new skiplist with max level {}", options.max_level);
        Self {
            head: NonNull::from(Box::leak(head)),
            max_level: options.max_level,
            level: 0,
            len: 0,
            rng,
            _marker: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Highest level currently populated by any node.
    pub fn level(&self) -> usize {
        self.level
    }

    pub fn max_level(&self) -> usize {
        self.max_level
    }

    /// Draws a tower height in `[0, max_level]` from fair coin flips.
    pub fn random_level(&mut self) -> usize {
        let mut level = 0;
        while level < self.max_level && self.rng.gen::<bool>() {
            level += 1;
        }
        level
    }

    /// Iterates all entries in ascending key order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        self.iter_level(0)
    }

    /// Iterates the entries linked at `level`, in ascending key order.
    /// Levels above `max_level` yield nothing.
    pub fn iter_level(&self, level: usize) -> Iter<'_, K, V> {
        let next = if level <= self.max_level {
            unsafe { (*self.head.as_ptr())[level] }
        } else {
            None
        };
        Iter {
            next,
            level,
            _marker: PhantomData,
        }
    }

    pub fn first(&self) -> Option<(&K, &V)> {
        self.iter().next()
    }

    pub fn last(&self) -> Option<(&K, &V)> {
        let mut tower: *const [Link<K, V>] = self.head.as_ptr();
        let mut last = None;
        for l in (0..=self.level).rev() {
            unsafe {
                while let Some(next) = (*tower)[l] {
                    let next = &*next.as_ptr();
                    last = Some((next.key(), next.value()));
                    tower = &*next.forward;
                }
            }
        }
        last
    }

    /// Releases every node head to tail and resets the list to empty.
    pub fn clear(&mut self) {
        unsafe {
            let head = self.head.as_ptr();
            let mut curr = (*head)[0];
            while let Some(ptr) = curr {
                let node = Box::from_raw(ptr.as_ptr());
                curr = node.forward[0];
            }
            for link in (*head).iter_mut() {
                *link = None;
            }
        }
        trace!("cleared {} nodes", self.len);
        self.level = 0;
        self.len = 0;
    }
}

impl<K, V> SkipList<K, V>
where
    K: Ord,
{
    /// Returns the node holding `key`, if any.
    fn find(&self, key: &K) -> Link<K, V> {
        let mut tower: *const [Link<K, V>] = self.head.as_ptr();
        for l in (0..=self.level).rev() {
            unsafe {
                while let Some(next) = (*tower)[l] {
                    let next = &*next.as_ptr();
                    if next.key() < key {
                        tower = &*next.forward;
                    } else {
                        break;
                    }
                }
            }
        }
        let candidate = unsafe { (*tower)[0] }?;
        if unsafe { candidate.as_ref() }.key() == key {
            Some(candidate)
        } else {
            None
        }
    }

    /// Walks down from the header and records, for every level up to the
    /// current one, the slot in the last node before `key`. Entries above
    /// `self.level` are left null.
    fn find_prevs(&mut self, key: &K) -> Vec<*mut Link<K, V>> {
        let mut prevs = vec![null_mut(); self.max_level + 1];
        let mut tower: *mut [Link<K, V>] = self.head.as_ptr();
        for l in (0..=self.level).rev() {
            unsafe {
                while let Some(next) = (*tower)[l] {
                    let next = next.as_ptr();
                    if (*next).key() < key {
                        tower = &mut *(*next).forward;
                    } else {
                        break;
                    }
                }
                prevs[l] = &mut (*tower)[l];
            }
        }
        prevs
    }

    pub fn search(&self, key: &K) -> Option<&V> {
        match self.find(key) {
            Some(node) => Some(unsafe { &*node.as_ptr() }.value()),
            None => {
                debug!("search: key not found");
                None
            }
        }
    }

    pub fn search_mut(&mut self, key: &K) -> Option<&mut V> {
        let node = self.find(key)?;
        Some(unsafe { &mut *node.as_ptr() }.value_mut())
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.find(key).is_some()
    }

    /// Inserts `key` with `value`.
    ///
    /// Returns `true` if a new node was linked in, `false` if the key was
    /// already present and its value was overwritten in place.
    pub fn insert(&mut self, key: K, value: V) -> bool {
        let mut prevs = self.find_prevs(&key);
        unsafe {
            if let Some(node) = *prevs[0] {
                let node = &mut *node.as_ptr();
                if node.key() == &key {
                    node.set_value(value);
                    trace!("updated value in place at level {}", node.level());
                    return false;
                }
            }

            let level = self.random_level();
            if level > self.level {
                let head = self.head.as_ptr();
                for l in self.level + 1..=level {
                    prevs[l] = &mut (*head)[l];
                }
                trace!("raising level from {} to {}", self.level, level);
                self.level = level;
            }

            let node = NonNull::from(Box::leak(Box::new(Node::new(key, value, level))));
            for (l, prev) in prevs.iter().take(level + 1).enumerate() {
                (*node.as_ptr()).forward[l] = **prev;
                **prev = Some(node);
            }
        }
        self.len += 1;
        trace!("inserted node, len {}", self.len);
        true
    }

    /// Unlinks `key` and returns its value.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let prevs = self.find_prevs(key);
        unsafe {
            let node = match *prevs[0] {
                Some(node) if node.as_ref().key() == key => node,
                _ => {
                    debug!("remove: key not found");
                    return None;
                }
            };

            for (l, prev) in prevs.iter().take(self.level + 1).enumerate() {
                // towers are contiguous, nothing above this level points at it
                if **prev != Some(node) {
                    break;
                }
                **prev = node.as_ref().forward[l];
            }

            let head = self.head.as_ptr();
            while self.level > 0 && (*head)[self.level].is_none() {
                self.level -= 1;
                trace!("lowered level to {}", self.level);
            }

            self.len -= 1;
            trace!("removed node, len {}", self.len);
            Some(Box::from_raw(node.as_ptr()).into_value())
        }
    }

    /// Deletes `key`, reporting whether it was present.
    pub fn delete(&mut self, key: &K) -> bool {
        self.remove(key).is_some()
    }
}

impl<K, V> Drop for SkipList<K, V> {
    fn drop(&mut self) {
        self.clear();
        unsafe {
            drop(Box::from_raw(self.head.as_ptr()));
        }
    }
}

impl<K, V> Default for SkipList<K, V> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LEVEL)
    }
}

impl<K, V> Extend<(K, V)> for SkipList<K, V>
where
    K: Ord,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

impl<K, V> FromIterator<(K, V)> for SkipList<K, V>
where
    K: Ord,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut list = Self::default();
        list.extend(iter);
        list
    }
}

pub struct Iter<'a, K, V> {
    next: Link<K, V>,
    level: usize,
    _marker: PhantomData<&'a Node<K, V>>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let node: &'a Node<K, V> = unsafe { &*self.next?.as_ptr() };
        self.next = node.forward[self.level];
        Some((node.key(), node.value()))
    }
}

impl<'a, K, V> IntoIterator for &'a SkipList<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K, V> Debug for SkipList<K, V>
where
    K: Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        for l in (0..=self.level).rev() {
            let mut keys = self.iter_level(l).peekable();
            if keys.peek().is_none() {
                continue;
            }
            write!(f, "{}:", l)?;
            for (key, _) in keys {
                write!(f, " {:?}", key)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

impl<K, V> Display for SkipList<K, V>
where
    K: Display,
    V: Display,
{
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let width = self.level.to_string().len();
        for l in (0..=self.level).rev() {
            write!(f, "Level {:<width$}: ", l, width = width)?;
            for (key, value) in self.iter_level(l) {
                write!(f, "[{}, {}] -> ", key, value)?;
            }
            writeln!(f, "NULL")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn seeded<K, V>(max_level: usize, seed: u64) -> SkipList<K, V> {
        SkipList::with_options(Options::new().max_level(max_level).seed(seed)).unwrap()
    }

    /// Ordering and tower invariants across every level.
    fn check_invariants<K: Ord + Clone, V>(list: &SkipList<K, V>) {
        let base: Vec<K> = list.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(base.len(), list.len());
        assert!(base.windows(2).all(|w| w[0] < w[1]));
        for l in 1..=list.max_level() {
            let keys: Vec<K> = list.iter_level(l).map(|(k, _)| k.clone()).collect();
            assert!(keys.windows(2).all(|w| w[0] < w[1]));
            let below: Vec<K> = list.iter_level(l - 1).map(|(k, _)| k.clone()).collect();
            for key in &keys {
                assert!(below.binary_search(key).is_ok());
            }
            if l > list.level() {
                assert!(keys.is_empty());
            }
        }
        if list.level() > 0 {
            assert!(list.iter_level(list.level()).next().is_some());
        }
    }

    fn scenario_list() -> SkipList<i32, String> {
        let mut list = seeded(6, 7);
        let pairs = [
            (1, "hello world"),
            (2, "first program"),
            (3, "glad to read the paper"),
            (5, "finish the code"),
            (8, "today summer"),
            (13, "2024/6/12"),
            (21, "tomorrow exam"),
            (34, "believe myself"),
        ];
        for (k, v) in pairs.iter() {
            assert!(list.insert(*k, v.to_string()));
        }
        list
    }

    #[test]
    fn test_scenario() {
        let mut list = scenario_list();
        assert_eq!(list.len(), 8);
        check_invariants(&list);

        assert!(list.delete(&8));
        assert!(list.delete(&21));
        assert_eq!(list.len(), 6);
        check_invariants(&list);

        assert_eq!(list.search(&1).map(String::as_str), Some("hello world"));
        assert_eq!(list.search(&34).map(String::as_str), Some("believe myself"));
        assert_eq!(list.search(&8), None);
        assert_eq!(list.search(&21), None);

        let keys: Vec<i32> = list.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![1, 2, 3, 5, 13, 34]);
    }

    #[test]
    fn test_empty_list() {
        let mut list: SkipList<u32, u32> = SkipList::new(4);
        assert!(list.is_empty());
        assert_eq!(list.search(&1), None);
        assert!(!list.delete(&1));
        assert_eq!(list.level(), 0);
        assert_eq!(list.len(), 0);
        assert_eq!(list.first(), None);
        assert_eq!(list.last(), None);
        assert_eq!(list.iter().count(), 0);
    }

    #[test]
    fn test_round_trip() {
        let mut list = SkipList::new(4);
        assert!(list.insert(50u32, "fifty"));
        assert_eq!(list.search(&50), Some(&"fifty"));
        assert!(list.contains_key(&50));
        assert!(!list.contains_key(&49));
    }

    #[test]
    fn test_duplicate_updates_in_place() {
        let mut list = seeded(8, 1);
        for k in 0..20u32 {
            list.insert(k, k);
        }
        let shape: Vec<Vec<u32>> = (0..=8)
            .map(|l| list.iter_level(l).map(|(k, _)| *k).collect())
            .collect();

        assert!(!list.insert(10, 1000));
        assert_eq!(list.len(), 20);
        assert_eq!(list.search(&10), Some(&1000));

        let after: Vec<Vec<u32>> = (0..=8)
            .map(|l| list.iter_level(l).map(|(k, _)| *k).collect())
            .collect();
        assert_eq!(shape, after);
    }

    #[test]
    fn test_search_mut() {
        let mut list = SkipList::new(4);
        list.insert("a".to_string(), 1);
        *list.search_mut(&"a".to_string()).unwrap() += 41;
        assert_eq!(list.search(&"a".to_string()), Some(&42));
        assert!(list.search_mut(&"b".to_string()).is_none());
    }

    #[test]
    fn test_remove_returns_value() {
        let mut list = SkipList::new(4);
        list.insert(3, "three".to_string());
        list.insert(1, "one".to_string());
        assert_eq!(list.remove(&3), Some("three".to_string()));
        assert_eq!(list.remove(&3), None);
        assert_eq!(list.len(), 1);
        assert_eq!(list.first(), Some((&1, &"one".to_string())));
    }

    #[test]
    fn test_level_shrinks_after_delete() {
        let mut list = seeded(10, 3);
        for k in 0..200u32 {
            list.insert(k, k);
        }
        assert!(list.level() > 0);
        for k in 0..200u32 {
            assert!(list.delete(&k));
            check_invariants(&list);
        }
        assert_eq!(list.level(), 0);
        assert!(list.is_empty());
        assert!((0..=10).all(|l| list.iter_level(l).next().is_none()));
    }

    #[test]
    fn test_random_level_bounds() {
        let mut list: SkipList<u32, u32> = seeded(3, 11);
        let mut seen = [0usize; 4];
        for _ in 0..10_000 {
            let level = list.random_level();
            assert!(level <= 3);
            seen[level] += 1;
        }
        // roughly half of the draws stop at level 0
        assert!(seen[0] > 4_000 && seen[0] < 6_000);
        assert!(seen[3] > 0);

        let mut single: SkipList<u32, u32> = seeded(1, 11);
        assert!((0..1000).all(|_| single.random_level() <= 1));
    }

    #[test]
    fn test_seed_is_deterministic() {
        let mut a = seeded(8, 99);
        let mut b = seeded(8, 99);
        for k in 0..100u32 {
            a.insert(k, ());
            b.insert(k, ());
        }
        assert_eq!(a.level(), b.level());
        for l in 0..=8 {
            assert!(a.iter_level(l).map(|(k, _)| *k).eq(b.iter_level(l).map(|(k, _)| *k)));
        }
    }

    #[test]
    fn test_first_last() {
        let list: SkipList<i32, i32> = vec![(5, 50), (-3, -30), (12, 120), (0, 0)]
            .into_iter()
            .collect();
        assert_eq!(list.first(), Some((&-3, &-30)));
        assert_eq!(list.last(), Some((&12, &120)));
    }

    #[test]
    fn test_iter_level_out_of_range() {
        let mut list = SkipList::new(2);
        list.insert(1, 1);
        assert_eq!(list.iter_level(3).count(), 0);
        assert_eq!(list.iter_level(100).count(), 0);
    }

    #[test]
    fn test_clear_and_reuse() {
        let mut list = seeded(6, 5);
        list.extend((0..50).map(|k| (k, k * 2)));
        assert_eq!(list.len(), 50);
        list.clear();
        assert!(list.is_empty());
        assert_eq!(list.level(), 0);
        assert_eq!(list.search(&10), None);
        list.insert(10, 20);
        assert_eq!(list.search(&10), Some(&20));
        check_invariants(&list);
    }

    #[test]
    fn test_drop_large_list() {
        let mut list = SkipList::new(16);
        for k in 0..100_000u64 {
            list.insert(k, k.to_string());
        }
        assert_eq!(list.len(), 100_000);
        drop(list);
    }

    #[test]
    fn test_with_options_rejects_zero() {
        let result: Result<SkipList<u32, u32>> = SkipList::with_options(Options::new().max_level(0));
        assert!(matches!(result, Err(Error::InvalidMaxLevel(0))));
    }

    #[test]
    fn test_tall_max_level() {
        let mut list = seeded(64, 4);
        assert_eq!(list.max_level(), 64);
        for k in 0..1000u32 {
            list.insert(k, k);
        }
        assert!(list.level() > 0 && list.level() <= 64);
        check_invariants(&list);
        assert_eq!(SkipList::<u32, u32>::new(64).max_level(), 64);
    }

    #[test]
    #[should_panic]
    fn test_new_panics_on_zero() {
        let _list: SkipList<u32, u32> = SkipList::new(0);
    }

    #[test]
    fn test_display() {
        let mut list = seeded(4, 2);
        list.insert(2, "b");
        list.insert(1, "a");
        let text = list.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), list.level() + 1);
        assert_eq!(lines.last(), Some(&"Level 0: [1, a] -> [2, b] -> NULL"));
    }

    #[test]
    fn test_debug() {
        let mut list = SkipList::new(1);
        assert_eq!(format!("{:?}", list), "");
        list.insert(3, ());
        list.insert(1, ());
        let text = format!("{:?}", list);
        assert!(text.ends_with("0: 1 3\n"));
    }

    mod proptests {
        use super::check_invariants;
        use crate::skiplist::SkipList;
        use proptest::prelude::*;
        use std::collections::{BTreeMap, HashSet};

        proptest! {
            #[test]
            fn prop_matches_btree(ops in prop::collection::vec((any::<bool>(), 0u16..300, any::<u32>()), 0..400)) {
                let mut list = SkipList::new(8);
                let mut model = BTreeMap::new();
                for (is_insert, key, value) in ops {
                    if is_insert {
                        prop_assert_eq!(list.insert(key, value), model.insert(key, value).is_none());
                    } else {
                        prop_assert_eq!(list.remove(&key), model.remove(&key));
                    }
                }
                prop_assert_eq!(list.len(), model.len());
                let items: Vec<_> = list.iter().map(|(k, v)| (*k, *v)).collect();
                let expected: Vec<_> = model.iter().map(|(k, v)| (*k, *v)).collect();
                prop_assert_eq!(items, expected);
                check_invariants(&list);
            }

            #[test]
            fn prop_len_counts_distinct_keys(keys in prop::collection::vec(any::<i64>(), 0..300)) {
                let mut list = SkipList::new(12);
                let distinct: HashSet<i64> = keys.iter().cloned().collect();
                for key in keys {
                    list.insert(key, key);
                    prop_assert_eq!(list.search(&key), Some(&key));
                }
                prop_assert_eq!(list.len(), distinct.len());
            }

            #[test]
            fn prop_delete_removes(keys in prop::collection::hash_set(0u32..1000, 1..200)) {
                let mut list = SkipList::new(6);
                for key in &keys {
                    list.insert(*key, *key);
                }
                for key in &keys {
                    let before = list.len();
                    prop_assert!(list.delete(key));
                    prop_assert_eq!(list.len(), before - 1);
                    prop_assert_eq!(list.search(key), None);
                }
                prop_assert_eq!(list.level(), 0);
            }
        }
    }
}
