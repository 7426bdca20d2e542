//! Object identifiers and compact identifier sets.
//!
//! Collection cycles may enumerate the entire live population, so sets of
//! identifiers are stored as a sparse bitset: one 64-bit word per populated
//! block of 64 consecutive identifiers, keyed by word index.

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;

/// Cluster-wide unique handle to one object in the shared graph.
///
/// Identifiers are totally ordered and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Create an identifier from its raw value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw 64-bit value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    const fn word(self) -> u64 {
        self.0 / 64
    }

    const fn mask(self) -> u64 {
        1u64 << (self.0 % 64)
    }
}

impl From<u64> for ObjectId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectID=[{}]", self.0)
    }
}

/// An unordered, duplicate-free set of [`ObjectId`]s.
///
/// Iteration yields identifiers in ascending order.
///
/// # Example
///
/// ```
/// use cluster_dgc::{ObjectId, ObjectIdSet};
///
/// let mut set = ObjectIdSet::new();
/// assert!(set.insert(ObjectId::new(3)));
/// assert!(!set.insert(ObjectId::new(3)));
/// assert!(set.contains(ObjectId::new(3)));
/// assert_eq!(set.len(), 1);
/// ```
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ObjectIdSet {
    words: BTreeMap<u64, u64>,
    len: usize,
}

impl ObjectIdSet {
    /// Create an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            words: BTreeMap::new(),
            len: 0,
        }
    }

    /// Number of identifiers in the set.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the set holds no identifiers.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Add an identifier. Returns `true` if it was not already present.
    pub fn insert(&mut self, id: ObjectId) -> bool {
        let word = self.words.entry(id.word()).or_insert(0);
        if *word & id.mask() != 0 {
            return false;
        }
        *word |= id.mask();
        self.len += 1;
        true
    }

    /// Remove an identifier. Returns `true` if it was present.
    pub fn remove(&mut self, id: ObjectId) -> bool {
        let btree_map::Entry::Occupied(mut entry) = self.words.entry(id.word()) else {
            return false;
        };
        if *entry.get() & id.mask() == 0 {
            return false;
        }
        *entry.get_mut() &= !id.mask();
        if *entry.get() == 0 {
            entry.remove();
        }
        self.len -= 1;
        true
    }

    /// Returns `true` if the identifier is a member.
    #[must_use]
    pub fn contains(&self, id: ObjectId) -> bool {
        self.words
            .get(&id.word())
            .is_some_and(|word| word & id.mask() != 0)
    }

    /// Remove every identifier.
    pub fn clear(&mut self) {
        self.words.clear();
        self.len = 0;
    }

    /// Add every member of `other` to this set.
    pub fn union_with(&mut self, other: &Self) {
        for (&index, &bits) in &other.words {
            let word = self.words.entry(index).or_insert(0);
            let added = bits & !*word;
            *word |= bits;
            self.len += added.count_ones() as usize;
        }
    }

    /// Remove every member of `other` from this set.
    pub fn subtract(&mut self, other: &Self) {
        for (&index, &bits) in &other.words {
            if let btree_map::Entry::Occupied(mut entry) = self.words.entry(index) {
                let removed = *entry.get() & bits;
                *entry.get_mut() &= !bits;
                self.len -= removed.count_ones() as usize;
                if *entry.get() == 0 {
                    entry.remove();
                }
            }
        }
    }

    /// Keep only the members also present in `other`.
    pub fn intersect_with(&mut self, other: &Self) {
        self.words.retain(|index, word| {
            let kept = other.words.get(index).map_or(0, |bits| *word & bits);
            *word = kept;
            kept != 0
        });
        self.len = self.count_bits();
    }

    /// A new set holding the members of `self` that are not in `other`.
    #[must_use]
    pub fn difference(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.subtract(other);
        result
    }

    /// Keep only the identifiers for which `f` returns `true`.
    pub fn retain<F>(&mut self, mut f: F)
    where
        F: FnMut(ObjectId) -> bool,
    {
        self.words.retain(|&index, word| {
            let mut bits = *word;
            while bits != 0 {
                let bit = bits.trailing_zeros();
                bits &= bits - 1;
                if !f(ObjectId(index * 64 + u64::from(bit))) {
                    *word &= !(1u64 << bit);
                }
            }
            *word != 0
        });
        self.len = self.count_bits();
    }

    /// Returns `true` if every member of `self` is also in `other`.
    #[must_use]
    pub fn is_subset(&self, other: &Self) -> bool {
        self.len <= other.len
            && self.words.iter().all(|(index, bits)| {
                other
                    .words
                    .get(index)
                    .is_some_and(|theirs| bits & !theirs == 0)
            })
    }

    /// The smallest identifier in the set.
    #[must_use]
    pub fn first(&self) -> Option<ObjectId> {
        self.words
            .iter()
            .next()
            .map(|(&index, &bits)| ObjectId(index * 64 + u64::from(bits.trailing_zeros())))
    }

    /// Iterate over the members in ascending order.
    #[must_use]
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            words: self.words.iter(),
            current: None,
            remaining: self.len,
        }
    }

    fn count_bits(&self) -> usize {
        self.words.values().map(|bits| bits.count_ones() as usize).sum()
    }
}

impl fmt::Debug for ObjectIdSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter().map(ObjectId::as_u64)).finish()
    }
}

/// Ascending iterator over an [`ObjectIdSet`].
pub struct Iter<'a> {
    words: btree_map::Iter<'a, u64, u64>,
    current: Option<(u64, u64)>,
    remaining: usize,
}

impl Iterator for Iter<'_> {
    type Item = ObjectId;

    fn next(&mut self) -> Option<ObjectId> {
        loop {
            if let Some((index, bits)) = self.current.as_mut() {
                if *bits != 0 {
                    let bit = bits.trailing_zeros();
                    *bits &= *bits - 1;
                    self.remaining -= 1;
                    return Some(ObjectId(*index * 64 + u64::from(bit)));
                }
            }
            let (&index, &bits) = self.words.next()?;
            self.current = Some((index, bits));
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Iter<'_> {}

impl<'a> IntoIterator for &'a ObjectIdSet {
    type Item = ObjectId;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}

impl Extend<ObjectId> for ObjectIdSet {
    fn extend<I: IntoIterator<Item = ObjectId>>(&mut self, iter: I) {
        for id in iter {
            self.insert(id);
        }
    }
}

impl<'a> Extend<&'a ObjectId> for ObjectIdSet {
    fn extend<I: IntoIterator<Item = &'a ObjectId>>(&mut self, iter: I) {
        self.extend(iter.into_iter().copied());
    }
}

impl FromIterator<ObjectId> for ObjectIdSet {
    fn from_iter<I: IntoIterator<Item = ObjectId>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl FromIterator<u64> for ObjectIdSet {
    fn from_iter<I: IntoIterator<Item = u64>>(iter: I) -> Self {
        iter.into_iter().map(ObjectId).collect()
    }
}
