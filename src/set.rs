use smallvec::{smallvec, SmallVec};

use crate::endpoint::{Endpoint, Snapshot};
use crate::error::IncompatibleSnapshot;

const WORD_BITS: usize = u64::BITS as usize;

// Inline storage covers snapshots up to 256 endpoints without allocating.
type Words = SmallVec<[u64; 4]>;

#[derive(Clone, Debug)]
/// A bit-vector subset of a [`Snapshot`].
///
/// Each set bit marks the endpoint at that index of the backing snapshot as
/// a member. Set algebra between two `IndexedSet`s is a word-wise bit
/// operation, `O(len / 64)`, which is what keeps the per-call routing path
/// cheap on clusters with thousands of endpoints.
///
/// Sets from different snapshots must never be combined; doing so returns
/// [`IncompatibleSnapshot`] rather than a silently wrong result.
pub struct IndexedSet {
    snapshot: Snapshot,
    words: Words,
}

impl IndexedSet {
    /// Creates a set over `snapshot` with no members.
    pub fn empty(snapshot: Snapshot) -> Self {
        let n_words = snapshot.len().div_ceil(WORD_BITS);
        Self {
            snapshot,
            words: smallvec![0; n_words],
        }
    }

    /// Creates a set containing every endpoint of `snapshot`.
    pub fn full(snapshot: Snapshot) -> Self {
        let mut set = Self::empty(snapshot);
        for word in set.words.iter_mut() {
            *word = u64::MAX;
        }
        set.mask_tail();
        set
    }

    /// Creates the set of every index `i` where `predicate(snapshot[i])`
    /// holds.
    pub fn from_predicate<F>(snapshot: Snapshot, predicate: F) -> Self
    where
        F: Fn(&Endpoint) -> bool,
    {
        let mut set = Self::empty(snapshot.clone());
        for (index, endpoint) in snapshot.iter().enumerate() {
            if predicate(endpoint) {
                set.insert(index);
            }
        }
        set
    }

    #[inline]
    /// The snapshot this set was built against.
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Marks the endpoint at `index` as a member.
    ///
    /// Only legal while the set is being constructed (e.g. during a repool),
    /// never once it has been published as a cache value.
    pub fn insert(&mut self, index: usize) {
        assert!(
            index < self.snapshot.len(),
            "index {index} out of bounds for snapshot of {} endpoints",
            self.snapshot.len(),
        );
        self.words[index / WORD_BITS] |= 1 << (index % WORD_BITS);
    }

    /// Removes the endpoint at `index` from the set.
    pub fn remove(&mut self, index: usize) {
        assert!(
            index < self.snapshot.len(),
            "index {index} out of bounds for snapshot of {} endpoints",
            self.snapshot.len(),
        );
        self.words[index / WORD_BITS] &= !(1 << (index % WORD_BITS));
    }

    #[inline]
    pub fn contains(&self, index: usize) -> bool {
        if index >= self.snapshot.len() {
            return false;
        }
        self.words[index / WORD_BITS] & (1 << (index % WORD_BITS)) != 0
    }

    /// Number of member endpoints.
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// Bitwise AND with another set sharing the same snapshot.
    pub fn intersect(&self, other: &IndexedSet) -> Result<IndexedSet, IncompatibleSnapshot> {
        self.check_compatible(other)?;
        let mut out = self.clone();
        for (word, other_word) in out.words.iter_mut().zip(other.words.iter()) {
            *word &= other_word;
        }
        Ok(out)
    }

    /// Bitwise OR with another set sharing the same snapshot.
    pub fn union(&self, other: &IndexedSet) -> Result<IndexedSet, IncompatibleSnapshot> {
        self.check_compatible(other)?;
        let mut out = self.clone();
        for (word, other_word) in out.words.iter_mut().zip(other.words.iter()) {
            *word |= other_word;
        }
        Ok(out)
    }

    /// Iterates over the member indices in ascending order.
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.snapshot.len()).filter(|i| self.contains(*i))
    }

    /// Materializes the members back into an ordered endpoint list.
    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.indices()
            .filter_map(|i| self.snapshot.get(i).cloned())
            .collect()
    }

    fn check_compatible(&self, other: &IndexedSet) -> Result<(), IncompatibleSnapshot> {
        if self.snapshot.same_origin(&other.snapshot) {
            Ok(())
        } else {
            Err(IncompatibleSnapshot)
        }
    }

    // Bits past the snapshot length must stay zero so popcounts and
    // emptiness checks stay honest.
    fn mask_tail(&mut self) {
        let tail_bits = self.snapshot.len() % WORD_BITS;
        if tail_bits != 0 {
            if let Some(last) = self.words.last_mut() {
                *last &= (1 << tail_bits) - 1;
            }
        }
    }
}
