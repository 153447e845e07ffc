//! Sets of element indices that an evaluation or call processes.

use crate::dynamic::VArray;
use std::{
    fmt::{self, Debug},
    iter::{Copied, FusedIterator},
    ops::Range,
    slice,
    sync::Arc,
};

/// A sorted set of unique element indices.
///
/// Contiguous masks are stored as a range, everything else as a shared list
/// of indices, so cloning and slicing a mask never copies indices.
#[derive(Clone)]
pub struct IndexMask {
    repr: Repr,
}

#[derive(Clone)]
enum Repr {
    Range(Range<usize>),
    Indices {
        indices: Arc<[usize]>,
        start: usize,
        end: usize,
    },
}

impl IndexMask {
    pub const fn empty() -> Self {
        Self {
            repr: Repr::Range(0..0),
        }
    }

    /// All indices in `0..size`.
    pub const fn from_size(size: usize) -> Self {
        Self {
            repr: Repr::Range(0..size),
        }
    }

    pub fn from_range(range: Range<usize>) -> Self {
        if range.is_empty() {
            return Self::empty();
        }
        Self {
            repr: Repr::Range(range),
        }
    }

    /// Creates a mask from indices that are sorted and unique.
    pub fn from_indices<I>(indices: I) -> Self
    where
        I: Into<Vec<usize>>,
    {
        let indices = indices.into();
        debug_assert!(
            indices.windows(2).all(|pair| pair[0] < pair[1]),
            "mask indices must be sorted and unique",
        );

        match (indices.first(), indices.last()) {
            (None, _) | (_, None) => Self::empty(),
            (Some(&first), Some(&last)) if last - first + 1 == indices.len() => {
                Self::from_range(first..last + 1)
            }
            _ => {
                let end = indices.len();
                Self {
                    repr: Repr::Indices {
                        indices: indices.into(),
                        start: 0,
                        end,
                    },
                }
            }
        }
    }

    /// Indices of `universe` for which `predicate` returns true.
    pub fn from_predicate<F>(universe: &IndexMask, predicate: F) -> Self
    where
        F: Fn(usize) -> bool,
    {
        if universe.is_empty() {
            return Self::empty();
        }
        Self::from_indices(
            universe
                .iter()
                .filter(|&index| predicate(index))
                .collect::<Vec<_>>(),
        )
    }

    /// Indices of `universe` whose value in `bools` is true.
    pub fn from_bools(universe: &IndexMask, bools: &VArray<bool>) -> Self {
        debug_assert!(bools.len() >= universe.min_array_size());
        if let Some(&value) = bools.get_internal_single() {
            return if value {
                universe.clone()
            } else {
                Self::empty()
            };
        }
        if let Some(span) = bools.get_internal_span() {
            return Self::from_predicate(universe, |index| span[index]);
        }
        Self::from_predicate(universe, |index| bools.get(index))
    }

    pub fn len(&self) -> usize {
        match &self.repr {
            Repr::Range(range) => range.len(),
            Repr::Indices { start, end, .. } => end - start,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn first(&self) -> Option<usize> {
        match &self.repr {
            Repr::Range(range) => (!range.is_empty()).then_some(range.start),
            Repr::Indices { indices, start, end } => indices[*start..*end].first().copied(),
        }
    }

    pub fn last(&self) -> Option<usize> {
        match &self.repr {
            Repr::Range(range) => (!range.is_empty()).then(|| range.end - 1),
            Repr::Indices { indices, start, end } => indices[*start..*end].last().copied(),
        }
    }

    /// The size an array must have so that every index in the mask is valid.
    pub fn min_array_size(&self) -> usize {
        self.last().map_or(0, |last| last + 1)
    }

    /// Positions `0..len` of the indices in the mask.
    pub fn index_range(&self) -> Range<usize> {
        0..self.len()
    }

    /// The index at position `position`.
    pub fn get(&self, position: usize) -> usize {
        match &self.repr {
            Repr::Range(range) => {
                assert!(position < range.len(), "mask position out of bounds");
                range.start + position
            }
            Repr::Indices { indices, start, end } => indices[*start..*end][position],
        }
    }

    pub fn contains(&self, index: usize) -> bool {
        match &self.repr {
            Repr::Range(range) => range.contains(&index),
            Repr::Indices { indices, start, end } => {
                indices[*start..*end].binary_search(&index).is_ok()
            }
        }
    }

    /// The mask as a contiguous range, if it is one.
    pub fn as_range(&self) -> Option<Range<usize>> {
        match &self.repr {
            Repr::Range(range) => Some(range.clone()),
            Repr::Indices { .. } => None,
        }
    }

    pub fn is_range(&self) -> bool {
        matches!(self.repr, Repr::Range(_))
    }

    /// The explicit index list, if the mask is not stored as a range.
    pub fn as_indices(&self) -> Option<&[usize]> {
        match &self.repr {
            Repr::Range(_) => None,
            Repr::Indices { indices, start, end } => Some(&indices[*start..*end]),
        }
    }

    pub fn iter(&self) -> Iter<'_> {
        match &self.repr {
            Repr::Range(range) => Iter::Range(range.clone()),
            Repr::Indices { indices, start, end } => {
                Iter::Indices(indices[*start..*end].iter().copied())
            }
        }
    }

    pub fn foreach_index<F>(&self, mut f: F)
    where
        F: FnMut(usize),
    {
        match &self.repr {
            Repr::Range(range) => range.clone().for_each(&mut f),
            Repr::Indices { indices, start, end } => {
                indices[*start..*end].iter().for_each(|&index| f(index))
            }
        }
    }

    /// Sub-mask with the indices at `positions`.
    pub fn slice(&self, positions: Range<usize>) -> Self {
        assert!(positions.start <= positions.end && positions.end <= self.len());
        if positions.is_empty() {
            return Self::empty();
        }

        match &self.repr {
            Repr::Range(range) => {
                Self::from_range(range.start + positions.start..range.start + positions.end)
            }
            Repr::Indices { indices, start, .. } => Self {
                repr: Repr::Indices {
                    indices: indices.clone(),
                    start: start + positions.start,
                    end: start + positions.end,
                },
            },
        }
    }

    /// Splits the mask into consecutive chunks of at least `grain_size`
    /// indices, creating no more than `max_chunks` chunks.
    pub fn chunks(&self, grain_size: usize, max_chunks: usize) -> Vec<IndexMask> {
        let len = self.len();
        if len == 0 {
            return Vec::new();
        }

        let chunk_count = len.div_ceil(grain_size.max(1)).clamp(1, max_chunks.max(1));
        let chunk_size = len.div_ceil(chunk_count);
        (0..len)
            .step_by(chunk_size)
            .map(|start| self.slice(start..(start + chunk_size).min(len)))
            .collect()
    }

    /// Indices contained in both masks.
    pub fn intersect(&self, other: &IndexMask) -> Self {
        if let (Some(a), Some(b)) = (self.as_range(), other.as_range()) {
            return Self::from_range(a.start.max(b.start)..a.end.min(b.end));
        }

        let (small, large) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        Self::from_indices(
            small
                .iter()
                .filter(|&index| large.contains(index))
                .collect::<Vec<_>>(),
        )
    }

    pub fn to_vec(&self) -> Vec<usize> {
        self.iter().collect()
    }
}

impl Default for IndexMask {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Range<usize>> for IndexMask {
    fn from(range: Range<usize>) -> Self {
        Self::from_range(range)
    }
}

impl PartialEq for IndexMask {
    fn eq(&self, other: &Self) -> bool {
        match (&self.repr, &other.repr) {
            (Repr::Range(a), Repr::Range(b)) => a == b || (a.is_empty() && b.is_empty()),
            _ => self.len() == other.len() && self.iter().eq(other.iter()),
        }
    }
}

impl Eq for IndexMask {}

impl Debug for IndexMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            Repr::Range(range) => write!(f, "IndexMask({range:?})"),
            Repr::Indices { .. } => f
                .debug_tuple("IndexMask")
                .field(&self.as_indices().unwrap_or_default())
                .finish(),
        }
    }
}

impl<'a> IntoIterator for &'a IndexMask {
    type Item = usize;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the indices of an [`IndexMask`].
#[derive(Clone, Debug)]
pub enum Iter<'a> {
    Range(Range<usize>),
    Indices(Copied<slice::Iter<'a, usize>>),
}

impl Iterator for Iter<'_> {
    type Item = usize;

    #[inline]
    fn next(&mut self) -> Option<usize> {
        match self {
            Self::Range(range) => range.next(),
            Self::Indices(indices) => indices.next(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            Self::Range(range) => range.size_hint(),
            Self::Indices(indices) => indices.size_hint(),
        }
    }
}

impl ExactSizeIterator for Iter<'_> {}

impl FusedIterator for Iter<'_> {}

#[cfg(test)]
mod test {
    use super::IndexMask;
    use crate::dynamic::VArray;

    #[test]
    fn contiguous_indices_become_a_range() {
        let mask = IndexMask::from_indices(vec![3, 4, 5]);
        assert!(mask.is_range());
        assert_eq!(mask, IndexMask::from_range(3..6));
        assert_eq!(mask.min_array_size(), 6);
    }

    #[test]
    fn slicing_and_chunking() {
        let mask = IndexMask::from_indices(vec![1, 4, 5, 9, 12, 13, 20]);
        assert_eq!(mask.slice(2..5).to_vec(), vec![5, 9, 12]);
        assert_eq!(mask.get(3), 9);
        assert!(mask.contains(13));
        assert!(!mask.contains(14));

        let chunks = mask.chunks(2, 100);
        assert_eq!(chunks.len(), 4);
        let rejoined: Vec<usize> = chunks.iter().flat_map(|chunk| chunk.to_vec()).collect();
        assert_eq!(rejoined, mask.to_vec());

        let limited = IndexMask::from_size(1000).chunks(10, 3);
        assert_eq!(limited.len(), 3);
        assert_eq!(limited.iter().map(IndexMask::len).sum::<usize>(), 1000);
    }

    #[test]
    fn intersection() {
        let a = IndexMask::from_range(2..10);
        let b = IndexMask::from_indices(vec![0, 3, 7, 11]);
        assert_eq!(a.intersect(&b).to_vec(), vec![3, 7]);
        assert_eq!(
            a.intersect(&IndexMask::from_range(5..20)),
            IndexMask::from_range(5..10)
        );
        assert!(a.intersect(&IndexMask::from_range(10..12)).is_empty());
    }

    #[test]
    fn from_bools() {
        let universe = IndexMask::from_range(0..6);
        let bools = VArray::from_vec(vec![true, false, true, true, false, true]);
        assert_eq!(
            IndexMask::from_bools(&universe, &bools).to_vec(),
            vec![0, 2, 3, 5]
        );
        assert_eq!(
            IndexMask::from_bools(&universe, &VArray::for_single(true, 6)),
            universe
        );
        assert!(IndexMask::from_bools(&universe, &VArray::for_single(false, 6)).is_empty());
    }
}
