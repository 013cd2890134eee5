use std::fmt::{Debug, Error, Formatter};
use std::iter::{Enumerate, Extend, FromIterator};
use std::ops::Sub;
use std::result::Result;
use std::slice::Iter;

/// Elements with a width (eg. when used in an `OffsetVec`)
pub trait Width {
    fn width(&self) -> usize;
}

/// A vector of elements of different logical "widths", where offsets into the vector are given in
/// terms of the sum of the widths of the previous elements (as opposed to the number of preceding
/// elements).
///
/// The constant pool is the main user: most entries have width 1, but `long` and `double`
/// constants have width 2 and the offset after them is an unusable placeholder. Looking up that
/// placeholder offset is reported as [`OffsetResult::InvalidOffset`] rather than silently
/// returning a neighbouring entry.
#[derive(Clone)]
pub struct OffsetVec<T: Sized> {
    /// Entries, along with their offset
    entries: Vec<(Offset, T)>,

    /// Offset of the next element to be added
    offset_len: Offset,

    /// Offset for the first element (usually 0, but 1 for the constant pool)
    initial_offset: Offset,
}

/// Offset into an `OffsetVec`
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Offset(pub usize);

impl Sub for Offset {
    type Output = isize;

    fn sub(self, other: Offset) -> isize {
        (self.0 as isize) - (other.0 as isize)
    }
}

impl<T: Sized + Width> OffsetVec<T> {
    /// New empty offset vector
    pub fn new() -> OffsetVec<T> {
        OffsetVec::new_starting_at(Offset(0))
    }

    /// New empty offset vector, with a custom starting offset
    pub fn new_starting_at(initial_offset: Offset) -> OffsetVec<T> {
        OffsetVec {
            entries: vec![],
            offset_len: initial_offset,
            initial_offset,
        }
    }

    /// Length of the `OffsetVec` (aka. number of entries)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current offset size of the `OffsetVec` (aka. offset of the next element
    /// to be added)
    pub fn offset_len(&self) -> Offset {
        self.offset_len
    }

    /// Offset of the first element
    pub fn initial_offset(&self) -> Offset {
        self.initial_offset
    }

    /// Add an entry to the back
    pub fn push(&mut self, slot: T) -> Offset {
        let offset = self.offset_len;
        self.offset_len.0 += slot.width();
        self.entries.push((offset, slot));

        offset
    }

    /// Find the position in `entries` of the element starting exactly at `offset`
    fn search(&self, offset: Offset) -> Result<usize, OffsetResult<'static, ()>> {
        if offset < self.initial_offset || offset >= self.offset_len {
            return Err(OffsetResult::TooLarge);
        }
        self.entries
            .binary_search_by_key(&offset, |(off, _)| *off)
            .map_err(|insert_at| OffsetResult::InvalidOffset(insert_at))
    }

    /// Get an entry (and its index) by its offset in the vector
    ///
    /// Note: this uses binary search to find the offset
    pub fn get_offset(&self, offset: Offset) -> OffsetResult<T> {
        match self.search(offset) {
            Ok(found_idx) => OffsetResult::Ok(found_idx, &self.entries[found_idx].1),
            Err(OffsetResult::InvalidOffset(idx)) => OffsetResult::InvalidOffset(idx),
            Err(_) => OffsetResult::TooLarge,
        }
    }

    /// Mutably access an entry by its offset in the vector
    ///
    /// Replacing the entry with one of a different width would invalidate every later offset, so
    /// callers only get to mutate the entry in place.
    pub fn get_offset_mut(&mut self, offset: Offset) -> Option<&mut T> {
        match self.search(offset) {
            Ok(found_idx) => Some(&mut self.entries[found_idx].1),
            Err(_) => None,
        }
    }

    pub fn iter<'a>(&'a self) -> OffsetVecIter<'a, T> {
        self.into_iter()
    }

    /// Iterate over every element mutably, along with its offset
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Offset, &mut T)> {
        self.entries.iter_mut().map(|(off, elem)| (*off, elem))
    }
}

impl<A: PartialEq> PartialEq for OffsetVec<A> {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries && self.initial_offset == other.initial_offset
    }
}

impl<A: Eq> Eq for OffsetVec<A> {}

impl<A: Width> Default for OffsetVec<A> {
    fn default() -> Self {
        OffsetVec::new()
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum OffsetResult<'a, T> {
    /// Element was accessed
    Ok(usize, &'a T),

    /// Offset was invalid, and falls in the middle of the element preceding this index
    InvalidOffset(usize),

    /// Offset is before the first element or past the last one
    TooLarge,
}

impl<'a, T> OffsetResult<'a, T> {
    /// Convert to an `Option` and keep only the value found
    pub fn ok(&self) -> Option<&'a T> {
        match self {
            OffsetResult::Ok(_, found) => Some(*found),
            OffsetResult::InvalidOffset(_) | OffsetResult::TooLarge => None,
        }
    }
}

/// Iterator for borrowed `OffsetVec`
pub struct OffsetVecIter<'a, T>(Enumerate<Iter<'a, (Offset, T)>>);

impl<'a, T> Iterator for OffsetVecIter<'a, T> {
    type Item = (Offset, usize, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(idx, (off, elem))| (*off, idx, elem))
    }
}

impl<'a, T> IntoIterator for &'a OffsetVec<T> {
    type Item = (Offset, usize, &'a T);
    type IntoIter = OffsetVecIter<'a, T>;

    fn into_iter(self) -> OffsetVecIter<'a, T> {
        OffsetVecIter(self.entries.iter().enumerate())
    }
}

impl<T: Width> FromIterator<T> for OffsetVec<T> {
    fn from_iter<A: IntoIterator<Item = T>>(elems: A) -> Self {
        let mut offset_vec = OffsetVec::new();
        offset_vec.extend(elems);
        offset_vec
    }
}

impl<T: Width> Extend<T> for OffsetVec<T> {
    fn extend<U: IntoIterator<Item = T>>(&mut self, iter: U) {
        for elem in iter {
            self.push(elem);
        }
    }
}

impl<T: Debug> Debug for OffsetVec<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        let mut list = f.debug_list();
        for (off, elem) in &self.entries {
            list.entry(&format_args!("#{} = {:?}", off.0, elem));
        }
        list.finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Copy, Clone, Eq, PartialEq, Debug)]
    enum Slot {
        Narrow(u8),
        Wide(u8),
    }

    impl Width for Slot {
        fn width(&self) -> usize {
            match self {
                Slot::Narrow(_) => 1,
                Slot::Wide(_) => 2,
            }
        }
    }

    fn pool_like() -> OffsetVec<Slot> {
        let mut slots = OffsetVec::new_starting_at(Offset(1));
        slots.extend(vec![Slot::Narrow(1), Slot::Wide(2), Slot::Narrow(3)]);
        slots
    }

    #[test]
    fn offsets_account_for_width() {
        let slots = pool_like();
        assert_eq!(
            slots.iter().map(|(off, idx, slot)| (off, idx, *slot)).collect::<Vec<_>>(),
            vec![
                (Offset(1), 0, Slot::Narrow(1)),
                (Offset(2), 1, Slot::Wide(2)),
                (Offset(4), 2, Slot::Narrow(3)),
            ]
        );
        assert_eq!(slots.offset_len(), Offset(5));
    }

    #[test]
    fn placeholder_and_out_of_range_offsets() {
        let slots = pool_like();
        assert_eq!(slots.get_offset(Offset(2)).ok(), Some(&Slot::Wide(2)));
        assert_eq!(slots.get_offset(Offset(3)), OffsetResult::InvalidOffset(2));
        assert_eq!(slots.get_offset(Offset(0)), OffsetResult::TooLarge);
        assert_eq!(slots.get_offset(Offset(5)), OffsetResult::TooLarge);
    }

    #[test]
    fn mutate_in_place() {
        let mut slots = pool_like();
        if let Some(Slot::Narrow(n)) = slots.get_offset_mut(Offset(4)) {
            *n = 9;
        }
        assert_eq!(slots.get_offset(Offset(4)).ok(), Some(&Slot::Narrow(9)));
        assert!(slots.get_offset_mut(Offset(3)).is_none());
    }
}
