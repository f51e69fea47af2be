use anyhow::{ensure, Result};
use std::fmt::Debug;
use std::ops::{Bound, Deref, DerefMut, Range, RangeBounds};

/// An owned byte buffer that exposes a subregion of its allocation.
///
/// Layers of the block store stack add or strip headers (format versions, nonces,
/// auth tags). [Data::shrink_to_subregion] and [Data::grow_region] move the visible
/// window over the allocation so those headers can be added or removed without copying
/// the payload. Bytes outside the window stay allocated until the [Data] is dropped.
#[derive(Clone, Eq)]
pub struct Data {
    storage: Vec<u8>,
    // Invariant: region.start <= region.end <= storage.len()
    region: Range<usize>,
}

impl Data {
    pub fn empty() -> Self {
        Vec::new().into()
    }

    /// Allocate a zeroed region of `len` bytes with `prefix_bytes` and `suffix_bytes`
    /// of headroom that can later be claimed with [Data::grow_region_fail_if_reallocation_necessary].
    pub fn allocate(prefix_bytes: usize, len: usize, suffix_bytes: usize) -> Self {
        Self {
            storage: vec![0; prefix_bytes + len + suffix_bytes],
            region: prefix_bytes..(prefix_bytes + len),
        }
    }

    pub fn len(&self) -> usize {
        self.region.len()
    }

    pub fn is_empty(&self) -> bool {
        self.region.is_empty()
    }

    /// Narrow the visible window to `range`, given relative to the current window.
    ///
    /// Panics if `range` reaches beyond the current window.
    pub fn shrink_to_subregion(&mut self, range: impl RangeBounds<usize> + Debug) {
        let start = match range.start_bound() {
            Bound::Unbounded => 0,
            Bound::Included(&x) => x,
            Bound::Excluded(&x) => x + 1,
        };
        let end = match range.end_bound() {
            Bound::Unbounded => self.region.len(),
            Bound::Included(&x) => x + 1,
            Bound::Excluded(&x) => x,
        };
        assert!(
            start <= end && end <= self.region.len(),
            "Tried to shrink to subregion {:?} of a Data instance with length {}",
            range,
            self.region.len(),
        );
        self.region = (self.region.start + start)..(self.region.start + end);
        self.assert_region_invariant();
    }

    /// Widen the visible window by the given number of bytes on each side, reallocating
    /// if the headroom isn't there. Newly reallocated bytes are zero, but bytes reclaimed
    /// from existing headroom keep whatever they held before.
    pub fn grow_region(&mut self, add_prefix_bytes: usize, add_suffix_bytes: usize) {
        self.reserve(add_prefix_bytes, add_suffix_bytes);
        let grown = self.grow_region_fail_if_reallocation_necessary(add_prefix_bytes, add_suffix_bytes);
        assert!(grown.is_ok(), "Reserved headroom but growing still failed: {grown:?}");
    }

    /// Like [Data::grow_region], but fails instead of reallocating.
    pub fn grow_region_fail_if_reallocation_necessary(
        &mut self,
        add_prefix_bytes: usize,
        add_suffix_bytes: usize,
    ) -> Result<()> {
        ensure!(
            self.available_prefix_bytes() >= add_prefix_bytes,
            "Tried to add {} prefix bytes but only {} are available",
            add_prefix_bytes,
            self.available_prefix_bytes(),
        );
        ensure!(
            self.available_suffix_bytes() >= add_suffix_bytes,
            "Tried to add {} suffix bytes but only {} are available",
            add_suffix_bytes,
            self.available_suffix_bytes(),
        );
        self.region = (self.region.start - add_prefix_bytes)..(self.region.end + add_suffix_bytes);
        self.assert_region_invariant();
        Ok(())
    }

    /// Make sure at least `prefix_bytes` and `suffix_bytes` of headroom exist around the window.
    pub fn reserve(&mut self, prefix_bytes: usize, suffix_bytes: usize) {
        if self.available_prefix_bytes() >= prefix_bytes
            && self.available_suffix_bytes() >= suffix_bytes
        {
            return;
        }
        let len = self.region.len();
        let mut storage = vec![0; prefix_bytes + len + suffix_bytes];
        storage[prefix_bytes..(prefix_bytes + len)].copy_from_slice(self.as_ref());
        self.storage = storage;
        self.region = prefix_bytes..(prefix_bytes + len);
        self.assert_region_invariant();
    }

    pub fn available_prefix_bytes(&self) -> usize {
        self.region.start
    }

    pub fn available_suffix_bytes(&self) -> usize {
        self.storage.len() - self.region.end
    }

    /// Set the window length to `new_size`, growing or shrinking at the end.
    pub fn resize(&mut self, new_size: usize) {
        if new_size < self.region.len() {
            self.shrink_to_subregion(..new_size);
        } else {
            self.grow_region(0, new_size - self.region.len());
        }
    }

    fn assert_region_invariant(&self) {
        debug_assert!(
            self.region.start <= self.region.end && self.region.end <= self.storage.len(),
            "Region {:?} invalid for storage of size {}",
            self.region,
            self.storage.len(),
        );
    }
}

impl From<Vec<u8>> for Data {
    fn from(storage: Vec<u8>) -> Data {
        let region = 0..storage.len();
        Self { storage, region }
    }
}

impl From<&[u8]> for Data {
    fn from(data: &[u8]) -> Data {
        data.to_vec().into()
    }
}

impl AsRef<[u8]> for Data {
    fn as_ref(&self) -> &[u8] {
        &self.storage[self.region.clone()]
    }
}

impl AsMut<[u8]> for Data {
    fn as_mut(&mut self) -> &mut [u8] {
        &mut self.storage[self.region.clone()]
    }
}

impl Deref for Data {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        self.as_ref()
    }
}

impl DerefMut for Data {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.as_mut()
    }
}

impl PartialEq for Data {
    fn eq(&self, other: &Data) -> bool {
        self.as_ref() == other.as_ref()
    }
}

impl Debug for Data {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(fmt, "Data({})", hex::encode_upper(self.as_ref()))
    }
}
