use std::cmp::min;
use std::ops::Index;

use crate::utils::MyHash;

#[derive(Clone)]
struct Entry<T> {
    value: T,
    next: usize,
}

/// Growable unique table.
///
/// Values are appended and never removed, so indices are stable for the
/// lifetime of the table. Index 0 is reserved (sentry), which lets `0`
/// double as the "end of chain" marker in buckets.
pub struct Table<T> {
    data: Vec<Entry<T>>,

    buckets: Vec<usize>,
    bitmask: u64,
}

impl<T> Table<T>
where
    T: Default,
{
    /// Create a new table with `2^bits` buckets (capped at `2^16`).
    pub fn new(bits: usize) -> Self {
        assert!(bits <= 31, "Table bits should be in the range 0..=31");

        let mut data = Vec::with_capacity(1 << min(bits, 20));
        data.push(Entry {
            value: T::default(),
            next: 0,
        });

        let buckets_bits = min(bits, 16);
        let buckets_size = 1 << buckets_bits;
        let buckets = vec![0; buckets_size];
        let bitmask = (buckets_size - 1) as u64;

        Self { data, buckets, bitmask }
    }
}

impl<T> Table<T> {
    /// Number of stored values (the sentry excluded).
    pub fn size(&self) -> usize {
        self.data.len() - 1
    }

    /// Get the reference to the value at the given index.
    pub fn value(&self, index: usize) -> &T {
        assert_ne!(index, 0, "Index is 0");
        &self.data[index].value
    }

    /// Get the index of the next cell in the same bucket.
    pub fn next(&self, index: usize) -> usize {
        assert_ne!(index, 0, "Index is 0");
        self.data[index].next
    }

    fn add(&mut self, value: T) -> usize {
        self.data.push(Entry { value, next: 0 });
        self.data.len() - 1
    }
}

impl<T> Table<T>
where
    T: MyHash + Eq,
{
    fn bucket_index(&self, value: &T) -> usize {
        (value.hash() & self.bitmask) as usize
    }

    /// Find the index of an existing value.
    pub fn find(&self, value: &T) -> Option<usize> {
        let mut index = self.buckets[self.bucket_index(value)];
        while index != 0 {
            if self.value(index) == value {
                return Some(index);
            }
            index = self.next(index);
        }
        None
    }

    /// Put a value into the table and return its index.
    ///
    /// Returns the index of the existing equal value, if any. New values
    /// are linked at the head of their bucket.
    pub fn put(&mut self, value: T) -> usize {
        if let Some(index) = self.find(&value) {
            return index;
        }
        let bucket_index = self.bucket_index(&value);
        let i = self.add(value);
        self.data[i].next = self.buckets[bucket_index];
        self.buckets[bucket_index] = i;
        i
    }
}

impl<T> Index<usize> for Table<T> {
    type Output = T;

    fn index(&self, index: usize) -> &Self::Output {
        self.value(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Clone, Eq, PartialEq)]
    struct Item(i32);

    impl MyHash for Item {
        fn hash(&self) -> u64 {
            self.0.unsigned_abs() as u64
        }
    }

    #[test]
    fn test_put_dedup() {
        let mut table = Table::new(2);
        let i = table.put(Item(7));
        let j = table.put(Item(7));
        assert_eq!(i, j);
        assert_eq!(table.size(), 1);
        assert_eq!(table[i], Item(7));
    }

    #[test]
    fn test_put_collision_chain() {
        let mut table = Table::new(2);
        let index1 = table.put(Item(5));
        let index2 = table.put(Item(-5));
        assert_ne!(index1, index2);
        assert_eq!(table[index1], Item(5));
        assert_eq!(table[index2], Item(-5));
        assert_eq!(table.next(index2), index1);
        assert_eq!(table.next(index1), 0);
        assert_eq!(table.find(&Item(-5)), Some(index2));
        assert_eq!(table.find(&Item(6)), None);
    }

    #[test]
    fn test_grows_past_bucket_count() {
        let mut table = Table::new(1);
        let indices: Vec<_> = (0..100).map(|i| table.put(Item(i))).collect();
        assert_eq!(table.size(), 100);
        for (i, &index) in indices.iter().enumerate() {
            assert_eq!(table[index], Item(i as i32));
        }
    }

    #[test]
    #[should_panic(expected = "Index is 0")]
    fn test_sentry_is_not_a_value() {
        let table = Table::<Item>::new(2);
        table.value(0);
    }
}
