/// A fixed number of equally sized bitsets stored in one allocation.
///
/// The spatial grid keeps one of these for columns and one for rows,
/// with a bit per shape in each.
#[derive(Clone, Debug)]
pub(crate) struct BitMatrix {
    words_per_row: usize,
    row_count: usize,
    words: Vec<u64>,
}

#[inline]
fn words_for(bit_count: usize) -> usize {
    bit_count / 64 + 1
}

impl BitMatrix {
    pub fn new(row_count: usize) -> Self {
        Self {
            words_per_row: 1,
            row_count,
            words: vec![0; row_count],
        }
    }

    #[inline]
    pub fn words_per_row(&self) -> usize {
        self.words_per_row
    }

    /// Clear every bit and make sure each row can hold `bit_count` bits.
    pub fn reset(&mut self, bit_count: usize) {
        self.words.iter_mut().for_each(|w| *w = 0);
        let needed = words_for(bit_count);
        if needed > self.words_per_row {
            self.words_per_row = needed;
            self.words.resize(self.words_per_row * self.row_count, 0);
        }
    }

    /// Set a bit in a row.
    ///
    /// # Panics
    /// Panics if either index is out of range.
    #[inline]
    pub fn set(&mut self, row: usize, bit: usize) {
        let start = row * self.words_per_row;
        self.words[start + bit / 64] |= 1_u64 << (bit % 64);
    }

    #[inline]
    pub fn row(&self, row: usize) -> &[u64] {
        let start = row * self.words_per_row;
        &self.words[start..start + self.words_per_row]
    }
}

/// A single growable bitset, used as scratch space when combining matrix rows.
#[derive(Clone, Debug, Default)]
pub(crate) struct BitSet(Vec<u64>);

impl BitSet {
    /// Clear the set and size it to `word_count` words.
    pub fn reset(&mut self, word_count: usize) {
        self.0.clear();
        self.0.resize(word_count, 0);
    }

    pub fn or_assign(&mut self, other: &[u64]) {
        for (w, o) in self.0.iter_mut().zip(other) {
            *w |= o;
        }
    }

    pub fn and_assign(&mut self, other: &BitSet) {
        for (w, o) in self.0.iter_mut().zip(&other.0) {
            *w &= o;
        }
    }

    #[cfg(test)]
    pub fn insert(&mut self, bit: usize) {
        let word_idx = bit / 64;
        if word_idx >= self.0.len() {
            self.0.resize(word_idx + 1, 0);
        }
        self.0[word_idx] |= 1_u64 << (bit % 64);
    }

    /// Iterate over the indices of set bits in ascending order.
    pub fn ones(&self) -> Ones<'_> {
        Ones {
            words: &self.0,
            word_idx: 0,
            curr_word: self.0.first().copied().unwrap_or(0),
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct Ones<'a> {
    words: &'a [u64],
    word_idx: usize,
    // copy of the current word with already returned bits removed
    curr_word: u64,
}

impl<'a> Iterator for Ones<'a> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.curr_word != 0 {
                let first_bit_idx = self.curr_word.trailing_zeros();
                self.curr_word ^= 1 << first_bit_idx;
                return Some(self.word_idx * 64 + first_bit_idx as usize);
            }
            self.word_idx += 1;
            self.curr_word = *self.words.get(self.word_idx)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_bitset(idxs: &[usize]) -> BitSet {
        let mut set = BitSet::default();
        for &idx in idxs {
            set.insert(idx);
        }
        set
    }

    #[test]
    fn ones_are_ascending() {
        let set = make_bitset(&[0, 5, 3, 130, 120]);
        itertools::assert_equal(set.ones(), [0, 3, 5, 120, 130]);
        assert_eq!(BitSet::default().ones().next(), None);
    }

    #[test]
    fn union_then_intersection() {
        let mut matrix = BitMatrix::new(3);
        matrix.reset(200);
        assert_eq!(matrix.words_per_row(), 4);
        for bit in [0, 5, 128, 191] {
            matrix.set(0, bit);
        }
        for bit in [2, 190] {
            matrix.set(1, bit);
        }
        matrix.set(2, 5);

        let mut union = BitSet::default();
        union.reset(matrix.words_per_row());
        union.or_assign(matrix.row(0));
        union.or_assign(matrix.row(1));
        itertools::assert_equal(union.ones(), [0, 2, 5, 128, 190, 191]);

        let mut other = BitSet::default();
        other.reset(matrix.words_per_row());
        other.or_assign(matrix.row(2));
        other.or_assign(make_bitset(&[190, 7]).0.as_slice());
        union.and_assign(&other);
        itertools::assert_equal(union.ones(), [5, 190]);
    }

    #[test]
    fn reset_clears_and_grows() {
        let mut matrix = BitMatrix::new(2);
        matrix.set(1, 3);
        matrix.reset(70);
        assert!(matrix.row(1).iter().all(|w| *w == 0));
        matrix.set(1, 69);
        assert_eq!(matrix.row(1)[1], 1 << 5);
    }
}
