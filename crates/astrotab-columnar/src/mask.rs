#![forbid(unsafe_code)]

/// Element mask of a masked array: a set bit flags the element as invalid.
///
/// Bits are packed little-endian within each `u64` word, bit 0 being the LSB of word 0.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ArrayMask {
    words: Vec<u64>,
    len: usize,
    flagged: usize,
}

impl ArrayMask {
    /// A mask of `len` elements with nothing flagged.
    pub fn clear(len: usize) -> Self {
        Self {
            words: vec![0u64; len.div_ceil(64)],
            len,
            flagged: 0,
        }
    }

    pub fn from_flags(flags: impl IntoIterator<Item = bool>) -> Self {
        let mut mask = Self::default();
        for flag in flags {
            mask.push(flag);
        }
        mask
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn push(&mut self, flagged: bool) {
        let bit = self.len % 64;
        if bit == 0 {
            self.words.push(0);
        }
        if flagged {
            self.words[self.len / 64] |= 1u64 << bit;
            self.flagged += 1;
        }
        self.len += 1;
    }

    pub fn is_flagged(&self, index: usize) -> bool {
        debug_assert!(index < self.len, "mask index out of bounds");
        (self.words[index / 64] >> (index % 64)) & 1 == 1
    }

    pub fn set(&mut self, index: usize, flagged: bool) {
        debug_assert!(index < self.len, "mask index out of bounds");
        let word = &mut self.words[index / 64];
        let bit = 1u64 << (index % 64);
        let was = *word & bit != 0;
        match (was, flagged) {
            (false, true) => {
                *word |= bit;
                self.flagged += 1;
            }
            (true, false) => {
                *word &= !bit;
                self.flagged -= 1;
            }
            _ => {}
        }
    }

    pub fn flagged_count(&self) -> usize {
        self.flagged
    }

    pub fn any_flagged(&self) -> bool {
        self.flagged > 0
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len).map(|i| self.is_flagged(i))
    }

    /// Indices of the flagged elements in increasing order.
    pub fn iter_flagged(&self) -> impl Iterator<Item = usize> + '_ {
        self.words
            .iter()
            .enumerate()
            .flat_map(|(word_idx, &word)| {
                let mut bits = word;
                std::iter::from_fn(move || {
                    if bits == 0 {
                        return None;
                    }
                    let tz = bits.trailing_zeros() as usize;
                    bits &= bits - 1;
                    Some(word_idx * 64 + tz)
                })
            })
            .take_while(move |&idx| idx < self.len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_span_word_boundaries() {
        let mut mask = ArrayMask::clear(130);
        mask.set(3, true);
        mask.set(64, true);
        mask.set(129, true);
        mask.set(3, true);
        assert_eq!(mask.flagged_count(), 3);
        assert_eq!(mask.iter_flagged().collect::<Vec<_>>(), vec![3, 64, 129]);
        mask.set(64, false);
        assert_eq!(mask.flagged_count(), 2);
        assert!(!mask.is_flagged(64));
    }

    #[test]
    fn clear_mask_flags_nothing() {
        let mut mask = ArrayMask::clear(70);
        assert!(!mask.any_flagged());
        mask.push(true);
        assert!(mask.any_flagged());
        assert_eq!(mask.len(), 71);
    }
}
