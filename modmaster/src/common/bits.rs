/// value of bit `index` when bits are packed LSB-first into `bytes`
pub(crate) fn bit_at(bytes: &[u8], index: usize) -> Option<bool> {
    bytes
        .get(index / 8)
        .map(|byte| (*byte & (1 << (index % 8))) != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpacks_bits_least_significant_first() {
        let bytes = [0b0000_0101, 0b1000_0000];
        assert_eq!(bit_at(&bytes, 0), Some(true));
        assert_eq!(bit_at(&bytes, 1), Some(false));
        assert_eq!(bit_at(&bytes, 2), Some(true));
        assert_eq!(bit_at(&bytes, 15), Some(true));
        assert_eq!(bit_at(&bytes, 16), None);
    }
}
