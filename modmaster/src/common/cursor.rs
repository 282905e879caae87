use crate::error::InternalError;

/// write cursor over a fixed buffer
pub(crate) struct WriteCursor<'a> {
    dest: &'a mut [u8],
    pos: usize,
}

impl<'a> WriteCursor<'a> {
    pub(crate) fn new(dest: &'a mut [u8]) -> WriteCursor<'a> {
        WriteCursor { dest, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn remaining(&self) -> usize {
        self.dest.len() - self.pos
    }

    pub(crate) fn seek_from_current(&mut self, count: usize) -> Result<(), InternalError> {
        if self.remaining() < count {
            return Err(InternalError::BadSeekOperation);
        }
        self.pos += count;
        Ok(())
    }

    pub(crate) fn seek_from_start(&mut self, count: usize) -> Result<(), InternalError> {
        if self.dest.len() < count {
            return Err(InternalError::BadSeekOperation);
        }
        self.pos = count;
        Ok(())
    }

    pub(crate) fn write_u8(&mut self, value: u8) -> Result<(), InternalError> {
        match self.dest.get_mut(self.pos) {
            Some(x) => {
                *x = value;
                self.pos += 1;
                Ok(())
            }
            None => Err(InternalError::InsufficientWriteSpace(1, 0)),
        }
    }

    pub(crate) fn write_u16_be(&mut self, value: u16) -> Result<(), InternalError> {
        if self.remaining() < 2 {
            // don't write any bytes if there's isn't space for the whole thing
            return Err(InternalError::InsufficientWriteSpace(2, self.remaining()));
        }
        let [upper, lower] = value.to_be_bytes();
        self.write_u8(upper)?;
        self.write_u8(lower)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_u16_writes_nothing_if_only_one_byte_remains() {
        let mut buffer = [0u8; 3];
        let mut cursor = WriteCursor::new(&mut buffer);
        cursor.write_u16_be(0x0102).unwrap();
        assert_eq!(
            cursor.write_u16_be(0x0304),
            Err(InternalError::InsufficientWriteSpace(2, 1))
        );
        assert_eq!(cursor.position(), 2);
        assert_eq!(buffer, [0x01, 0x02, 0x00]);
    }

    #[test]
    fn seek_outside_buffer_fails() {
        let mut buffer = [0u8; 2];
        let mut cursor = WriteCursor::new(&mut buffer);
        assert_eq!(cursor.seek_from_current(3), Err(InternalError::BadSeekOperation));
        assert_eq!(cursor.seek_from_start(3), Err(InternalError::BadSeekOperation));
        cursor.seek_from_start(2).unwrap();
        assert_eq!(cursor.remaining(), 0);
    }
}
