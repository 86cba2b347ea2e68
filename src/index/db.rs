use crate::constants::{MAX_DATABASE_BYTES, ROW_SIZE};
use crate::error::Error;
use crate::index::row::{DbRow, TokenKind};
use crate::parse::pool;
use crate::Result;

/// Append-only store of fixed-width index rows in a contiguous little-endian
/// byte buffer. Rows are addressed by byte offset; row index and byte offset
/// convert by multiplying or dividing by `ROW_SIZE`.
///
/// Storage for parsed documents is rented from the thread-local pool and
/// returned (zeroed) on dispose or drop; segment copies own fresh buffers.
pub(crate) struct MetadataDb {
    data: Vec<u8>,
    pooled: bool,
}

impl MetadataDb {
    /// Rents pooled storage sized for roughly one row per two input bytes,
    /// the densest token stream the grammar allows.
    pub(crate) fn rented(input_len: usize) -> Self {
        let mut data = pool::take_row_buffer();
        data.reserve((input_len / 2 + 1) * ROW_SIZE);
        Self { data, pooled: true }
    }

    /// Total bytes in use; also the offset one past the last row.
    pub(crate) fn len_bytes(&self) -> usize {
        self.data.len()
    }

    pub(crate) fn row_count(&self) -> usize {
        self.data.len() / ROW_SIZE
    }

    pub(crate) fn append(&mut self, kind: TokenKind, location: usize, size_or_length: i32) -> Result<()> {
        if self.data.len() + ROW_SIZE > MAX_DATABASE_BYTES {
            return Err(Error::IndexTooLarge);
        }
        self.data.extend_from_slice(&(location as u32).to_le_bytes());
        self.data.extend_from_slice(&size_or_length.to_le_bytes());
        self.data
            .extend_from_slice(&DbRow::pack(kind, 1, false).to_le_bytes());
        Ok(())
    }

    pub(crate) fn get(&self, index: usize) -> DbRow {
        debug_assert!(index % ROW_SIZE == 0 && index + ROW_SIZE <= self.data.len());
        DbRow::from_words(
            read_u32(&self.data, index),
            read_u32(&self.data, index + 4) as i32,
            read_u32(&self.data, index + 8),
        )
    }

    pub(crate) fn set_length(&mut self, index: usize, value: i32) {
        write_u32(&mut self.data, index + 4, value as u32);
    }

    pub(crate) fn set_number_of_rows(&mut self, index: usize, number_of_rows: usize) -> Result<()> {
        if number_of_rows > DbRow::ROWS_MASK as usize {
            return Err(Error::IndexTooLarge);
        }
        let packed = read_u32(&self.data, index + 8);
        let packed = (packed & !DbRow::ROWS_MASK) | number_of_rows as u32;
        write_u32(&mut self.data, index + 8, packed);
        Ok(())
    }

    pub(crate) fn set_has_complex_children(&mut self, index: usize) {
        let packed = read_u32(&self.data, index + 8) | DbRow::COMPLEX_FLAG;
        write_u32(&mut self.data, index + 8, packed);
    }

    /// Byte offset of the most recent row of `kind` whose size word still
    /// holds the open-container sentinel. Scans backwards from the end.
    pub(crate) fn find_index_of_first_unset_size(&self, kind: TokenKind) -> Option<usize> {
        let mut offset = self.data.len();
        while offset >= ROW_SIZE {
            offset -= ROW_SIZE;
            let row = self.get(offset);
            if row.kind() == kind && row.is_unknown_size() {
                return Some(offset);
            }
        }
        None
    }

    /// Settles storage after the final token. Pooled buffers keep their
    /// capacity for the pool; owned copies shed unused tail capacity.
    pub(crate) fn complete_allocations(&mut self) {
        if !self.pooled {
            self.data.shrink_to_fit();
        }
    }

    /// New database holding rows `[start, end_exclusive)` of this one, with
    /// every location rebased so the copied subtree's buffer starts at zero.
    pub(crate) fn copy_segment(
        &self,
        start: usize,
        end_exclusive: usize,
        location_delta: usize,
    ) -> MetadataDb {
        debug_assert!(start <= end_exclusive && end_exclusive <= self.data.len());
        let mut data = self.data[start..end_exclusive].to_vec();
        let mut offset = 0;
        while offset < data.len() {
            let location = read_u32(&data, offset);
            debug_assert!(location as usize >= location_delta);
            write_u32(&mut data, offset, location - location_delta as u32);
            offset += ROW_SIZE;
        }
        MetadataDb {
            data,
            pooled: false,
        }
    }

    /// Returns pooled storage, zeroed over the used range. Idempotent.
    pub(crate) fn dispose(&mut self) {
        if self.pooled {
            self.pooled = false;
            pool::put_row_buffer(std::mem::take(&mut self.data));
        } else {
            self.data = Vec::new();
        }
    }
}

impl Drop for MetadataDb {
    fn drop(&mut self) {
        if self.pooled {
            self.pooled = false;
            pool::put_row_buffer(std::mem::take(&mut self.data));
        }
    }
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

fn write_u32(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::UNKNOWN_SIZE;

    #[rstest::rstest]
    fn test_append_and_get() {
        let mut db = MetadataDb::rented(16);
        db.append(TokenKind::StartObject, 0, UNKNOWN_SIZE).unwrap();
        db.append(TokenKind::PropertyName, 2, 1).unwrap();
        assert_eq!(db.row_count(), 2);

        let first = db.get(0);
        assert_eq!(first.kind(), TokenKind::StartObject);
        assert!(first.is_unknown_size());
        assert_eq!(first.number_of_rows(), 1);

        let second = db.get(ROW_SIZE);
        assert_eq!(second.kind(), TokenKind::PropertyName);
        assert_eq!(second.location(), 2);
        assert_eq!(second.length(), 1);
    }

    #[rstest::rstest]
    fn test_back_patching() {
        let mut db = MetadataDb::rented(16);
        db.append(TokenKind::StartArray, 0, UNKNOWN_SIZE).unwrap();
        db.set_length(0, 3);
        db.set_number_of_rows(0, 7).unwrap();
        db.set_has_complex_children(0);

        let row = db.get(0);
        assert_eq!(row.size_or_length(), 3);
        assert_eq!(row.number_of_rows(), 7);
        assert!(row.has_complex_children());
        assert_eq!(row.kind(), TokenKind::StartArray);
    }

    #[rstest::rstest]
    fn test_row_count_over_field_width_rejected() {
        let mut db = MetadataDb::rented(16);
        db.append(TokenKind::StartArray, 0, UNKNOWN_SIZE).unwrap();
        assert!(matches!(
            db.set_number_of_rows(0, DbRow::ROWS_MASK as usize + 1),
            Err(Error::IndexTooLarge)
        ));
        db.set_number_of_rows(0, DbRow::ROWS_MASK as usize).unwrap();
        let row = db.get(0);
        assert_eq!(row.number_of_rows(), DbRow::ROWS_MASK as usize);
        assert_eq!(row.kind(), TokenKind::StartArray);
        assert!(!row.has_complex_children());
    }

    #[rstest::rstest]
    fn test_find_most_recent_unset_row() {
        let mut db = MetadataDb::rented(64);
        db.append(TokenKind::StartArray, 0, UNKNOWN_SIZE).unwrap();
        db.append(TokenKind::StartArray, 1, UNKNOWN_SIZE).unwrap();
        db.append(TokenKind::Number, 2, 1).unwrap();
        assert_eq!(
            db.find_index_of_first_unset_size(TokenKind::StartArray),
            Some(ROW_SIZE)
        );
        db.set_length(ROW_SIZE, 1);
        assert_eq!(
            db.find_index_of_first_unset_size(TokenKind::StartArray),
            Some(0)
        );
        assert_eq!(db.find_index_of_first_unset_size(TokenKind::StartObject), None);
    }

    #[rstest::rstest]
    fn test_copy_segment_rebases_locations() {
        let mut db = MetadataDb::rented(64);
        db.append(TokenKind::StartArray, 10, 1).unwrap();
        db.append(TokenKind::Number, 11, 1).unwrap();
        db.append(TokenKind::EndArray, 12, 1).unwrap();

        let copy = db.copy_segment(0, 3 * ROW_SIZE, 10);
        assert_eq!(copy.row_count(), 3);
        assert_eq!(copy.get(0).location(), 0);
        assert_eq!(copy.get(ROW_SIZE).location(), 1);
        assert_eq!(copy.get(2 * ROW_SIZE).location(), 2);
    }

    #[rstest::rstest]
    fn test_dispose_is_idempotent() {
        let mut db = MetadataDb::rented(16);
        db.append(TokenKind::Null, 0, 4).unwrap();
        db.dispose();
        db.dispose();
        assert_eq!(db.len_bytes(), 0);
    }
}
