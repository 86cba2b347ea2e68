use crate::constants::UNKNOWN_SIZE;

/// Kind of a parsed token, one row each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum TokenKind {
    StartObject = 0,
    EndObject = 1,
    StartArray = 2,
    EndArray = 3,
    PropertyName = 4,
    String = 5,
    Number = 6,
    True = 7,
    False = 8,
    Null = 9,
}

impl TokenKind {
    /// Simple tokens occupy exactly one row and never need back-patching.
    pub fn is_simple(self) -> bool {
        !matches!(
            self,
            TokenKind::StartObject
                | TokenKind::EndObject
                | TokenKind::StartArray
                | TokenKind::EndArray
                | TokenKind::PropertyName
        )
    }

    pub(crate) fn from_tag(tag: u32) -> TokenKind {
        match tag {
            0 => TokenKind::StartObject,
            1 => TokenKind::EndObject,
            2 => TokenKind::StartArray,
            3 => TokenKind::EndArray,
            4 => TokenKind::PropertyName,
            5 => TokenKind::String,
            6 => TokenKind::Number,
            7 => TokenKind::True,
            8 => TokenKind::False,
            9 => TokenKind::Null,
            _ => unreachable!("corrupt row kind tag"),
        }
    }
}

/// One decoded index entry: three 32-bit words.
///
/// Word 0 is the payload's byte offset into the document buffer. Word 1 is
/// the payload length for simple tokens, the child count for `Start*` rows
/// (or [`UNKNOWN_SIZE`] while the container is open), and the closing-marker
/// length for `End*` rows. Word 2 packs `has_complex_children` in bit 31,
/// a 4-bit kind tag in bits 30..27, and `number_of_rows` in bits 26..0.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DbRow {
    location: u32,
    size_or_length: i32,
    packed: u32,
}

impl DbRow {
    pub(crate) const COMPLEX_FLAG: u32 = 0x8000_0000;
    pub(crate) const KIND_SHIFT: u32 = 27;
    pub(crate) const KIND_MASK: u32 = 0xF;
    pub(crate) const ROWS_MASK: u32 = (1 << Self::KIND_SHIFT) - 1;

    pub(crate) fn from_words(location: u32, size_or_length: i32, packed: u32) -> Self {
        Self {
            location,
            size_or_length,
            packed,
        }
    }

    /// The row count is masked to its field width; callers that may exceed
    /// it must reject first (`MetadataDb::set_number_of_rows` does).
    pub(crate) fn pack(kind: TokenKind, number_of_rows: u32, complex: bool) -> u32 {
        debug_assert!(number_of_rows <= Self::ROWS_MASK);
        let mut packed = ((kind as u32) << Self::KIND_SHIFT) | (number_of_rows & Self::ROWS_MASK);
        if complex {
            packed |= Self::COMPLEX_FLAG;
        }
        packed
    }

    pub(crate) fn location(&self) -> usize {
        self.location as usize
    }

    pub(crate) fn size_or_length(&self) -> i32 {
        self.size_or_length
    }

    /// Payload length in bytes. Only meaningful for simple tokens,
    /// property names, and `End*` markers.
    pub(crate) fn length(&self) -> usize {
        debug_assert!(self.size_or_length >= 0);
        self.size_or_length as usize
    }

    pub(crate) fn is_unknown_size(&self) -> bool {
        self.size_or_length == UNKNOWN_SIZE
    }

    pub(crate) fn kind(&self) -> TokenKind {
        TokenKind::from_tag((self.packed >> Self::KIND_SHIFT) & Self::KIND_MASK)
    }

    pub(crate) fn number_of_rows(&self) -> usize {
        (self.packed & Self::ROWS_MASK) as usize
    }

    pub(crate) fn has_complex_children(&self) -> bool {
        self.packed & Self::COMPLEX_FLAG != 0
    }

    pub(crate) fn is_simple_value(&self) -> bool {
        self.kind().is_simple()
    }
}
