use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use chrono::{DateTime, FixedOffset, Utc};
use uuid::Uuid;

use crate::constants::{GUID_BYTES, MAX_DATETIME_BYTES, MIN_DATETIME_BYTES, ROW_SIZE};
use crate::document::Document;
use crate::error::Error;
use crate::index::row::{DbRow, TokenKind};
use crate::text::{self, Scratch};
use crate::write::DocumentWriter;
use crate::Result;

/// A non-owning cursor into a parsed document, identified by the byte offset
/// of its index row. Elements are cheap to copy and never hold decoded
/// payloads; every accessor reads the row and slices the original buffer.
#[derive(Clone, Copy)]
pub struct Element<'d> {
    doc: &'d Document,
    index: usize,
}

impl<'d> Element<'d> {
    pub(crate) fn at_row(doc: &'d Document, index: usize) -> Self {
        Self { doc, index }
    }

    fn row(&self) -> DbRow {
        self.doc.db().get(self.index)
    }

    pub fn kind(&self) -> Result<TokenKind> {
        self.doc.ensure_alive()?;
        Ok(self.row().kind())
    }

    /// Number of elements in this array.
    pub fn array_len(&self) -> Result<usize> {
        self.doc.ensure_alive()?;
        let row = self.row();
        match row.kind() {
            TokenKind::StartArray => Ok(row.size_or_length() as usize),
            actual => Err(Error::wrong_kind("an array", actual)),
        }
    }

    /// Number of properties in this object.
    pub fn property_count(&self) -> Result<usize> {
        self.doc.ensure_alive()?;
        let row = self.row();
        match row.kind() {
            TokenKind::StartObject => Ok(row.size_or_length() as usize),
            actual => Err(Error::wrong_kind("an object", actual)),
        }
    }

    /// The `index`-th element of this array.
    ///
    /// When every child is a single-row simple value the answer is one
    /// multiplication away; otherwise the children are walked, skipping each
    /// container child by its row count.
    pub fn array_element(&self, index: usize) -> Result<Element<'d>> {
        let len = self.array_len()?;
        if index >= len {
            return Err(Error::index_out_of_range(index, len));
        }
        let row = self.row();
        if !row.has_complex_children() {
            return Ok(Element::at_row(self.doc, self.index + (index + 1) * ROW_SIZE));
        }
        let end = self.end_index(false)?;
        let mut visited = 0;
        let mut offset = self.index + ROW_SIZE;
        while offset < end {
            if visited == index {
                return Ok(Element::at_row(self.doc, offset));
            }
            visited += 1;
            let child = self.doc.db().get(offset);
            offset += ROW_SIZE;
            if !child.is_simple_value() {
                offset += child.number_of_rows() * ROW_SIZE;
            }
        }
        Err(Error::index_out_of_range(index, len))
    }

    /// Iterator over this array's elements.
    pub fn items(&self) -> Result<Items<'d>> {
        let remaining = self.array_len()?;
        Ok(Items {
            doc: self.doc,
            offset: self.index + ROW_SIZE,
            remaining,
        })
    }

    /// Iterator over this object's properties, in document order.
    pub fn properties(&self) -> Result<Properties<'d>> {
        let remaining = self.property_count()?;
        Ok(Properties {
            doc: self.doc,
            offset: self.index + ROW_SIZE,
            remaining,
        })
    }

    /// The `index`-th property of this object, in document order.
    pub fn get_property(&self, index: usize) -> Result<Property<'d>> {
        let count = self.property_count()?;
        self.properties()?
            .nth(index)
            .ok_or_else(|| Error::index_out_of_range(index, count))
    }

    /// The value of the property named `name`, if present. The comparison
    /// runs against the raw name bytes and unescapes lazily, so no
    /// allocation happens for escape-free names.
    pub fn get_property_value(&self, name: &str) -> Result<Option<Element<'d>>> {
        for property in self.properties()? {
            if property.name_equals(name)? {
                return Ok(Some(property.value));
            }
        }
        Ok(None)
    }

    /// Byte offset one past this element's payload rows. For containers the
    /// result lands on the matching `End*` row, or one past it with
    /// `include_end`.
    pub(crate) fn end_index(&self, include_end: bool) -> Result<usize> {
        self.doc.ensure_alive()?;
        let row = self.row();
        if row.is_simple_value() || row.kind() == TokenKind::PropertyName {
            return Ok(self.index + ROW_SIZE);
        }
        let mut end = self.index + row.number_of_rows() * ROW_SIZE;
        if include_end {
            end += ROW_SIZE;
        }
        Ok(end)
    }

    fn raw_span(&self, include_quotes: bool) -> Result<(usize, usize)> {
        let row = self.row();
        match row.kind() {
            TokenKind::StartObject | TokenKind::StartArray => {
                let end_row = self.doc.db().get(self.end_index(false)?);
                Ok((row.location(), end_row.location() + end_row.length()))
            }
            TokenKind::String | TokenKind::PropertyName if include_quotes => {
                Ok((row.location() - 1, row.location() + row.length() + 1))
            }
            _ => Ok((row.location(), row.location() + row.length())),
        }
    }

    /// The slice of the original buffer this element spans. For strings,
    /// `include_quotes` extends the span one byte each side to cover the
    /// quotes.
    pub fn raw_value(&self, include_quotes: bool) -> Result<&'d [u8]> {
        self.doc.ensure_alive()?;
        let (start, end) = self.raw_span(include_quotes)?;
        Ok(&self.doc.bytes()[start..end])
    }

    /// The raw span as text, quotes included for strings.
    pub fn raw_text(&self) -> Result<&'d str> {
        as_utf8(self.raw_value(true)?)
    }

    fn payload(&self) -> &'d [u8] {
        let row = self.row();
        &self.doc.bytes()[row.location()..row.location() + row.length()]
    }

    /// Decoded text of a `String` (or property name) element; `None` for
    /// `Null`. Escape-free payloads are copied verbatim; escaped ones are
    /// unescaped through a scratch buffer.
    pub fn get_string(&self) -> Result<Option<String>> {
        self.doc.ensure_alive()?;
        let row = self.row();
        match row.kind() {
            TokenKind::Null => Ok(None),
            TokenKind::String | TokenKind::PropertyName => {
                let raw = self.payload();
                if row.has_complex_children() {
                    let mut scratch = Scratch::new();
                    let decoded = text::unescape(raw, &mut scratch)?;
                    Ok(Some(as_utf8(decoded)?.to_owned()))
                } else {
                    Ok(Some(as_utf8(raw)?.to_owned()))
                }
            }
            actual => Err(Error::wrong_kind("a string", actual)),
        }
    }

    /// Zero-allocation comparison of this string element against `text`,
    /// unescaping the stored payload lazily when needed.
    pub fn value_equals(&self, text: &str) -> Result<bool> {
        self.text_equals(text.as_bytes(), false, true)
    }

    /// Compares the stored segment at this row (or, for `is_property_name`,
    /// the name row immediately before it) against `other`.
    pub(crate) fn text_equals(
        &self,
        other: &[u8],
        is_property_name: bool,
        should_unescape: bool,
    ) -> Result<bool> {
        self.doc.ensure_alive()?;
        let index = if is_property_name {
            self.index - ROW_SIZE
        } else {
            self.index
        };
        let row = self.doc.db().get(index);
        match row.kind() {
            TokenKind::String | TokenKind::PropertyName => {}
            actual => return Err(Error::wrong_kind("a string", actual)),
        }
        let segment = &self.doc.bytes()[row.location()..row.location() + row.length()];
        if row.has_complex_children() && should_unescape {
            Ok(text::unescaped_equals(segment, other))
        } else {
            Ok(segment == other)
        }
    }

    /// `true` for a `True` element, `false` for a `False` one.
    pub fn as_bool(&self) -> Result<bool> {
        self.doc.ensure_alive()?;
        match self.row().kind() {
            TokenKind::True => Ok(true),
            TokenKind::False => Ok(false),
            actual => Err(Error::wrong_kind("a boolean", actual)),
        }
    }

    /// Parses this number element as `T`. Returns `Ok(None)` when the
    /// payload does not convert (including trailing bytes the target type
    /// would not consume).
    pub fn try_get_number<T: FromStr>(&self) -> Result<Option<T>> {
        self.doc.ensure_alive()?;
        let row = self.row();
        if row.kind() != TokenKind::Number {
            return Err(Error::wrong_kind("a number", row.kind()));
        }
        match std::str::from_utf8(self.payload()) {
            Ok(payload) => Ok(payload.parse().ok()),
            Err(_) => Ok(None),
        }
    }

    /// RFC 3339 date-time with its original offset. Length-gated before the
    /// parser runs.
    pub fn try_get_datetime(&self) -> Result<Option<DateTime<FixedOffset>>> {
        self.with_unescaped_str(|payload| {
            if !(MIN_DATETIME_BYTES..=MAX_DATETIME_BYTES).contains(&payload.len()) {
                return None;
            }
            DateTime::parse_from_rfc3339(payload).ok()
        })
    }

    /// RFC 3339 date-time normalized to UTC.
    pub fn try_get_datetime_utc(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .try_get_datetime()?
            .map(|datetime| datetime.with_timezone(&Utc)))
    }

    /// GUID in the 36-byte hyphenated spelling; every other spelling fails.
    pub fn try_get_uuid(&self) -> Result<Option<Uuid>> {
        self.with_unescaped_str(|payload| {
            if payload.len() != GUID_BYTES {
                return None;
            }
            Uuid::try_parse(payload).ok()
        })
    }

    /// Payload decoded as standard-alphabet base64.
    pub fn try_get_bytes_from_base64(&self) -> Result<Option<Vec<u8>>> {
        self.with_unescaped_str(|payload| BASE64_STANDARD.decode(payload).ok())
    }

    fn with_unescaped_str<R>(&self, convert: impl FnOnce(&str) -> Option<R>) -> Result<Option<R>> {
        self.doc.ensure_alive()?;
        let row = self.row();
        if row.kind() != TokenKind::String {
            return Err(Error::wrong_kind("a string", row.kind()));
        }
        let raw = self.payload();
        if row.has_complex_children() {
            let mut scratch = Scratch::new();
            let decoded = text::unescape(raw, &mut scratch)?;
            match std::str::from_utf8(decoded) {
                Ok(payload) => Ok(convert(payload)),
                Err(_) => Ok(None),
            }
        } else {
            match std::str::from_utf8(raw) {
                Ok(payload) => Ok(convert(payload)),
                Err(_) => Ok(None),
            }
        }
    }

    /// Copies this subtree into a new, independent, non-disposable document.
    /// The new buffer holds exactly the subtree's raw span (quotes included)
    /// and the new index starts at row zero with rebased locations.
    pub fn clone_subtree(&self) -> Result<Document> {
        self.doc.ensure_alive()?;
        let (start, end) = self.raw_span(true)?;
        let buffer = self.doc.bytes()[start..end].to_vec();
        let end_index = self.end_index(true)?;
        let db = self.doc.db().copy_segment(self.index, end_index, start);
        Ok(Document::assemble(buffer, db, false))
    }

    /// Rewrites this subtree as structural calls into `writer`. Rows are
    /// emitted in document order; nested containers nest correctly because
    /// the parser produced their rows in order.
    pub fn write_to<W: DocumentWriter + ?Sized>(&self, writer: &mut W) -> Result<()> {
        self.doc.ensure_alive()?;
        let row = self.row();
        match row.kind() {
            TokenKind::StartObject | TokenKind::StartArray => {
                let end = self.end_index(true)?;
                let mut offset = self.index;
                while offset < end {
                    write_row(self.doc, offset, writer)?;
                    offset += ROW_SIZE;
                }
                Ok(())
            }
            kind if kind.is_simple() => write_row(self.doc, self.index, writer),
            actual => Err(Error::wrong_kind("a value", actual)),
        }
    }
}

impl std::fmt::Debug for Element<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Element")
            .field("row", &(self.index / ROW_SIZE))
            .finish()
    }
}

fn write_row<W: DocumentWriter + ?Sized>(
    doc: &Document,
    offset: usize,
    writer: &mut W,
) -> Result<()> {
    let row = doc.db().get(offset);
    match row.kind() {
        TokenKind::StartObject => writer.write_start_object(),
        TokenKind::EndObject => writer.write_end_object(),
        TokenKind::StartArray => writer.write_start_array(),
        TokenKind::EndArray => writer.write_end_array(),
        TokenKind::PropertyName => {
            let payload = &doc.bytes()[row.location()..row.location() + row.length()];
            if row.has_complex_children() {
                let mut scratch = Scratch::new();
                let decoded = text::unescape(payload, &mut scratch)?;
                writer.write_property_name(decoded)
            } else {
                writer.write_property_name(payload)
            }
        }
        TokenKind::String => {
            let payload = &doc.bytes()[row.location()..row.location() + row.length()];
            if row.has_complex_children() {
                let mut scratch = Scratch::new();
                let decoded = text::unescape(payload, &mut scratch)?;
                writer.write_string_value(decoded)
            } else {
                writer.write_string_value(payload)
            }
        }
        TokenKind::Number => {
            let payload = &doc.bytes()[row.location()..row.location() + row.length()];
            writer.write_number_value(payload)
        }
        TokenKind::True => writer.write_bool_value(true),
        TokenKind::False => writer.write_bool_value(false),
        TokenKind::Null => writer.write_null_value(),
    }
}

fn as_utf8(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|err| Error::InvalidUtf8 {
        offset: err.valid_up_to(),
    })
}

/// One object property: the name row and the value row right after it.
#[derive(Clone, Copy, Debug)]
pub struct Property<'d> {
    pub name: Element<'d>,
    pub value: Element<'d>,
}

impl<'d> Property<'d> {
    /// Decoded property name.
    pub fn name_text(&self) -> Result<String> {
        Ok(self.name.get_string()?.unwrap_or_default())
    }

    /// Lazy comparison against the raw name bytes.
    pub fn name_equals(&self, name: &str) -> Result<bool> {
        self.value.text_equals(name.as_bytes(), true, true)
    }

    /// The raw span of the whole property, from the name's opening quote to
    /// the end of the value.
    pub fn raw_value(&self) -> Result<&'d [u8]> {
        let name_row = self.name.row();
        let start = name_row.location() - 1;
        let (_, end) = self.value.raw_span(true)?;
        Ok(&self.name.doc.bytes()[start..end])
    }
}

/// Iterator over array elements, skipping container children by row count.
pub struct Items<'d> {
    doc: &'d Document,
    offset: usize,
    remaining: usize,
}

impl<'d> Iterator for Items<'d> {
    type Item = Element<'d>;

    fn next(&mut self) -> Option<Element<'d>> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let element = Element::at_row(self.doc, self.offset);
        let row = self.doc.db().get(self.offset);
        let footprint = if row.is_simple_value() {
            1
        } else {
            row.number_of_rows() + 1
        };
        self.offset += footprint * ROW_SIZE;
        Some(element)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Items<'_> {}

/// Iterator over object properties.
pub struct Properties<'d> {
    doc: &'d Document,
    offset: usize,
    remaining: usize,
}

impl<'d> Iterator for Properties<'d> {
    type Item = Property<'d>;

    fn next(&mut self) -> Option<Property<'d>> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let name = Element::at_row(self.doc, self.offset);
        let value_offset = self.offset + ROW_SIZE;
        let value = Element::at_row(self.doc, value_offset);
        let value_row = self.doc.db().get(value_offset);
        let footprint = if value_row.is_simple_value() {
            1
        } else {
            value_row.number_of_rows() + 1
        };
        self.offset = value_offset + footprint * ROW_SIZE;
        Some(Property { name, value })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Properties<'_> {}
