mod element;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::constants::MAX_DOCUMENT_BYTES;
use crate::error::Error;
use crate::index::db::MetadataDb;
use crate::options::ParseOptions;
use crate::parse::{parser, pool};
use crate::write::DocumentWriter;
use crate::Result;

pub use element::{Element, Items, Properties, Property};

/// Backing storage for the document's UTF-8 bytes.
///
/// `Rented` buffers come from the thread-local pool and go back zeroed on
/// dispose. `Shared` buffers are read-only and reference-counted; `Owned`
/// buffers belong to this document alone (clones always use `Owned`).
enum Backing {
    Rented(Vec<u8>),
    Owned(Vec<u8>),
    Shared(Arc<[u8]>),
    Released,
}

impl Backing {
    fn as_slice(&self) -> &[u8] {
        match self {
            Backing::Rented(bytes) | Backing::Owned(bytes) => bytes,
            Backing::Shared(bytes) => bytes,
            Backing::Released => &[],
        }
    }
}

/// A parsed, read-only KDL-ish document: the original UTF-8 bytes plus a
/// compact index with one fixed-width row per token. Navigation and value
/// extraction run against the index without re-parsing.
///
/// Documents produced by the `parse*` constructors are disposable: they rent
/// pooled buffers and return them (zeroed) from [`Document::dispose`] or on
/// drop. Documents produced by [`Element::clone_subtree`] own fresh buffers
/// and ignore `dispose`.
pub struct Document {
    bytes: Backing,
    db: MetadataDb,
    disposable: bool,
    disposed: AtomicBool,
}

impl Document {
    /// Parses a copy of `input` held in pool-rented storage.
    pub fn parse(input: &[u8], options: &ParseOptions) -> Result<Document> {
        check_input(input)?;
        let mut buffer = pool::take_text_buffer();
        buffer.extend_from_slice(input);
        match parser::build_index(&buffer, options) {
            Ok(db) => Ok(Self::assemble_backing(Backing::Rented(buffer), db, true)),
            Err(err) => {
                pool::put_text_buffer(buffer);
                Err(err)
            }
        }
    }

    /// Parses a copy of `input`, skipping the UTF-8 scan the `&str` type
    /// already guarantees.
    pub fn parse_str(input: &str, options: &ParseOptions) -> Result<Document> {
        if input.len() > MAX_DOCUMENT_BYTES {
            return Err(Error::DocumentTooLarge { len: input.len() });
        }
        let mut buffer = pool::take_text_buffer();
        buffer.extend_from_slice(input.as_bytes());
        match parser::build_index(&buffer, options) {
            Ok(db) => Ok(Self::assemble_backing(Backing::Rented(buffer), db, true)),
            Err(err) => {
                pool::put_text_buffer(buffer);
                Err(err)
            }
        }
    }

    /// Parses `input` in place, taking ownership of the buffer.
    pub fn parse_owned(input: Vec<u8>, options: &ParseOptions) -> Result<Document> {
        check_input(&input)?;
        let db = parser::build_index(&input, options)?;
        Ok(Self::assemble_backing(Backing::Owned(input), db, true))
    }

    /// Parses a shared read-only buffer without copying it. The document
    /// holds a reference; `dispose` releases only the index.
    pub fn parse_shared(input: Arc<[u8]>, options: &ParseOptions) -> Result<Document> {
        check_input(&input)?;
        let db = parser::build_index(&input, options)?;
        Ok(Self::assemble_backing(Backing::Shared(input), db, true))
    }

    pub(crate) fn assemble(bytes_vec: Vec<u8>, db: MetadataDb, disposable: bool) -> Document {
        Self::assemble_backing(Backing::Owned(bytes_vec), db, disposable)
    }

    fn assemble_backing(bytes: Backing, db: MetadataDb, disposable: bool) -> Document {
        Document {
            bytes,
            db,
            disposable,
            disposed: AtomicBool::new(false),
        }
    }

    /// The element at the root of the document.
    pub fn root(&self) -> Result<Element<'_>> {
        self.ensure_alive()?;
        Ok(Element::at_row(self, 0))
    }

    /// Rewrites the whole document into `writer`.
    pub fn write_to<W: DocumentWriter + ?Sized>(&self, writer: &mut W) -> Result<()> {
        self.root()?.write_to(writer)
    }

    pub fn is_disposable(&self) -> bool {
        self.disposable
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Releases pooled buffers (zeroed over their used range) and renders the
    /// document inert. Idempotent; a no-op on non-disposable documents.
    pub fn dispose(&mut self) {
        if !self.disposable {
            return;
        }
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.release();
    }

    fn release(&mut self) {
        match std::mem::replace(&mut self.bytes, Backing::Released) {
            Backing::Rented(buffer) => pool::put_text_buffer(buffer),
            Backing::Owned(_) | Backing::Shared(_) | Backing::Released => {}
        }
        self.db.dispose();
    }

    pub(crate) fn ensure_alive(&self) -> Result<()> {
        if self.is_disposed() {
            Err(Error::Disposed)
        } else {
            Ok(())
        }
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        self.bytes.as_slice()
    }

    pub(crate) fn db(&self) -> &MetadataDb {
        &self.db
    }
}

impl Drop for Document {
    fn drop(&mut self) {
        if self.disposable && !self.disposed.swap(true, Ordering::AcqRel) {
            self.release();
        }
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("rows", &self.db.row_count())
            .field("bytes", &self.bytes().len())
            .field("disposable", &self.disposable)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

fn check_input(input: &[u8]) -> Result<()> {
    if input.len() > MAX_DOCUMENT_BYTES {
        return Err(Error::DocumentTooLarge { len: input.len() });
    }
    std::str::from_utf8(input).map_err(|err| Error::InvalidUtf8 {
        offset: err.valid_up_to(),
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::row::TokenKind;

    #[rstest::rstest]
    fn test_parse_entry_points_agree() {
        let text = r#"{"a":[1,2]}"#;
        let options = ParseOptions::default();
        let from_bytes = Document::parse(text.as_bytes(), &options).unwrap();
        let from_str = Document::parse_str(text, &options).unwrap();
        let owned = Document::parse_owned(text.as_bytes().to_vec(), &options).unwrap();
        let shared = Document::parse_shared(Arc::from(text.as_bytes()), &options).unwrap();

        for doc in [&from_bytes, &from_str, &owned, &shared] {
            assert_eq!(doc.root().unwrap().kind().unwrap(), TokenKind::StartObject);
            assert_eq!(doc.db().row_count(), 7);
        }
    }

    #[rstest::rstest]
    fn test_invalid_utf8_rejected() {
        let err = Document::parse(b"\"\xff\"", &ParseOptions::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidUtf8 { .. }));
    }

    #[rstest::rstest]
    fn test_dispose_makes_document_inert() {
        let mut doc = Document::parse(b"[1]", &ParseOptions::default()).unwrap();
        assert!(doc.is_disposable());
        doc.dispose();
        assert!(doc.is_disposed());
        assert!(matches!(doc.root(), Err(Error::Disposed)));
        doc.dispose();
        assert!(doc.is_disposed());
    }

    #[rstest::rstest]
    fn test_parse_failure_returns_buffers() {
        assert!(Document::parse(b"[1,", &ParseOptions::default()).is_err());
        // The pool must still hand out a clean buffer afterwards.
        let doc = Document::parse(b"[2]", &ParseOptions::default()).unwrap();
        assert_eq!(
            doc.root().unwrap().array_element(0).unwrap().raw_value(false).unwrap(),
            b"2"
        );
    }
}
