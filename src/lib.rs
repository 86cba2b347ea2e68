//! Read-only, memory-efficient document model for the KDL-ish data format.
//!
//! A [`Document`] owns the original UTF-8 bytes plus a compact side index
//! with one fixed 12-byte row per token. Parsing runs once; afterwards every
//! navigation or extraction query is answered from the index: O(1) random
//! access into escape-free arrays, an O(k) child walk otherwise, O(1) raw
//! span recovery, and string comparison against unescaped input without
//! allocating.
//!
//! # Examples
//!
//! Parse and navigate:
//!
//! ```rust
//! use kdlish::{Document, ParseOptions, TokenKind};
//!
//! let doc = Document::parse(br#"{"name":"Ada","scores":[1,2,3]}"#, &ParseOptions::default())?;
//! let root = doc.root()?;
//! assert_eq!(root.kind()?, TokenKind::StartObject);
//! assert_eq!(root.property_count()?, 2);
//!
//! let name = root.get_property_value("name")?.expect("name is present");
//! assert_eq!(name.get_string()?.as_deref(), Some("Ada"));
//!
//! let scores = root.get_property_value("scores")?.expect("scores is present");
//! assert_eq!(scores.array_len()?, 3);
//! assert_eq!(scores.array_element(2)?.try_get_number::<i32>()?, Some(3));
//! # Ok::<(), kdlish::Error>(())
//! ```
//!
//! Clone a subtree into an independent document:
//!
//! ```rust
//! use kdlish::{Document, ParseOptions};
//!
//! let mut doc = Document::parse(br#"[1,[2,3],4]"#, &ParseOptions::default())?;
//! let inner = doc.root()?.array_element(1)?.clone_subtree()?;
//! doc.dispose();
//!
//! assert_eq!(inner.root()?.array_len()?, 2);
//! assert_eq!(inner.root()?.array_element(0)?.try_get_number::<i64>()?, Some(2));
//! # Ok::<(), kdlish::Error>(())
//! ```
//!
//! Rewrite a subtree through the structural writer:
//!
//! ```rust
//! use kdlish::{Document, ParseOptions, TextWriter};
//!
//! let doc = Document::parse(br#"{ "a" : "x\ny" }"#, &ParseOptions::default())?;
//! let mut writer = TextWriter::new();
//! doc.write_to(&mut writer)?;
//! assert_eq!(writer.finish(), "{\"a\":\"x\\ny\"}");
//! # Ok::<(), kdlish::Error>(())
//! ```

mod constants;
mod document;
mod error;
mod index;
mod options;
mod parse;
mod text;
mod write;

pub use constants::DEFAULT_MAX_DEPTH;
pub use document::{Document, Element, Items, Properties, Property};
pub use error::Error;
pub use index::row::TokenKind;
pub use options::{CommentHandling, ParseOptions};
pub use write::{DocumentWriter, TextWriter};

pub type Result<T> = std::result::Result<T, Error>;
