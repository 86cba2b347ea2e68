use crate::constants::{ROW_SIZE, UNKNOWN_SIZE};
use crate::error::Error;
use crate::index::db::MetadataDb;
use crate::index::row::TokenKind;
use crate::index::stack::{ContainerStack, StackRow};
use crate::options::ParseOptions;
use crate::parse::tokenizer::Tokenizer;
use crate::Result;

/// Drives the tokenizer over the complete buffer and builds the metadata
/// database: one row per token, container rows back-patched on close.
///
/// Three counters carry the accounting. `item_count` counts direct children
/// of the open container. `rows_for_members` accumulates rows since the
/// current object opened and becomes its `number_of_rows`; `rows_for_values`
/// does the same for arrays and additionally feeds the complex-children
/// identity: a closing array whose `item_count + 1` differs from
/// `rows_for_values` had at least one container child. Object opens bump
/// `rows_for_values` while array opens bump `rows_for_members`; the
/// asymmetry is what makes the identity hold, so it must stay.
pub(crate) fn build_index(input: &[u8], options: &ParseOptions) -> Result<MetadataDb> {
    let mut tokenizer = Tokenizer::new(input, options)?;
    let mut db = MetadataDb::rented(input.len());
    let mut stack = ContainerStack::new();
    let mut item_count: usize = 0;
    let mut rows_for_values: usize = 0;
    let mut rows_for_members: usize = 0;

    while tokenizer.read()? {
        let kind = tokenizer.kind();
        let token_start = tokenizer.token_start();
        let value_len = tokenizer.value_len();
        match kind {
            TokenKind::StartObject => {
                if tokenizer.is_in_array() {
                    item_count += 1;
                }
                rows_for_values += 1;
                db.append(kind, token_start, UNKNOWN_SIZE)?;
                stack.push(StackRow {
                    saved_count: item_count,
                    saved_rows: rows_for_members + 1,
                });
                item_count = 0;
                rows_for_members = 0;
            }
            TokenKind::EndObject => {
                let start_index = db
                    .find_index_of_first_unset_size(TokenKind::StartObject)
                    .ok_or_else(|| Error::parse(token_start, "unmatched '}'"))?;
                rows_for_values += 1;
                rows_for_members += 1;
                db.set_length(start_index, item_count as i32);
                let end_index = db.len_bytes();
                db.append(kind, token_start, value_len as i32)?;
                db.set_number_of_rows(start_index, rows_for_members)?;
                db.set_number_of_rows(end_index, rows_for_members)?;
                let frame = stack.pop();
                item_count = frame.saved_count;
                rows_for_members += frame.saved_rows;
            }
            TokenKind::StartArray => {
                if tokenizer.is_in_array() {
                    item_count += 1;
                }
                rows_for_members += 1;
                db.append(kind, token_start, UNKNOWN_SIZE)?;
                stack.push(StackRow {
                    saved_count: item_count,
                    saved_rows: rows_for_values + 1,
                });
                item_count = 0;
                rows_for_values = 0;
            }
            TokenKind::EndArray => {
                let start_index = db
                    .find_index_of_first_unset_size(TokenKind::StartArray)
                    .ok_or_else(|| Error::parse(token_start, "unmatched ']'"))?;
                rows_for_values += 1;
                rows_for_members += 1;
                db.set_length(start_index, item_count as i32);
                db.set_number_of_rows(start_index, rows_for_values)?;
                if item_count + 1 != rows_for_values {
                    db.set_has_complex_children(start_index);
                }
                let end_index = db.len_bytes();
                db.append(kind, token_start, value_len as i32)?;
                db.set_number_of_rows(end_index, rows_for_values)?;
                let frame = stack.pop();
                item_count = frame.saved_count;
                rows_for_values += frame.saved_rows;
            }
            TokenKind::PropertyName => {
                debug_assert!(!tokenizer.is_in_array());
                rows_for_values += 1;
                rows_for_members += 1;
                item_count += 1;
                db.append(kind, token_start + 1, value_len as i32)?;
                if tokenizer.value_escaped() {
                    db.set_has_complex_children(db.len_bytes() - ROW_SIZE);
                }
            }
            TokenKind::String => {
                rows_for_values += 1;
                rows_for_members += 1;
                if tokenizer.is_in_array() {
                    item_count += 1;
                }
                db.append(kind, token_start + 1, value_len as i32)?;
                if tokenizer.value_escaped() {
                    db.set_has_complex_children(db.len_bytes() - ROW_SIZE);
                }
            }
            TokenKind::Number | TokenKind::True | TokenKind::False | TokenKind::Null => {
                rows_for_values += 1;
                rows_for_members += 1;
                if tokenizer.is_in_array() {
                    item_count += 1;
                }
                db.append(kind, token_start, value_len as i32)?;
            }
        }
    }

    debug_assert_eq!(tokenizer.bytes_consumed(), input.len());
    debug_assert!(stack.is_empty());
    db.complete_allocations();
    Ok(db)
}
