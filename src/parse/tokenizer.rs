use memchr::{memchr, memchr2};

use crate::error::Error;
use crate::index::row::TokenKind;
use crate::options::{CommentHandling, ParseOptions};
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    RootValue,
    Value,
    ValueOrArrayEnd,
    Name,
    NameOrObjectEnd,
    Colon,
    CommaOrEnd,
    Done,
}

/// Streaming tokenizer over a complete UTF-8 buffer.
///
/// `read` advances to the next structural token and returns `true`, or
/// `false` once the single root value and any trailing trivia have been
/// consumed. After a successful read the accessors describe the token:
/// `token_start` is the byte offset of its first structural byte (the
/// opening quote for strings), `value_len` the payload length between the
/// quotes for strings and property names (one byte for container markers),
/// `is_in_array` whether the enclosing open container is an array, and
/// `value_escaped` whether the payload contains at least one backslash.
///
/// The grammar is the JSON token stream; `//` and `/* */` comments are the
/// KDL-ish extension, consumed between tokens only when comment handling is
/// `Skip`. `Allow` is rejected at construction.
pub(crate) struct Tokenizer<'a> {
    input: &'a [u8],
    pos: usize,
    expect: Expect,
    containers: Vec<bool>,
    comment_handling: CommentHandling,
    max_depth: usize,

    kind: TokenKind,
    token_start: usize,
    value_len: usize,
    value_escaped: bool,
    in_array: bool,
}

impl<'a> Tokenizer<'a> {
    pub(crate) fn new(input: &'a [u8], options: &ParseOptions) -> Result<Self> {
        if options.comment_handling == CommentHandling::Allow {
            return Err(Error::unsupported("comment handling \"allow\""));
        }
        Ok(Self {
            input,
            pos: 0,
            expect: Expect::RootValue,
            containers: Vec::new(),
            comment_handling: options.comment_handling,
            max_depth: options.max_depth,
            kind: TokenKind::Null,
            token_start: 0,
            value_len: 0,
            value_escaped: false,
            in_array: false,
        })
    }

    pub(crate) fn kind(&self) -> TokenKind {
        self.kind
    }

    pub(crate) fn token_start(&self) -> usize {
        self.token_start
    }

    pub(crate) fn value_len(&self) -> usize {
        self.value_len
    }

    pub(crate) fn value_escaped(&self) -> bool {
        self.value_escaped
    }

    pub(crate) fn is_in_array(&self) -> bool {
        self.in_array
    }

    pub(crate) fn bytes_consumed(&self) -> usize {
        self.pos
    }

    pub(crate) fn read(&mut self) -> Result<bool> {
        loop {
            self.skip_trivia()?;

            if self.expect == Expect::Done {
                return if self.pos < self.input.len() {
                    Err(Error::parse(
                        self.pos,
                        "unexpected content after the root value",
                    ))
                } else {
                    Ok(false)
                };
            }

            let Some(byte) = self.at(self.pos) else {
                return Err(Error::parse(self.pos, "unexpected end of input"));
            };

            match self.expect {
                Expect::RootValue | Expect::Value => {
                    self.scan_value(byte)?;
                    return Ok(true);
                }
                Expect::ValueOrArrayEnd => {
                    if byte == b']' {
                        self.close_container(TokenKind::EndArray);
                    } else {
                        self.scan_value(byte)?;
                    }
                    return Ok(true);
                }
                Expect::NameOrObjectEnd => {
                    if byte == b'}' {
                        self.close_container(TokenKind::EndObject);
                    } else {
                        self.scan_name(byte)?;
                    }
                    return Ok(true);
                }
                Expect::Name => {
                    self.scan_name(byte)?;
                    return Ok(true);
                }
                Expect::Colon => {
                    if byte != b':' {
                        return Err(Error::parse(self.pos, "expected ':' after a property name"));
                    }
                    self.pos += 1;
                    self.expect = Expect::Value;
                }
                Expect::CommaOrEnd => {
                    let in_array = self.containers.last().copied().unwrap_or(false);
                    match byte {
                        b',' => {
                            self.pos += 1;
                            self.expect = if in_array { Expect::Value } else { Expect::Name };
                        }
                        b']' if in_array => {
                            self.close_container(TokenKind::EndArray);
                            return Ok(true);
                        }
                        b'}' if !in_array => {
                            self.close_container(TokenKind::EndObject);
                            return Ok(true);
                        }
                        _ => {
                            return Err(Error::parse(
                                self.pos,
                                "expected ',' or a closing bracket",
                            ));
                        }
                    }
                }
                Expect::Done => unreachable!("handled above"),
            }
        }
    }

    #[inline]
    fn at(&self, index: usize) -> Option<u8> {
        self.input.get(index).copied()
    }

    fn scan_value(&mut self, byte: u8) -> Result<()> {
        self.in_array = self.containers.last().copied().unwrap_or(false);
        match byte {
            b'{' => self.open_container(TokenKind::StartObject),
            b'[' => self.open_container(TokenKind::StartArray),
            b'"' => {
                self.scan_string(TokenKind::String)?;
                self.after_value();
                Ok(())
            }
            b't' => {
                self.scan_literal(b"true", TokenKind::True)?;
                self.after_value();
                Ok(())
            }
            b'f' => {
                self.scan_literal(b"false", TokenKind::False)?;
                self.after_value();
                Ok(())
            }
            b'n' => {
                self.scan_literal(b"null", TokenKind::Null)?;
                self.after_value();
                Ok(())
            }
            b'-' | b'0'..=b'9' => {
                self.scan_number()?;
                self.after_value();
                Ok(())
            }
            _ => Err(Error::parse(self.pos, "expected a value")),
        }
    }

    fn scan_name(&mut self, byte: u8) -> Result<()> {
        if byte != b'"' {
            return Err(Error::parse(self.pos, "expected a quoted property name"));
        }
        self.in_array = false;
        self.scan_string(TokenKind::PropertyName)?;
        self.expect = Expect::Colon;
        Ok(())
    }

    fn open_container(&mut self, kind: TokenKind) -> Result<()> {
        if self.containers.len() >= self.max_depth {
            return Err(Error::parse(self.pos, "maximum nesting depth exceeded"));
        }
        self.kind = kind;
        self.token_start = self.pos;
        self.value_len = 1;
        self.value_escaped = false;
        self.pos += 1;
        let is_array = kind == TokenKind::StartArray;
        self.containers.push(is_array);
        self.expect = if is_array {
            Expect::ValueOrArrayEnd
        } else {
            Expect::NameOrObjectEnd
        };
        Ok(())
    }

    fn close_container(&mut self, kind: TokenKind) {
        self.kind = kind;
        self.token_start = self.pos;
        self.value_len = 1;
        self.value_escaped = false;
        self.pos += 1;
        self.containers.pop();
        self.in_array = self.containers.last().copied().unwrap_or(false);
        self.after_value();
    }

    fn after_value(&mut self) {
        self.expect = if self.containers.is_empty() {
            Expect::Done
        } else {
            Expect::CommaOrEnd
        };
    }

    fn scan_string(&mut self, kind: TokenKind) -> Result<()> {
        let start = self.pos;
        let mut idx = start + 1;
        let mut escaped = false;
        loop {
            let Some(found) = memchr2(b'"', b'\\', &self.input[idx..]) else {
                return Err(Error::parse(start, "unterminated string"));
            };
            let stop = idx + found;
            if let Some(control) = self.input[idx..stop].iter().position(|&b| b < 0x20) {
                return Err(Error::parse(
                    idx + control,
                    "unescaped control character in string",
                ));
            }
            if self.input[stop] == b'"' {
                self.kind = kind;
                self.token_start = start;
                self.value_len = stop - (start + 1);
                self.value_escaped = escaped;
                self.pos = stop + 1;
                return Ok(());
            }
            escaped = true;
            idx = self.check_escape(stop)?;
        }
    }

    /// Validates the escape sequence starting at `backslash` and returns the
    /// offset of the first byte after it.
    fn check_escape(&self, backslash: usize) -> Result<usize> {
        let Some(code) = self.at(backslash + 1) else {
            return Err(Error::parse(backslash, "unterminated escape sequence"));
        };
        match code {
            b'"' | b'\\' | b'/' | b'b' | b'f' | b'n' | b'r' | b't' => Ok(backslash + 2),
            b'u' => {
                let unit = self.check_hex4(backslash + 2)?;
                if (0xD800..=0xDBFF).contains(&unit) {
                    if self.at(backslash + 6) == Some(b'\\') && self.at(backslash + 7) == Some(b'u')
                    {
                        let low = self.check_hex4(backslash + 8)?;
                        if (0xDC00..=0xDFFF).contains(&low) {
                            return Ok(backslash + 12);
                        }
                    }
                    Err(Error::parse(backslash, "unpaired surrogate escape"))
                } else if (0xDC00..=0xDFFF).contains(&unit) {
                    Err(Error::parse(backslash, "unpaired surrogate escape"))
                } else {
                    Ok(backslash + 6)
                }
            }
            _ => Err(Error::parse(backslash, "invalid escape sequence")),
        }
    }

    fn check_hex4(&self, at: usize) -> Result<u32> {
        let slice = self
            .input
            .get(at..at + 4)
            .ok_or_else(|| Error::parse(at, "truncated \\u escape"))?;
        let mut unit = 0u32;
        for &byte in slice {
            let digit = match byte {
                b'0'..=b'9' => byte - b'0',
                b'a'..=b'f' => byte - b'a' + 10,
                b'A'..=b'F' => byte - b'A' + 10,
                _ => return Err(Error::parse(at, "invalid \\u escape digit")),
            };
            unit = (unit << 4) | u32::from(digit);
        }
        Ok(unit)
    }

    fn scan_number(&mut self) -> Result<()> {
        let start = self.pos;
        let mut idx = start;
        if self.at(idx) == Some(b'-') {
            idx += 1;
        }
        match self.at(idx) {
            Some(b'0') => idx += 1,
            Some(b'1'..=b'9') => {
                idx += 1;
                while matches!(self.at(idx), Some(b'0'..=b'9')) {
                    idx += 1;
                }
            }
            _ => return Err(Error::parse(idx, "invalid number")),
        }
        if self.at(idx) == Some(b'.') {
            idx += 1;
            if !matches!(self.at(idx), Some(b'0'..=b'9')) {
                return Err(Error::parse(idx, "invalid number"));
            }
            while matches!(self.at(idx), Some(b'0'..=b'9')) {
                idx += 1;
            }
        }
        if matches!(self.at(idx), Some(b'e' | b'E')) {
            idx += 1;
            if matches!(self.at(idx), Some(b'+' | b'-')) {
                idx += 1;
            }
            if !matches!(self.at(idx), Some(b'0'..=b'9')) {
                return Err(Error::parse(idx, "invalid number"));
            }
            while matches!(self.at(idx), Some(b'0'..=b'9')) {
                idx += 1;
            }
        }
        self.kind = TokenKind::Number;
        self.token_start = start;
        self.value_len = idx - start;
        self.value_escaped = false;
        self.pos = idx;
        Ok(())
    }

    fn scan_literal(&mut self, literal: &'static [u8], kind: TokenKind) -> Result<()> {
        let end = self.pos + literal.len();
        if self.input.get(self.pos..end) != Some(literal) {
            return Err(Error::parse(self.pos, "invalid literal"));
        }
        self.kind = kind;
        self.token_start = self.pos;
        self.value_len = literal.len();
        self.value_escaped = false;
        self.pos = end;
        Ok(())
    }

    fn skip_trivia(&mut self) -> Result<()> {
        loop {
            while matches!(self.at(self.pos), Some(b' ' | b'\t' | b'\n' | b'\r')) {
                self.pos += 1;
            }
            if self.at(self.pos) != Some(b'/') {
                return Ok(());
            }
            match self.comment_handling {
                CommentHandling::Disallow => {
                    return Err(Error::parse(self.pos, "comments are not allowed"));
                }
                CommentHandling::Skip => self.skip_comment()?,
                CommentHandling::Allow => unreachable!("rejected at construction"),
            }
        }
    }

    fn skip_comment(&mut self) -> Result<()> {
        match self.at(self.pos + 1) {
            Some(b'/') => {
                match memchr(b'\n', &self.input[self.pos + 2..]) {
                    Some(found) => self.pos += 2 + found + 1,
                    None => self.pos = self.input.len(),
                }
                Ok(())
            }
            Some(b'*') => {
                let mut idx = self.pos + 2;
                loop {
                    match memchr(b'*', &self.input[idx..]) {
                        Some(found) => {
                            let star = idx + found;
                            if self.at(star + 1) == Some(b'/') {
                                self.pos = star + 2;
                                return Ok(());
                            }
                            idx = star + 1;
                        }
                        None => {
                            return Err(Error::parse(self.pos, "unterminated block comment"));
                        }
                    }
                }
            }
            _ => Err(Error::parse(self.pos, "invalid comment")),
        }
    }
}
