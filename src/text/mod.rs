use memchr::memchr;
use smallvec::SmallVec;

use crate::constants::{MAX_ESCAPE_EXPANSION, UNESCAPE_STACK_BYTES};
use crate::error::Error;
use crate::Result;

/// Per-call unescape scratch. Payloads at or under the stack threshold never
/// allocate; the buffer is zeroed when the call unwinds on any path, since
/// decoded bytes may be sensitive.
pub(crate) struct Scratch(SmallVec<[u8; UNESCAPE_STACK_BYTES]>);

impl Scratch {
    pub(crate) fn new() -> Self {
        Self(SmallVec::new())
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        self.0.fill(0);
    }
}

/// Decodes the backslash escapes of `segment` into `scratch` and returns the
/// decoded bytes. `segment` is a string payload without its quotes.
pub(crate) fn unescape<'s>(segment: &[u8], scratch: &'s mut Scratch) -> Result<&'s [u8]> {
    let out = &mut scratch.0;
    out.clear();
    let mut idx = 0;
    while let Some(found) = memchr(b'\\', &segment[idx..]) {
        let backslash = idx + found;
        out.extend_from_slice(&segment[idx..backslash]);
        let code = *segment
            .get(backslash + 1)
            .ok_or_else(|| Error::parse(backslash, "unterminated escape sequence"))?;
        idx = match code {
            b'"' => {
                out.push(b'"');
                backslash + 2
            }
            b'\\' => {
                out.push(b'\\');
                backslash + 2
            }
            b'/' => {
                out.push(b'/');
                backslash + 2
            }
            b'b' => {
                out.push(0x08);
                backslash + 2
            }
            b'f' => {
                out.push(0x0C);
                backslash + 2
            }
            b'n' => {
                out.push(b'\n');
                backslash + 2
            }
            b'r' => {
                out.push(b'\r');
                backslash + 2
            }
            b't' => {
                out.push(b'\t');
                backslash + 2
            }
            b'u' => {
                let (ch, consumed) = decode_unicode_escape(segment, backslash)?;
                let mut buf = [0u8; 4];
                out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                backslash + consumed
            }
            _ => return Err(Error::parse(backslash, "invalid escape sequence")),
        };
    }
    out.extend_from_slice(&segment[idx..]);
    Ok(out.as_slice())
}

/// Compares an escaped payload against plain UTF-8 without materializing the
/// decoded form: the prefix before the first backslash is compared raw, then
/// escapes are decoded one at a time against the remainder.
pub(crate) fn unescaped_equals(segment: &[u8], other: &[u8]) -> bool {
    if other.len() > segment.len() {
        return false;
    }
    if other.len() < segment.len() / MAX_ESCAPE_EXPANSION {
        return false;
    }
    let Some(first) = memchr(b'\\', segment) else {
        return segment == other;
    };
    if other.len() < first || segment[..first] != other[..first] {
        return false;
    }
    compare_unescaped_tail(&segment[first..], &other[first..])
}

fn compare_unescaped_tail(mut segment: &[u8], mut other: &[u8]) -> bool {
    while !segment.is_empty() {
        if segment[0] == b'\\' {
            let Some(&code) = segment.get(1) else {
                return false;
            };
            let decoded: u8 = match code {
                b'"' => b'"',
                b'\\' => b'\\',
                b'/' => b'/',
                b'b' => 0x08,
                b'f' => 0x0C,
                b'n' => b'\n',
                b'r' => b'\r',
                b't' => b'\t',
                b'u' => {
                    let Ok((ch, consumed)) = decode_unicode_escape(segment, 0) else {
                        return false;
                    };
                    let mut buf = [0u8; 4];
                    let encoded = ch.encode_utf8(&mut buf).as_bytes();
                    if !other.starts_with(encoded) {
                        return false;
                    }
                    other = &other[encoded.len()..];
                    segment = &segment[consumed..];
                    continue;
                }
                _ => return false,
            };
            if other.first() != Some(&decoded) {
                return false;
            }
            other = &other[1..];
            segment = &segment[2..];
        } else {
            let run = memchr(b'\\', segment).unwrap_or(segment.len());
            if other.len() < run || segment[..run] != other[..run] {
                return false;
            }
            other = &other[run..];
            segment = &segment[run..];
        }
    }
    other.is_empty()
}

fn decode_unicode_escape(segment: &[u8], backslash: usize) -> Result<(char, usize)> {
    let unit = hex4(segment, backslash + 2)?;
    if (0xD800..=0xDBFF).contains(&unit) {
        if segment.get(backslash + 6) == Some(&b'\\') && segment.get(backslash + 7) == Some(&b'u') {
            let low = hex4(segment, backslash + 8)?;
            if (0xDC00..=0xDFFF).contains(&low) {
                let scalar = 0x10000 + ((unit - 0xD800) << 10) + (low - 0xDC00);
                let ch = char::from_u32(scalar)
                    .ok_or_else(|| Error::parse(backslash, "invalid surrogate pair"))?;
                return Ok((ch, 12));
            }
        }
        Err(Error::parse(backslash, "unpaired surrogate escape"))
    } else if (0xDC00..=0xDFFF).contains(&unit) {
        Err(Error::parse(backslash, "unpaired surrogate escape"))
    } else {
        let ch = char::from_u32(unit)
            .ok_or_else(|| Error::parse(backslash, "invalid \\u escape"))?;
        Ok((ch, 6))
    }
}

fn hex4(segment: &[u8], at: usize) -> Result<u32> {
    let slice = segment
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

/// Appends `value` to `out` with KDL-ish string escaping applied, copying
/// escape-free runs in chunks.
pub(crate) fn escape_into(out: &mut Vec<u8>, value: &[u8]) {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut start = 0;
    for (idx, &byte) in value.iter().enumerate() {
        let replacement: &[u8] = match byte {
            b'"' => b"\\\"",
            b'\\' => b"\\\\",
            b'\n' => b"\\n",
            b'\r' => b"\\r",
            b'\t' => b"\\t",
            0x08 => b"\\b",
            0x0C => b"\\f",
            byte if byte < 0x20 => {
                if start < idx {
                    out.extend_from_slice(&value[start..idx]);
                }
                out.extend_from_slice(b"\\u00");
                out.push(HEX[(byte >> 4) as usize]);
                out.push(HEX[(byte & 0xF) as usize]);
                start = idx + 1;
                continue;
            }
            _ => continue,
        };
        if start < idx {
            out.extend_from_slice(&value[start..idx]);
        }
        out.extend_from_slice(replacement);
        start = idx + 1;
    }
    if start < value.len() {
        out.extend_from_slice(&value[start..]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(segment: &[u8]) -> Vec<u8> {
        let mut scratch = Scratch::new();
        unescape(segment, &mut scratch).unwrap().to_vec()
    }

    #[rstest::rstest]
    fn test_unescape_simple_escapes() {
        assert_eq!(decode(br"a\nb"), b"a\nb");
        assert_eq!(decode(br"a\tb\r\n"), b"a\tb\r\n");
        assert_eq!(decode(br#"say \"hi\""#), br#"say "hi""#);
        assert_eq!(decode(br"back\\slash"), br"back\slash");
        assert_eq!(decode(br"a\/b"), b"a/b");
        assert_eq!(decode(br"\b\f"), &[0x08, 0x0C]);
    }

    #[rstest::rstest]
    fn test_unescape_unicode() {
        assert_eq!(decode(b"\\u0041"), b"A");
        assert_eq!(decode(b"\\u00e9"), "\u{e9}".as_bytes());
        assert_eq!(decode(b"\\u2603"), "\u{2603}".as_bytes());
        assert_eq!(decode(b"\\ud83d\\ude00"), "\u{1F600}".as_bytes());
    }

    #[rstest::rstest]
    fn test_unescape_passthrough_without_escapes() {
        assert_eq!(decode(b"plain text"), b"plain text");
        assert_eq!(decode(b""), b"");
    }

    #[rstest::rstest]
    fn test_unescape_rejects_lone_surrogate() {
        let mut scratch = Scratch::new();
        assert!(unescape(br"\ud83d", &mut scratch).is_err());
        assert!(unescape(br"\ude00", &mut scratch).is_err());
    }

    #[rstest::rstest]
    #[case(br"a\nb".as_slice(), "a\nb", true)]
    #[case(br"a\nb".as_slice(), "a\\nb", false)]
    #[case(br"a\nb".as_slice(), "a\nc", false)]
    #[case(br"a\nb".as_slice(), "a\n", false)]
    #[case(br"a\nb".as_slice(), "a\nbx", false)]
    #[case(b"\\ud83d\\ude00".as_slice(), "\u{1F600}", true)]
    #[case(br"prefix\tsuffix".as_slice(), "prefix\tsuffix", true)]
    #[case(br"prefix\tsuffix".as_slice(), "prefiy\tsuffix", false)]
    fn test_unescaped_equals(#[case] segment: &[u8], #[case] other: &str, #[case] expected: bool) {
        assert_eq!(unescaped_equals(segment, other.as_bytes()), expected);
    }

    #[rstest::rstest]
    fn test_unescaped_equals_rejects_impossible_lengths() {
        // Longer than the stored segment can ever decode to.
        assert!(!unescaped_equals(br"a\n", b"a\nbcdef"));
        // Shorter than the minimum the segment can decode to.
        let segment = br"abcdefghijkl\n";
        assert!(!unescaped_equals(segment, b"a"));
    }

    #[rstest::rstest]
    fn test_escape_into_round_trip() {
        let mut out = Vec::new();
        escape_into(&mut out, b"line\none\ttab \"quoted\" back\\slash");
        assert_eq!(out, br#"line\none\ttab \"quoted\" back\\slash"#);

        let decoded = decode(&out);
        assert_eq!(decoded, b"line\none\ttab \"quoted\" back\\slash");
    }

    #[rstest::rstest]
    fn test_escape_into_control_chars() {
        let mut out = Vec::new();
        escape_into(&mut out, &[0x01, b'a', 0x1F]);
        assert_eq!(out, b"\\u0001a\\u001f");
    }
}
