use crate::text::escape_into;
use crate::Result;

/// Structural sink a subtree is rewritten into. Property names and string
/// values arrive as decoded UTF-8 bytes (escapes already resolved); numbers
/// arrive as their raw payload bytes.
///
/// Implementations may fail; failures propagate to the caller unchanged,
/// via [`crate::Error::write`] for sink-specific conditions.
pub trait DocumentWriter {
    fn write_start_object(&mut self) -> Result<()>;
    fn write_end_object(&mut self) -> Result<()>;
    fn write_start_array(&mut self) -> Result<()>;
    fn write_end_array(&mut self) -> Result<()>;
    fn write_property_name(&mut self, name: &[u8]) -> Result<()>;
    fn write_string_value(&mut self, value: &[u8]) -> Result<()>;
    fn write_number_value(&mut self, raw: &[u8]) -> Result<()>;
    fn write_bool_value(&mut self, value: bool) -> Result<()>;
    fn write_null_value(&mut self) -> Result<()>;
}

/// Writer producing compact KDL-ish text. Separators are bookkept with a
/// single flag: values and names emit a leading comma unless they open a
/// scope or follow a name.
#[derive(Default)]
pub struct TextWriter {
    buffer: Vec<u8>,
    needs_separator: bool,
}

impl TextWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finish(self) -> String {
        String::from_utf8(self.buffer).expect("writer output must be valid UTF-8")
    }

    pub fn finish_bytes(self) -> Vec<u8> {
        self.buffer
    }

    fn before_value(&mut self) {
        if self.needs_separator {
            self.buffer.push(b',');
        }
    }

    fn push_quoted(&mut self, bytes: &[u8]) {
        self.buffer.push(b'"');
        escape_into(&mut self.buffer, bytes);
        self.buffer.push(b'"');
    }
}

impl DocumentWriter for TextWriter {
    fn write_start_object(&mut self) -> Result<()> {
        self.before_value();
        self.buffer.push(b'{');
        self.needs_separator = false;
        Ok(())
    }

    fn write_end_object(&mut self) -> Result<()> {
        self.buffer.push(b'}');
        self.needs_separator = true;
        Ok(())
    }

    fn write_start_array(&mut self) -> Result<()> {
        self.before_value();
        self.buffer.push(b'[');
        self.needs_separator = false;
        Ok(())
    }

    fn write_end_array(&mut self) -> Result<()> {
        self.buffer.push(b']');
        self.needs_separator = true;
        Ok(())
    }

    fn write_property_name(&mut self, name: &[u8]) -> Result<()> {
        self.before_value();
        self.push_quoted(name);
        self.buffer.push(b':');
        self.needs_separator = false;
        Ok(())
    }

    fn write_string_value(&mut self, value: &[u8]) -> Result<()> {
        self.before_value();
        self.push_quoted(value);
        self.needs_separator = true;
        Ok(())
    }

    fn write_number_value(&mut self, raw: &[u8]) -> Result<()> {
        self.before_value();
        self.buffer.extend_from_slice(raw);
        self.needs_separator = true;
        Ok(())
    }

    fn write_bool_value(&mut self, value: bool) -> Result<()> {
        self.before_value();
        self.buffer
            .extend_from_slice(if value { b"true" } else { b"false" });
        self.needs_separator = true;
        Ok(())
    }

    fn write_null_value(&mut self) -> Result<()> {
        self.before_value();
        self.buffer.extend_from_slice(b"null");
        self.needs_separator = true;
        Ok(())
    }
}
