//! Incremental UTF-8 decoding for chunked response bodies.

use std::str;

/// Decodes a byte stream chunk by chunk, holding back a trailing incomplete
/// multi-byte sequence until the bytes that complete it arrive.
///
/// Invalid sequences decode to U+FFFD. The decoded text is identical no
/// matter where the input is split.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Decode `bytes`, prefixed by whatever was held back from the last call.
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        if self.pending.is_empty() {
            return self.decode_owned(bytes);
        }

        let mut joined = std::mem::take(&mut self.pending);
        joined.extend_from_slice(bytes);
        self.decode_owned(&joined)
    }

    /// Flush held-back bytes at end of input. An incomplete sequence becomes U+FFFD.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }

        let pending = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&pending).into_owned()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    fn decode_owned(&mut self, mut input: &[u8]) -> String {
        let mut out = String::with_capacity(input.len());

        loop {
            match str::from_utf8(input) {
                Ok(valid) => {
                    out.push_str(valid);
                    return out;
                }
                Err(error) => {
                    let (valid, rest) = input.split_at(error.valid_up_to());
                    // `valid_up_to` marks a verified UTF-8 prefix.
                    out.push_str(str::from_utf8(valid).unwrap_or_default());

                    match error.error_len() {
                        Some(invalid_len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            input = &rest[invalid_len..];
                        }
                        None => {
                            self.pending.extend_from_slice(rest);
                            return out;
                        }
                    }
                }
            }
        }
    }
}
