//! Canonical state codec.
//!
//! Every field is one 32-byte big-endian word, in declaration order:
//!
//! | type       | word layout                                  |
//! |------------|----------------------------------------------|
//! | `bool`     | 31 zero bytes, then `0x00` or `0x01`         |
//! | `u64`      | 24 zero bytes, then the big-endian integer   |
//! | `Address`  | 12 zero bytes, then the 20 address bytes     |
//! | `Amount`   | 16 zero bytes, then the big-endian `u128`    |
//! | `H256`     | the raw 32 bytes                             |
//!
//! Decoding is strict. Padding must be zero, booleans must be 0 or 1, and
//! the payload length must be exactly `fields * 32`. Together with the
//! fixed field order this makes encode/decode a bijection, so equal bytes
//! always mean equal states and a signature over one encoding can never
//! be reinterpreted as another state.

use crate::{Address, Amount, ChannelError, H256, Result, constants::WORD_SIZE};

type Word = [u8; WORD_SIZE];

/// Builds a canonical encoding field by field.
#[derive(Debug, Default)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_fields(fields: usize) -> Self {
        Self {
            buf: Vec::with_capacity(fields * WORD_SIZE),
        }
    }

    fn right_aligned(&mut self, bytes: &[u8]) -> &mut Self {
        let mut word = [0u8; WORD_SIZE];
        word[WORD_SIZE - bytes.len()..].copy_from_slice(bytes);
        self.buf.extend_from_slice(&word);
        self
    }

    pub fn bool(&mut self, value: bool) -> &mut Self {
        self.right_aligned(&[u8::from(value)])
    }

    pub fn u64(&mut self, value: u64) -> &mut Self {
        self.right_aligned(&value.to_be_bytes())
    }

    pub fn address(&mut self, value: &Address) -> &mut Self {
        self.right_aligned(value.as_bytes())
    }

    pub fn amount(&mut self, value: Amount) -> &mut Self {
        self.right_aligned(&value.0.to_be_bytes())
    }

    pub fn h256(&mut self, value: &H256) -> &mut Self {
        self.buf.extend_from_slice(value.as_bytes());
        self
    }

    #[must_use]
    pub fn finish(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }
}

/// Reads a canonical encoding field by field, rejecting anything that a
/// matching [`Encoder`] call sequence could not have produced.
#[derive(Debug)]
pub struct Decoder<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    /// Start decoding a payload that must contain exactly `fields` words.
    pub fn new(bytes: &'a [u8], fields: usize) -> Result<Self> {
        let expected = fields * WORD_SIZE;
        if bytes.len() != expected {
            return Err(ChannelError::malformed(format!(
                "expected {expected} bytes ({fields} words), got {}",
                bytes.len()
            )));
        }
        Ok(Self { bytes, pos: 0 })
    }

    /// Start decoding a payload whose length is only required to be word aligned.
    pub fn unbounded(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() % WORD_SIZE != 0 {
            return Err(ChannelError::malformed(format!(
                "payload of {} bytes is not word aligned",
                bytes.len()
            )));
        }
        Ok(Self { bytes, pos: 0 })
    }

    /// Words not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        (self.bytes.len() - self.pos) / WORD_SIZE
    }

    fn next_word(&mut self, field: &str) -> Result<Word> {
        let end = self.pos + WORD_SIZE;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or_else(|| ChannelError::malformed(format!("truncated before field `{field}`")))?;
        let mut word = [0u8; WORD_SIZE];
        word.copy_from_slice(slice);
        self.pos = end;
        Ok(word)
    }

    /// Read a word whose first `WORD_SIZE - width` bytes must be zero.
    fn right_aligned(&mut self, field: &str, width: usize) -> Result<Word> {
        let word = self.next_word(field)?;
        if word[..WORD_SIZE - width].iter().any(|b| *b != 0) {
            return Err(ChannelError::malformed(format!(
                "non-zero padding in field `{field}`"
            )));
        }
        Ok(word)
    }

    pub fn bool(&mut self, field: &str) -> Result<bool> {
        let word = self.right_aligned(field, 1)?;
        match word[WORD_SIZE - 1] {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(ChannelError::malformed(format!(
                "field `{field}` is not a boolean (0x{other:02x})"
            ))),
        }
    }

    pub fn u64(&mut self, field: &str) -> Result<u64> {
        let word = self.right_aligned(field, 8)?;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&word[WORD_SIZE - 8..]);
        Ok(u64::from_be_bytes(bytes))
    }

    pub fn address(&mut self, field: &str) -> Result<Address> {
        let word = self.right_aligned(field, 20)?;
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&word[WORD_SIZE - 20..]);
        Ok(Address(bytes))
    }

    pub fn amount(&mut self, field: &str) -> Result<Amount> {
        let word = self.right_aligned(field, 16)?;
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&word[WORD_SIZE - 16..]);
        Ok(Amount(u128::from_be_bytes(bytes)))
    }

    pub fn h256(&mut self, field: &str) -> Result<H256> {
        self.next_word(field).map(H256)
    }

    /// Finish decoding; fails if any word was left unread.
    pub fn finish(self) -> Result<()> {
        if self.pos == self.bytes.len() {
            Ok(())
        } else {
            Err(ChannelError::malformed(format!(
                "{} trailing words",
                self.remaining()
            )))
        }
    }
}

/// A state with a canonical, hashable, signable encoding.
pub trait CanonicalState: Sized {
    /// Number of words in the encoding.
    const FIELD_COUNT: usize;

    /// Canonical bytes used as the hashing and signing pre-image.
    fn encode(&self) -> Vec<u8>;

    /// Exact inverse of [`CanonicalState::encode`].
    fn decode(bytes: &[u8]) -> Result<Self>;

    /// `keccak256(encode())`.
    fn hash(&self) -> H256 {
        crate::hash::keccak256(&self.encode())
    }
}
