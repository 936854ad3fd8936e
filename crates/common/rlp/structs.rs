use super::{
    decode::{decode_rlp_item, get_item_with_prefix, RLPDecode},
    encode::{encode_length, RLPEncode},
    error::RLPDecodeError,
};
use bytes::BufMut;

/// # Struct decoding helper
///
/// Used to decode a struct from RLP format.
/// The struct is expected as a list, with its values being the fields
/// in the order they are passed to [`Decoder::decode_field`].
#[derive(Debug)]
#[must_use = "`Decoder` must be consumed with `finish` to perform decoding checks"]
pub struct Decoder<'a> {
    payload: &'a [u8],
    remaining: &'a [u8],
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Result<Self, RLPDecodeError> {
        match decode_rlp_item(buf)? {
            (true, payload, remaining) => Ok(Self { payload, remaining }),
            (false, _, _) => Err(RLPDecodeError::UnexpectedString),
        }
    }

    pub fn decode_field<T: RLPDecode>(self, name: &str) -> Result<(T, Self), RLPDecodeError> {
        let (field, rest) = <T as RLPDecode>::decode_unfinished(self.payload)
            .map_err(|err| RLPDecodeError::Custom(format!("error decoding field '{name}': {err}")))?;
        Ok((
            field,
            Self {
                payload: rest,
                ..self
            },
        ))
    }

    /// Returns the next field without decoding it, i.e. the payload bytes including its prefix.
    pub fn get_encoded_item(self) -> Result<(Vec<u8>, Self), RLPDecodeError> {
        let (item, rest) = get_item_with_prefix(self.payload)?;
        Ok((
            item.to_vec(),
            Self {
                payload: rest,
                ..self
            },
        ))
    }

    /// Finishes decoding the struct and returns the bytes after the item.
    /// If the item's payload is not fully consumed, returns an error.
    pub const fn finish(self) -> Result<&'a [u8], RLPDecodeError> {
        if self.payload.is_empty() {
            Ok(self.remaining)
        } else {
            Err(RLPDecodeError::MalformedData)
        }
    }

    /// Returns true if the decoder has consumed the whole list payload.
    pub const fn is_done(&self) -> bool {
        self.payload.is_empty()
    }
}

/// # Struct encoding helper
///
/// Encodes a struct as an RLP list of the fields passed to
/// [`Encoder::encode_field`], in order.
#[must_use = "`Encoder` must be consumed with `finish` to write the encoding"]
pub struct Encoder<'a> {
    buf: &'a mut dyn BufMut,
    temp_buf: Vec<u8>,
}

impl<'a> Encoder<'a> {
    pub fn new(buf: &'a mut dyn BufMut) -> Self {
        Self {
            buf,
            temp_buf: Vec::new(),
        }
    }

    pub fn encode_field<T: RLPEncode + ?Sized>(mut self, value: &T) -> Self {
        value.encode(&mut self.temp_buf);
        self
    }

    /// Appends an already-encoded item to the list payload verbatim.
    pub fn encode_raw(mut self, encoded: &[u8]) -> Self {
        self.temp_buf.extend_from_slice(encoded);
        self
    }

    pub fn finish(self) {
        encode_length(self.temp_buf.len(), self.buf);
        self.buf.put_slice(&self.temp_buf);
    }
}
