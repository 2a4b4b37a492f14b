//! Length-delimited postcard framing for peer links.

use std::io;
use std::marker::PhantomData;

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// [`LengthDelimitedCodec`] with postcard serialization on both sides.
///
/// Frames are capped at 16 MB, which comfortably fits a full document
/// snapshot during state transfer.
#[derive(Debug)]
pub struct PostcardCodec<T> {
    framing: LengthDelimitedCodec,
    _marker: PhantomData<T>,
}

impl<T> PostcardCodec<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            framing: LengthDelimitedCodec::builder()
                .max_frame_length(MAX_FRAME_LEN)
                .new_codec(),
            _marker: PhantomData,
        }
    }
}

impl<T> Default for PostcardCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for PostcardCodec<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> Decoder for PostcardCodec<T>
where
    T: for<'de> Deserialize<'de>,
{
    type Item = T;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(frame) = self.framing.decode(src)? else {
            return Ok(None);
        };
        postcard::from_bytes(&frame)
            .map(Some)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

impl<T> Encoder<T> for PostcardCodec<T>
where
    T: Serialize,
{
    type Error = io::Error;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let bytes = postcard::to_allocvec(&item)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.framing.encode(Bytes::from(bytes), dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        tag: u32,
        body: String,
    }

    #[test]
    fn encode_decode_round_trip() {
        let mut codec = PostcardCodec::<Sample>::new();
        let mut buf = BytesMut::new();
        codec
            .encode(
                Sample {
                    tag: 9,
                    body: "payload".into(),
                },
                &mut buf,
            )
            .unwrap();
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(
            decoded,
            Sample {
                tag: 9,
                body: "payload".into()
            }
        );
    }

    #[test]
    fn partial_frame_yields_none() {
        let mut codec = PostcardCodec::<Sample>::new();
        let mut buf = BytesMut::new();
        codec
            .encode(
                Sample {
                    tag: 1,
                    body: "x".into(),
                },
                &mut buf,
            )
            .unwrap();
        let mut partial = buf.split_to(buf.len() - 1);
        assert!(codec.decode(&mut partial).unwrap().is_none());
    }

    #[test]
    fn garbage_is_invalid_data() {
        let mut codec = PostcardCodec::<Sample>::new();
        // Valid length prefix, invalid postcard body.
        let mut buf = BytesMut::from(&[0u8, 0, 0, 2, 0xff, 0xff][..]);
        let err = codec.decode(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
