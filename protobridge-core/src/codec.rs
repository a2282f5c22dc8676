//! A gRPC codec that marshals and unmarshals as identity on `Vec<u8>`.
//!
//! The routing engine already has proto-encoded bytes by the time it calls
//! a backend (the transcoder produced them) and wants the raw reply bytes
//! back untouched (the transcoder will decode them). Unlike tonic's
//! `ProstCodec`, which requires a compile-time `prost::Message` type, this
//! codec moves bytes straight onto and off of the wire.

use bytes::{Buf, BufMut};
use tonic::codec::{BufferSettings, Codec, DecodeBuf, Decoder, EncodeBuf, Encoder};
use tonic::Status;

#[derive(Debug, Clone, Default)]
pub struct PassthroughCodec;

impl Codec for PassthroughCodec {
    type Encode = Vec<u8>;
    type Decode = Vec<u8>;
    type Encoder = PassthroughEncoder;
    type Decoder = PassthroughDecoder;

    fn encoder(&mut self) -> Self::Encoder {
        PassthroughEncoder
    }

    fn decoder(&mut self) -> Self::Decoder {
        PassthroughDecoder
    }
}

#[derive(Debug, Clone, Default)]
pub struct PassthroughEncoder;

impl Encoder for PassthroughEncoder {
    type Item = Vec<u8>;
    type Error = Status;

    fn encode(&mut self, item: Self::Item, dst: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
        dst.reserve(item.len());
        dst.put_slice(&item);
        Ok(())
    }

    fn buffer_settings(&self) -> BufferSettings {
        BufferSettings::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PassthroughDecoder;

impl Decoder for PassthroughDecoder {
    type Item = Vec<u8>;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Self::Item>, Self::Error> {
        if !src.has_remaining() {
            return Ok(None);
        }
        let len = src.remaining();
        let mut buf = vec![0u8; len];
        src.copy_to_slice(&mut buf);
        Ok(Some(buf))
    }

    fn buffer_settings(&self) -> BufferSettings {
        BufferSettings::default()
    }
}

// `EncodeBuf`/`DecodeBuf` only come from tonic's own codec machinery, so this
// is exercised end to end by the `tests/` gateway integration suite instead
// of a unit test here.
