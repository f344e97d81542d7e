pub mod json_codec;

pub use json_codec::JsonMessageCodec;
