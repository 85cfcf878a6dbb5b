//! AMF0 (Action Message Format) used by RTMP commands and metadata

pub mod amf0;
pub mod value;

pub use amf0::{Amf0Decoder, Amf0Encoder};
pub use value::AmfValue;
