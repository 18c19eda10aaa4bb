//! AMF0 serialization for command and data messages
//!
//! Only AMF0 is decoded. "Flex" message variants carry one extra leading
//! byte that the message layer strips before handing the payload here.

pub mod amf0;
pub mod value;

pub use amf0::{Amf0Decoder, Amf0Encoder};
pub use value::AmfValue;
