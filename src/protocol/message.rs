//! Typed RTMP messages
//!
//! Protocol control and user control messages travel on chunk stream 2 with
//! message stream 0. Commands are AMF0 sequences on chunk stream 3; data
//! messages (metadata, sample access) use chunk stream 6.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::amf::{amf0, AmfValue};
use crate::error::AmfError;
use crate::protocol::chunk::RtmpChunk;
use crate::protocol::constants::*;

/// Strip the leading format byte of Flex (AMF3 container) messages
pub fn amf0_payload(message_type: u8, payload: &Bytes) -> Bytes {
    match message_type {
        MSG_FLEX_MESSAGE | MSG_FLEX_STREAM if !payload.is_empty() => payload.slice(1..),
        _ => payload.clone(),
    }
}

/// Protocol control messages (types 1, 2, 3, 5, 6) and user control (type 4)
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    SetChunkSize(u32),
    Abort(u32),
    Acknowledgement(u32),
    WindowAckSize(u32),
    SetPeerBandwidth { size: u32, limit_type: u8 },
    UserControl(UserControlEvent),
}

/// User control events
#[derive(Debug, Clone, PartialEq)]
pub enum UserControlEvent {
    StreamBegin(u32),
    StreamEof(u32),
    StreamDry(u32),
    StreamIsRecorded(u32),
    PingRequest(u32),
    PingResponse(u32),
    Unknown(u16),
}

impl ControlMessage {
    /// Parse a control message; `None` for other types or short payloads
    pub fn decode(message_type: u8, payload: &Bytes) -> Option<Self> {
        let mut buf = payload.clone();
        let message = match message_type {
            MSG_SET_CHUNK_SIZE if buf.remaining() >= 4 => ControlMessage::SetChunkSize(buf.get_u32()),
            MSG_ABORT if buf.remaining() >= 4 => ControlMessage::Abort(buf.get_u32()),
            MSG_ACKNOWLEDGEMENT if buf.remaining() >= 4 => {
                ControlMessage::Acknowledgement(buf.get_u32())
            }
            MSG_WINDOW_ACK_SIZE if buf.remaining() >= 4 => {
                ControlMessage::WindowAckSize(buf.get_u32())
            }
            MSG_SET_PEER_BANDWIDTH if buf.remaining() >= 5 => ControlMessage::SetPeerBandwidth {
                size: buf.get_u32(),
                limit_type: buf.get_u8(),
            },
            MSG_USER_CONTROL if buf.remaining() >= 2 => {
                let event_type = buf.get_u16();
                let value = if buf.remaining() >= 4 { buf.get_u32() } else { 0 };
                ControlMessage::UserControl(match event_type {
                    UC_STREAM_BEGIN => UserControlEvent::StreamBegin(value),
                    UC_STREAM_EOF => UserControlEvent::StreamEof(value),
                    UC_STREAM_DRY => UserControlEvent::StreamDry(value),
                    UC_STREAM_IS_RECORDED => UserControlEvent::StreamIsRecorded(value),
                    UC_PING_REQUEST => UserControlEvent::PingRequest(value),
                    UC_PING_RESPONSE => UserControlEvent::PingResponse(value),
                    other => UserControlEvent::Unknown(other),
                })
            }
            _ => return None,
        };
        Some(message)
    }

    pub fn to_chunk(&self) -> RtmpChunk {
        let mut payload = BytesMut::with_capacity(6);
        let message_type = match self {
            ControlMessage::SetChunkSize(v) => {
                payload.put_u32(*v);
                MSG_SET_CHUNK_SIZE
            }
            ControlMessage::Abort(v) => {
                payload.put_u32(*v);
                MSG_ABORT
            }
            ControlMessage::Acknowledgement(v) => {
                payload.put_u32(*v);
                MSG_ACKNOWLEDGEMENT
            }
            ControlMessage::WindowAckSize(v) => {
                payload.put_u32(*v);
                MSG_WINDOW_ACK_SIZE
            }
            ControlMessage::SetPeerBandwidth { size, limit_type } => {
                payload.put_u32(*size);
                payload.put_u8(*limit_type);
                MSG_SET_PEER_BANDWIDTH
            }
            ControlMessage::UserControl(event) => {
                let (event_type, value) = match event {
                    UserControlEvent::StreamBegin(v) => (UC_STREAM_BEGIN, *v),
                    UserControlEvent::StreamEof(v) => (UC_STREAM_EOF, *v),
                    UserControlEvent::StreamDry(v) => (UC_STREAM_DRY, *v),
                    UserControlEvent::StreamIsRecorded(v) => (UC_STREAM_IS_RECORDED, *v),
                    UserControlEvent::PingRequest(v) => (UC_PING_REQUEST, *v),
                    UserControlEvent::PingResponse(v) => (UC_PING_RESPONSE, *v),
                    UserControlEvent::Unknown(t) => (*t, 0),
                };
                payload.put_u16(event_type);
                payload.put_u32(value);
                MSG_USER_CONTROL
            }
        };
        RtmpChunk::new(CSID_PROTOCOL, message_type, 0, payload.freeze())
    }
}

/// AMF0 command: name, transaction id, command object, then arguments
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub name: String,
    pub transaction_id: f64,
    pub command_object: AmfValue,
    pub arguments: Vec<AmfValue>,
    /// Message stream the command arrived on or is sent to
    pub stream_id: u32,
}

impl Command {
    pub fn new(name: impl Into<String>, transaction_id: f64) -> Self {
        Self {
            name: name.into(),
            transaction_id,
            command_object: AmfValue::Null,
            arguments: Vec::new(),
            stream_id: 0,
        }
    }

    pub fn with_object(mut self, object: AmfValue) -> Self {
        self.command_object = object;
        self
    }

    pub fn with_arg(mut self, arg: impl Into<AmfValue>) -> Self {
        self.arguments.push(arg.into());
        self
    }

    pub fn on_stream(mut self, stream_id: u32) -> Self {
        self.stream_id = stream_id;
        self
    }

    /// Decode a command (type 20) or Flex command (type 17) payload
    pub fn decode(message_type: u8, payload: &Bytes, stream_id: u32) -> Result<Self, AmfError> {
        let values = amf0::decode_all(amf0_payload(message_type, payload))?;
        let mut values = values.into_iter();

        let name = match values.next() {
            Some(AmfValue::String(name)) => name,
            _ => return Err(AmfError::MissingCommandName),
        };
        let transaction_id = values.next().and_then(|v| v.as_number()).unwrap_or(0.0);
        let command_object = values.next().unwrap_or(AmfValue::Null);

        Ok(Self {
            name,
            transaction_id,
            command_object,
            arguments: values.collect(),
            stream_id,
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut encoder = amf0::Amf0Encoder::new();
        encoder.encode(&AmfValue::String(self.name.clone()));
        encoder.encode(&AmfValue::Number(self.transaction_id));
        encoder.encode(&self.command_object);
        encoder.encode_all(&self.arguments);
        encoder.finish()
    }

    pub fn to_chunk(&self) -> RtmpChunk {
        RtmpChunk::new(CSID_INVOKE, MSG_COMMAND, self.stream_id, self.encode())
    }

    pub fn arg(&self, index: usize) -> Option<&AmfValue> {
        self.arguments.get(index)
    }

    pub fn arg_str(&self, index: usize) -> Option<&str> {
        self.arg(index)?.as_str()
    }

    pub fn arg_bool(&self, index: usize) -> Option<bool> {
        self.arg(index)?.as_bool()
    }

    pub fn arg_number(&self, index: usize) -> Option<f64> {
        self.arg(index)?.as_number()
    }

    /// `_result` reply
    pub fn result(transaction_id: f64, object: AmfValue, info: AmfValue) -> Self {
        Command::new(CMD_RESULT, transaction_id)
            .with_object(object)
            .with_arg(info)
    }

    /// `onStatus` with a {level, code, description} info object
    pub fn on_status(stream_id: u32, level: &str, code: &str, description: &str) -> Self {
        Command::new(CMD_ON_STATUS, 0.0)
            .with_arg(AmfValue::object([
                ("level", level),
                ("code", code),
                ("description", description),
            ]))
            .on_stream(stream_id)
    }
}

/// AMF0 data message: a name followed by values
#[derive(Debug, Clone, PartialEq)]
pub struct DataMessage {
    pub name: String,
    pub values: Vec<AmfValue>,
    pub stream_id: u32,
}

impl DataMessage {
    pub fn new(name: impl Into<String>, values: Vec<AmfValue>) -> Self {
        Self {
            name: name.into(),
            values,
            stream_id: 0,
        }
    }

    /// Decode a data (type 18) or Flex data (type 15) payload
    pub fn decode(message_type: u8, payload: &Bytes, stream_id: u32) -> Result<Self, AmfError> {
        let mut values = amf0::decode_all(amf0_payload(message_type, payload))?.into_iter();
        let name = match values.next() {
            Some(AmfValue::String(name)) => name,
            _ => return Err(AmfError::MissingCommandName),
        };
        Ok(Self {
            name,
            values: values.collect(),
            stream_id,
        })
    }

    /// The metadata object of `@setDataFrame` / `onMetaData`
    pub fn data_object(&self) -> Option<&AmfValue> {
        match self.name.as_str() {
            DATA_SET_DATA_FRAME => self.values.get(1),
            DATA_ON_METADATA => self.values.first(),
            _ => None,
        }
    }

    /// `onMetaData` carrying `object`, as forwarded to players
    pub fn metadata(object: Option<AmfValue>) -> Self {
        Self::new(DATA_ON_METADATA, vec![AmfValue::from(object)])
    }

    /// `|RtmpSampleAccess` (audio, video) both denied
    pub fn sample_access() -> Self {
        Self::new(DATA_SAMPLE_ACCESS, vec![AmfValue::Boolean(false), AmfValue::Boolean(false)])
    }

    pub fn encode(&self) -> Bytes {
        let mut encoder = amf0::Amf0Encoder::new();
        encoder.encode(&AmfValue::String(self.name.clone()));
        encoder.encode_all(&self.values);
        encoder.finish()
    }

    pub fn to_chunk(&self) -> RtmpChunk {
        RtmpChunk::new(CSID_DATA, MSG_DATA, self.stream_id, self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_command_fields() {
        let wire = Command::new(CMD_PUBLISH, 5.0)
            .with_arg("key1?token=abc")
            .with_arg("live")
            .encode();

        let cmd = Command::decode(MSG_COMMAND, &wire, 1).unwrap();
        assert_eq!(cmd.name, "publish");
        assert_eq!(cmd.transaction_id, 5.0);
        assert!(cmd.command_object.is_null_or_undefined());
        assert_eq!(cmd.arg_str(0), Some("key1?token=abc"));
        assert_eq!(cmd.stream_id, 1);
    }

    #[test]
    fn test_flex_command_skips_leading_byte() {
        let body = Command::new(CMD_PAUSE, 0.0).with_arg(true).with_arg(0.0).encode();
        let mut wire = BytesMut::new();
        wire.put_u8(0);
        wire.put_slice(&body);

        let cmd = Command::decode(MSG_FLEX_MESSAGE, &wire.freeze(), 1).unwrap();
        assert_eq!(cmd.name, "pause");
        assert_eq!(cmd.arg_bool(0), Some(true));
    }

    #[test]
    fn test_command_without_name() {
        let wire = amf0::encode_all(&[AmfValue::Number(1.0)]);
        assert_eq!(Command::decode(MSG_COMMAND, &wire, 0), Err(AmfError::MissingCommandName));
    }

    #[test]
    fn test_on_status_layout() {
        let cmd = Command::on_status(1, LEVEL_STATUS, NS_PLAY_START, "Started playing stream.");
        let decoded = Command::decode(MSG_COMMAND, &cmd.encode(), 1).unwrap();
        assert_eq!(decoded.name, "onStatus");
        assert_eq!(decoded.transaction_id, 0.0);
        let info = decoded.arg(0).unwrap();
        assert_eq!(info.get_string("level"), Some("status"));
        assert_eq!(info.get_string("code"), Some("NetStream.Play.Start"));
        assert_eq!(info.get_string("description"), Some("Started playing stream."));
        assert_eq!(cmd.to_chunk().csid, CSID_INVOKE);
    }

    #[test]
    fn test_set_data_frame_object() {
        let meta = AmfValue::object([("width", 640.0)]);
        let wire = DataMessage::new(
            DATA_SET_DATA_FRAME,
            vec![AmfValue::from(DATA_ON_METADATA), meta.clone()],
        )
        .encode();

        let data = DataMessage::decode(MSG_DATA, &wire, 1).unwrap();
        assert_eq!(data.data_object(), Some(&meta));

        let forwarded = DataMessage::metadata(data.data_object().cloned());
        let again = DataMessage::decode(MSG_DATA, &forwarded.encode(), 1).unwrap();
        assert_eq!(again.name, DATA_ON_METADATA);
        assert_eq!(again.data_object(), Some(&meta));
    }

    #[test]
    fn test_control_messages() {
        let chunk = ControlMessage::SetPeerBandwidth {
            size: DEFAULT_PEER_BANDWIDTH,
            limit_type: BANDWIDTH_LIMIT_DYNAMIC,
        }
        .to_chunk();
        assert_eq!(chunk.csid, CSID_PROTOCOL);
        assert_eq!(chunk.message_type, MSG_SET_PEER_BANDWIDTH);
        assert_eq!(&chunk.payload[..], &[0x00, 0x4C, 0x4B, 0x40, 0x02]);

        let ping = ControlMessage::UserControl(UserControlEvent::PingRequest(1234)).to_chunk();
        assert_eq!(ping.payload.len(), 6);
        assert_eq!(
            ControlMessage::decode(ping.message_type, &ping.payload),
            Some(ControlMessage::UserControl(UserControlEvent::PingRequest(1234)))
        );

        assert_eq!(
            ControlMessage::decode(MSG_SET_CHUNK_SIZE, &Bytes::from_static(&[0, 0, 0x10, 0])),
            Some(ControlMessage::SetChunkSize(4096))
        );
        assert_eq!(ControlMessage::decode(MSG_SET_CHUNK_SIZE, &Bytes::from_static(&[0])), None);
        assert_eq!(ControlMessage::decode(MSG_AUDIO, &Bytes::new()), None);
    }
}
