//! RTMP protocol constants

use std::time::Duration;

/// RTMP version byte sent in S0
pub const RTMP_VERSION: u8 = 3;

/// Size of C1/S1/C2/S2
pub const HANDSHAKE_SIZE: usize = 1536;

// Chunk stream ids used for outbound messages
pub const CSID_PROTOCOL: u32 = 2;
pub const CSID_INVOKE: u32 = 3;
pub const CSID_AUDIO: u32 = 4;
pub const CSID_VIDEO: u32 = 5;
pub const CSID_DATA: u32 = 6;

// Chunk header formats
pub const CHUNK_FMT_0: u8 = 0;
pub const CHUNK_FMT_1: u8 = 1;
pub const CHUNK_FMT_2: u8 = 2;
pub const CHUNK_FMT_3: u8 = 3;

/// Message header length indexed by chunk format
pub const MESSAGE_HEADER_SIZE: [usize; 4] = [11, 7, 3, 0];

/// Largest possible chunk header: 3 byte basic + 11 byte message + 4 byte extended timestamp
pub const MAX_CHUNK_HEADER: usize = 18;

/// Timestamp value signalling an extended timestamp field
pub const EXTENDED_TIMESTAMP: u32 = 0xFF_FFFF;

/// Extra bytes reserved when a packet buffer has to grow
pub const PACKET_SLACK: usize = 1024;

pub const DEFAULT_CHUNK_SIZE: u32 = 128;
pub const RECOMMENDED_CHUNK_SIZE: u32 = 4096;
pub const MAX_CHUNK_SIZE: u32 = 0x7FFF_FFFF;

// Message type ids
pub const MSG_SET_CHUNK_SIZE: u8 = 1;
pub const MSG_ABORT: u8 = 2;
pub const MSG_ACKNOWLEDGEMENT: u8 = 3;
pub const MSG_USER_CONTROL: u8 = 4;
pub const MSG_WINDOW_ACK_SIZE: u8 = 5;
pub const MSG_SET_PEER_BANDWIDTH: u8 = 6;
pub const MSG_AUDIO: u8 = 8;
pub const MSG_VIDEO: u8 = 9;
pub const MSG_FLEX_STREAM: u8 = 15;
pub const MSG_FLEX_OBJECT: u8 = 16;
pub const MSG_FLEX_MESSAGE: u8 = 17;
pub const MSG_DATA: u8 = 18;
pub const MSG_SHARED_OBJECT: u8 = 19;
pub const MSG_COMMAND: u8 = 20;
pub const MSG_AGGREGATE: u8 = 22;

/// Highest message type accepted by the chunk parser
pub const MSG_TYPE_MAX: u8 = MSG_AGGREGATE;

// User control event types
pub const UC_STREAM_BEGIN: u16 = 0;
pub const UC_STREAM_EOF: u16 = 1;
pub const UC_STREAM_DRY: u16 = 2;
pub const UC_STREAM_IS_RECORDED: u16 = 4;
pub const UC_PING_REQUEST: u16 = 6;
pub const UC_PING_RESPONSE: u16 = 7;

// Peer bandwidth limit types
pub const BANDWIDTH_LIMIT_HARD: u8 = 0;
pub const BANDWIDTH_LIMIT_SOFT: u8 = 1;
pub const BANDWIDTH_LIMIT_DYNAMIC: u8 = 2;

pub const DEFAULT_WINDOW_ACK_SIZE: u32 = 5_000_000;
pub const DEFAULT_PEER_BANDWIDTH: u32 = 5_000_000;

/// Inbound byte counter resets once it reaches this value
pub const ACK_COUNTER_RESET: u32 = 0xF000_0000;

pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(30);

/// Standard RTMP port, used for the ingest connection
pub const DEFAULT_RTMP_PORT: u16 = 1935;

// Command names
pub const CMD_CONNECT: &str = "connect";
pub const CMD_CREATE_STREAM: &str = "createStream";
pub const CMD_PUBLISH: &str = "publish";
pub const CMD_PLAY: &str = "play";
pub const CMD_PAUSE: &str = "pause";
pub const CMD_RECEIVE_AUDIO: &str = "receiveAudio";
pub const CMD_RECEIVE_VIDEO: &str = "receiveVideo";
pub const CMD_DELETE_STREAM: &str = "deleteStream";
pub const CMD_CLOSE_STREAM: &str = "closeStream";
pub const CMD_RELEASE_STREAM: &str = "releaseStream";
pub const CMD_FC_PUBLISH: &str = "FCPublish";
pub const CMD_FC_UNPUBLISH: &str = "FCUnpublish";
pub const CMD_RESULT: &str = "_result";
pub const CMD_ON_STATUS: &str = "onStatus";

// Data message names
pub const DATA_SET_DATA_FRAME: &str = "@setDataFrame";
pub const DATA_ON_METADATA: &str = "onMetaData";
pub const DATA_SAMPLE_ACCESS: &str = "|RtmpSampleAccess";

// Connect reply
pub const FMS_VERSION: &str = "FMS/3,0,1,123";
pub const FMS_CAPABILITIES: f64 = 31.0;

// Status codes
pub const NC_CONNECT_SUCCESS: &str = "NetConnection.Connect.Success";
pub const NS_PUBLISH_START: &str = "NetStream.Publish.Start";
pub const NS_PUBLISH_BAD_NAME: &str = "NetStream.Publish.BadName";
pub const NS_PUBLISH_BAD_CONNECTION: &str = "NetStream.Publish.BadConnection";
pub const NS_PUBLISH_UNAUTHORIZED: &str = "NetStream.publish.Unauthorized";
pub const NS_UNPUBLISH_SUCCESS: &str = "NetStream.Unpublish.Success";
pub const NS_PLAY_RESET: &str = "NetStream.Play.Reset";
pub const NS_PLAY_START: &str = "NetStream.Play.Start";
pub const NS_PLAY_STOP: &str = "NetStream.Play.Stop";
pub const NS_PLAY_BAD_CONNECTION: &str = "NetStream.Play.BadConnection";
pub const NS_PLAY_UNAUTHORIZED: &str = "NetStream.play.Unauthorized";
pub const NS_PLAY_UNPUBLISH_NOTIFY: &str = "NetStream.Play.UnpublishNotify";
pub const NS_PAUSE_NOTIFY: &str = "NetStream.Pause.Notify";
pub const NS_UNPAUSE_NOTIFY: &str = "NetStream.Unpause.Notify";

// Status levels
pub const LEVEL_STATUS: &str = "status";
pub const LEVEL_ERROR: &str = "error";
