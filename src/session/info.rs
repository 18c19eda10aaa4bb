//! Records attached to relay events

use std::collections::BTreeMap;
use std::net::IpAddr;

/// Parsed `?key=value` arguments of a stream name
pub type QueryArgs = BTreeMap<String, String>;

/// Parse a query string (without the leading `?`)
pub fn parse_query(query: &str) -> QueryArgs {
    url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect()
}

/// Split a stream name into its name and query arguments
pub fn split_stream_name(name: &str) -> (&str, QueryArgs) {
    match name.split_once('?') {
        Some((name, query)) => (name, parse_query(query)),
        None => (name, QueryArgs::new()),
    }
}

/// Identity of the stream a session publishes or plays
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamInfo {
    pub session_id: u64,
    /// `/{app}/{name}`, empty before publish or play
    pub path: String,
    pub query: QueryArgs,
    /// Where the peer publishes, as seen from this host
    pub publish_url: String,
    /// Where a local player reads the stream
    pub play_url: String,
    /// Last path segment
    pub stream_key: String,
    /// Token between the last two underscores of the stream key
    pub user_id: String,
}

impl StreamInfo {
    pub fn new(session_id: u64, path: &str, query: QueryArgs, peer_ip: IpAddr, local_port: u16) -> Self {
        let stream_key = path.rsplit('/').next().unwrap_or_default().to_string();
        let user_id = user_id_of(&stream_key).to_string();
        let host = match peer_ip.to_canonical() {
            IpAddr::V4(v4) => v4.to_string(),
            IpAddr::V6(v6) => format!("[{}]", v6),
        };
        Self {
            session_id,
            path: path.to_string(),
            query,
            publish_url: format!("rtmp://{}:{}{}", host, local_port, path),
            play_url: format!("rtmp://127.0.0.1:{}{}", local_port, path),
            stream_key,
            user_id,
        }
    }
}

fn user_id_of(stream_key: &str) -> &str {
    let mut parts = stream_key.rsplitn(3, '_');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(user), Some(_)) => user,
        _ => "",
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioInfo {
    pub codec_name: String,
    pub samplerate: u32,
    pub channels: u8,
    pub profile_name: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoInfo {
    pub codec_name: String,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub profile_name: String,
    pub level: f64,
}

/// Both descriptors, reported once the first video frame is seen
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CodecInfo {
    pub audio: AudioInfo,
    pub video: VideoInfo,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_info_urls_and_key() {
        let info = StreamInfo::new(
            7,
            "/live/room_u42_abc",
            parse_query("token=t1&x=%20y"),
            "203.0.113.5".parse().unwrap(),
            1935,
        );
        assert_eq!(info.publish_url, "rtmp://203.0.113.5:1935/live/room_u42_abc");
        assert_eq!(info.play_url, "rtmp://127.0.0.1:1935/live/room_u42_abc");
        assert_eq!(info.stream_key, "room_u42_abc");
        assert_eq!(info.user_id, "u42");
        assert_eq!(info.query.get("token").map(String::as_str), Some("t1"));
        assert_eq!(info.query.get("x").map(String::as_str), Some(" y"));
    }

    #[test]
    fn test_user_id_needs_two_underscores() {
        assert_eq!(user_id_of("a_b"), "");
        assert_eq!(user_id_of("plain"), "");
        assert_eq!(user_id_of("a_b_c_d"), "c");
        assert_eq!(user_id_of("a__b"), "");
    }

    #[test]
    fn test_split_stream_name() {
        let (name, args) = split_stream_name("cam1?sign=abc&ts=1");
        assert_eq!(name, "cam1");
        assert_eq!(args.len(), 2);

        let (name, args) = split_stream_name("cam1");
        assert_eq!(name, "cam1");
        assert!(args.is_empty());
    }

    #[test]
    fn test_v6_peer_is_bracketed() {
        let info = StreamInfo::new(1, "/app/s", QueryArgs::new(), "2001:db8::1".parse().unwrap(), 1936);
        assert_eq!(info.publish_url, "rtmp://[2001:db8::1]:1936/app/s");
        let info = StreamInfo::new(1, "/app/s", QueryArgs::new(), "::ffff:10.0.0.1".parse().unwrap(), 1936);
        assert_eq!(info.publish_url, "rtmp://10.0.0.1:1936/app/s");
    }

    #[test]
    fn test_empty_path() {
        let info = StreamInfo::new(1, "", QueryArgs::new(), "127.0.0.1".parse().unwrap(), 1935);
        assert_eq!(info.stream_key, "");
        assert_eq!(info.publish_url, "rtmp://127.0.0.1:1935");
    }
}
