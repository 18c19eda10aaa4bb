//! IP allow-lists for publish and play authorization

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

const ANY: [&str; 2] = ["*", "all"];
const LOCAL: [&str; 2] = ["local", "localhost"];

/// A set of IP addresses or aliases allowed to publish or play
///
/// Entries are IP literals or one of the aliases `*`/`all` (any peer) and
/// `local`/`localhost` (loopback, v4-mapped v6 included).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AllowType {
    entries: Vec<String>,
}

impl AllowType {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(Into::into)
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    /// Allows every peer
    pub fn all() -> Self {
        Self::new(["*", "all", "0.0.0.0"])
    }

    /// Allows loopback peers only
    pub fn local() -> Self {
        Self::new(["local", "localhost", "127.0.0.1", "::1", "::ffff:127.0.0.1"])
    }

    /// Allows nobody
    pub fn none() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn check(&self, ip: IpAddr) -> bool {
        let ip = ip.to_canonical();
        self.entries.iter().any(|entry| {
            let name = entry.to_ascii_lowercase();
            if ANY.contains(&name.as_str()) {
                return true;
            }
            if LOCAL.contains(&name.as_str()) {
                return ip.is_loopback();
            }
            match name.parse::<IpAddr>() {
                Ok(allowed) => allowed.to_canonical() == ip,
                Err(_) => name == ip.to_string(),
            }
        })
    }
}

impl FromStr for AllowType {
    type Err = std::convert::Infallible;

    /// Comma-separated entries
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s.split(',')))
    }
}

impl From<&str> for AllowType {
    fn from(s: &str) -> Self {
        Self::new(s.split(','))
    }
}

impl From<Vec<String>> for AllowType {
    fn from(entries: Vec<String>) -> Self {
        Self::new(entries)
    }
}

impl fmt::Display for AllowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.entries.join(","))
    }
}
