//! Channel mode and lifecycle state.

use std::fmt;

/// Whether a channel runs over plain TCP or TLS.
///
/// The mode is chosen once, when the channel is constructed, and never
/// changes afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChannelMode {
    /// `ws://` over plain TCP.
    #[default]
    Plain,
    /// `wss://` over TLS.
    Secure,
}

impl ChannelMode {
    /// The only URL scheme this mode accepts.
    pub fn scheme(self) -> &'static str {
        match self {
            Self::Plain => "ws",
            Self::Secure => "wss",
        }
    }

    /// Returns true if `scheme` matches this mode (case-insensitive).
    pub fn accepts_scheme(self, scheme: &str) -> bool {
        scheme.eq_ignore_ascii_case(self.scheme())
    }

    /// Returns the mode name as a string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Secure => "secure",
        }
    }
}

impl fmt::Display for ChannelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a client channel.
///
/// ```text
/// Idle ──connect──▶ Connecting ──ok──▶ Connected
///  ▲                    │                  │
///  └──────failure───────┘◀──reconnect──────┤
///  └─────────────────peer close────────────┘
/// ```
///
/// `Closed` is terminal and reachable from every state through `close`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChannelState {
    /// No connection and no attempt outstanding.
    #[default]
    Idle,
    /// A connect attempt is outstanding.
    Connecting,
    /// A connection is established.
    Connected,
    /// The session has been released.
    Closed,
}

impl ChannelState {
    /// Returns the state name as a string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
