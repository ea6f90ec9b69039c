/// Wire envelope version. The first byte after the 4-byte length prefix.
/// Bump whenever a breaking change is made to any borsh-serialized wire type.
pub const WIRE_VERSION: u8 = 1;

/// Protocol id for authenticated application sessions.
pub const SESSION_PROTOCOL: &str = "/skein/session/1.0.0";

/// Protocol id for the peer-exchange (discovery) channel.
pub const PX_PROTOCOL: &str = "/skein/px/1.0.0";
