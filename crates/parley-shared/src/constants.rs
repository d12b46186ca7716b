/// Separator between the two participant ids of a conversation key.
pub const KEY_DELIMITER: char = '_';

/// Separator between store path segments.
pub const PATH_SEPARATOR: char = '/';

/// Root of the per-conversation message logs.
pub const CHATS_ROOT: &str = "chats";

/// Root of the per-conversation, per-recipient unread counters.
pub const UNREADS_ROOT: &str = "unreads";

/// Root of the per-user presence flags.
pub const CONNECTION_STATUS_ROOT: &str = "connectionStatus";
