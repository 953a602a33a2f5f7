/// Application name
pub const APP_NAME: &str = "Palaver";

/// How long the word-filter cache stays fresh before a reload (seconds)
pub const FILTER_CACHE_TTL_SECS: u64 = 300;

/// Auth token validity in days
pub const TOKEN_VALIDITY_DAYS: i64 = 7;

/// AI collaborator request timeout (seconds)
pub const ASSISTANT_TIMEOUT_SECS: u64 = 35;

/// Prefix that routes a message to the AI collaborator
pub const ASSISTANT_PREFIX: &str = "/chat ";

/// Default number of history messages returned on channel switch
pub const DEFAULT_HISTORY_LIMIT: u32 = 100;

/// Username length bounds
pub const USERNAME_MIN_LEN: usize = 2;
pub const USERNAME_MAX_LEN: usize = 20;

/// Minimum password length
pub const PASSWORD_MIN_LEN: usize = 6;

/// Channel name length bounds
pub const CHANNEL_NAME_MIN_LEN: usize = 2;
pub const CHANNEL_NAME_MAX_LEN: usize = 50;

/// Maximum channel description length
pub const CHANNEL_DESC_MAX_LEN: usize = 200;

/// Default channel icon (Phosphor icon name)
pub const DEFAULT_CHANNEL_ICON: &str = "ph-hash";
