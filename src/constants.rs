// API Versions
pub const FACEBOOK_API_VERSION: &str = "v22.0";

// API Base URLs
pub const FACEBOOK_BASE_URL: &str = "https://graph.facebook.com";

// Transport
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

// Server identity reported on `initialize`
pub const SERVER_NAME: &str = "meta-ads-mcp-server";
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

// Custom audiences
pub const AUDIENCE_SUBTYPE: &str = "CUSTOM";
pub const CUSTOMER_FILE_SOURCE: &str = "USER_PROVIDED_ONLY";
pub const PHONE_HASH_SCHEMA: &str = "PHONE_SHA256";
pub const HASH_CSV_HEADER: &str = "mobile_number_hash";
pub const AUDIENCE_NAME_MAX_CHARS: usize = 100;

// Campaign chain
pub const INITIAL_STATUS: &str = "PAUSED";
pub const BILLING_EVENT: &str = "IMPRESSIONS";
pub const SPECIAL_AD_CATEGORY_NONE: &str = "NONE";
pub const MINOR_UNITS_PER_MAJOR: f64 = 100.0;

// Accepted by `start_time` / `end_time`
pub const GRAPH_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";
