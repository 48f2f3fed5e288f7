//! Shared constants for identity resolution, scoring and recommendation.

/// Business-day start hour (24h). Mail received earlier counts as off-hours.
pub const BUSINESS_DAY_START_HOUR: u32 = 8;

/// Business-day end hour (24h). Mail received at or after this hour counts as off-hours.
pub const BUSINESS_DAY_END_HOUR: u32 = 18;

/// Senders matching any of these are never used for fuzzy alias inference.
pub const SYSTEM_SENDER_PATTERNS: &[&str] = &[
    "noreply",
    "no-reply",
    "donotreply",
    "system",
    "notification",
    "alert",
];

/// Identity used when a message carries no sender at all.
pub const UNKNOWN_CONTACT: &str = "unknown";

// ---------------------------------------------------------------------------
// Alias scoring
// ---------------------------------------------------------------------------

/// Fragments shorter than this are ignored (`len > 2`).
pub const MIN_FRAGMENT_LEN: usize = 3;

/// A name fragment found verbatim in the local-part (and vice versa).
pub const FRAGMENT_DIRECT_POINTS: u32 = 2;

/// A fragment that only overlaps partially.
pub const FRAGMENT_PARTIAL_POINTS: u32 = 1;

/// Concatenated name fragments equal the separator-stripped local-part.
pub const FULL_NAME_POINTS: u32 = 5;

/// `jdoe@...` for "John Doe".
pub const INITIAL_LAST_NAME_POINTS: u32 = 4;

/// Minimum score to accept an inferred alias. Deliberately permissive.
pub const ALIAS_ACCEPT_FLOOR: u32 = 1;

// ---------------------------------------------------------------------------
// Importance model
// ---------------------------------------------------------------------------

/// Score given to the single qualifying contact when the raw range is zero.
pub const SINGLE_CONTACT_SCORE: f64 = 0.6;

/// Score given to every contact when several share one raw score.
pub const FLAT_RANGE_SCORE: f64 = 0.5;

/// Reply bodies at or above this length earn the full length credit.
pub const REPLY_LENGTH_SATURATION: f64 = 500.0;

// ---------------------------------------------------------------------------
// Scoring engine
// ---------------------------------------------------------------------------

/// Neutral value used for unknown senders, categories and components.
pub const NEUTRAL_SCORE: f64 = 0.5;

/// Cap on the repeated-ignore penalty.
pub const MAX_IGNORE_PENALTY: f64 = 0.4;

/// Bonus for a message in an active conversation.
pub const CONVERSATION_BONUS: f64 = 0.05;

/// Bonus added to the urgency score when action items are present.
pub const ACTION_ITEM_URGENCY_BOOST: f64 = 0.1;

/// Age assumed for a message without a received time.
pub const MISSING_RECEIVED_AGE_DAYS: i64 = 365;

/// Recipient count at or below which a To: message counts as personal.
pub const DIRECT_RECIPIENT_LIMIT: usize = 3;

/// Recipient count above which a message counts as a mass mailing.
pub const MASS_RECIPIENT_LIMIT: usize = 10;

// ---------------------------------------------------------------------------
// Folders
// ---------------------------------------------------------------------------

pub const FOLDER_DUE_TODAY: &str = "Due Today";
pub const FOLDER_HIGH_PRIORITY: &str = "High Priority";
pub const FOLDER_IMPORTANT: &str = "Important";
pub const FOLDER_MEDIUM_PRIORITY: &str = "Medium Priority";
pub const FOLDER_ACTION_REQUIRED: &str = "Action Required";
pub const FOLDER_GENERAL: &str = "General";
pub const ARCHIVE_PREFIX: &str = "Archive";

/// Folders that action items may not override.
pub const PRIORITY_FOLDERS: &[&str] = &[
    FOLDER_HIGH_PRIORITY,
    FOLDER_MEDIUM_PRIORITY,
    FOLDER_DUE_TODAY,
    FOLDER_IMPORTANT,
];

/// Default folders that carry little signal and yield to "Action Required".
pub const LOW_SIGNAL_FOLDERS: &[&str] = &["General", "Newsletter", "Promotional", "Transactional"];

/// Suggested folder names too vague to be useful.
pub const GENERIC_FOLDER_NAMES: &[&str] = &["miscellaneous", "general", "updates", "emails"];

/// Maximum length of a suggested sub-folder name.
pub const MAX_FOLDER_NAME_LEN: usize = 50;
