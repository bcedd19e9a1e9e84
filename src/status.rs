//! Chat status taxonomy
//!
//! The closed set of outcomes a probe can end in, and the table that maps
//! Bot API error descriptions onto them. Extending the taxonomy means adding
//! a variant and a row to [`DESCRIPTION_TABLE`]; no control flow changes.

use std::fmt;

/// Identifier of a chat as the Bot API sees it
pub type ChatId = i64;

/// Terminal classification of one chat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Status {
    Ok,
    Blocked,
    Deactivated,
    NoChat,
    Kicked,
    ChatUpgraded,
    ChatDeleted,
    ChatWriteForbidden,
    PeerIdInvalid,
    NoRights,
    SupergroupNotMember,
    SupergroupKicked,
    ChannelPrivate,
    Other,
}

/// Known Bot API error descriptions, matched verbatim
pub const DESCRIPTION_TABLE: &[(&str, Status)] = &[
    ("Forbidden: bot was blocked by the user", Status::Blocked),
    ("Forbidden: user is deactivated", Status::Deactivated),
    ("Bad Request: chat not found", Status::NoChat),
    ("Forbidden: bot was kicked from the group chat", Status::Kicked),
    (
        "Bad Request: group chat was upgraded to a supergroup chat",
        Status::ChatUpgraded,
    ),
    ("Forbidden: the group chat was deleted", Status::ChatDeleted),
    ("Bad Request: CHAT_WRITE_FORBIDDEN", Status::ChatWriteForbidden),
    ("Bad Request: PEER_ID_INVALID", Status::PeerIdInvalid),
    ("Bad Request: have no rights to send a message", Status::NoRights),
    (
        "Forbidden: bot is not a member of the supergroup chat",
        Status::SupergroupNotMember,
    ),
    (
        "Forbidden: bot was kicked from the supergroup chat",
        Status::SupergroupKicked,
    ),
    ("Bad Request: CHANNEL_PRIVATE", Status::ChannelPrivate),
];

impl Status {
    /// Every status, in dashboard order
    pub const ALL: [Status; 14] = [
        Status::Ok,
        Status::Blocked,
        Status::Deactivated,
        Status::NoChat,
        Status::Kicked,
        Status::ChatUpgraded,
        Status::ChatDeleted,
        Status::ChatWriteForbidden,
        Status::PeerIdInvalid,
        Status::NoRights,
        Status::SupergroupNotMember,
        Status::SupergroupKicked,
        Status::ChannelPrivate,
        Status::Other,
    ];

    /// Look up a remote error description; `None` if it is not in the table
    pub fn from_description(description: &str) -> Option<Status> {
        DESCRIPTION_TABLE
            .iter()
            .find(|(text, _)| *text == description)
            .map(|(_, status)| *status)
    }

    /// Status under which this one is counted on the dashboard
    ///
    /// Supergroup kicks are reported together with group kicks.
    pub fn display_group(self) -> Status {
        match self {
            Status::SupergroupKicked => Status::Kicked,
            other => other,
        }
    }

    /// Dashboard label
    pub fn label(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Blocked => "BLOCKED",
            Status::Deactivated => "DEACTIVATED",
            Status::NoChat => "NO_CHAT",
            Status::Kicked => "KICKED",
            Status::ChatUpgraded => "UPGRADED",
            Status::ChatDeleted => "DELETED",
            Status::ChatWriteForbidden => "WRITE_FORBIDDEN",
            Status::PeerIdInvalid => "PEER_ID_INVALID",
            Status::NoRights => "NO_RIGHTS",
            Status::SupergroupNotMember => "SG_NO_MEMBER",
            Status::SupergroupKicked => "SG_KICKED",
            Status::ChannelPrivate => "CHANNEL_PRIVATE",
            Status::Other => "OTHER",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
