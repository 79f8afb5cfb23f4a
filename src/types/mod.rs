mod jid;

pub use jid::{qualify, Jid, JidParseError, DEFAULT_USER_SERVER, GROUP_SERVER};

/// Message ID type (WhatsApp internal ID string).
pub type MessageId = String;
