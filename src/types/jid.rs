use std::fmt;
use std::str::FromStr;

/// Server for regular user accounts.
pub const DEFAULT_USER_SERVER: &str = "s.whatsapp.net";
pub const GROUP_SERVER: &str = "g.us";

/// Turn a recipient into a fully qualified address.
///
/// Anything that already names a server (contains `@`) is returned verbatim;
/// a bare phone number is placed on the default user server.
pub fn qualify(recipient: &str) -> String {
    if recipient.contains('@') {
        recipient.to_string()
    } else {
        format!("{recipient}@{DEFAULT_USER_SERVER}")
    }
}

/// JID represents a WhatsApp user/entity ID (user@server or AD-JID).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Jid {
    pub user: String,
    pub raw_agent: u8,
    pub device: u16,
    pub server: String,
}

impl Jid {
    /// New regular JID (user@server).
    pub fn new(user: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            raw_agent: 0,
            device: 0,
            server: server.into(),
        }
    }

    /// New AD-JID (user.agent:device@server) for device-specific addressing.
    pub fn new_ad(
        user: impl Into<String>,
        agent: u8,
        device: u16,
        server: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            raw_agent: agent,
            device,
            server: server.into(),
        }
    }

    /// Server JID (no user).
    pub fn server(server: impl Into<String>) -> Self {
        Self::new("", server)
    }

    /// JID without agent/device (regular user@server).
    pub fn to_non_ad(&self) -> Self {
        Self::new(self.user.clone(), self.server.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.server.is_empty()
    }

    /// Group chats name the actual author in a separate `participant` attribute.
    pub fn is_group(&self) -> bool {
        self.server == GROUP_SERVER
    }
}

impl FromStr for Jid {
    type Err = JidParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('@').collect();
        if parts.len() == 1 {
            return Ok(Self::server(parts[0]));
        }
        if parts.len() != 2 || parts[1].is_empty() {
            return Err(JidParseError);
        }
        let mut jid = Self::new(parts[0], parts[1]);
        if let Some((user, rest)) = parts[0].split_once('.') {
            jid.user = user.to_string();
            let (agent, device) = match rest.split_once(':') {
                Some((a, d)) => (a, Some(d)),
                None => (rest, None),
            };
            jid.raw_agent = agent.parse().map_err(|_| JidParseError)?;
            if let Some(d) = device {
                jid.device = d.parse().map_err(|_| JidParseError)?;
            }
        } else if let Some((user, device)) = parts[0].split_once(':') {
            jid.user = user.to_string();
            jid.device = device.parse().map_err(|_| JidParseError)?;
        }
        Ok(jid)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct JidParseError;

impl fmt::Display for JidParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid JID format")
    }
}

impl std::error::Error for JidParseError {}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.raw_agent > 0 {
            write!(
                f,
                "{}.{}:{}@{}",
                self.user, self.raw_agent, self.device, self.server
            )
        } else if self.device > 0 {
            write!(f, "{}:{}@{}", self.user, self.device, self.server)
        } else if !self.user.is_empty() {
            write!(f, "{}@{}", self.user, self.server)
        } else {
            write!(f, "{}", self.server)
        }
    }
}

impl serde::Serialize for Jid {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for Jid {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Jid::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jid_new_and_display() {
        let j = Jid::new("123456789", DEFAULT_USER_SERVER);
        assert_eq!(j.to_string(), "123456789@s.whatsapp.net");
        assert!(!j.is_empty());
        assert!(!j.is_group());
    }

    #[test]
    fn jid_parse_group() {
        let j: Jid = "120363025246125486@g.us".parse().unwrap();
        assert_eq!(j.user, "120363025246125486");
        assert!(j.is_group());
        assert_eq!(j.to_string(), "120363025246125486@g.us");
    }

    #[test]
    fn jid_parse_server_only() {
        let j: Jid = "g.us".parse().unwrap();
        assert_eq!(j.user, "");
        assert_eq!(j.to_string(), "g.us");
    }

    #[test]
    fn jid_with_device() {
        let j: Jid = "123:7@s.whatsapp.net".parse().unwrap();
        assert_eq!(j.user, "123");
        assert_eq!(j.device, 7);
        assert_eq!(j.to_non_ad().to_string(), "123@s.whatsapp.net");
    }

    #[test]
    fn jid_with_agent_and_device() {
        let j: Jid = "123.1:2@lid".parse().unwrap();
        assert_eq!((j.raw_agent, j.device), (1, 2));
        assert_eq!(j.to_string(), "123.1:2@lid");
    }

    #[test]
    fn jid_rejects_double_at() {
        assert!("a@b@c".parse::<Jid>().is_err());
        assert!("123@".parse::<Jid>().is_err());
    }

    #[test]
    fn qualify_appends_default_server() {
        assert_eq!(qualify("5511999999999"), "5511999999999@s.whatsapp.net");
    }

    #[test]
    fn qualify_keeps_qualified_addresses_verbatim() {
        for addr in [
            "5511999999999@s.whatsapp.net",
            "120363025246125486@g.us",
            "5511999999999:3@s.whatsapp.net",
            "5511999999999:0@s.whatsapp.net",
            "5511.0@s.whatsapp.net",
            "john.doe@s.whatsapp.net",
            "@s.whatsapp.net",
            "a@b@c",
            "status@broadcast",
        ] {
            assert_eq!(qualify(addr), addr);
        }
    }

    #[test]
    fn jid_serde_as_string() {
        let j = Jid::new("42", DEFAULT_USER_SERVER);
        let json = serde_json::to_string(&j).unwrap();
        assert_eq!(json, "\"42@s.whatsapp.net\"");
        let back: Jid = serde_json::from_str(&json).unwrap();
        assert_eq!(back, j);
    }
}
