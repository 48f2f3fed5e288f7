//! Mail-source data model.
//!
//! These are the fields the core consumes from the mailbox collaborator.
//! Timestamps are naive wall-clock values in the mailbox's local time.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::util;

/// Recipient role on a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipientRole {
    #[default]
    To,
    Cc,
    Bcc,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recipient {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub role: RecipientRole,
}

impl Recipient {
    pub fn to(address: &str) -> Self {
        Self {
            name: None,
            address: Some(address.to_string()),
            role: RecipientRole::To,
        }
    }

    pub fn cc(address: &str) -> Self {
        Self {
            name: None,
            address: Some(address.to_string()),
            role: RecipientRole::Cc,
        }
    }

    /// Address when it looks like one, otherwise the display name.
    pub fn identifier(&self) -> Option<&str> {
        match (&self.address, &self.name) {
            (Some(addr), _) if addr.contains('@') => Some(addr.as_str()),
            (_, Some(name)) if !name.trim().is_empty() => Some(name.as_str()),
            (Some(addr), _) if !addr.trim().is_empty() => Some(addr.as_str()),
            _ => None,
        }
    }
}

/// Follow-up flag state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagStatus {
    #[default]
    None,
    Marked,
    Complete,
}

/// Sender-assigned importance level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Low,
    #[default]
    Normal,
    High,
}

/// One received message as reported by the mail source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MailMessage {
    /// Platform-stable message id.
    pub id: String,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub sender_address: Option<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub received_time: Option<NaiveDateTime>,
    #[serde(default)]
    pub last_modified: Option<NaiveDateTime>,
    #[serde(default)]
    pub folder_path: String,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub flag_status: FlagStatus,
    #[serde(default)]
    pub flag_due_by: Option<NaiveDateTime>,
    #[serde(default)]
    pub importance: Importance,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub recipients: Vec<Recipient>,
    /// Total recipient count when the source knows more than it lists.
    #[serde(default)]
    pub recipient_count: Option<usize>,
}

impl MailMessage {
    /// Best raw sender identifier: a valid address, else the display name.
    ///
    /// Handles `"Name <addr>"` headers delivered in either field.
    pub fn raw_sender(&self) -> Option<String> {
        if let Some(addr) = self.sender_address.as_deref() {
            let bare = util::extract_email_address(addr);
            if util::looks_like_address(&bare) {
                return Some(bare);
            }
        }
        if let Some(name) = self.sender_name.as_deref() {
            let bare = util::extract_email_address(name);
            if util::looks_like_address(&bare) {
                return Some(bare);
            }
            let trimmed = name.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        self.sender_address
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    /// A (display name, address) pair when both are present, exactly one
    /// of them holding an '@'.
    pub fn direct_pair(&self) -> Option<(String, String)> {
        let name = self.sender_name.as_deref().map(str::trim).unwrap_or("");
        let addr = self.sender_address.as_deref().map(str::trim).unwrap_or("");

        if !name.is_empty() && !addr.is_empty() {
            match (name.contains('@'), addr.contains('@')) {
                (false, true) => {
                    return Some((name.to_lowercase(), util::extract_email_address(addr)))
                }
                (true, false) => {
                    return Some((addr.to_lowercase(), util::extract_email_address(name)))
                }
                _ => {}
            }
        }

        // A single "Jane Doe <jane@x.com>" header carries both halves.
        for header in [name, addr] {
            if let Some(display) = util::extract_display_name(header) {
                let address = util::extract_email_address(header);
                if util::looks_like_address(&address) {
                    return Some((display.to_lowercase(), address));
                }
            }
        }
        None
    }

    pub fn total_recipients(&self) -> usize {
        self.recipient_count
            .unwrap_or(self.recipients.len())
            .max(self.recipients.len())
    }

    pub fn is_flagged(&self) -> bool {
        self.flag_status == FlagStatus::Marked
    }
}

/// One sent message, used only by the importance model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SentMessage {
    pub id: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body_length: usize,
    #[serde(default)]
    pub sent_on: Option<NaiveDateTime>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub recipients: Vec<Recipient>,
}

impl SentMessage {
    pub fn is_reply(&self) -> bool {
        util::is_reply_subject(&self.subject)
    }

    pub fn is_forward(&self) -> bool {
        util::is_forward_subject(&self.subject)
    }

    /// Primary ("To") recipient identifiers.
    pub fn primary_recipients(&self) -> impl Iterator<Item = &str> {
        self.recipients
            .iter()
            .filter(|r| r.role == RecipientRole::To)
            .filter_map(Recipient::identifier)
    }
}

/// Bulk history fed to the periodic identity/importance rebuild.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MailHistory {
    #[serde(default)]
    pub sent: Vec<SentMessage>,
    #[serde(default)]
    pub received: Vec<MailMessage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(name: Option<&str>, addr: Option<&str>) -> MailMessage {
        MailMessage {
            id: "m-1".to_string(),
            sender_name: name.map(str::to_string),
            sender_address: addr.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_raw_sender_prefers_valid_address() {
        let m = message(Some("John Doe"), Some("JDoe@Example.com"));
        assert_eq!(m.raw_sender().as_deref(), Some("jdoe@example.com"));
    }

    #[test]
    fn test_raw_sender_falls_back_to_name_for_exchange_paths() {
        let m = message(Some("John Doe"), Some("/O=EXCHANGE/OU=FIRST/CN=JDOE"));
        assert_eq!(m.raw_sender().as_deref(), Some("John Doe"));
    }

    #[test]
    fn test_direct_pair_from_separate_fields() {
        let m = message(Some("John Doe"), Some("jdoe@example.com"));
        assert_eq!(
            m.direct_pair(),
            Some(("john doe".to_string(), "jdoe@example.com".to_string()))
        );
    }

    #[test]
    fn test_direct_pair_from_combined_header() {
        let m = message(None, Some("\"Jane Roe\" <Jane.Roe@corp.io>"));
        assert_eq!(
            m.direct_pair(),
            Some(("jane roe".to_string(), "jane.roe@corp.io".to_string()))
        );
    }

    #[test]
    fn test_no_direct_pair_when_both_are_addresses() {
        let m = message(Some("a@x.com"), Some("b@x.com"));
        assert_eq!(m.direct_pair(), None);
    }

    #[test]
    fn test_sent_message_reply_detection() {
        let sent = SentMessage {
            id: "s".to_string(),
            subject: "RE: budget".to_string(),
            ..Default::default()
        };
        assert!(sent.is_reply());
        assert!(!sent.is_forward());
    }

    #[test]
    fn test_total_recipients_uses_larger_count() {
        let mut m = message(None, Some("a@x.com"));
        m.recipients = vec![Recipient::to("me@x.com")];
        m.recipient_count = Some(25);
        assert_eq!(m.total_recipients(), 25);
        m.recipient_count = None;
        assert_eq!(m.total_recipients(), 1);
    }
}
