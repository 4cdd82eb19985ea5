use std::hash::{Hash, Hasher};
use std::path::PathBuf;

use chrono::{DateTime, FixedOffset, Utc};

/// The recipient account the run is archiving mail for.
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub nickname: String,
    pub gender: String,
    pub country_code: String,
    pub prefecture_id: i64,
    pub birthday: String,
    pub member_id: i64,
}

impl PartialEq for User {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for User {}

impl Hash for User {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// A sender identity as it appears in inbox summaries.
#[derive(Debug, Clone)]
pub struct Member {
    pub id: i64,
    pub name: String,
    pub image_url: String,
}

impl PartialEq for Member {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Member {}

impl Hash for Member {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// One inbox entry. Identity is the string id; received timestamps are not
/// unique across mail categories and must not be used for identity.
#[derive(Debug, Clone)]
pub struct Mail {
    pub member: Member,
    pub id: String,
    pub subject: String,
    pub content: String,
    pub received: DateTime<FixedOffset>,
    pub detail_url: String,
}

impl Mail {
    /// Birthday mail carries a `b` id prefix. Its received time does not
    /// line up with the ordinary stream.
    pub fn is_special(&self) -> bool {
        self.id.starts_with('b')
    }

    pub fn received_utc(&self) -> DateTime<Utc> {
        self.received.with_timezone(&Utc)
    }
}

impl PartialEq for Mail {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Mail {}

impl Hash for Mail {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// One page of the inbox, mails newest-first as the API returns them.
#[derive(Debug, Clone)]
pub struct Inbox {
    pub page: u32,
    pub has_next_page: bool,
    pub mails: Vec<Mail>,
}

/// A fetched remote resource (image, avatar).
#[derive(Debug, Clone)]
pub struct Asset {
    pub content_type: String,
    pub data: Vec<u8>,
}

/// A side-file discovered during composition, written at most once.
/// The path is relative to the destination root (a leading `/` is treated
/// as the destination root, not the filesystem root).
#[derive(Debug, Clone)]
pub struct Artifact {
    pub path: PathBuf,
    pub data: Vec<u8>,
}

/// Per-service constants: endpoints, bundled presentation assets and the
/// genesis watermark used when no HEAD file exists yet.
#[derive(Debug, Clone)]
pub struct Policy {
    pub bundle_id: String,
    pub api_host: String,
    pub app_host: String,
    pub mail_header: String,
    pub css: String,
    pub genesis: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn mail(id: &str) -> Mail {
        Mail {
            member: Member {
                id: 5,
                name: "Yena".into(),
                image_url: "https://cdn.example.com/5.jpg".into(),
            },
            id: id.into(),
            subject: "hi".into(),
            content: "snippet".into(),
            received: DateTime::parse_from_rfc3339("2021-04-01T12:00:00+09:00").unwrap(),
            detail_url: format!("https://app.example.com/mail/{id}"),
        }
    }

    #[test]
    fn mail_identity_is_id_only() {
        let a = mail("m1000");
        let mut b = mail("m1000");
        b.subject = "different".into();
        assert_eq!(a, b);
        assert_ne!(a, mail("m1001"));
    }

    #[test]
    fn birthday_ids_are_special() {
        assert!(mail("bm100").is_special());
        assert!(mail("b123").is_special());
        assert!(!mail("m1000").is_special());
        assert!(!mail("m9").is_special());
    }
}
