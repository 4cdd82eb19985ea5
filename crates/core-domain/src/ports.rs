use async_trait::async_trait;
use mailshelter_error::ShelterError;

use crate::entities::{Asset, Inbox, Mail, User};

/// Boundary to the remote mail service. The production implementation lives
/// in `mailshelter-api`; tests substitute in-memory fakes.
#[async_trait]
pub trait MailPort: Send + Sync {
    /// Validates the profile and returns the recipient identity.
    async fn get_user(&self) -> Result<User, ShelterError>;

    /// One page of the inbox, mails newest-first. Pages start at 1.
    async fn get_inbox(&self, page: u32) -> Result<Inbox, ShelterError>;

    /// The full HTML body of one mail.
    async fn get_mail_detail(&self, mail: &Mail) -> Result<String, ShelterError>;

    /// An auxiliary resource (image, avatar) by absolute URL.
    async fn get_asset(&self, url: &str) -> Result<Asset, ShelterError>;
}
