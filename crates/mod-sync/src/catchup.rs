use mailshelter_domain::{Mail, MailPort};
use mailshelter_error::ShelterError;
use tracing::{debug, info};

use crate::state::SyncState;

/// Walk the inbox newest-first until a mail already in INDEX turns up (or
/// pages run out) and return the strictly-new mails oldest-first. Id-set
/// membership is the catch-up rule: received timestamps collide across mail
/// categories and cannot be trusted for this.
///
/// A page fetch failure propagates immediately; no mail from a failed page
/// is considered seen and state is left untouched.
pub async fn collect_new_mails(
    port: &dyn MailPort,
    state: &SyncState,
) -> Result<Vec<Mail>, ShelterError> {
    let mut new_mails = Vec::new();
    let mut caught_up = false;
    let mut page = 1u32;

    loop {
        let inbox = port.get_inbox(page).await?;
        debug!(page, mails = inbox.mails.len(), has_next = inbox.has_next_page, "inbox page");
        for mail in inbox.mails {
            if state.contains(&mail.id) {
                caught_up = true;
                break;
            }
            info!(
                mail_id = %mail.id,
                sender = %mail.member.name,
                subject = %mail.subject,
                received = %mail.received.to_rfc3339(),
                special = mail.is_special(),
                "found new mail"
            );
            new_mails.push(mail);
        }
        if caught_up || !inbox.has_next_page {
            break;
        }
        page += 1;
    }

    // Oldest first, so a crash can only ever leave a contiguous prefix behind.
    new_mails.reverse();
    Ok(new_mails)
}
