use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use mailshelter_compose::MailComposer;
use mailshelter_domain::{Mail, MailPort, User};
use mailshelter_error::ShelterError;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

/// Ids of mails whose processing fully settled. Shared with the caller so
/// the finalize step can still see progress when the run future is dropped
/// by an interruption.
pub type DoneSet = Arc<Mutex<HashSet<String>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailOutcome {
    Downloaded,
    /// Destination file already existed; treated as committed without a fetch.
    Skipped,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RunSummary {
    pub total: usize,
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn complete(&self) -> bool {
        self.downloaded + self.skipped == self.total
    }
}

/// Bounded worker pool driving `fetch detail → compose` for the oldest-first
/// mail list. Completion order is unconstrained; the prefix rule in
/// [`crate::SyncState::finalize`] is what keeps durable state gap-free.
pub struct Runner {
    port: Arc<dyn MailPort>,
    composer: Arc<MailComposer>,
    max_workers: usize,
}

impl Runner {
    pub fn new(port: Arc<dyn MailPort>, composer: Arc<MailComposer>, max_workers: usize) -> Self {
        Self {
            port,
            composer,
            max_workers: max_workers.max(1),
        }
    }

    /// Process all mails, up to `max_workers` in flight at once. The first
    /// failure stops further submission; tasks already in flight drain
    /// before the summary is returned.
    pub async fn run(&self, recipient: &User, mails: &[Mail], done: &DoneSet) -> RunSummary {
        let mut summary = RunSummary {
            total: mails.len(),
            ..RunSummary::default()
        };
        let mut queue = mails.iter().cloned();
        let mut tasks: JoinSet<Result<(String, MailOutcome), (String, ShelterError)>> =
            JoinSet::new();
        let mut halted = false;

        loop {
            while !halted && tasks.len() < self.max_workers {
                let Some(mail) = queue.next() else { break };
                let port = Arc::clone(&self.port);
                let composer = Arc::clone(&self.composer);
                let recipient = recipient.clone();
                tasks.spawn(async move {
                    process_mail(&port, &composer, &recipient, mail).await
                });
            }

            match tasks.join_next().await {
                None => break,
                Some(Ok(Ok((mail_id, outcome)))) => {
                    mark_done(done, mail_id);
                    match outcome {
                        MailOutcome::Downloaded => summary.downloaded += 1,
                        MailOutcome::Skipped => summary.skipped += 1,
                    }
                }
                Some(Ok(Err((mail_id, e)))) => {
                    warn!(mail_id, error = %e, "mail failed; draining in-flight work");
                    summary.failed += 1;
                    halted = true;
                }
                Some(Err(e)) => {
                    error!(error = %e, "worker panicked; draining in-flight work");
                    summary.failed += 1;
                    halted = true;
                }
            }
        }

        summary
    }
}

async fn process_mail(
    port: &Arc<dyn MailPort>,
    composer: &MailComposer,
    recipient: &User,
    mail: Mail,
) -> Result<(String, MailOutcome), (String, ShelterError)> {
    let file = composer.mail_file(&mail);
    if file.is_file() {
        debug!(mail_id = %mail.id, file = %file.display(), "already on disk, skipping");
        return Ok((mail.id, MailOutcome::Skipped));
    }

    let body = port
        .get_mail_detail(&mail)
        .await
        .map_err(|e| (mail.id.clone(), e))?;
    composer
        .compose(recipient, &mail, &body, port)
        .await
        .map_err(|e| (mail.id.clone(), e))?;
    Ok((mail.id, MailOutcome::Downloaded))
}

fn mark_done(done: &DoneSet, mail_id: String) {
    done.lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .insert(mail_id);
}
