use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use kuchikiki::NodeRef;
use mailshelter_domain::{Artifact, Asset, Mail, MailPort, User};
use mailshelter_error::ShelterError;
use tracing::{debug, trace};
use url::Url;

use crate::commands::Command;
use crate::dom;
use crate::pathutil::{naive_join, render_mail_path};

/// Per-mail context threaded through the pipeline: the recipient, the mail
/// header, the mutable document, the destination path, the prefetched
/// resources and the artifacts discovered so far. Created fresh for every
/// mail and discarded once its artifacts are flushed.
pub struct ComposerPayload {
    pub recipient: User,
    pub header: Mail,
    pub doc: NodeRef,
    pub path: PathBuf,
    pub assets: HashMap<String, Asset>,
    pub artifacts: Vec<Artifact>,
}

/// Runs the ordered command pipeline over each mail and writes the resulting
/// artifacts exactly once. Configured once per run; shared across workers.
pub struct MailComposer {
    destination: PathBuf,
    mail_path_fmt: String,
    commands: Vec<Box<dyn Command>>,
}

impl MailComposer {
    pub fn new(destination: impl Into<PathBuf>, mail_path_fmt: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            mail_path_fmt: mail_path_fmt.into(),
            commands: Vec::new(),
        }
    }

    pub fn push(mut self, command: impl Command + 'static) -> Self {
        self.commands.push(Box::new(command));
        self
    }

    /// Destination-relative path of one mail, from the configured template.
    pub fn mail_path(&self, mail: &Mail) -> PathBuf {
        render_mail_path(&self.mail_path_fmt, mail)
    }

    /// Absolute (destination-rooted) file the mail will be written to.
    pub fn mail_file(&self, mail: &Mail) -> PathBuf {
        naive_join(&self.destination, &self.mail_path(mail))
    }

    /// Parse the raw body, prefetch every remote resource the pipeline will
    /// touch, run the commands in order and flush the collected artifacts.
    /// Nothing is written to disk unless the whole pipeline succeeded.
    pub async fn compose(
        &self,
        recipient: &User,
        mail: &Mail,
        body: &str,
        port: &Arc<dyn MailPort>,
    ) -> Result<Vec<u8>, ShelterError> {
        let wanted = scan_resource_urls(body, mail)?;
        let mut assets = HashMap::with_capacity(wanted.len());
        for url in wanted {
            let asset = port.get_asset(&url).await?;
            trace!(mail_id = %mail.id, url, bytes = asset.data.len(), "fetched resource");
            assets.insert(url, asset);
        }

        let (document, artifacts) = self.run_pipeline(recipient, mail, body, assets)?;
        let written = self.flush_artifacts(&artifacts)?;
        debug!(mail_id = %mail.id, artifacts = artifacts.len(), written, "composed");
        Ok(document)
    }

    /// The synchronous transform pass. The document tree is not thread-safe,
    /// so it must never live across an await point; everything network has
    /// already happened by the time this runs.
    fn run_pipeline(
        &self,
        recipient: &User,
        mail: &Mail,
        body: &str,
        assets: HashMap<String, Asset>,
    ) -> Result<(Vec<u8>, Vec<Artifact>), ShelterError> {
        let mut payload = ComposerPayload {
            recipient: recipient.clone(),
            header: mail.clone(),
            doc: dom::parse(body),
            path: self.mail_path(mail),
            assets,
            artifacts: Vec::new(),
        };
        for command in &self.commands {
            trace!(mail_id = %mail.id, command = command.name(), "executing");
            command.execute(&mut payload)?;
        }
        let document = dom::serialize(&payload.doc)?;
        Ok((document, payload.artifacts))
    }

    /// Write each artifact under the destination root unless a file already
    /// exists there. Workers race on shared artifacts without locks, so a
    /// loser of the create race treats `AlreadyExists` as success.
    fn flush_artifacts(&self, artifacts: &[Artifact]) -> Result<usize, ShelterError> {
        let mut written = 0;
        for artifact in artifacts {
            let target = naive_join(&self.destination, &artifact.path);
            if target.is_file() {
                continue;
            }
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| {
                    ShelterError::storage(format!("create {}: {e}", parent.display()))
                })?;
            }
            match OpenOptions::new().write(true).create_new(true).open(&target) {
                Ok(mut file) => {
                    file.write_all(&artifact.data).map_err(|e| {
                        ShelterError::storage(format!("write {}: {e}", target.display()))
                    })?;
                    written += 1;
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
                Err(e) => {
                    return Err(ShelterError::storage(format!(
                        "create {}: {e}",
                        target.display()
                    )))
                }
            }
        }
        Ok(written)
    }
}

/// Every remote resource the pipeline will need for this mail: non-data-URI
/// image sources plus the sender avatar, resolved against the detail URL.
fn scan_resource_urls(body: &str, mail: &Mail) -> Result<Vec<String>, ShelterError> {
    let base = Url::parse(&mail.detail_url).map_err(|e| {
        ShelterError::compose(format!(
            "mail {}: bad detail url '{}': {e}",
            mail.id, mail.detail_url
        ))
    })?;
    let doc = dom::parse(body);
    let mut urls: Vec<String> = Vec::new();
    let images = doc
        .select("img")
        .map_err(|_| ShelterError::compose("invalid selector 'img'"))?;
    for image in images {
        let attrs = image.attributes.borrow();
        if let Some(src) = attrs.get("src") {
            if src.is_empty() || src.starts_with("data:") {
                continue;
            }
            let resolved = base
                .join(src)
                .map_err(|e| ShelterError::compose(format!("bad image url '{src}': {e}")))?;
            let resolved = String::from(resolved);
            if !urls.contains(&resolved) {
                urls.push(resolved);
            }
        }
    }
    if !mail.member.image_url.is_empty() {
        let avatar = base.join(&mail.member.image_url).map_err(|e| {
            ShelterError::compose(format!("bad avatar url '{}': {e}", mail.member.image_url))
        })?;
        let avatar = String::from(avatar);
        if !urls.contains(&avatar) {
            urls.push(avatar);
        }
    }
    Ok(urls)
}
