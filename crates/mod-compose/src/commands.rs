use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use mailshelter_domain::Artifact;
use mailshelter_error::ShelterError;
use url::Url;

use crate::composer::ComposerPayload;
use crate::dom;
use crate::pathutil::{naive_join, relative_href, url_tail};

/// One rewrite step of the transform pipeline. Commands mutate the payload's
/// document and artifact list in place; configuration is bound at
/// construction, once per run. Steps must be idempotent for a given input
/// document but may rely on the pipeline order documented on each type.
pub trait Command: Send + Sync {
    fn name(&self) -> &'static str;

    fn execute(&self, payload: &mut ComposerPayload) -> Result<(), ShelterError>;
}

/// Drop every `<meta>` tag. Runs before [`InsertAppMetadata`] so no foreign
/// metadata survives into the archived document.
pub struct RemoveAllMetaTags;

impl Command for RemoveAllMetaTags {
    fn name(&self) -> &'static str {
        "remove-meta"
    }

    fn execute(&self, payload: &mut ComposerPayload) -> Result<(), ShelterError> {
        dom::remove_all(&payload.doc, "meta")?;
        Ok(())
    }
}

/// Charset, viewport and the application's own `mailshelter:*` metadata.
pub struct InsertAppMetadata {
    app_name: String,
    app_version: String,
}

impl InsertAppMetadata {
    pub fn new(app_name: impl Into<String>, app_version: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            app_version: app_version.into(),
        }
    }
}

impl Command for InsertAppMetadata {
    fn name(&self) -> &'static str {
        "insert-metadata"
    }

    fn execute(&self, payload: &mut ComposerPayload) -> Result<(), ShelterError> {
        let head = dom::head(&payload.doc)?;
        head.append(dom::new_element("meta", [("charset", "utf-8".to_string())]));
        head.append(dom::new_element(
            "meta",
            [
                ("name", "viewport".to_string()),
                ("content", "width=device-width, initial-scale=1".to_string()),
            ],
        ));
        let mail = &payload.header;
        let metas = [
            ("mailshelter:application-name", self.app_name.clone()),
            ("mailshelter:application-version", self.app_version.clone()),
            ("mailshelter:mail-id", mail.id.clone()),
            ("mailshelter:subject", mail.subject.clone()),
            ("mailshelter:content", mail.content.clone()),
            ("mailshelter:received", mail.received.to_rfc3339()),
        ];
        for (name, content) in metas {
            head.append(dom::new_element(
                "meta",
                [("name", name.to_string()), ("content", content)],
            ));
        }
        Ok(())
    }
}

/// Drop stylesheet links and inline `<style>` blocks.
pub struct RemoveAllStyleSheet;

impl Command for RemoveAllStyleSheet {
    fn name(&self) -> &'static str {
        "remove-stylesheets"
    }

    fn execute(&self, payload: &mut ComposerPayload) -> Result<(), ShelterError> {
        dom::remove_all(&payload.doc, r#"link[rel="stylesheet"]"#)?;
        dom::remove_all(&payload.doc, "style")?;
        Ok(())
    }
}

/// Attach the bundled stylesheet: as a shared artifact linked relatively when
/// a root is configured, inline otherwise. Must run after
/// [`RemoveAllStyleSheet`].
pub struct DumpStyleSheet {
    css: String,
    root: Option<PathBuf>,
}

impl DumpStyleSheet {
    pub fn new(css: impl Into<String>, root: Option<PathBuf>) -> Self {
        Self {
            css: css.into(),
            root,
        }
    }
}

impl Command for DumpStyleSheet {
    fn name(&self) -> &'static str {
        "dump-stylesheet"
    }

    fn execute(&self, payload: &mut ComposerPayload) -> Result<(), ShelterError> {
        let head = dom::head(&payload.doc)?;
        match &self.root {
            Some(root) => {
                let artifact_path = root.join("mail.css");
                let href = relative_href(&payload.path, &artifact_path);
                payload.artifacts.push(Artifact {
                    path: artifact_path,
                    data: self.css.clone().into_bytes(),
                });
                head.append(dom::new_element(
                    "link",
                    [("rel", "stylesheet".to_string()), ("href", href)],
                ));
            }
            None => {
                let style = dom::new_element("style", Vec::new());
                style.append(kuchikiki::NodeRef::new_text(self.css.clone()));
                head.append(style);
            }
        }
        Ok(())
    }
}

/// Drop every `<script>` tag.
pub struct RemoveAllJs;

impl Command for RemoveAllJs {
    fn name(&self) -> &'static str {
        "remove-scripts"
    }

    fn execute(&self, payload: &mut ComposerPayload) -> Result<(), ShelterError> {
        dom::remove_all(&payload.doc, "script")?;
        Ok(())
    }
}

/// Rewrite every remote `<img src>` to a local artifact or a data URI. The
/// bytes were prefetched by the composer; a missing entry here means the
/// document changed between scan and transform and is an error.
pub struct DumpAllImages {
    root: Option<PathBuf>,
}

impl DumpAllImages {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }
}

impl Command for DumpAllImages {
    fn name(&self) -> &'static str {
        "dump-images"
    }

    fn execute(&self, payload: &mut ComposerPayload) -> Result<(), ShelterError> {
        let base = detail_base(payload)?;
        let doc = payload.doc.clone();
        let images: Vec<_> = doc
            .select("img")
            .map_err(|_| ShelterError::compose("invalid selector 'img'"))?
            .collect();
        for image in images {
            let src = {
                let attrs = image.attributes.borrow();
                match attrs.get("src") {
                    Some(s) if !s.is_empty() && !s.starts_with("data:") => s.to_string(),
                    _ => continue,
                }
            };
            let resolved = base
                .join(&src)
                .map_err(|e| ShelterError::compose(format!("bad image url '{src}': {e}")))?;
            let new_src = rewrite_resource(payload, &resolved, self.root.as_deref())?;
            image.attributes.borrow_mut().insert("src", new_src);
        }
        Ok(())
    }
}

/// Build the mail header block (avatar, sender, received time, recipient,
/// subject) and insert it before the main content element. The avatar is
/// dumped or embedded exactly like a body image, under its own root.
pub struct InsertMailHeader {
    template: String,
    root: Option<PathBuf>,
}

impl InsertMailHeader {
    pub fn new(template: impl Into<String>, root: Option<PathBuf>) -> Self {
        Self {
            template: template.into(),
            root,
        }
    }
}

impl Command for InsertMailHeader {
    fn name(&self) -> &'static str {
        "insert-header"
    }

    fn execute(&self, payload: &mut ComposerPayload) -> Result<(), ShelterError> {
        let avatar_src = if payload.header.member.image_url.is_empty() {
            String::new()
        } else {
            let base = detail_base(payload)?;
            let resolved = base.join(&payload.header.member.image_url).map_err(|e| {
                ShelterError::compose(format!(
                    "bad avatar url '{}': {e}",
                    payload.header.member.image_url
                ))
            })?;
            rewrite_resource(payload, &resolved, self.root.as_deref())?
        };

        let mail = &payload.header;
        let html = self
            .template
            .replacen("{member_image}", &avatar_src, 1)
            .replacen("{sender}", &mail.member.name, 1)
            .replacen("{received}", &mail.received.format("%Y/%m/%d %H:%M").to_string(), 1)
            .replacen("{recipient}", &payload.recipient.nickname, 1)
            .replacen("{subject}", &mail.subject, 1);

        let header = dom::select_first(&dom::parse(&html), "header")?
            .ok_or_else(|| ShelterError::compose("header template has no <header> element"))?;
        header.detach();

        let target = dom::select_first(&payload.doc, "#mail-detail")?.ok_or_else(|| {
            ShelterError::compose(format!(
                "mail {}: no #mail-detail element in body",
                payload.header.id
            ))
        })?;
        target.insert_before(header);
        Ok(())
    }
}

/// Serialize the finished document as the final artifact, keyed by the
/// mail's destination path. Must be the last step of the pipeline.
pub struct DumpMailMarkup;

impl Command for DumpMailMarkup {
    fn name(&self) -> &'static str {
        "dump-markup"
    }

    fn execute(&self, payload: &mut ComposerPayload) -> Result<(), ShelterError> {
        let data = dom::serialize(&payload.doc)?;
        payload.artifacts.push(Artifact {
            path: payload.path.clone(),
            data,
        });
        Ok(())
    }
}

fn detail_base(payload: &ComposerPayload) -> Result<Url, ShelterError> {
    Url::parse(&payload.header.detail_url).map_err(|e| {
        ShelterError::compose(format!(
            "mail {}: bad detail url '{}': {e}",
            payload.header.id, payload.header.detail_url
        ))
    })
}

/// Turn a prefetched resource into either a destination-relative href (root
/// configured) or a base64 data URI (no root).
fn rewrite_resource(
    payload: &mut ComposerPayload,
    url: &Url,
    root: Option<&std::path::Path>,
) -> Result<String, ShelterError> {
    let asset = payload
        .assets
        .get(url.as_str())
        .cloned()
        .ok_or_else(|| ShelterError::compose(format!("resource not prefetched: {url}")))?;
    match root {
        Some(root) => {
            let artifact_path = naive_join(root, &url_tail(url));
            let href = relative_href(&payload.path, &artifact_path);
            payload.artifacts.push(Artifact {
                path: artifact_path,
                data: asset.data,
            });
            Ok(href)
        }
        None => Ok(format!(
            "data:{};base64,{}",
            asset.content_type,
            BASE64.encode(&asset.data)
        )),
    }
}
