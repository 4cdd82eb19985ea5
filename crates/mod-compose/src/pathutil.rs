use std::path::{Component, Path, PathBuf};

use mailshelter_domain::Mail;

/// Characters that cannot appear in a file name on the usual filesystems.
const FORBIDDEN: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Filesystem-safe rendition of a mail subject.
pub fn slugify(s: &str) -> String {
    s.chars()
        .map(|c| if FORBIDDEN.contains(&c) { '_' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Join `rel` under `root`, treating a leading `/` in `rel` as the root
/// itself rather than the filesystem root.
pub fn naive_join(root: &Path, rel: &Path) -> PathBuf {
    let mut joined = root.to_path_buf();
    for part in rel
        .components()
        .filter(|c| !matches!(c, Component::RootDir | Component::Prefix(_)))
    {
        joined.push(part);
    }
    joined
}

/// Relative href from the directory containing `from_file` to `to`. Both are
/// destination-relative paths with a leading `/`; the result uses `/` as the
/// separator regardless of platform.
pub fn relative_href(from_file: &Path, to: &Path) -> String {
    let from_dir: Vec<_> = from_file
        .parent()
        .map(|p| normal_components(p))
        .unwrap_or_default();
    let to_parts: Vec<_> = normal_components(to);

    let common = from_dir
        .iter()
        .zip(to_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<String> = vec!["..".to_string(); from_dir.len() - common];
    parts.extend(to_parts[common..].iter().cloned());
    if parts.is_empty() {
        return ".".to_string();
    }
    parts.join("/")
}

fn normal_components(p: &Path) -> Vec<String> {
    p.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect()
}

/// Resolve the per-mail destination path from the configured template.
/// Tokens: `{member_id}`, `{member_name}`, `{mail_id}`, `{received}`
/// (compact timestamp) and `{subject}` (slugged).
pub fn render_mail_path(fmt: &str, mail: &Mail) -> PathBuf {
    let rendered = fmt
        .replace("{member_id}", &mail.member.id.to_string())
        .replace("{member_name}", &slugify(&mail.member.name))
        .replace("{mail_id}", &mail.id)
        .replace("{received}", &mail.received.format("%Y%m%d%H%M%S").to_string())
        .replace("{subject}", &slugify(&mail.subject));
    PathBuf::from(rendered)
}

/// Artifact-relative name for a fetched resource: the last two segments of
/// the URL path, so shared images land on the same deterministic file.
pub fn url_tail(url: &url::Url) -> PathBuf {
    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|p| !p.is_empty()).collect())
        .unwrap_or_default();
    let tail = if segments.len() >= 2 {
        &segments[segments.len() - 2..]
    } else {
        &segments[..]
    };
    if tail.is_empty() {
        PathBuf::from("asset")
    } else {
        tail.iter().collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use mailshelter_domain::Member;

    #[test]
    fn slugify_replaces_forbidden_characters() {
        assert_eq!(slugify("Re: hello/world?"), "Re_ hello_world_");
        assert_eq!(slugify("  plain  "), "plain");
        assert_eq!(slugify("한글 제목"), "한글 제목");
    }

    #[test]
    fn naive_join_ignores_leading_root() {
        assert_eq!(
            naive_join(Path::new("incoming"), Path::new("/img/a/b.jpg")),
            PathBuf::from("incoming/img/a/b.jpg")
        );
        assert_eq!(
            naive_join(Path::new("/data/mail"), Path::new("css/mail.css")),
            PathBuf::from("/data/mail/css/mail.css")
        );
    }

    #[test]
    fn relative_href_walks_up_and_down() {
        assert_eq!(
            relative_href(Path::new("/12/m100.html"), Path::new("/img/x/1.jpg")),
            "../img/x/1.jpg"
        );
        assert_eq!(
            relative_href(Path::new("/m100.html"), Path::new("/css/mail.css")),
            "css/mail.css"
        );
        assert_eq!(
            relative_href(Path::new("/a/b/c.html"), Path::new("/a/d.css")),
            "../d.css"
        );
    }

    #[test]
    fn renders_the_mail_path_template() {
        let mail = Mail {
            member: Member {
                id: 12,
                name: "Chaewon".into(),
                image_url: String::new(),
            },
            id: "m1043".into(),
            subject: "re: spring/summer".into(),
            content: String::new(),
            received: DateTime::parse_from_rfc3339("2021-05-29T08:05:00+09:00").unwrap(),
            detail_url: String::new(),
        };
        let path = render_mail_path("/{member_id}/{mail_id} {subject}.html", &mail);
        assert_eq!(path, PathBuf::from("/12/m1043 re_ spring_summer.html"));
        let path = render_mail_path("/{member_name}/{received}.html", &mail);
        assert_eq!(path, PathBuf::from("/Chaewon/20210529080500.html"));
    }

    #[test]
    fn url_tail_keeps_two_segments() {
        let url = url::Url::parse("https://cdn.example.com/prod/mail/123/photo.jpg").unwrap();
        assert_eq!(url_tail(&url), PathBuf::from("123/photo.jpg"));
        let url = url::Url::parse("https://cdn.example.com/solo.png").unwrap();
        assert_eq!(url_tail(&url), PathBuf::from("solo.png"));
    }
}
