use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use mailshelter_domain::Profile;
use mailshelter_error::ShelterError;
use serde::Deserialize;

/// User configuration, read from a JSON file. Unknown keys are rejected by
/// name; the nullable asset roots mean "embed instead of dump".
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_bundle_id")]
    pub bundle_id: String,
    #[serde(default = "default_destination")]
    pub destination: String,
    pub mail_path: String,
    #[serde(default = "default_profile_image_path")]
    pub profile_image_path: Option<String>,
    #[serde(default = "default_css_path")]
    pub css_path: Option<String>,
    #[serde(default = "default_image_path")]
    pub image_path: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout: f64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_head")]
    pub head: String,
    #[serde(default = "default_index")]
    pub index: String,
    #[serde(default)]
    pub finish_hook: Option<String>,
    pub profile: BTreeMap<String, String>,
}

fn default_bundle_id() -> String {
    "com.ca-smart.izonemail".to_string()
}

fn default_destination() -> String {
    "incoming".to_string()
}

fn default_profile_image_path() -> Option<String> {
    Some("/".to_string())
}

fn default_css_path() -> Option<String> {
    Some("/css".to_string())
}

fn default_image_path() -> Option<String> {
    Some("/img".to_string())
}

fn default_timeout() -> f64 {
    5.0
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_workers() -> usize {
    8
}

fn default_head() -> String {
    "HEAD".to_string()
}

fn default_index() -> String {
    "INDEX".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ShelterError> {
        let raw = fs::read_to_string(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => {
                ShelterError::config(format!("file '{}' missing", path.display()))
            }
            _ => ShelterError::config(format!("read {}: {e}", path.display())),
        })?;
        let config: Config = serde_json::from_str(&raw)
            .map_err(|e| ShelterError::config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ShelterError> {
        require_abspath("mail_path", Some(&self.mail_path))?;
        require_abspath("profile_image_path", self.profile_image_path.as_deref())?;
        require_abspath("css_path", self.css_path.as_deref())?;
        require_abspath("image_path", self.image_path.as_deref())?;
        if !self.timeout.is_finite() || self.timeout < 0.0 {
            return Err(ShelterError::config(format!(
                "'timeout' cannot be {}",
                self.timeout
            )));
        }
        if self.max_workers == 0 {
            return Err(ShelterError::config("'max_workers' cannot be 0"));
        }
        if self.head.is_empty() {
            return Err(ShelterError::config("'head' cannot be empty"));
        }
        if self.index.is_empty() {
            return Err(ShelterError::config("'index' cannot be empty"));
        }
        Ok(())
    }

    /// The validated request-header profile; keys with empty values are
    /// dropped rather than sent as empty headers.
    pub fn build_profile(&self) -> Result<Profile, ShelterError> {
        Profile::new(
            self.profile
                .iter()
                .filter(|(_, v)| !v.is_empty())
                .map(|(k, v)| (k.as_str(), v.clone())),
        )
    }
}

fn require_abspath(key: &str, value: Option<&str>) -> Result<(), ShelterError> {
    match value {
        None => Ok(()),
        Some(v) if v.starts_with('/') => Ok(()),
        Some(v) => Err(ShelterError::config(format!(
            "'{key}' must be an absolute path, not '{v}'"
        ))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(json: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(json.as_bytes()).unwrap();
        (dir, path)
    }

    fn minimal() -> &'static str {
        r#"{
            "mail_path": "/{member_id}/{mail_id} {subject}.html",
            "profile": {
                "user-id": "u-1",
                "access-token": "t-1",
                "os-type": "and",
                "application-version": "1.3.2",
                "terms-version": "3"
            }
        }"#
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let (_dir, path) = write_config(minimal());
        let config = Config::load(&path).unwrap();
        assert_eq!(config.destination, "incoming");
        assert_eq!(config.css_path.as_deref(), Some("/css"));
        assert_eq!(config.image_path.as_deref(), Some("/img"));
        assert_eq!(config.timeout, 5.0);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.max_workers, 8);
        assert_eq!(config.head, "HEAD");
        assert!(config.finish_hook.is_none());
        assert!(config.build_profile().is_ok());
    }

    #[test]
    fn null_asset_root_means_embed() {
        let json = minimal().replacen('{', "{\n\"css_path\": null,", 1);
        let (_dir, path) = write_config(&json);
        let config = Config::load(&path).unwrap();
        assert!(config.css_path.is_none());
        assert_eq!(config.image_path.as_deref(), Some("/img"));
    }

    #[test]
    fn unknown_key_is_rejected_by_name() {
        let json = minimal().replacen('{', "{\n\"colour\": \"red\",", 1);
        let (_dir, path) = write_config(&json);
        let err = Config::load(&path).err().map(|e| e.to_string()).unwrap_or_default();
        assert!(err.contains("colour"), "{err}");
    }

    #[test]
    fn missing_mail_path_is_rejected_by_name() {
        let json = r#"{"profile": {"user-id": "u"}}"#;
        let (_dir, path) = write_config(json);
        let err = Config::load(&path).err().map(|e| e.to_string()).unwrap_or_default();
        assert!(err.contains("mail_path"), "{err}");
    }

    #[test]
    fn relative_mail_path_is_rejected() {
        let json = minimal().replace("/{member_id}", "{member_id}");
        let (_dir, path) = write_config(&json);
        let err = Config::load(&path).err().map(|e| e.to_string()).unwrap_or_default();
        assert!(err.contains("'mail_path'"), "{err}");
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = Config::load(Path::new("/no/such/config.json"))
            .err()
            .map(|e| e.to_string())
            .unwrap_or_default();
        assert!(err.contains("missing"), "{err}");
    }

    #[test]
    fn empty_profile_values_are_dropped() {
        let json = minimal().replace("\"os-type\": \"and\"", "\"os-type\": \"and\", \"user-agent\": \"\"");
        let (_dir, path) = write_config(&json);
        let config = Config::load(&path).unwrap();
        let profile = config.build_profile().unwrap();
        assert!(profile.get("user-agent").is_none());
        assert_eq!(profile.len(), 5);
    }
}
