use chrono::{DateTime, TimeZone, Utc};
use mailshelter_domain::Policy;
use mailshelter_error::ShelterError;

const MAIL_HEADER: &str = include_str!("../assets/mail_header.html");
const MAIL_CSS: &str = include_str!("../assets/mail.css");

/// Per-service constants keyed by application bundle id: API hosts, bundled
/// presentation assets and the genesis watermark.
pub fn for_bundle(bundle_id: &str) -> Result<Policy, ShelterError> {
    match bundle_id {
        "com.ca-smart.izonemail" => Ok(Policy {
            bundle_id: bundle_id.to_string(),
            api_host: "https://app-api.izone-mail.com".to_string(),
            app_host: "https://app-web.izone-mail.com".to_string(),
            mail_header: MAIL_HEADER.to_string(),
            css: MAIL_CSS.to_string(),
            genesis: genesis_utc(2019, 2, 21)?,
        }),
        other => Err(ShelterError::config(format!("unknown bundle id '{other}'"))),
    }
}

fn genesis_utc(year: i32, month: u32, day: u32) -> Result<DateTime<Utc>, ShelterError> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0)
        .single()
        .ok_or_else(|| ShelterError::config("invalid genesis timestamp"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn known_bundle_has_assets_and_genesis() {
        let policy = for_bundle("com.ca-smart.izonemail").unwrap();
        assert!(policy.mail_header.contains("{member_image}"));
        assert!(policy.css.contains("#mail-detail"));
        assert!(policy.api_host.starts_with("https://"));
        assert_eq!(policy.genesis.timestamp(), 1_550_707_200);
    }

    #[test]
    fn unknown_bundle_is_a_config_error() {
        let err = for_bundle("com.example.other")
            .err()
            .map(|e| e.to_string())
            .unwrap_or_default();
        assert!(err.contains("com.example.other"), "{err}");
    }
}
