use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShelterError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("api error: {0}")]
    Api(String),

    #[error("compose error: {0}")]
    Compose(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("run interrupted")]
    Interrupted,
}

impl ShelterError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    pub fn api(msg: impl Into<String>) -> Self {
        Self::Api(msg.into())
    }

    pub fn compose(msg: impl Into<String>) -> Self {
        Self::Compose(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Process exit code for a fatal error. Configuration problems are
    /// distinguishable from runtime failures so wrapper scripts can tell
    /// "fix the config" apart from "try again later".
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            _ => 1,
        }
    }

    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_have_their_own_exit_code() {
        assert_eq!(ShelterError::config("missing key 'mail_path'").exit_code(), 2);
        assert_eq!(ShelterError::network("timed out").exit_code(), 1);
        assert_eq!(ShelterError::Interrupted.exit_code(), 1);
    }

    #[test]
    fn messages_carry_context() {
        let e = ShelterError::config("unknown key 'colour'");
        assert_eq!(e.to_string(), "configuration error: unknown key 'colour'");
    }
}
