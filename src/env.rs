//! Environment variable names read by [`LoggingConfig::from_env`] and the
//! deployment marker they resolve to.
//!
//! These are purely helpers; the pipeline itself only ever sees the
//! resolved [`LoggingConfig`].
//!
//! [`LoggingConfig::from_env`]: crate::init::LoggingConfig::from_env
//! [`LoggingConfig`]: crate::init::LoggingConfig

/// Deployment marker. Unset means a local/dev workstation; any value
/// (even empty) means a deployed environment of that name.
pub const ENV_VAR: &str = "ENV";

/// Optional explicit threshold, e.g. `debug` or `WARNING`.
pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";

/// Name of the deployed environment that defaults to verbose logging.
pub const DEV_ENVIRONMENT: &str = "dev";

/// Read an environment variable, treating "not set" and "not unicode" alike.
pub fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Where the process runs, as far as logging is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Environment {
    /// No deployment marker: human-readable console output, terse traces.
    #[default]
    Local,
    /// Deployment marker present: JSON output, traces in `stacktrace`.
    Deployed(String),
}

impl Environment {
    pub fn from_env() -> Self {
        match env_opt(ENV_VAR) {
            Some(name) => Environment::Deployed(name),
            None => Environment::Local,
        }
    }

    pub fn deployed(name: impl Into<String>) -> Self {
        Environment::Deployed(name.into())
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Environment::Local)
    }

    /// Value stamped into the `environment` root field, if any.
    pub fn name(&self) -> Option<&str> {
        match self {
            Environment::Local => None,
            Environment::Deployed(name) => Some(name),
        }
    }

    pub fn is_dev(&self) -> bool {
        self.name() == Some(DEV_ENVIRONMENT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deployed_names() {
        let env = Environment::deployed("prod");
        assert!(!env.is_local());
        assert_eq!(env.name(), Some("prod"));
        assert!(!env.is_dev());
        assert!(Environment::deployed("dev").is_dev());
    }

    #[test]
    fn local_has_no_name() {
        assert!(Environment::Local.is_local());
        assert_eq!(Environment::Local.name(), None);
        assert!(!Environment::Local.is_dev());
    }
}
