use crate::adapters::clublog::ClubLogCredentials;
use crate::adapters::eqsl::EqslCredentials;
use crate::adapters::http::ReqwestTransport;
use crate::adapters::lotw::LotwCredentials;
use crate::adapters::qrz::QrzCredentials;
use crate::core::session::{Credentials, Session};
use crate::domain::model::Provider;
use crate::domain::ports::Transport;
use crate::utils::error::{QslError, Result};
use crate::utils::validation::{
    validate_callsign, validate_email, validate_non_empty_string, validate_required_field, validate_url,
    Validate,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, OnceLock};

/// Account file: one optional table per provider plus shared HTTP settings.
///
/// ```toml
/// [lotw]
/// callsign = "W1AW"
/// password = "${LOTW_PASSWORD}"
///
/// [qrz]
/// api_key = "${QRZ_KEY}"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountsConfig {
    pub lotw: Option<LotwCredentials>,
    pub eqsl: Option<EqslCredentials>,
    pub qrz: Option<QrzCredentials>,
    pub clublog: Option<ClubLogCredentials>,
    pub http: Option<HttpConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HttpConfig {
    pub user_agent: Option<String>,
}

impl AccountsConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// Like `from_file`, but a missing file yields the empty configuration. For commands
    /// that need no account but still honour `[http]` settings.
    pub fn from_file_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            tracing::debug!("{} not found, using defaults", path.as_ref().display());
            Ok(Self::default())
        }
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.http.as_ref().and_then(|h| h.user_agent.as_deref())
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content);

        toml::from_str(&processed_content).map_err(|e| QslError::Config {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${VAR}` with the variable's value. Unset variables are left as written.
    fn substitute_env_vars(content: &str) -> String {
        static VARS: OnceLock<Regex> = OnceLock::new();
        let re = VARS.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("valid env var regex"));

        re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        })
        .into_owned()
    }

    pub fn validate_config(&self) -> Result<()> {
        if let Some(lotw) = &self.lotw {
            validate_callsign("lotw.callsign", &lotw.callsign)?;
            validate_secret("lotw.password", &lotw.password)?;
            validate_endpoint("lotw.endpoint", &lotw.endpoint)?;
        }
        if let Some(eqsl) = &self.eqsl {
            validate_callsign("eqsl.username", &eqsl.username)?;
            validate_secret("eqsl.password", &eqsl.password)?;
            validate_endpoint("eqsl.endpoint", &eqsl.endpoint)?;
        }
        if let Some(qrz) = &self.qrz {
            if qrz.api_key.is_none() && qrz.username.is_none() {
                return Err(QslError::MissingConfig {
                    field: "qrz.api_key or qrz.username".to_string(),
                });
            }
            if let Some(key) = &qrz.api_key {
                validate_secret("qrz.api_key", key)?;
            }
            if let Some(username) = &qrz.username {
                validate_callsign("qrz.username", username)?;
                validate_secret(
                    "qrz.password",
                    validate_required_field("qrz.password", &qrz.password)?,
                )?;
            }
            validate_endpoint("qrz.logbook_endpoint", &qrz.logbook_endpoint)?;
            validate_endpoint("qrz.xml_endpoint", &qrz.xml_endpoint)?;
        }
        if let Some(clublog) = &self.clublog {
            validate_email("clublog.email", &clublog.email)?;
            validate_callsign("clublog.callsign", &clublog.callsign)?;
            validate_secret("clublog.password", &clublog.password)?;
            validate_endpoint("clublog.endpoint", &clublog.endpoint)?;
        }
        if let Some(agent) = self.user_agent() {
            validate_non_empty_string("http.user_agent", agent)?;
        }
        Ok(())
    }

    /// Providers with a table in the file, in declaration order of the struct.
    pub fn configured_providers(&self) -> Vec<Provider> {
        let mut providers = Vec::new();
        if self.lotw.is_some() {
            providers.push(Provider::Lotw);
        }
        if self.eqsl.is_some() {
            providers.push(Provider::Eqsl);
        }
        if self.qrz.is_some() {
            providers.push(Provider::Qrz);
        }
        if self.clublog.is_some() {
            providers.push(Provider::ClubLog);
        }
        providers
    }

    pub fn credentials(&self, provider: Provider) -> Result<Credentials> {
        let missing = || QslError::MissingConfig {
            field: format!("[{}]", provider.as_str().to_ascii_lowercase()),
        };
        Ok(match provider {
            Provider::Lotw => Credentials::Lotw(self.lotw.clone().ok_or_else(missing)?),
            Provider::Eqsl => Credentials::Eqsl(self.eqsl.clone().ok_or_else(missing)?),
            Provider::Qrz => Credentials::Qrz(self.qrz.clone().ok_or_else(missing)?),
            Provider::ClubLog => Credentials::ClubLog(self.clublog.clone().ok_or_else(missing)?),
        })
    }

    pub fn transport(&self) -> Result<Arc<dyn Transport>> {
        let transport = match self.user_agent() {
            Some(agent) => ReqwestTransport::with_user_agent(agent)?,
            None => ReqwestTransport::new()?,
        };
        Ok(Arc::new(transport))
    }

    pub fn session(&self, provider: Provider) -> Result<Session> {
        Session::with_transport(self.credentials(provider)?, self.transport()?)
    }

    /// One session per configured provider, sharing a single HTTP client.
    pub fn sessions(&self) -> Result<Vec<Session>> {
        let transport = self.transport()?;
        self.configured_providers()
            .into_iter()
            .map(|provider| Session::with_transport(self.credentials(provider)?, transport.clone()))
            .collect()
    }
}

fn validate_secret(field_name: &str, value: &str) -> Result<()> {
    validate_non_empty_string(field_name, value)?;
    if value.starts_with("${") {
        return Err(QslError::InvalidConfigValue {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "environment variable is not set".to_string(),
        });
    }
    Ok(())
}

fn validate_endpoint(field_name: &str, endpoint: &Option<String>) -> Result<()> {
    match endpoint {
        Some(url) => validate_url(field_name, url),
        None => Ok(()),
    }
}

impl Validate for AccountsConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::ErrorKind;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const ACCOUNTS: &str = r#"
[lotw]
callsign = "W1AW"
password = "hunter2"

[clublog]
email = "op@example.com"
callsign = "W1AW"
password = "hunter3"
endpoint = "https://clublog.test/getadif.php"

[http]
user_agent = "test-agent/1.0"
"#;

    #[test]
    fn test_parse_accounts() {
        let config = AccountsConfig::from_toml_str(ACCOUNTS).unwrap();

        assert_eq!(config.lotw.as_ref().unwrap().callsign, "W1AW");
        assert!(config.lotw.as_ref().unwrap().endpoint.is_none());
        assert!(config.eqsl.is_none());
        assert_eq!(
            config.configured_providers(),
            vec![Provider::Lotw, Provider::ClubLog]
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("QSLKIT_TEST_QRZ_KEY", "ABCD-1234");

        let config = AccountsConfig::from_toml_str(
            r#"
[qrz]
api_key = "${QSLKIT_TEST_QRZ_KEY}"
"#,
        )
        .unwrap();
        assert_eq!(config.qrz.unwrap().api_key.as_deref(), Some("ABCD-1234"));

        std::env::remove_var("QSLKIT_TEST_QRZ_KEY");
    }

    #[test]
    fn test_unset_env_var_fails_validation() {
        let config = AccountsConfig::from_toml_str(
            r#"
[eqsl]
username = "W1AW"
password = "${QSLKIT_TEST_UNSET_VARIABLE}"
"#,
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, QslError::InvalidConfigValue { ref field, .. } if field == "eqsl.password"));
    }

    #[test]
    fn test_config_validation() {
        let bad_endpoint = r#"
[lotw]
callsign = "W1AW"
password = "x"
endpoint = "ftp://lotw.test"
"#;
        assert!(AccountsConfig::from_toml_str(bad_endpoint).unwrap().validate().is_err());

        let qrz_without_password = r#"
[qrz]
username = "W1AW"
"#;
        let err = AccountsConfig::from_toml_str(qrz_without_password)
            .unwrap()
            .validate()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);

        assert!(AccountsConfig::from_toml_str("[lotw]\ncallsign = 3").is_err());
    }

    #[test]
    fn test_missing_provider_table() {
        let config = AccountsConfig::from_toml_str(ACCOUNTS).unwrap();
        let err = config.credentials(Provider::Qrz).unwrap_err();
        assert!(matches!(err, QslError::MissingConfig { ref field } if field == "[qrz]"));
        assert_eq!(config.credentials(Provider::Lotw).unwrap().provider(), Provider::Lotw);
    }

    #[test]
    fn test_sessions_for_configured_providers() {
        let config = AccountsConfig::from_toml_str(ACCOUNTS).unwrap();
        let sessions = config.sessions().unwrap();
        let providers: Vec<_> = sessions.iter().map(Session::provider).collect();
        assert_eq!(providers, vec![Provider::Lotw, Provider::ClubLog]);
    }

    #[test]
    fn test_optional_file_keeps_http_settings() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"[http]\nuser_agent = \"club-station/2.0\"\n").unwrap();

        let config = AccountsConfig::from_file_or_default(temp_file.path()).unwrap();
        assert_eq!(config.user_agent(), Some("club-station/2.0"));
        assert!(config.configured_providers().is_empty());

        let dir = tempfile::tempdir().unwrap();
        let missing = AccountsConfig::from_file_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(missing.user_agent(), None);
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(ACCOUNTS.as_bytes()).unwrap();

        let config = AccountsConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.clublog.unwrap().email, "op@example.com");
    }
}
