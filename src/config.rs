//! Configuration loader and validator for the giving labeler.
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub personal_access_token: PersonalAccessToken,
    pub login: Login,
    pub apply_labels_to_donations: Vec<LabelMapping>,
}

/// API credentials for the documented REST surface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersonalAccessToken {
    pub app_id: String,
    pub secret: String,
}

/// Web-session credentials. Either `cookie` alone, or the full
/// `email`/`password`/`user_id` set, must be present.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Login {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub cookie: Option<String>,
}

impl Login {
    pub fn has_cookie(&self) -> bool {
        self.cookie.as_deref().is_some_and(|c| !c.trim().is_empty())
    }

    pub fn has_password_credentials(&self) -> bool {
        [&self.email, &self.password, &self.user_id]
            .iter()
            .all(|f| f.as_deref().is_some_and(|v| !v.trim().is_empty()))
    }
}

/// One campus-to-label rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LabelMapping {
    pub people_campus: String,
    pub giving_label: String,
}

impl Config {
    /// Campus name to label slug. A later entry for the same campus wins.
    pub fn label_mappings(&self) -> HashMap<String, String> {
        self.apply_labels_to_donations
            .iter()
            .map(|m| (m.people_campus.clone(), m.giving_label.clone()))
            .collect()
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.personal_access_token.app_id.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "personal_access_token.app_id must be non-empty",
        ));
    }
    if cfg.personal_access_token.secret.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "personal_access_token.secret must be non-empty",
        ));
    }

    if !cfg.login.has_cookie() && !cfg.login.has_password_credentials() {
        return Err(ConfigError::Invalid(
            "login requires either cookie or email/password/user_id",
        ));
    }

    if cfg.apply_labels_to_donations.is_empty() {
        return Err(ConfigError::Invalid(
            "apply_labels_to_donations must list at least one mapping",
        ));
    }
    for mapping in &cfg.apply_labels_to_donations {
        if mapping.people_campus.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "apply_labels_to_donations entries must name a people_campus",
            ));
        }
        if mapping.giving_label.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "apply_labels_to_donations entries must name a giving_label",
            ));
        }
    }

    Ok(())
}

/// Example YAML used by tests and as operator documentation.
pub fn example() -> &'static str {
    r#"personal_access_token:
  app_id: "YOUR_PCO_APP_ID"
  secret: "YOUR_PCO_SECRET"

login:
  email: "ops@example.com"
  password: "YOUR_PASSWORD"
  user_id: "12345"
  # Alternatively, reuse an existing browser session instead of logging in:
  # cookie: "planning_center_session=..."

apply_labels_to_donations:
  - people_campus: "Downtown"
    giving_label: "giving-downtown"
  - people_campus: "North Side"
    giving_label: "giving-north"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
        assert!(cfg.login.has_password_credentials());
        assert!(!cfg.login.has_cookie());
    }

    #[test]
    fn invalid_api_credentials() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.personal_access_token.app_id = "".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("app_id")),
            _ => panic!("wrong error"),
        }

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.personal_access_token.secret = "".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn cookie_alone_is_a_valid_login() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.login = Login {
            email: None,
            password: None,
            user_id: None,
            cookie: Some("planning_center_session=abc".into()),
        };
        validate(&cfg).unwrap();
        assert!(cfg.login.has_cookie());
    }

    #[test]
    fn incomplete_password_credentials_are_rejected() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.login.password = None;
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("login")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn empty_mapping_list_is_rejected() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.apply_labels_to_donations.clear();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn blank_mapping_fields_are_rejected() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.apply_labels_to_donations[0].people_campus = "".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.apply_labels_to_donations[1].giving_label = " ".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn later_mapping_for_same_campus_wins() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.apply_labels_to_donations.push(LabelMapping {
            people_campus: "Downtown".into(),
            giving_label: "giving-downtown-v2".into(),
        });
        let mappings = cfg.label_mappings();
        assert_eq!(mappings["Downtown"], "giving-downtown-v2");
        assert_eq!(mappings["North Side"], "giving-north");
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        let mut f = fs::File::create(&p).unwrap();
        f.write_all(example().as_bytes()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.apply_labels_to_donations.len(), 2);
    }
}
