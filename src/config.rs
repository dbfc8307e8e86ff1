//! Configuration types.
//!
//! Everything is read once at startup from the environment (optionally seeded
//! from a `.env` file) and handed to the transports and the coordinator.

use std::path::PathBuf;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Subject tag of outbound approval requests.
pub const DEFAULT_SUBJECT_TAG: &str = "NORDSVCP approval request";

/// IMAP mailbox settings.
#[derive(Debug, Clone)]
pub struct MailboxConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub folder: String,
}

/// SMTP settings.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

/// SFTP settings.
#[derive(Debug, Clone)]
pub struct SftpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
}

/// Settings the workflow coordinator reads.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Local directory artifacts are written to and resolved from.
    pub artifact_dir: PathBuf,
    /// Remote directory approved artifacts are uploaded into.
    pub remote_dir: String,
    /// Reviewers, in configured order, without duplicates.
    pub recipients: Vec<String>,
    /// Address the relay sends as; mail from it is never reprocessed.
    pub from_address: String,
    /// Sender allowlist (`*`, `@domain`, `domain`, or full address).
    pub allowed_senders: Vec<String>,
    /// Mark a message processed even when its primary action failed.
    pub mark_on_failure: bool,
    pub subject_tag: String,
}

/// Full relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub mailbox: MailboxConfig,
    pub smtp: SmtpConfig,
    pub sftp: SftpConfig,
    pub workflow: WorkflowConfig,
    /// Directory for daily-rolling log files; stderr only when unset.
    pub log_dir: Option<PathBuf>,
}

impl RelayConfig {
    /// Build config from environment variables, loading `.env` first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);

        let imap_host = vars.required("EMAIL_HOSTNAME")?;
        let username = vars.required("EMAIL_USERNAME")?;
        let password = vars.required("EMAIL_PASSWORD")?;

        let mailbox = MailboxConfig {
            port: vars.parsed("EMAIL_IMAP_PORT", 993)?,
            folder: vars.optional("EMAIL_MAILBOX").unwrap_or_else(|| "INBOX".into()),
            host: imap_host.clone(),
            username: username.clone(),
            password: SecretString::from(password.clone()),
        };

        let from_address = vars
            .optional("EMAIL_FROM_ADDRESS")
            .unwrap_or_else(|| username.clone());

        let smtp = SmtpConfig {
            host: vars
                .optional("SMTP_HOST")
                .unwrap_or_else(|| imap_host.replace("imap", "smtp")),
            port: vars.parsed("SMTP_PORT", 587)?,
            username: vars.optional("SMTP_USERNAME").unwrap_or(username),
            password: SecretString::from(vars.optional("SMTP_PASSWORD").unwrap_or(password)),
            from_address: from_address.clone(),
        };

        let sftp = SftpConfig {
            host: vars.required("SFTP_HOST")?,
            port: vars.parsed("SFTP_PORT", 22)?,
            username: vars.required("SFTP_USERNAME")?,
            password: SecretString::from(vars.required("SFTP_PASSWORD")?),
        };

        let recipients = split_list(&vars.required("APPROVAL_RECIPIENTS")?);
        if recipients.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "APPROVAL_RECIPIENTS".into(),
                message: "at least one address is required".into(),
            });
        }

        let workflow = WorkflowConfig {
            artifact_dir: vars
                .optional("ARTIFACT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./artifacts")),
            remote_dir: vars.required("SFTP_REMOTE_DIR")?,
            recipients,
            from_address,
            allowed_senders: split_list(
                &vars
                    .optional("RELAY_ALLOWED_SENDERS")
                    .unwrap_or_else(|| "*".into()),
            ),
            mark_on_failure: vars.flag("RELAY_MARK_ON_FAILURE", false)?,
            subject_tag: vars
                .optional("RELAY_SUBJECT_TAG")
                .unwrap_or_else(|| DEFAULT_SUBJECT_TAG.into()),
        };

        Ok(Self {
            mailbox,
            smtp,
            sftp,
            workflow,
            log_dir: vars.optional("RELAY_LOG_DIR").map(PathBuf::from),
        })
    }
}

/// Comma-separated list, trimmed, empties and repeats dropped, order kept.
pub fn split_list(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if !out.iter().any(|seen| seen.eq_ignore_ascii_case(item)) {
            out.push(item.to_string());
        }
    }
    out
}

struct Vars<F>(F);

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    /// Set and non-blank.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    fn parsed<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(key) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("{raw:?}: {e}"),
            }),
        }
    }

    fn flag(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        match self.optional(key).map(|v| v.to_ascii_lowercase()).as_deref() {
            None => Ok(default),
            Some("1" | "true" | "yes" | "on") => Ok(true),
            Some("0" | "false" | "no" | "off") => Ok(false),
            Some(other) => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("{other:?} is not a boolean"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn base() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("EMAIL_HOSTNAME", "imap.example.com"),
            ("EMAIL_USERNAME", "relay@example.com"),
            ("EMAIL_PASSWORD", "mail-secret"),
            ("SFTP_HOST", "sftp.partner.com"),
            ("SFTP_USERNAME", "upload"),
            ("SFTP_PASSWORD", "sftp-secret"),
            ("SFTP_REMOTE_DIR", "/inbound"),
            ("APPROVAL_RECIPIENTS", "a@example.com, b@example.com"),
        ])
    }

    fn load(vars: &HashMap<&'static str, &'static str>) -> Result<RelayConfig, ConfigError> {
        RelayConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()))
    }

    #[test]
    fn minimal_config_fills_defaults() {
        let cfg = load(&base()).unwrap();
        assert_eq!(cfg.mailbox.port, 993);
        assert_eq!(cfg.mailbox.folder, "INBOX");
        assert_eq!(cfg.smtp.host, "smtp.example.com");
        assert_eq!(cfg.smtp.port, 587);
        assert_eq!(cfg.smtp.username, "relay@example.com");
        assert_eq!(cfg.smtp.password.expose_secret(), "mail-secret");
        assert_eq!(cfg.sftp.port, 22);
        assert_eq!(cfg.workflow.from_address, "relay@example.com");
        assert_eq!(cfg.workflow.recipients, vec!["a@example.com", "b@example.com"]);
        assert_eq!(cfg.workflow.allowed_senders, vec!["*"]);
        assert_eq!(cfg.workflow.artifact_dir, PathBuf::from("./artifacts"));
        assert_eq!(cfg.workflow.subject_tag, DEFAULT_SUBJECT_TAG);
        assert!(!cfg.workflow.mark_on_failure);
        assert!(cfg.log_dir.is_none());
    }

    #[test]
    fn missing_required_value_names_the_variable() {
        for key in [
            "EMAIL_HOSTNAME",
            "EMAIL_USERNAME",
            "EMAIL_PASSWORD",
            "SFTP_HOST",
            "SFTP_USERNAME",
            "SFTP_PASSWORD",
            "SFTP_REMOTE_DIR",
            "APPROVAL_RECIPIENTS",
        ] {
            let mut vars = base();
            vars.remove(key);
            match load(&vars) {
                Err(ConfigError::MissingEnvVar(name)) => assert_eq!(name, key),
                other => panic!("expected missing {key}, got {other:?}"),
            }
        }
    }

    #[test]
    fn blank_value_counts_as_missing() {
        let mut vars = base();
        vars.insert("SFTP_HOST", "   ");
        assert!(matches!(load(&vars), Err(ConfigError::MissingEnvVar(_))));
    }

    #[test]
    fn invalid_port_is_rejected() {
        let mut vars = base();
        vars.insert("SFTP_PORT", "twenty-two");
        let err = load(&vars).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "SFTP_PORT"));
    }

    #[test]
    fn recipients_of_only_commas_rejected() {
        let mut vars = base();
        vars.insert("APPROVAL_RECIPIENTS", " , ,");
        assert!(matches!(load(&vars), Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn overrides_are_honored() {
        let mut vars = base();
        vars.insert("SMTP_HOST", "mail.relay.net");
        vars.insert("SMTP_USERNAME", "smtp-user");
        vars.insert("EMAIL_FROM_ADDRESS", "noreply@example.com");
        vars.insert("RELAY_MARK_ON_FAILURE", "yes");
        vars.insert("RELAY_ALLOWED_SENDERS", "@vendor.com, reviewer@example.com");
        vars.insert("RELAY_LOG_DIR", "/var/log/relay");
        let cfg = load(&vars).unwrap();
        assert_eq!(cfg.smtp.host, "mail.relay.net");
        assert_eq!(cfg.smtp.username, "smtp-user");
        assert_eq!(cfg.workflow.from_address, "noreply@example.com");
        assert!(cfg.workflow.mark_on_failure);
        assert_eq!(cfg.workflow.allowed_senders.len(), 2);
        assert_eq!(cfg.log_dir, Some(PathBuf::from("/var/log/relay")));
    }

    #[test]
    fn invalid_flag_is_rejected() {
        let mut vars = base();
        vars.insert("RELAY_MARK_ON_FAILURE", "maybe");
        assert!(matches!(load(&vars), Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn split_list_keeps_order_and_drops_repeats() {
        assert_eq!(
            split_list("b@x.com, a@x.com,,B@X.com , c@x.com"),
            vec!["b@x.com", "a@x.com", "c@x.com"]
        );
    }

    #[test]
    fn secrets_are_redacted_in_debug() {
        let cfg = load(&base()).unwrap();
        let dump = format!("{cfg:?}");
        assert!(!dump.contains("mail-secret"));
        assert!(!dump.contains("sftp-secret"));
    }
}
