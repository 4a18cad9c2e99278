//! Bot configuration loading.
//!
//! A thin collaborator over the core: a TOML file carrying the classic
//! key set (`Nick`, `Server`, `SSL`, …) is deserialized and pushed
//! through the client's typed setters, optionally connecting and joining
//! channels in one call.
//!
//! ```toml
//! Nick = "examplebot"
//! UserName = "example"
//! Server = "irc.example.net"
//! Port = 6697
//! SSL = true
//! Channels = "#example"
//! ```

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::client::{ConnectionSettings, IrcClient};
use crate::error::ClientError;

/// Errors produced while loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid TOML (or has mistyped keys).
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Declarative bot configuration.
///
/// Every key is optional; absent keys leave the client's defaults
/// untouched.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, rename_all = "PascalCase", deny_unknown_fields)]
pub struct BotConfig {
    /// Log raw traffic at INFO.
    pub verbose: Option<bool>,
    /// Nick to register with.
    pub nick: Option<String>,
    /// Username (ident).
    pub user_name: Option<String>,
    /// Real name field of `USER`.
    pub real_name: Option<String>,
    /// CTCP VERSION reply.
    pub version: Option<String>,
    /// CTCP FINGER reply.
    pub finger: Option<String>,
    /// Server to connect to; connection only happens when set.
    pub server: Option<String>,
    /// Server port; defaults to 6667 when omitted.
    pub port: Option<u16>,
    /// Connect over TLS.
    #[serde(rename = "SSL")]
    pub ssl: Option<bool>,
    /// Verify the server certificate.
    #[serde(rename = "VerifySSL")]
    pub verify_ssl: Option<bool>,
    /// Connection password.
    pub password: Option<String>,
    /// Channel (or comma-separated channels) to join after connecting.
    pub channels: Option<String>,
}

impl BotConfig {
    /// Load a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] when the file cannot be read,
    /// [`ConfigError::Parse`] when it is not valid.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Parse a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] when the text is not valid.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply this configuration to a client: push the identity settings,
    /// then connect and join the configured channels when a server is
    /// present.
    ///
    /// # Errors
    ///
    /// Connection errors from [`IrcClient::connect`].
    pub async fn apply(&self, client: &IrcClient) -> Result<(), ClientError> {
        if let Some(verbose) = self.verbose {
            client.set_verbose(verbose);
        }
        if let Some(nick) = &self.nick {
            client.set_name(nick);
        }
        if let Some(user_name) = &self.user_name {
            client.set_user_name(user_name);
        }
        if let Some(real_name) = &self.real_name {
            client.set_real_name(real_name);
        }
        if let Some(version) = &self.version {
            client.set_version(version);
        }
        if let Some(finger) = &self.finger {
            client.set_finger(finger);
        }

        if let Some(server) = &self.server {
            let mut settings = ConnectionSettings::new(server.clone());
            if let Some(port) = self.port {
                settings.port = port;
            }
            if let Some(ssl) = self.ssl {
                settings.use_tls = ssl;
            }
            if let Some(verify_ssl) = self.verify_ssl {
                settings.verify_tls = verify_ssl;
            }
            settings.password = self.password.clone();

            client.connect(settings).await?;

            if let Some(channels) = &self.channels {
                client.join_channel(channels).await;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = BotConfig::parse(
            r##"
            Verbose = true
            Nick = "testbot"
            UserName = "test"
            RealName = "Test Bot"
            Version = "Test-1"
            Finger = "busy"
            Server = "irc.example.net"
            Port = 6697
            SSL = true
            VerifySSL = false
            Password = "hunter2"
            Channels = "#a,#b"
            "##,
        )
        .unwrap();

        assert_eq!(config.nick.as_deref(), Some("testbot"));
        assert_eq!(config.port, Some(6697));
        assert_eq!(config.ssl, Some(true));
        assert_eq!(config.verify_ssl, Some(false));
        assert_eq!(config.channels.as_deref(), Some("#a,#b"));
    }

    #[test]
    fn test_parse_empty_config() {
        let config = BotConfig::parse("").unwrap();
        assert_eq!(config, BotConfig::default());
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(matches!(
            BotConfig::parse("Nickname = \"typo\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_apply_identity_without_server() {
        let client = IrcClient::new();
        let config = BotConfig::parse(
            r#"
            Nick = "confbot"
            Version = "Conf-1"
            "#,
        )
        .unwrap();

        config.apply(&client).await.unwrap();
        assert_eq!(client.name(), "confbot");
        assert_eq!(client.version(), "Conf-1");
        assert!(!client.is_connected());
    }
}
