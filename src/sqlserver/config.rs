//! SQL Server connection configuration.

use crate::error::{ChangeStreamError, Result};

/// SQL Server connection configuration
///
/// # Security Note
///
/// This struct implements a custom Debug that redacts the password field
/// to prevent accidental leakage to logs.
#[derive(Clone)]
pub struct SqlServerConfig {
    /// SQL Server host
    pub host: String,
    /// SQL Server port (default: 1433)
    pub port: u16,
    /// Username for authentication
    pub username: String,
    /// Password for authentication
    pub password: Option<String>,
    /// Database name (required for CDC)
    pub database: String,
    /// Application name for connection identification
    pub application_name: String,
    /// Connection timeout in seconds (default: 30)
    pub connect_timeout_secs: u64,
    /// Whether to trust server certificate (for self-signed certs)
    pub trust_server_certificate: bool,
    /// Whether to enable encryption
    pub encrypt: bool,
}

impl std::fmt::Debug for SqlServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("database", &self.database)
            .field("application_name", &self.application_name)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("trust_server_certificate", &self.trust_server_certificate)
            .field("encrypt", &self.encrypt)
            .finish()
    }
}

impl Default for SqlServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1433,
            username: String::new(),
            password: None,
            database: String::new(),
            application_name: "changestream".to_string(),
            connect_timeout_secs: 30,
            trust_server_certificate: false,
            encrypt: true,
        }
    }
}

impl SqlServerConfig {
    /// Create a new builder for SqlServerConfig
    pub fn builder() -> SqlServerConfigBuilder {
        SqlServerConfigBuilder::default()
    }

    fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(ChangeStreamError::config("Host is required"));
        }
        if self.username.is_empty() {
            return Err(ChangeStreamError::config("Username is required"));
        }
        if self.database.is_empty() {
            return Err(ChangeStreamError::config("Database is required"));
        }
        Ok(())
    }

    /// Redacted connection description for logging
    pub fn redacted_connection_string(&self) -> String {
        let mut parts = vec![
            format!("Server={},{}", self.host, self.port),
            format!("Database={}", self.database),
            format!("User Id={}", self.username),
        ];
        if self.password.is_some() {
            parts.push("Password=[REDACTED]".to_string());
        }
        parts.push(format!("Application Name={}", self.application_name));
        parts.push(format!(
            "Encrypt={}",
            if self.encrypt { "true" } else { "false" }
        ));
        parts.join(";")
    }
}

/// Builder for SqlServerConfig
#[derive(Default)]
pub struct SqlServerConfigBuilder {
    config: SqlServerConfig,
}

impl SqlServerConfigBuilder {
    /// Set the SQL Server host
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set the SQL Server port (default: 1433)
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the username for authentication
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.config.username = username.into();
        self
    }

    /// Set the password for authentication
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = Some(password.into());
        self
    }

    /// Set the database name
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.config.database = database.into();
        self
    }

    /// Set the application name for connection identification
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.config.application_name = name.into();
        self
    }

    /// Set connection timeout in seconds (default: 30)
    pub fn connect_timeout_secs(mut self, secs: u64) -> Self {
        self.config.connect_timeout_secs = secs;
        self
    }

    /// Trust server certificate (for self-signed certs)
    ///
    /// **Security warning**: Only use in development/testing.
    pub fn trust_server_certificate(mut self, trust: bool) -> Self {
        self.config.trust_server_certificate = trust;
        self
    }

    /// Enable/disable encryption (default: true)
    pub fn encrypt(mut self, encrypt: bool) -> Self {
        self.config.encrypt = encrypt;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<SqlServerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = SqlServerConfig::builder()
            .host("localhost")
            .port(1433)
            .username("sa")
            .password("TestPassword123!")
            .database("testdb")
            .build()
            .unwrap();

        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 1433);
        assert_eq!(config.username, "sa");
        assert_eq!(config.database, "testdb");
        assert!(config.encrypt);
    }

    #[test]
    fn test_validation() {
        // Missing username
        assert!(SqlServerConfig::builder()
            .host("localhost")
            .database("testdb")
            .build()
            .is_err());

        // Missing database
        assert!(SqlServerConfig::builder()
            .host("localhost")
            .username("sa")
            .build()
            .is_err());
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = SqlServerConfig::builder()
            .host("localhost")
            .username("sa")
            .password("secret")
            .database("testdb")
            .build()
            .unwrap();

        let debug_str = format!("{:?}", config);
        assert!(!debug_str.contains("secret"));
        assert!(debug_str.contains("REDACTED"));
    }

    #[test]
    fn test_redacted_connection_string() {
        let config = SqlServerConfig::builder()
            .host("myserver")
            .username("myuser")
            .password("mypass")
            .database("mydb")
            .build()
            .unwrap();

        let redacted = config.redacted_connection_string();
        assert!(redacted.contains("Server=myserver,1433"));
        assert!(redacted.contains("[REDACTED]"));
        assert!(!redacted.contains("mypass"));
    }
}
