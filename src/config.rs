use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug, Default)]
#[command(name = "inkwell", about = "A blog content-management API")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Path to data directory
    #[arg(long, env = "INKWELL_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Path to the SQLite database file
    #[arg(long, env = "DATABASE_PATH")]
    pub database: Option<PathBuf>,

    /// Secret used to sign bearer tokens
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    /// Username of the admin account created at startup
    #[arg(long, env = "INKWELL_ADMIN_USERNAME")]
    pub admin_username: Option<String>,

    /// Email of the admin account created at startup
    #[arg(long, env = "INKWELL_ADMIN_EMAIL")]
    pub admin_email: Option<String>,

    /// Password of the admin account created at startup
    #[arg(long, env = "INKWELL_ADMIN_PASSWORD", hide_env_values = true)]
    pub admin_password: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub admin: AdminConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
    pub max_connections: u32,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 signing secret. A random one is generated when unset.
    pub jwt_secret: Option<String>,
    pub token_ttl_hours: u64,
    pub bcrypt_cost: u32,
}

/// Admin account ensured at startup. Ignored unless both username and
/// password are set.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct AdminConfig {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_connections: 8,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            token_ttl_hours: 24 * 7,
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl Config {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let data_dir = Self::data_dir(cli);
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| data_dir.join("config.toml"));

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };

        // CLI / env overrides
        if let Some(ref host) = cli.host {
            config.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            config.server.port = port;
        }
        if let Some(ref database) = cli.database {
            config.database.path = Some(database.clone());
        }
        if let Some(ref secret) = cli.jwt_secret {
            config.auth.jwt_secret = Some(secret.clone());
        }
        if let Some(ref username) = cli.admin_username {
            config.admin.username = Some(username.clone());
        }
        if let Some(ref email) = cli.admin_email {
            config.admin.email = Some(email.clone());
        }
        if let Some(ref password) = cli.admin_password {
            config.admin.password = Some(password.clone());
        }

        // An empty secret is as good as none
        if config
            .auth
            .jwt_secret
            .as_deref()
            .is_some_and(|s| s.trim().is_empty())
        {
            config.auth.jwt_secret = None;
        }

        if config.database.path.is_none() {
            config.database.path = Some(data_dir.join("inkwell.db"));
        }

        Ok(config)
    }

    pub fn data_dir(cli: &Cli) -> PathBuf {
        cli.data_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".inkwell")
        })
    }

    pub fn db_path(&self) -> &Path {
        self.database
            .path
            .as_deref()
            .unwrap_or_else(|| Path::new("inkwell.db"))
    }
}

impl AdminConfig {
    /// Returns (username, email, password) when the bootstrap account is configured.
    pub fn credentials(&self) -> Option<(&str, String, &str)> {
        let username = self.username.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        let password = self.password.as_deref().filter(|s| !s.is_empty())?;
        let email = self
            .email
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| format!("{username}@localhost"));
        Some((username, email, password))
    }
}
