use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use sqlx::MySqlPool;
use tracing::{info, instrument};

use crate::util::env::env_req;

/// Connection descriptor for one MySQL database. Production and test
/// databases are described by separate env variable sets.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl ConnectionInfo {
    pub fn from_env() -> Result<Self> {
        Self::from_env_prefixed("")
    }

    pub fn test_from_env() -> Result<Self> {
        Self::from_env_prefixed("TEST_")
    }

    fn from_env_prefixed(prefix: &str) -> Result<Self> {
        let var = |suffix: &str| env_req(&format!("{prefix}{suffix}"));
        let port: u16 = var("DB_PORT")?
            .parse()
            .context("DB_PORT is not a valid port number")?;
        Ok(Self {
            host: var("DB_HOST")?,
            port,
            user: var("DB_USER")?,
            password: var("DB_PASSWD")?,
            database: var("DB_NAME")?,
        })
    }

    /// Driver-native DSN form for this descriptor. Contains the password;
    /// never log the result.
    pub fn dsn(&self) -> String {
        format!(
            "{}:{}@tcp({}:{})/{}?charset=utf8mb4&parseTime=True&loc=Local",
            self.user, self.password, self.host, self.port, self.database
        )
    }
}

/// Shared connection pool handle. Cheap to clone; all write workers use the
/// same pool without any extra application-level locking.
#[derive(Clone)]
pub struct Db {
    pub pool: MySqlPool,
}

impl Db {
    // SECURITY: never include credentials in tracing spans.
    #[instrument(skip(info))]
    pub async fn connect(
        info: &ConnectionInfo,
        max_connections: u32,
        idle_connections: u32,
    ) -> Result<Self> {
        let options = MySqlConnectOptions::new()
            .host(&info.host)
            .port(info.port)
            .username(&info.user)
            .password(&info.password)
            .database(&info.database)
            .charset("utf8mb4");

        let pool = MySqlPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(idle_connections)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .connect_with(options)
            .await
            .context("failed to open mysql connection pool")?;
        info!("connected to db");
        Ok(Self { pool })
    }
}
