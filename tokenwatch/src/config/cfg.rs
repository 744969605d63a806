use std::{path::PathBuf, time::Duration};

use sqlx::{sqlite, SqlitePool};

use crate::chain::LcdClient;

use super::{Cli, ConfigFile};

#[derive(Clone, Debug)]
pub struct Config {
    pub cli: Cli,
    pub file: ConfigFile,
}

impl Config {
    pub fn new(cli: Cli, file: ConfigFile) -> Self {
        Self { cli, file }
    }

    pub async fn sqlite(&self) -> anyhow::Result<sqlite::SqlitePool> {
        let db = self.data();

        // SQLx doesn't seem to like it if a db file does not already exist, so let's create an empty one
        if !tokio::fs::try_exists(&db).await? {
            tokio::fs::OpenOptions::new()
                .write(true)
                .create(true)
                .open(&db)
                .await?;
        }

        Ok(SqlitePool::connect(&format!("sqlite:{}", db.to_string_lossy())).await?)
    }

    pub fn lcd_client(&self) -> anyhow::Result<LcdClient> {
        LcdClient::new(&self.lcd(), self.chain_timeout(), self.page_limit())
    }

    fn data(&self) -> PathBuf {
        self.file
            .data
            .clone()
            .unwrap_or_else(|| "tokenwatch.db".into())
    }

    fn lcd(&self) -> String {
        self.file
            .chain
            .lcd
            .clone()
            .unwrap_or_else(|| "http://127.0.0.1:1317".to_string())
    }

    fn chain_timeout(&self) -> Duration {
        Duration::from_secs(self.file.chain.timeout.unwrap_or(30))
    }

    fn page_limit(&self) -> u32 {
        self.file.chain.page_limit.unwrap_or(100)
    }

    pub fn start_height(&self) -> u64 {
        self.file.index.start_height.unwrap_or(1)
    }

    pub fn block_delay(&self) -> Duration {
        seconds(self.file.index.block_delay, 5)
    }

    pub fn notification_delay(&self) -> Duration {
        seconds(self.file.index.notification_delay, 2)
    }

    pub fn sweep_delay(&self) -> Duration {
        seconds(self.file.index.sweep_delay, 60)
    }

    pub fn retry_backoff(&self) -> Duration {
        seconds(self.file.index.retry_backoff, 10)
    }
}

/// Timer periods of zero are raised to one second.
fn seconds(value: Option<u64>, default: u64) -> Duration {
    Duration::from_secs(value.unwrap_or(default).max(1))
}
