use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ChainConfig {
    pub lcd: Option<String>,
    pub timeout: Option<u64>,
    pub page_limit: Option<u32>,
}
impl ChainConfig {
    fn example() -> ChainConfig {
        ChainConfig {
            lcd: Some("http://localhost:1317".into()),
            timeout: Some(30),
            page_limit: Some(100),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct IndexConfig {
    pub start_height: Option<u64>,
    pub block_delay: Option<u64>,
    pub notification_delay: Option<u64>,
    pub sweep_delay: Option<u64>,
    pub retry_backoff: Option<u64>,
}
impl IndexConfig {
    fn example() -> IndexConfig {
        IndexConfig {
            start_height: Some(1),
            block_delay: Some(5),
            notification_delay: Some(2),
            sweep_delay: Some(60),
            retry_backoff: Some(10),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ConfigFile {
    pub data: Option<PathBuf>,
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub index: IndexConfig,
}

impl ConfigFile {
    pub fn example() -> ConfigFile {
        ConfigFile {
            data: Some("tokenwatch.db".into()),
            chain: ChainConfig::example(),
            index: IndexConfig::example(),
        }
    }
}
