//! Redis via multiplexed async connections

use super::expect_kind;
use crate::errors::BackendError;
use crate::manager::ManageConnection;
use async_trait::async_trait;
use config::{BackendConfig, BackendKind};
use redis::aio::MultiplexedConnection;
use redis::Client;
use tracing::{debug, trace};

#[derive(Debug, Clone)]
pub struct RedisManager {
    config: BackendConfig,
    client: Client,
}

impl RedisManager {
    pub fn new(config: BackendConfig) -> Result<Self, BackendError> {
        expect_kind(&config, &[BackendKind::Redis])?;
        let url = config.connection_url()?;
        let client = Client::open(url.as_str())?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }
}

#[async_trait]
impl ManageConnection for RedisManager {
    type Connection = MultiplexedConnection;

    fn describe(&self) -> String {
        self.config.redacted_url()
    }

    async fn connect(&self) -> Result<MultiplexedConnection, BackendError> {
        let conn = self.client.get_multiplexed_async_connection().await?;
        debug!(target_url = %self.describe(), "Connected");
        Ok(conn)
    }

    async fn tune(&self, _conn: &mut MultiplexedConnection) -> Result<(), BackendError> {
        trace!("Redis client owns its socket, no keepalive tuning");
        Ok(())
    }

    async fn health_check(&self, conn: &mut MultiplexedConnection) -> Result<(), BackendError> {
        let pong: String = redis::cmd("PING").query_async(conn).await?;
        if pong == "PONG" {
            Ok(())
        } else {
            Err(BackendError::HealthCheck(format!(
                "unexpected PING reply {:?}",
                pong
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manager_hides_password() {
        let config = BackendConfig::new(
            BackendKind::Redis,
            "cache.internal".into(),
            "2".into(),
            "app".into(),
            "hunter2".into(),
        );
        let manager = RedisManager::new(config).unwrap();
        assert!(!manager.describe().contains("hunter2"));
        assert!(manager.describe().contains("cache.internal:6379/2"));
    }
}
