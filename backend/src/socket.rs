//! TCP keepalive tuning
//!
//! PostgreSQL and SQL Server connections get the same client-side keepalive
//! profile. Keepalives start after the configured connection timeout of idleness
//! and go out every second. Three unanswered keepalives drop the connection, and
//! unacknowledged writes time out after the connection timeout.

use config::BackendConfig;
use socket2::{SockRef, TcpKeepalive};
use std::io;
use std::time::Duration;
use tokio::net::TcpStream;

pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(1);
pub const KEEPALIVE_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketTuning {
    /// Idle time before the first keepalive
    pub idle: Duration,
    pub interval: Duration,
    pub retries: u32,
    /// How long written data may stay unacknowledged
    pub user_timeout: Duration,
}

impl SocketTuning {
    pub fn new(connection_timeout: Duration) -> Self {
        Self {
            idle: connection_timeout,
            interval: KEEPALIVE_INTERVAL,
            retries: KEEPALIVE_RETRIES,
            user_timeout: connection_timeout,
        }
    }

    pub fn from_config(config: &BackendConfig) -> Self {
        Self::new(config.connection_timeout())
    }

    fn keepalive(&self) -> TcpKeepalive {
        let keepalive = TcpKeepalive::new().with_time(self.idle);

        #[cfg(any(target_os = "linux", target_os = "android"))]
        let keepalive = keepalive
            .with_interval(self.interval)
            .with_retries(self.retries);

        keepalive
    }

    /// Apply the profile to a socket we dialed ourselves
    pub fn apply(&self, stream: &TcpStream) -> io::Result<()> {
        let socket = SockRef::from(stream);
        socket.set_keepalive(true)?;
        socket.set_tcp_keepalive(&self.keepalive())?;

        #[cfg(any(target_os = "linux", target_os = "android"))]
        socket.set_tcp_user_timeout(Some(self.user_timeout))?;

        Ok(())
    }

    /// Hand the profile to tokio-postgres, which dials its own sockets
    pub fn apply_to_postgres(&self, config: &mut tokio_postgres::Config) {
        config
            .keepalives(true)
            .keepalives_idle(self.idle)
            .keepalives_interval(self.interval)
            .keepalives_retries(self.retries)
            .tcp_user_timeout(self.user_timeout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_profile_follows_connection_timeout() {
        let tuning = SocketTuning::new(Duration::from_secs(5));
        assert_eq!(tuning.idle, Duration::from_secs(5));
        assert_eq!(tuning.interval, Duration::from_secs(1));
        assert_eq!(tuning.retries, 3);
        assert_eq!(tuning.user_timeout, Duration::from_millis(5000));
    }

    #[test]
    fn test_postgres_client_keepalives() {
        let mut config = tokio_postgres::Config::new();
        SocketTuning::new(Duration::from_secs(5)).apply_to_postgres(&mut config);

        assert!(config.get_keepalives());
        assert_eq!(config.get_keepalives_idle(), Duration::from_secs(5));
        assert_eq!(config.get_keepalives_interval(), Some(Duration::from_secs(1)));
        assert_eq!(config.get_keepalives_retries(), Some(3));
    }

    #[tokio::test]
    async fn test_apply_to_live_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let stream = TcpStream::connect(addr).await.unwrap();

        SocketTuning::new(Duration::from_secs(5)).apply(&stream).unwrap();

        let socket = SockRef::from(&stream);
        assert!(socket.keepalive().unwrap());
        #[cfg(target_os = "linux")]
        {
            assert_eq!(socket.keepalive_time().unwrap(), Duration::from_secs(5));
            assert_eq!(socket.keepalive_interval().unwrap(), Duration::from_secs(1));
            assert_eq!(socket.keepalive_retries().unwrap(), 3);
        }
    }
}
