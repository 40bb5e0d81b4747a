//! Local service readiness probe

use std::time::{Duration, Instant};

use tokio::net::TcpStream;
use tokio::time::sleep;

use cx_core::error::TunnelError;

/// Poll `127.0.0.1:port` until it accepts a TCP connection.
///
/// Fails with [`TunnelError::ServiceNotReady`] once `timeout` has elapsed.
pub async fn wait_for_local_service(
    port: u16,
    timeout: Duration,
    interval: Duration,
) -> Result<(), TunnelError> {
    let start = Instant::now();

    loop {
        match TcpStream::connect(("127.0.0.1", port)).await {
            Ok(_) => {
                tracing::debug!(
                    "Local service on port {} ready after {:?}",
                    port,
                    start.elapsed()
                );
                return Ok(());
            }
            Err(e) => tracing::trace!("Port {} not ready: {}", port, e),
        }

        if start.elapsed() >= timeout {
            return Err(TunnelError::ServiceNotReady { port, timeout });
        }

        sleep(interval).await;
    }
}
