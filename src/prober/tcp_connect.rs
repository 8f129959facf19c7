use crate::error::{ProbeError, timed_out};
use crate::sampler::Sample;
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tokio::time::{Duration, Instant, timeout};

/// Time a TCP handshake to `addr`; the connection is closed right away.
pub async fn probe_tcp(addr: SocketAddr, limit: Duration) -> Result<Sample, ProbeError> {
    let start = Instant::now();
    let conn_fut = TcpStream::connect(addr);
    let conn = timeout(limit, conn_fut)
        .await
        .map_err(|_| ProbeError::connect(addr, timed_out(limit)))?
        .map_err(|e| ProbeError::connect(addr, e))?;
    let elapsed = start.elapsed();
    drop(conn);
    Ok(Sample::timed(elapsed))
}
