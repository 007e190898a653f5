//! Byte-budgeted write destination for artifact downloads.
//!
//! [`LimitedSink`] wraps an async writer with a fixed byte quota, the
//! declared artifact size. Quota overrun and destination failure are
//! reported as distinct conditions, and closing with budget left over is an
//! error of its own.

use std::io;

use log::{debug, info};
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Failure conditions of a budgeted write destination.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The quota truncated a write; `written` bytes were still accepted.
    #[error("no space left in the write budget ({written} bytes accepted)")]
    NoSpace { written: usize },

    #[error("destination write failed: {0}")]
    Io(#[from] std::io::Error),

    /// Closed with part of the budget never written.
    #[error("destination closed {remaining} bytes short")]
    Incomplete { remaining: u64 },
}

/// Async writer bounded by a byte quota.
pub struct LimitedSink<W> {
    inner: W,
    quota: u64,
}

impl<W: AsyncWrite + Unpin> LimitedSink<W> {
    /// Wrap `inner` with a budget of exactly `quota` bytes.
    pub fn new(inner: W, quota: u64) -> Self {
        Self { inner, quota }
    }

    /// Remaining byte allowance.
    pub fn remaining(&self) -> u64 {
        self.quota
    }

    /// Write `buf`, truncated to the remaining quota.
    ///
    /// The destination may accept fewer bytes per call than offered, so the
    /// whole allowed slice is driven to completion before returning. Returns
    /// the number of bytes the destination accepted. When the quota forced a
    /// truncation the call reports [`SinkError::NoSpace`] carrying that
    /// count instead; a destination failure takes priority over the quota
    /// condition, with the bytes accepted before it already counted against
    /// the quota.
    pub async fn write(&mut self, buf: &[u8]) -> Result<usize, SinkError> {
        let allowed = self.quota.min(buf.len() as u64) as usize;
        if allowed == 0 && !buf.is_empty() {
            return Err(SinkError::NoSpace { written: 0 });
        }
        let mut written = 0;
        while written < allowed {
            match self.inner.write(&buf[written..allowed]).await {
                Ok(0) => {
                    self.quota -= written as u64;
                    return Err(SinkError::Io(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "destination accepted no more bytes",
                    )));
                }
                Ok(n) => written += n,
                Err(e) => {
                    self.quota -= written as u64;
                    return Err(SinkError::Io(e));
                }
            }
        }
        self.quota -= written as u64;
        if allowed < buf.len() {
            debug!(
                "write of {} bytes truncated to quota, {written} accepted",
                buf.len()
            );
            return Err(SinkError::NoSpace { written });
        }
        Ok(written)
    }

    /// Shut the destination down and report whether the budget was filled.
    pub async fn close(mut self) -> Result<(), SinkError> {
        self.inner.shutdown().await?;
        if self.quota == 0 {
            info!("destination closed, artifact completely written");
            Ok(())
        } else {
            debug!("destination closed {} bytes short of the budget", self.quota);
            Err(SinkError::Incomplete {
                remaining: self.quota,
            })
        }
    }
}
