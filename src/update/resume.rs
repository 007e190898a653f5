//! Resumable, size-bounded streaming of one update artifact.
//!
//! A dropped connection halfway through a multi-megabyte download should not
//! throw the delivered bytes away. [`UpdateResumer`] keeps the byte offset
//! of everything handed to the caller and re-issues the request with a
//! `Range` header from that offset whenever the stream fails or ends early,
//! until a time budget fixed at creation runs out.

use std::time::Duration;

use bytes::Bytes;
use log::{debug, warn};
use reqwest::header::{HeaderValue, RANGE};
use reqwest::{Method, Request, Response, StatusCode, Url};
use tokio::time::{sleep, Instant};

use crate::api::ApiRequester;

use super::{Result, UpdateError};

/// Pause before retrying a resume whose own request could not be sent.
const RESUME_RETRY_PAUSE: Duration = Duration::from_secs(1);

/// One artifact download in progress.
///
/// Created by `UpdateClient::fetch_update` once the response has passed the
/// size checks. Holds the transport capability so it can reconstruct the
/// request on resume; dropping it releases the current connection no matter
/// how far the transfer got.
#[derive(Debug)]
pub struct UpdateResumer<A> {
    api:      A,
    url:      Url,
    response: Response,
    total:    u64,
    offset:   u64,
    deadline: Instant,
}

impl<A: ApiRequester> UpdateResumer<A> {
    pub(crate) fn new(
        api: A,
        url: Url,
        response: Response,
        total: u64,
        max_wait: Duration,
    ) -> Self {
        let now = Instant::now();
        // Budgets too large for the clock arithmetic are capped to a year.
        let deadline = now
            .checked_add(max_wait)
            .unwrap_or_else(|| now + Duration::from_secs(365 * 24 * 60 * 60));
        Self {
            api,
            url,
            response,
            total,
            offset: 0,
            deadline,
        }
    }

    /// Declared size of the artifact in bytes.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Bytes delivered to the caller so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Bytes the declared size still owes the caller.
    pub fn remaining(&self) -> u64 {
        self.total - self.offset
    }

    /// The next chunk of the artifact, or `None` once the declared size has
    /// been delivered.
    ///
    /// Never yields bytes past the declared size; a server sending more is
    /// cut off there. A mid-stream failure or a premature end of stream
    /// resumes from the current offset while the time budget lasts, then
    /// surfaces as a terminal error.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>> {
        if self.remaining() == 0 {
            return Ok(None);
        }
        loop {
            match self.response.chunk().await {
                Ok(Some(data)) => {
                    if data.is_empty() {
                        continue;
                    }
                    let take = self.remaining().min(data.len() as u64) as usize;
                    self.offset += take as u64;
                    if self.remaining() == 0 {
                        debug!("artifact fully delivered: {} bytes", self.total);
                    }
                    return Ok(Some(data.slice(..take)));
                }

                Ok(None) => {
                    debug!(
                        "artifact stream ended early at {} of {} bytes",
                        self.offset, self.total
                    );
                    self.resume(None).await?;
                }

                Err(e) => {
                    debug!("artifact stream failed at byte {}: {e}", self.offset);
                    self.resume(Some(e)).await?;
                }
            }
        }
    }

    /// Re-issue the download from the current offset.
    ///
    /// `cause` is the stream failure that triggered the resume; it becomes
    /// the terminal error once the time budget is spent. `None` marks a
    /// premature end of stream, reported as a short transfer.
    async fn resume(&mut self, cause: Option<reqwest::Error>) -> Result<()> {
        let mut terminal = match cause {
            Some(e) => UpdateError::Transport(e.into()),
            None => UpdateError::ShortTransfer {
                got:  self.offset,
                want: self.total,
            },
        };

        loop {
            if Instant::now() >= self.deadline {
                return Err(terminal);
            }
            warn!(
                "artifact download interrupted at {} of {} bytes, resuming",
                self.offset, self.total
            );

            match self.api.send(self.range_request()?).await {
                Ok(response) if response.status() == StatusCode::PARTIAL_CONTENT => {
                    debug!("download resumed from byte {}", self.offset);
                    self.response = response;
                    return Ok(());
                }
                // Anything but 206 restarts from byte zero, which would
                // break the offset accounting.
                Ok(response) => return Err(UpdateError::ResumeRejected(response.status())),
                Err(e) => {
                    debug!("resume request failed: {e}");
                    terminal = UpdateError::Transport(e);
                    sleep(RESUME_RETRY_PAUSE).await;
                }
            }
        }
    }

    fn range_request(&self) -> Result<Request> {
        let mut request = Request::new(Method::GET, self.url.clone());
        let range = HeaderValue::try_from(format!("bytes={}-", self.offset))
            .map_err(|e| UpdateError::InvalidRequest(format!("range header: {e}")))?;
        request.headers_mut().insert(RANGE, range);
        Ok(request)
    }
}
