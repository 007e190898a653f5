//! Update client: dialect negotiation, fetch policy, control map refresh.

use std::time::Duration;

use log::{debug, error, info, warn};
use reqwest::{Method, Request, Response, StatusCode};
use serde::Deserialize;

use crate::api::{build_api_url, ApiRequester};
use crate::controlmap::UpdateControlMap;
use crate::device::CurrentUpdate;

use super::requests::{make_update_check_requests, make_update_fetch_request};
use super::response::{ResponseProcessor, UpdateResponse, UpdateResponseProcessor};
use super::resume::UpdateResumer;
use super::{Result, UpdateError};

/// Plausibility floor for declared artifact sizes: 4096 kB.
pub const MIN_ARTIFACT_SIZE: u64 = 4 * 1024 * 1024;

/// Client for the update-check and artifact-fetch operations.
///
/// Owns no connection state of its own; every operation borrows an
/// [`ApiRequester`], so one client value can serve any number of sequential
/// checks.
#[derive(Debug, Clone)]
pub struct UpdateClient {
    min_artifact_size: u64,
}

impl UpdateClient {
    pub fn new() -> Self {
        Self {
            min_artifact_size: MIN_ARTIFACT_SIZE,
        }
    }

    /// Client with a non-default size floor. Deployments smaller than the
    /// floor are refused before any payload byte is read.
    pub fn with_min_artifact_size(min_artifact_size: u64) -> Self {
        Self { min_artifact_size }
    }

    /// Ask the server for the next scheduled deployment.
    ///
    /// Negotiates across the known protocol dialects and decodes the winning
    /// response. `Ok(None)` means the server answered but has nothing
    /// scheduled for this device.
    pub async fn get_scheduled_update<A: ApiRequester>(
        &self,
        api: &A,
        server: &str,
        current: &CurrentUpdate,
    ) -> Result<Option<UpdateResponse>> {
        self.get_update_info(api, &UpdateResponseProcessor, server, current)
            .await
    }

    async fn get_update_info<A: ApiRequester, P: ResponseProcessor>(
        &self,
        api: &A,
        processor: &P,
        server: &str,
        current: &CurrentUpdate,
    ) -> Result<P::Output> {
        let requests = make_update_check_requests(server, current)?;
        let response = find_first_working_endpoint(api, requests).await?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| UpdateError::Transport(e.into()))?;
        processor.process(status, &body)
    }

    /// Start downloading the artifact at `url`.
    ///
    /// Requires a plain 200 with a declared content length of at least the
    /// configured minimum; the byte budget downstream depends on that
    /// declaration, so unknown sizes are refused outright. On success the
    /// response is wrapped in an [`UpdateResumer`] that owns `api` for
    /// re-issuing the request, and the declared size is returned with it.
    pub async fn fetch_update<A: ApiRequester>(
        &self,
        api: A,
        url: &str,
        max_wait: Duration,
    ) -> Result<(UpdateResumer<A>, u64)> {
        let request = make_update_fetch_request(url)?;
        let target = request.url().clone();

        let response = api.send(request).await.map_err(|e| {
            error!("cannot fetch update artifact: {e}");
            UpdateError::Transport(e)
        })?;

        debug!("fetch update response: HTTP {}", response.status());

        if response.status() != StatusCode::OK {
            error!("artifact fetch refused: HTTP {}", response.status());
            return Err(UpdateError::FetchRejected(response.status()));
        }

        let size = match response.content_length() {
            Some(size) => size,
            None => {
                error!("will not fetch an artifact of unknown size");
                return Err(UpdateError::UnknownSize);
            }
        };
        if size < self.min_artifact_size {
            error!(
                "artifact smaller than expected: declared {size}, minimum {}",
                self.min_artifact_size
            );
            return Err(UpdateError::TooSmall {
                size,
                min: self.min_artifact_size,
            });
        }

        Ok((
            UpdateResumer::new(api, target, response, size, max_wait),
            size,
        ))
    }
}

impl Default for UpdateClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Try each candidate request in dialect order and return the first
/// response that settles the negotiation.
///
/// 200, 204 and 401 all settle it: even an unauthorized answer proves the
/// endpoint understood the request, and the decode stage turns it into the
/// right error. Only a 404 moves on to the next dialect; everything else
/// fails the whole check, and transport failures never fall through to an
/// older dialect.
async fn find_first_working_endpoint<A: ApiRequester>(
    api: &A,
    requests: Vec<Request>,
) -> Result<Response> {
    for request in requests {
        let method = request.method().clone();
        let url = request.url().clone();

        let response = api.send(request).await.map_err(|e| {
            debug!("failed sending update check request ({method} {url}): {e}");
            UpdateError::Transport(e)
        })?;

        match response.status() {
            StatusCode::OK | StatusCode::NO_CONTENT | StatusCode::UNAUTHORIZED => {
                let auth = if response.status() == StatusCode::UNAUTHORIZED {
                    "unauthorized"
                } else {
                    "authorized"
                };
                debug!(
                    "successful ({auth}) update check ({method} {url}): HTTP {}",
                    response.status()
                );
                return Ok(response);
            }

            StatusCode::NOT_FOUND => {
                info!("request {method} to {url} returned HTTP 404");
                // dropped response releases the connection; try the next
                // dialect
            }

            status if status.is_client_error() || status.is_server_error() => {
                debug!("request not accepted by the server ({method} {url}): HTTP {status}");
                let body = response.text().await.unwrap_or_default();
                return Err(UpdateError::ServerRejected { status, body });
            }

            status => return Err(UpdateError::UnexpectedStatus(status)),
        }
    }

    Err(UpdateError::EndpointsExhausted)
}

#[derive(Deserialize)]
struct ControlMapEnvelope {
    #[serde(default)]
    update_control_map: Option<UpdateControlMap>,
}

/// Fetch a fresh update control map for a deployment the device already
/// knows about.
///
/// `Ok(None)` means the deployment no longer exists on the server. A 200
/// whose body carries no control map is an error: the endpoint has nothing
/// else to say.
pub async fn refresh_control_map<A: ApiRequester>(
    api: &A,
    server: &str,
    deployment_id: &str,
) -> Result<Option<UpdateControlMap>> {
    let path = format!("/v2/deployments/device/deployments/{deployment_id}/update_control_map");
    let url = build_api_url(server, &path)
        .map_err(|e| UpdateError::InvalidRequest(format!("bad server address {server}: {e}")))?;

    let response = api
        .send(Request::new(Method::GET, url))
        .await
        .map_err(UpdateError::Transport)?;

    match response.status() {
        StatusCode::OK => {
            let body = response
                .bytes()
                .await
                .map_err(|e| UpdateError::Transport(e.into()))?;
            let envelope: ControlMapEnvelope = serde_json::from_slice(&body)
                .map_err(|source| UpdateError::Malformed {
                    partial: None,
                    source,
                })?;
            match envelope.update_control_map {
                Some(map) => Ok(Some(map)),
                None => Err(UpdateError::MissingControlMap),
            }
        }

        StatusCode::NOT_FOUND => Ok(None),

        status => {
            warn!("unexpected HTTP status {status} from the control map refresh");
            Err(UpdateError::InvalidResponse(status))
        }
    }
}
