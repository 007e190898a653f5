//! Candidate request construction for the update-check dialects.
//!
//! Three generations of the deployment API are still in the field, so the
//! builder produces one request per dialect, richest first:
//!   1. POST v2 — provides wrapped in `device_provides`, opts in to update
//!      control maps
//!   2. POST v1 — provides flattened into the body
//!   3. GET  v1 — device type and artifact name as query parameters

use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::{Method, Request};
use serde::Serialize;
use url::Url;

use crate::api::build_api_url;
use crate::device::CurrentUpdate;

use super::{Result, UpdateError};

pub(crate) const DEPLOYMENTS_NEXT_V2: &str = "/v2/deployments/device/deployments/next";
pub(crate) const DEPLOYMENTS_NEXT_V1: &str = "/v1/deployments/device/deployments/next";

/// Body of the v2 update-check POST.
#[derive(Serialize)]
struct CheckBodyV2<'a> {
    device_provides:    &'a CurrentUpdate,
    update_control_map: bool,
}

/// Build the update-check candidates for every dialect, in fallback order.
pub fn make_update_check_requests(server: &str, current: &CurrentUpdate) -> Result<Vec<Request>> {
    let v2_body = serde_json::to_vec(&CheckBodyV2 {
        device_provides:    current,
        update_control_map: true,
    })
    .map_err(|e| UpdateError::InvalidRequest(format!("encoding v2 body: {e}")))?;
    let v1_body = serde_json::to_vec(current)
        .map_err(|e| UpdateError::InvalidRequest(format!("encoding v1 body: {e}")))?;

    let mut requests = Vec::with_capacity(3);
    requests.push(json_post(api_url(server, DEPLOYMENTS_NEXT_V2)?, v2_body));
    requests.push(json_post(api_url(server, DEPLOYMENTS_NEXT_V1)?, v1_body));
    requests.push(Request::new(Method::GET, v1_check_url(server, current)?));
    Ok(requests)
}

/// Build the artifact GET for `url` (absolute, straight from the deployment
/// descriptor).
pub fn make_update_fetch_request(url: &str) -> Result<Request> {
    let target: Url = url
        .parse()
        .map_err(|e| UpdateError::InvalidRequest(format!("bad artifact URL {url}: {e}")))?;
    Ok(Request::new(Method::GET, target))
}

fn api_url(server: &str, path: &str) -> Result<Url> {
    build_api_url(server, path)
        .map_err(|e| UpdateError::InvalidRequest(format!("bad server address {server}: {e}")))
}

fn json_post(url: Url, body: Vec<u8>) -> Request {
    let mut request = Request::new(Method::POST, url);
    request
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    *request.body_mut() = Some(body.into());
    request
}

/// v1 GET URL; `device_type` and `artifact_name` are appended only when
/// non-empty, and an all-empty identity produces no query string at all.
fn v1_check_url(server: &str, current: &CurrentUpdate) -> Result<Url> {
    let mut url = api_url(server, DEPLOYMENTS_NEXT_V1)?;
    if !current.device_type.is_empty() || !current.artifact_name.is_empty() {
        let mut pairs = url.query_pairs_mut();
        if !current.device_type.is_empty() {
            pairs.append_pair("device_type", &current.device_type);
        }
        if !current.artifact_name.is_empty() {
            pairs.append_pair("artifact_name", &current.artifact_name);
        }
    }
    Ok(url)
}
