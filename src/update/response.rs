//! Deployment descriptor types and update-check response decoding.
//!
//! The outer response document is decoded leniently (unknown fields are
//! ignored, the server adds fields over time), but the embedded update
//! control map is decoded strictly. When the strict part fails, the update
//! info alone is salvaged and attached to the error so callers can still
//! log what the server scheduled.

use chrono::{DateTime, Utc};
use log::{debug, warn};
use reqwest::StatusCode;
use serde::Deserialize;

use crate::controlmap::UpdateControlMap;

use super::{Result, UpdateError};

/// Where the artifact payload can be downloaded from.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ArtifactSource {
    #[serde(default)]
    pub uri: String,
    /// Expiry of the (usually pre-signed) download link.
    #[serde(default)]
    pub expire: Option<DateTime<Utc>>,
}

/// The artifact a deployment wants installed.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Artifact {
    #[serde(default)]
    pub source: ArtifactSource,
    #[serde(default, rename = "device_types_compatible")]
    pub compatible_devices: Vec<String>,
    #[serde(default)]
    pub artifact_name: String,
}

/// Core deployment record of an update-check response.
///
/// Every field defaults so a structurally empty document still decodes;
/// [`UpdateInfo::validate`] is what decides whether the record is usable.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct UpdateInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub artifact: Artifact,
}

impl UpdateInfo {
    /// Check that every field needed to actually fetch the artifact is set.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.id.is_empty() {
            return Err("deployment id missing".into());
        }
        if self.artifact.artifact_name.is_empty() {
            return Err("artifact name missing".into());
        }
        if self.artifact.source.uri.is_empty() {
            return Err("artifact source URI missing".into());
        }
        if self.artifact.compatible_devices.is_empty() {
            return Err("compatible device types missing".into());
        }
        Ok(())
    }
}

/// Validated outcome of a successful update check: the deployment plus the
/// optional rollout control map.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct UpdateResponse {
    #[serde(flatten)]
    pub info: UpdateInfo,
    #[serde(default)]
    pub update_control_map: Option<UpdateControlMap>,
}

/// Strategy turning one buffered update-check response into a typed result.
///
/// The negotiation loop is independent of the document shape it wins; new
/// endpoints can reuse it by shipping their own processor.
pub trait ResponseProcessor {
    type Output;

    /// Interpret a fully buffered response.
    fn process(&self, status: StatusCode, body: &[u8]) -> Result<Self::Output>;
}

/// Decoder for the deployments/next response, per the status-code contract:
/// 200 decodes and validates a descriptor, 204 means nothing is scheduled,
/// 401 is an authorization failure, anything else is a protocol violation.
pub struct UpdateResponseProcessor;

impl ResponseProcessor for UpdateResponseProcessor {
    type Output = Option<UpdateResponse>;

    fn process(&self, status: StatusCode, body: &[u8]) -> Result<Option<UpdateResponse>> {
        match status {
            StatusCode::OK => {
                debug!("have update available");
                let response: UpdateResponse = match serde_json::from_slice(body) {
                    Ok(response) => response,
                    Err(source) => {
                        // Most likely a control map the strict decoder
                        // refused; salvage the update info on its own.
                        let partial = serde_json::from_slice::<UpdateInfo>(body).ok();
                        return Err(UpdateError::Malformed { partial, source });
                    }
                };
                if let Err(reason) = response.info.validate() {
                    return Err(UpdateError::Validation {
                        response: Box::new(response),
                        reason,
                    });
                }
                debug!(
                    "update response received and validated, artifact at {}",
                    response.info.artifact.source.uri
                );
                Ok(Some(response))
            }

            StatusCode::NO_CONTENT => {
                debug!("no update available");
                Ok(None)
            }

            StatusCode::UNAUTHORIZED => {
                warn!("client not authorized to get update schedule");
                Err(UpdateError::NotAuthorized)
            }

            _ => {
                warn!("invalid response status code {status} from the update check");
                Err(UpdateError::InvalidResponse(status))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_RESPONSE: &str = r#"{
        "id": "w81s4fae-7dec-11d0-a765-00a0c91e6bf6",
        "artifact": {
            "artifact_name": "release-7",
            "source": {
                "uri": "https://store.example.com/artifact/7",
                "expire": "2026-03-11T13:03:17.063493443Z"
            },
            "device_types_compatible": ["gate-v3"]
        },
        "update_control_map": {
            "id": "w81s4fae-7dec-11d0-a765-00a0c91e6bf6",
            "priority": 1,
            "states": {
                "ArtifactInstall_Enter": { "action": "pause" }
            }
        }
    }"#;

    fn process(status: u16, body: &str) -> Result<Option<UpdateResponse>> {
        UpdateResponseProcessor.process(
            StatusCode::from_u16(status).unwrap(),
            body.as_bytes(),
        )
    }

    #[test]
    fn ok_decodes_and_validates() {
        let response = process(200, FULL_RESPONSE).unwrap().unwrap();
        assert_eq!(response.info.id, "w81s4fae-7dec-11d0-a765-00a0c91e6bf6");
        assert_eq!(response.info.artifact.artifact_name, "release-7");
        assert_eq!(
            response.info.artifact.source.uri,
            "https://store.example.com/artifact/7"
        );
        let map = response.update_control_map.unwrap();
        assert_eq!(map.priority, 1);
    }

    #[test]
    fn control_map_is_optional() {
        let body = r#"{
            "id": "d1",
            "artifact": {
                "artifact_name": "release-7",
                "source": { "uri": "https://store.example.com/artifact/7" },
                "device_types_compatible": ["gate-v3"]
            }
        }"#;
        let response = process(200, body).unwrap().unwrap();
        assert!(response.update_control_map.is_none());
    }

    #[test]
    fn unknown_outer_fields_are_tolerated() {
        let body = r#"{
            "id": "d1",
            "artifact": {
                "artifact_name": "release-7",
                "source": { "uri": "https://store.example.com/artifact/7" },
                "device_types_compatible": ["gate-v3"],
                "payload_types": ["rootfs-image"]
            },
            "phased_rollout": { "group": 2 }
        }"#;
        assert!(process(200, body).unwrap().is_some());
    }

    #[test]
    fn bad_control_map_salvages_update_info() {
        let body = r#"{
            "id": "d1",
            "artifact": {
                "artifact_name": "release-7",
                "source": { "uri": "https://store.example.com/artifact/7" },
                "device_types_compatible": ["gate-v3"]
            },
            "update_control_map": { "id": "d1", "flavor": "mild" }
        }"#;
        match process(200, body) {
            Err(UpdateError::Malformed { partial, .. }) => {
                let info = partial.expect("update info should be salvaged");
                assert_eq!(info.id, "d1");
                assert_eq!(info.artifact.artifact_name, "release-7");
            }
            other => panic!("expected Malformed, got {other:?}"),
        }
    }

    #[test]
    fn unparseable_body_salvages_nothing() {
        match process(200, "not json at all") {
            Err(UpdateError::Malformed { partial, .. }) => assert!(partial.is_none()),
            other => panic!("expected Malformed, got {other:?}"),
        }
    }

    #[test]
    fn missing_source_uri_fails_validation() {
        let body = r#"{
            "id": "d1",
            "artifact": {
                "artifact_name": "release-7",
                "device_types_compatible": ["gate-v3"]
            }
        }"#;
        match process(200, body) {
            Err(UpdateError::Validation { response, reason }) => {
                assert_eq!(response.info.id, "d1");
                assert!(reason.contains("source URI"), "reason={reason}");
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn empty_document_fails_validation_not_parsing() {
        match process(200, "{}") {
            Err(UpdateError::Validation { reason, .. }) => {
                assert!(reason.contains("deployment id"), "reason={reason}");
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn no_content_means_no_deployment() {
        assert!(process(204, "").unwrap().is_none());
    }

    #[test]
    fn unauthorized_is_its_own_error() {
        assert!(matches!(process(401, ""), Err(UpdateError::NotAuthorized)));
    }

    #[test]
    fn other_statuses_are_invalid_responses() {
        match process(418, "") {
            Err(UpdateError::InvalidResponse(status)) => assert_eq!(status.as_u16(), 418),
            other => panic!("expected InvalidResponse, got {other:?}"),
        }
    }
}
