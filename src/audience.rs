use crate::constants::{
    AUDIENCE_NAME_MAX_CHARS, AUDIENCE_SUBTYPE, CUSTOMER_FILE_SOURCE, PHONE_HASH_SCHEMA,
};
use crate::facebook::{FacebookApiError, GraphApi, Params};
use crate::models::{AdAccountRef, CustomAudience, HashedIdentifier, UploadState, ValidationError};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AudienceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Failed to create custom audience: {0}")]
    Create(#[source] FacebookApiError),
    #[error("Failed to add users to custom audience {audience_id}: {source}")]
    Upload {
        audience_id: String,
        #[source]
        source: FacebookApiError,
    },
}

impl AudienceError {
    pub fn stage(&self) -> &'static str {
        match self {
            AudienceError::Validation(_) => "validation",
            AudienceError::Create(_) => "create",
            AudienceError::Upload { .. } => "upload",
        }
    }

    pub fn remote(&self) -> Option<&FacebookApiError> {
        match self {
            AudienceError::Validation(_) => None,
            AudienceError::Create(source) | AudienceError::Upload { source, .. } => Some(source),
        }
    }

    /// Id of an audience that exists remotely despite the failure.
    pub fn audience_id(&self) -> Option<&str> {
        match self {
            AudienceError::Upload { audience_id, .. } => Some(audience_id),
            _ => None,
        }
    }
}

/// Creates a customer-file audience and uploads its members in one batch.
///
/// Validation failures issue no remote call. An upload failure reports the
/// id of the audience that was already created so the upload can be retried
/// on its own.
pub async fn create_custom_audience<A: GraphApi + ?Sized>(
    api: &A,
    account: &AdAccountRef,
    identifiers: &BTreeSet<HashedIdentifier>,
    name: &str,
    description: Option<&str>,
) -> Result<CustomAudience, AudienceError> {
    let name = validate_name(name)?;
    if identifiers.is_empty() {
        return Err(ValidationError::NoIdentifiers { rejected: 0 }.into());
    }
    let description = description
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string);

    let mut params = Params::new();
    params.insert("name".to_string(), json!(name));
    params.insert("subtype".to_string(), json!(AUDIENCE_SUBTYPE));
    params.insert(
        "customer_file_source".to_string(),
        json!(CUSTOMER_FILE_SOURCE),
    );
    if let Some(description) = &description {
        params.insert("description".to_string(), json!(description));
    }

    let created = api
        .create(&account.edge("customaudiences"), params)
        .await
        .map_err(|e| {
            warn!(%account, error = %e, "custom audience creation failed");
            AudienceError::Create(e)
        })?;
    info!(%account, audience_id = %created.id, "custom audience created");

    let mut audience = CustomAudience {
        id: created.id,
        name,
        description,
        subtype: AUDIENCE_SUBTYPE.to_string(),
        member_count: 0,
        invalid_entries: 0,
        state: UploadState::Created,
    };

    audience.state = UploadState::MembersUploading;
    let receipt = api
        .upload(&format!("{}/users", audience.id), users_payload(identifiers))
        .await
        .map_err(|e| {
            warn!(audience_id = %audience.id, error = %e, "member upload failed");
            AudienceError::Upload {
                audience_id: audience.id.clone(),
                source: e,
            }
        })?;

    audience.member_count = receipt.num_received;
    audience.invalid_entries = receipt.num_invalid_entries;
    audience.state = UploadState::Ready;
    info!(
        audience_id = %audience.id,
        received = receipt.num_received,
        invalid = receipt.num_invalid_entries,
        "custom audience members uploaded"
    );

    Ok(audience)
}

fn validate_name(name: &str) -> Result<String, ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::Empty {
            field: "audience_name",
        });
    }
    if name.chars().count() > AUDIENCE_NAME_MAX_CHARS {
        return Err(ValidationError::TooLong {
            field: "audience_name",
            max: AUDIENCE_NAME_MAX_CHARS,
        });
    }
    Ok(name.to_string())
}

fn users_payload(identifiers: &BTreeSet<HashedIdentifier>) -> Params {
    let data: Vec<Value> = identifiers.iter().map(|id| json!([id.as_str()])).collect();

    let mut params = Params::new();
    params.insert(
        "payload".to_string(),
        json!({ "schema": [PHONE_HASH_SCHEMA], "data": data }),
    );
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facebook::mock::{api_error, created, uploaded, Call, MockGraphApi, Reply};

    fn account() -> AdAccountRef {
        AdAccountRef::parse("act_123").unwrap()
    }

    fn ids(n: u8) -> BTreeSet<HashedIdentifier> {
        (1..=n)
            .map(|i| HashedIdentifier::parse(&format!("{:064x}", i)).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn empty_identifiers_make_no_calls() {
        let api = MockGraphApi::new(vec![]);
        let err = create_custom_audience(&api, &account(), &BTreeSet::new(), "VIPs", None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AudienceError::Validation(ValidationError::NoIdentifiers { .. })
        ));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn blank_or_long_name_makes_no_calls() {
        let api = MockGraphApi::new(vec![]);

        let err = create_custom_audience(&api, &account(), &ids(1), "   ", None)
            .await
            .unwrap_err();
        assert_eq!(err.stage(), "validation");

        let long = "x".repeat(101);
        let err = create_custom_audience(&api, &account(), &ids(1), &long, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AudienceError::Validation(ValidationError::TooLong { .. })
        ));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn creates_then_uploads_single_batch() {
        let api = MockGraphApi::new(vec![created("aud_1"), uploaded("aud_1", 3)]);
        let audience =
            create_custom_audience(&api, &account(), &ids(3), "VIPs", Some("top buyers"))
                .await
                .unwrap();

        assert_eq!(audience.id, "aud_1");
        assert_eq!(audience.member_count, 3);
        assert_eq!(audience.state, UploadState::Ready);
        assert_eq!(audience.subtype, "CUSTOM");

        let calls = api.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(calls[0], Call::Create { .. }));
        assert_eq!(calls[0].path(), "act_123/customaudiences");
        assert_eq!(calls[0].params()["name"], "VIPs");
        assert_eq!(calls[0].params()["description"], "top buyers");
        assert_eq!(calls[0].params()["subtype"], "CUSTOM");

        assert!(matches!(calls[1], Call::Upload { .. }));
        assert_eq!(calls[1].path(), "aud_1/users");
        let payload = &calls[1].params()["payload"];
        assert_eq!(payload["schema"], json!(["PHONE_SHA256"]));
        let data = payload["data"].as_array().unwrap();
        assert_eq!(data.len(), 3);
        assert_eq!(data[0], json!([format!("{:064x}", 1)]));
    }

    #[tokio::test]
    async fn create_failure_skips_upload() {
        let api = MockGraphApi::new(vec![Reply::Created(Err(api_error("Invalid account")))]);
        let err = create_custom_audience(&api, &account(), &ids(2), "VIPs", None)
            .await
            .unwrap_err();

        assert_eq!(err.stage(), "create");
        assert_eq!(err.audience_id(), None);
        assert!(err.to_string().contains("Invalid account"));
        assert_eq!(api.calls().len(), 1);
    }

    #[tokio::test]
    async fn upload_failure_reports_created_audience() {
        let api = MockGraphApi::new(vec![
            created("aud_7"),
            Reply::Uploaded(Err(api_error("Rate limited"))),
        ]);
        let err = create_custom_audience(&api, &account(), &ids(2), "VIPs", None)
            .await
            .unwrap_err();

        assert_eq!(err.stage(), "upload");
        assert_eq!(err.audience_id(), Some("aud_7"));
        assert!(err.to_string().contains("Rate limited"));
        assert_eq!(api.calls().len(), 2);
    }
}
