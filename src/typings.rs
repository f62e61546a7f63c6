use crate::{mutate::Mutator, patch, Error, Result};

pub const API_VERSION: &str = "admission.k8s.io/v1";
const LEGACY_API_VERSION: &str = "admission.k8s.io/v1beta1";
pub const REVIEW_KIND: &str = "AdmissionReview";

#[derive(Debug, Clone, serde::Deserialize)]
pub struct AdmissionReviewRequest {
    #[serde(rename = "apiVersion", default)]
    api_version: Option<String>,
    #[serde(default)]
    kind: Option<String>,
    pub request: Request,
}

impl AdmissionReviewRequest {
    /// Checks the envelope. Both fields are optional, but when present they
    /// must name an admission review.
    pub fn validate(&self) -> Result<()> {
        if let Some(api_version) = &self.api_version {
            if api_version != API_VERSION && api_version != LEGACY_API_VERSION {
                return Err(Error::malformed(format!(
                    "unexpected apiVersion {}",
                    api_version
                )));
            }
        }
        if let Some(kind) = &self.kind {
            if kind != REVIEW_KIND {
                return Err(Error::malformed(format!("unexpected kind {}", kind)));
            }
        }
        Ok(())
    }

    /// Runs the mutator and answers with the resulting patch. Requests
    /// without an object (DELETE, some CONNECT) are admitted unchanged.
    pub fn review(&self, mutator: &Mutator) -> Result<AdmissionReviewResponse> {
        if self.request.object.is_null() {
            tracing::debug!(uid = self.request.uid.as_str(), "no object to mutate");
            return Ok(self.allow_unchanged());
        }
        let mutated = mutator.mutate(&self.request)?;
        self.allow(&mutated)
    }

    pub fn allow(&self, new_object: &serde_json::Value) -> Result<AdmissionReviewResponse> {
        let response = patch::build_response(&self.request.object, new_object, &self.request.uid)?;
        Ok(AdmissionReviewResponse::wrap(response))
    }

    /// Admits the object as is, without a patch.
    pub fn allow_unchanged(&self) -> AdmissionReviewResponse {
        AdmissionReviewResponse::wrap(Response {
            allowed: true,
            uid: self.request.uid.clone(),
            status: None,
            patch: None,
        })
    }

    pub fn reject(&self, code: u16, message: &str) -> AdmissionReviewResponse {
        AdmissionReviewResponse::wrap(Response {
            allowed: false,
            uid: self.request.uid.clone(),
            status: Some(Status {
                code,
                message: message.to_string(),
            }),
            patch: None,
        })
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct GroupVersionKind {
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub version: String,
    pub kind: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Request {
    pub uid: String,
    pub kind: GroupVersionKind,
    /// Absent for cluster-scoped objects.
    #[serde(default)]
    namespace: Option<String>,
    /// Null for requests without an object, e.g. DELETE.
    #[serde(default)]
    pub object: serde_json::Value,
}

impl Request {
    pub fn namespace(&self) -> &str {
        self.namespace.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct AdmissionReviewResponse {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub response: Response,
}

impl AdmissionReviewResponse {
    fn wrap(response: Response) -> Self {
        AdmissionReviewResponse {
            api_version: API_VERSION.to_string(),
            kind: REVIEW_KIND.to_string(),
            response,
        }
    }
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct Response {
    pub uid: String,
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(flatten)]
    pub patch: Option<Patch>,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct Status {
    pub code: u16,
    pub message: String,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct Patch {
    #[serde(rename = "patchType")]
    pub patch_type: String,
    pub patch: String,
}
