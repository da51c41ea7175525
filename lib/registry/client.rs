//! The Registry Client (C1): a typed, stateless wrapper over the Distribution v2 HTTP
//! API — catalog listing, tag listing, manifest fetch with media-type negotiation and
//! index descent, config blob fetch, and manifest delete with retry.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde_json::Value;
use tracing::{debug, warn};

use crate::registry::manifest::{
    accept_header_value, decode_manifest, first_resolvable_entry, IndexEntry, Manifest,
    OCI_INDEX_V1,
};
use crate::{RegicacheError, RegicacheResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// HTTP Basic auth material, attached only when both fields are non-empty (spec.md 4.1).
#[derive(Debug, Clone, Default)]
pub struct RegistryAuth {
    /// The basic-auth username.
    pub username: String,
    /// The basic-auth password.
    pub password: String,
}

impl RegistryAuth {
    fn is_set(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}

/// A stateless client over one registry's Distribution v2 HTTP API.
#[derive(Clone)]
pub struct RegistryClient {
    base_url: String,
    auth: RegistryAuth,
    client: ClientWithMiddleware,
}

/// The raw result of a single manifest GET: the decoded manifest, the
/// `Docker-Content-Digest` response header (if present), and the raw response body —
/// used by the Tag Deleter to drive `ChooseDeleteDigest` (spec.md 4.6 step 5).
pub struct ManifestResponse {
    /// The decoded manifest or index, with no index-descent applied.
    pub manifest: Manifest,
    /// The `Docker-Content-Digest` response header value, quotes stripped, if present.
    pub content_digest_header: Option<String>,
    /// The raw JSON body, for canonicalization when the header is absent.
    pub raw_body: String,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl RegistryClient {
    /// Builds a client for the registry at `base_url` (trailing slash stripped), with
    /// optional HTTP Basic auth and a multi-minute per-call timeout, wrapped in the
    /// exponential-backoff retry middleware for transient transport failures.
    pub fn new(base_url: impl Into<String>, auth: RegistryAuth) -> RegicacheResult<Self> {
        let inner = Client::builder()
            .timeout(Duration::from_secs(5 * 60))
            .build()?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);

        let client = ClientBuilder::new(inner)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            auth,
            client,
        })
    }

    /// `GET {base}/v2/_catalog` — the set of registry paths (namespace/image or bare
    /// image) known to the registry.
    pub async fn list_repositories(&self) -> RegicacheResult<Vec<String>> {
        let url = format!("{}/v2/_catalog", self.base_url);
        let body = self.get_json(&url).await?;

        Ok(body
            .get("repositories")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_owned))
                    .collect()
            })
            .unwrap_or_default())
    }

    /// `GET {base}/v2/{repo}/tags/list` — a missing or null `tags` field is normalized
    /// to an empty list rather than an error.
    pub async fn list_tags(&self, repo: &str) -> RegicacheResult<Vec<String>> {
        let repo = repo.trim_matches('/');
        let url = format!("{}/v2/{}/tags/list", self.base_url, repo);
        let body = self.get_json(&url).await?;

        Ok(body
            .get("tags")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_owned))
                    .collect()
            })
            .unwrap_or_default())
    }

    /// `GET {base}/v2/{repo}/manifests/{reference}`, transparently descending an OCI
    /// image-index to its first resolvable platform manifest (spec.md 4.1). Docker
    /// manifest lists are returned unresolved — the Reconciler iterates those itself.
    pub async fn get_manifest(&self, repo: &str, reference: &str) -> RegicacheResult<Manifest> {
        let response = self.fetch_manifest_response(repo, reference).await?;

        match response.manifest {
            Manifest::Index(index) if index.media_type == OCI_INDEX_V1 => {
                match first_resolvable_entry(&index) {
                    Some(entry) => {
                        let resolved = self.get_manifest(repo, &entry.digest).await?;
                        Ok(attach_platform(resolved, entry))
                    }
                    None => Ok(Manifest::Index(index)),
                }
            }
            other => Ok(other),
        }
    }

    /// Performs a single, undescended manifest GET, returning the decoded manifest
    /// alongside the `Docker-Content-Digest` header and raw body — used by the Tag
    /// Deleter, which needs the header/body pair for exactly the reference requested.
    pub async fn fetch_manifest_response(
        &self,
        repo: &str,
        reference: &str,
    ) -> RegicacheResult<ManifestResponse> {
        let repo = repo.trim_matches('/');
        let url = format!("{}/v2/{}/manifests/{}", self.base_url, repo, reference);

        let request = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, accept_header_value());
        let request = self.with_auth(request);

        let response = request.send().await?;
        let status = response.status();

        let content_digest_header = response
            .headers()
            .get("Docker-Content-Digest")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim_matches('"').to_owned());

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_owned();

        let raw_body = response.text().await?;
        self.ensure_success(&url, status, &raw_body)?;

        let body: Value = serde_json::from_str(&raw_body)?;
        let manifest = decode_manifest(&content_type, &body);

        Ok(ManifestResponse {
            manifest,
            content_digest_header,
            raw_body,
        })
    }

    /// `GET {base}/v2/{repo}/blobs/{digest}`, decoded as an image config document. A 404
    /// is returned as `Err(RegicacheError::RegistryHttp { status: 404, .. })`, which
    /// callers distinguish via `is_registry_not_found`.
    pub async fn get_config(&self, repo: &str, digest: &str) -> RegicacheResult<Value> {
        let repo = repo.trim_matches('/');
        let url = format!("{}/v2/{}/blobs/{}", self.base_url, repo, digest);
        self.get_json(&url).await
    }

    /// `DELETE {base}/v2/{repo}/manifests/{digest}`. Retries up to 3 attempts with
    /// linear backoff (1s, 2s). Success on 200/202; 404 is treated as success.
    pub async fn delete_manifest(&self, repo: &str, digest: &str) -> RegicacheResult<()> {
        let repo = repo.trim_matches('/');
        let digest = if digest.contains(':') {
            digest.to_owned()
        } else {
            format!("sha256:{digest}")
        };
        let url = format!("{}/v2/{}/manifests/{}", self.base_url, repo, digest);

        let delays = [Duration::ZERO, Duration::from_secs(1), Duration::from_secs(2)];
        let mut last_err = None;

        for (attempt, delay) in delays.iter().enumerate() {
            if !delay.is_zero() {
                tokio::time::sleep(*delay).await;
            }

            let request = self
                .client
                .delete(&url)
                .header(reqwest::header::ACCEPT, accept_header_value());
            let request = self.with_auth(request);

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status == StatusCode::NOT_FOUND {
                        debug!(%url, "manifest already absent, treating delete as success");
                        return Ok(());
                    }
                    if status.is_success() {
                        return Ok(());
                    }
                    let body = response.text().await.unwrap_or_default();
                    warn!(%url, %status, attempt, "delete manifest attempt failed");
                    last_err = Some(RegicacheError::RegistryHttp {
                        status: status.as_u16(),
                        body,
                    });
                }
                Err(e) => {
                    warn!(%url, attempt, error = %e, "delete manifest attempt errored");
                    last_err = Some(e.into());
                }
            }
        }

        Err(last_err.unwrap_or(RegicacheError::RegistryUnavailable(url)))
    }

    //----------------------------------------------------------------------------------------------
    // Helpers
    //----------------------------------------------------------------------------------------------

    fn with_auth(&self, request: reqwest_middleware::RequestBuilder) -> reqwest_middleware::RequestBuilder {
        if self.auth.is_set() {
            request.basic_auth(&self.auth.username, Some(&self.auth.password))
        } else {
            request
        }
    }

    async fn get_json(&self, url: &str) -> RegicacheResult<Value> {
        let request = self.client.get(url);
        let request = self.with_auth(request);

        let response = request.send().await.map_err(|e| match &e {
            reqwest_middleware::Error::Reqwest(re) if re.is_connect() || re.is_timeout() => {
                RegicacheError::RegistryUnavailable(re.to_string())
            }
            _ => e.into(),
        })?;

        let status = response.status();
        let body = response.text().await?;
        self.ensure_success(url, status, &body)?;

        Ok(serde_json::from_str(&body)?)
    }

    fn ensure_success(&self, url: &str, status: StatusCode, body: &str) -> RegicacheResult<()> {
        if status.is_success() {
            return Ok(());
        }

        Err(RegicacheError::RegistryHttp {
            status: status.as_u16(),
            body: {
                let _ = url;
                body.to_owned()
            },
        })
    }
}

fn attach_platform(manifest: Manifest, entry: &IndexEntry) -> Manifest {
    match manifest {
        Manifest::Single(mut single) => {
            if single.platform.is_none() {
                single.platform = entry.platform.clone();
            }
            Manifest::Single(single)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use super::*;
    use crate::registry::manifest::{Platform, SingleManifest};

    #[test]
    fn auth_is_set_requires_both_username_and_password() {
        assert!(!RegistryAuth::default().is_set());
        assert!(!RegistryAuth {
            username: "u".to_owned(),
            password: String::new(),
        }
        .is_set());
        assert!(RegistryAuth {
            username: "u".to_owned(),
            password: "p".to_owned(),
        }
        .is_set());
    }

    #[test]
    fn attach_platform_fills_in_only_when_absent() {
        let entry = IndexEntry {
            digest: "sha256:aaa".to_owned(),
            media_type: "".to_owned(),
            platform: Some(Platform {
                os: "linux".to_owned(),
                architecture: "arm64".to_owned(),
            }),
            annotations: BTreeMap::new(),
        };

        let bare = Manifest::Single(SingleManifest {
            media_type: "".to_owned(),
            config: None,
            layers: vec![],
            platform: None,
            raw: json!({}),
        });

        match attach_platform(bare, &entry) {
            Manifest::Single(single) => {
                assert_eq!(single.platform.unwrap().architecture, "arm64");
            }
            Manifest::Index(_) => panic!("expected single"),
        }

        let already_tagged = Manifest::Single(SingleManifest {
            media_type: "".to_owned(),
            config: None,
            layers: vec![],
            platform: Some(Platform {
                os: "windows".to_owned(),
                architecture: "amd64".to_owned(),
            }),
            raw: json!({}),
        });

        match attach_platform(already_tagged, &entry) {
            Manifest::Single(single) => assert_eq!(single.platform.unwrap().os, "windows"),
            Manifest::Index(_) => panic!("expected single"),
        }
    }
}
