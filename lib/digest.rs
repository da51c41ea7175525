//! Digest Utilities (C3): manifest JSON canonicalization, SHA-256 digest computation, and
//! the header-vs-body digest selection used to drive `DeleteManifest`.

use serde_json::Value;
use sha2::{Digest as _, Sha256};

use crate::registry::{DOCKER_REFERENCE_TYPE_ANNOTATION, OCI_REF_NAME_ANNOTATION};

/// Parses `body`, drops attestation entries from a non-empty top-level `manifests` array
/// (those whose `vnd.docker.reference.type` annotation is present and non-empty), sorts
/// the remainder by `org.opencontainers.image.ref.name` ascending (empty sorts first,
/// stable), and re-emits the whole document as indented JSON.
///
/// Bodies without a `manifests` array are re-emitted unchanged (still indented), so this
/// also serves as the canonical form for single manifests.
pub fn canonicalize_manifest_json(body: &str) -> Result<String, serde_json::Error> {
    let mut value: Value = serde_json::from_str(body)?;

    if let Some(manifests) = value.get("manifests").and_then(Value::as_array) {
        if !manifests.is_empty() {
            let mut kept: Vec<Value> = manifests
                .iter()
                .filter(|entry| !is_attestation_entry(entry))
                .cloned()
                .collect();

            kept.sort_by(|a, b| ref_name(a).cmp(&ref_name(b)));

            value
                .as_object_mut()
                .expect("manifest body with a manifests array is a JSON object")
                .insert("manifests".to_owned(), Value::Array(kept));
        }
    }

    serde_json::to_string_pretty(&value)
}

/// Strips all spaces, tabs, carriage returns, and line feeds from `s`, SHA-256 hashes the
/// result, and returns `sha256:` followed by lowercase hex.
pub fn sha256_normalized(s: &str) -> String {
    let stripped: String = s
        .chars()
        .filter(|c| !matches!(c, ' ' | '\t' | '\r' | '\n'))
        .collect();

    let digest = Sha256::digest(stripped.as_bytes());
    format!("sha256:{:x}", digest)
}

/// Chooses the digest to pass to `DeleteManifest`: the `Docker-Content-Digest` response
/// header when present (quotes stripped by the caller, surrounding whitespace trimmed
/// here), otherwise the normalized SHA-256 of the canonicalized raw manifest body.
pub fn choose_delete_digest(
    header_value: Option<&str>,
    raw_manifest_body: &str,
) -> Result<String, serde_json::Error> {
    if let Some(header) = header_value {
        let trimmed = header.trim().trim_matches('"');
        if !trimmed.is_empty() {
            return Ok(trimmed.to_owned());
        }
    }

    let canonical = canonicalize_manifest_json(raw_manifest_body)?;
    Ok(sha256_normalized(&canonical))
}

fn is_attestation_entry(entry: &Value) -> bool {
    entry
        .get("annotations")
        .and_then(|a| a.get(DOCKER_REFERENCE_TYPE_ANNOTATION))
        .and_then(Value::as_str)
        .is_some_and(|v| !v.is_empty())
}

fn ref_name(entry: &Value) -> String {
    entry
        .get("annotations")
        .and_then(|a| a.get(OCI_REF_NAME_ANNOTATION))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned()
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_whitespace_before_hashing() {
        let a = sha256_normalized("{\"a\":1}");
        let b = sha256_normalized("{ \"a\" : 1 }\n");
        assert_eq!(a, b);
        assert!(a.starts_with("sha256:"));
    }

    #[test]
    fn filters_attestation_entries_and_sorts_by_ref_name() {
        let body = serde_json::json!({
            "manifests": [
                {"digest": "sha256:b", "annotations": {"org.opencontainers.image.ref.name": "b"}},
                {"digest": "sha256:attest", "annotations": {"vnd.docker.reference.type": "attestation-manifest"}},
                {"digest": "sha256:a", "annotations": {"org.opencontainers.image.ref.name": "a"}},
            ]
        })
        .to_string();

        let canonical = canonicalize_manifest_json(&body).unwrap();
        let value: Value = serde_json::from_str(&canonical).unwrap();
        let manifests = value["manifests"].as_array().unwrap();

        assert_eq!(manifests.len(), 2);
        assert_eq!(manifests[0]["digest"], "sha256:a");
        assert_eq!(manifests[1]["digest"], "sha256:b");
    }

    #[test]
    fn choose_delete_digest_prefers_header() {
        let digest = choose_delete_digest(Some("\"sha256:deadbeef\""), "{}").unwrap();
        assert_eq!(digest, "sha256:deadbeef");
    }

    #[test]
    fn choose_delete_digest_falls_back_to_body() {
        let body = "{\"a\":1}";
        let expected = sha256_normalized(&canonicalize_manifest_json(body).unwrap());
        let digest = choose_delete_digest(None, body).unwrap();
        assert_eq!(digest, expected);
    }
}
