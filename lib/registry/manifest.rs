//! The manifest media types recognized by the Distribution v2 API, and the tagged
//! union the registry client decodes manifest responses into (spec.md 9, "Polymorphism
//! over manifest shape").

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Docker Distribution v2 single manifest media type.
pub const DOCKER_MANIFEST_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";

/// OCI single image manifest media type.
pub const OCI_MANIFEST_V1: &str = "application/vnd.oci.image.manifest.v1+json";

/// Docker manifest list (multi-arch) media type.
pub const DOCKER_MANIFEST_LIST_V2: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";

/// OCI image index (multi-arch) media type.
pub const OCI_INDEX_V1: &str = "application/vnd.oci.image.index.v1+json";

/// The annotation key marking an index entry as an attestation manifest (SBOM/signature),
/// rather than a platform image.
pub const DOCKER_REFERENCE_TYPE_ANNOTATION: &str = "vnd.docker.reference.type";

/// The annotation key used to order canonicalized index entries.
pub const OCI_REF_NAME_ANNOTATION: &str = "org.opencontainers.image.ref.name";

/// The `Accept` header value for manifest GET/DELETE requests, listing all four
/// recognized media types in the registry's required preference order.
pub fn accept_header_value() -> String {
    [
        DOCKER_MANIFEST_V2,
        OCI_MANIFEST_V1,
        DOCKER_MANIFEST_LIST_V2,
        OCI_INDEX_V1,
    ]
    .join(", ")
}

/// The literal string used by the registry to mark an unknown platform OS or
/// architecture on a multi-arch index entry.
pub const UNKNOWN_PLATFORM: &str = "unknown";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A manifest as returned by `GET /v2/{name}/manifests/{ref}`, resolved into either a
/// single platform manifest or a still-unresolved index.
#[derive(Debug, Clone)]
pub enum Manifest {
    /// A single-platform manifest: a config descriptor plus an ordered layer list.
    Single(SingleManifest),
    /// A manifest index / manifest list, not (or not fully) resolved to a platform.
    Index(IndexManifest),
}

/// A single-platform manifest.
#[derive(Debug, Clone)]
pub struct SingleManifest {
    /// The manifest's own declared media type.
    pub media_type: String,
    /// The image config descriptor, absent only for schema v1 manifests.
    pub config: Option<Descriptor>,
    /// The ordered layer descriptors.
    pub layers: Vec<Descriptor>,
    /// The platform this manifest was resolved for, if known (set by index descent).
    pub platform: Option<Platform>,
    /// The raw decoded JSON body, retained for digest canonicalization.
    pub raw: Value,
}

/// A manifest index / manifest list.
#[derive(Debug, Clone)]
pub struct IndexManifest {
    /// The index's own declared media type.
    pub media_type: String,
    /// The per-platform manifest descriptors.
    pub manifests: Vec<IndexEntry>,
    /// The raw decoded JSON body, retained for digest canonicalization.
    pub raw: Value,
}

/// A descriptor: digest, size, and media type of a referenced blob or manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct Descriptor {
    /// The digest of the referenced content.
    pub digest: String,
    /// The size in bytes of the referenced content.
    pub size: i64,
    /// The media type of the referenced content.
    #[serde(rename = "mediaType", default)]
    pub media_type: String,
}

/// An entry in an index's `manifests[]` array.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    /// The digest of the pointed-to manifest.
    pub digest: String,
    /// The media type of the pointed-to manifest.
    pub media_type: String,
    /// The platform this entry targets, if declared.
    pub platform: Option<Platform>,
    /// The entry's annotations, e.g. attestation markers or ref names.
    pub annotations: BTreeMap<String, String>,
}

/// An OS/architecture pair identifying a platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    /// The operating system, e.g. `linux`.
    pub os: String,
    /// The architecture, e.g. `amd64`.
    pub architecture: String,
}

impl Platform {
    /// True if either the OS or architecture is the literal string `unknown`.
    pub fn is_unknown(&self) -> bool {
        self.os == UNKNOWN_PLATFORM || self.architecture == UNKNOWN_PLATFORM
    }
}

impl IndexEntry {
    /// True if this entry carries a non-empty `vnd.docker.reference.type` annotation,
    /// marking it as an attestation manifest rather than a platform image.
    pub fn is_attestation(&self) -> bool {
        self.annotations
            .get(DOCKER_REFERENCE_TYPE_ANNOTATION)
            .is_some_and(|v| !v.is_empty())
    }
}

//--------------------------------------------------------------------------------------------------
// Decoding
//--------------------------------------------------------------------------------------------------

/// Decodes a raw manifest/index JSON body (plus the registry-declared content type) into
/// a `Manifest`. Falls back to sniffing the body's own `mediaType` field when the
/// transport content type is absent or generic.
pub fn decode_manifest(content_type: &str, body: &Value) -> Manifest {
    let declared = body
        .get("mediaType")
        .and_then(Value::as_str)
        .unwrap_or(content_type);

    if declared == DOCKER_MANIFEST_LIST_V2 || declared == OCI_INDEX_V1 || body.get("manifests").is_some()
    {
        Manifest::Index(decode_index(declared, body))
    } else {
        Manifest::Single(decode_single(declared, body))
    }
}

fn decode_single(media_type: &str, body: &Value) -> SingleManifest {
    let config = body
        .get("config")
        .and_then(|v| serde_json::from_value::<Descriptor>(v.clone()).ok())
        .filter(|d| !d.digest.is_empty());

    let layers = body
        .get("layers")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|v| serde_json::from_value::<Descriptor>(v.clone()).ok())
                .collect()
        })
        .unwrap_or_default();

    SingleManifest {
        media_type: media_type.to_owned(),
        config,
        layers,
        platform: None,
        raw: body.clone(),
    }
}

fn decode_index(media_type: &str, body: &Value) -> IndexManifest {
    let manifests = body
        .get("manifests")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().map(decode_index_entry).collect())
        .unwrap_or_default();

    IndexManifest {
        media_type: media_type.to_owned(),
        manifests,
        raw: body.clone(),
    }
}

fn decode_index_entry(v: &Value) -> IndexEntry {
    let digest = v
        .get("digest")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();

    let media_type = v
        .get("mediaType")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();

    let platform = v.get("platform").map(|p| Platform {
        os: p
            .get("os")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned(),
        architecture: p
            .get("architecture")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned(),
    });

    let annotations = v
        .get("annotations")
        .and_then(Value::as_object)
        .map(|m| {
            m.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_owned())))
                .collect()
        })
        .unwrap_or_default();

    IndexEntry {
        digest,
        media_type,
        platform,
        annotations,
    }
}

/// Picks the first index entry whose platform is declared and neither `unknown` OS nor
/// `unknown` architecture (spec.md 4.1's client-side descent rule).
pub fn first_resolvable_entry(index: &IndexManifest) -> Option<&IndexEntry> {
    index
        .manifests
        .iter()
        .find(|e| e.platform.as_ref().is_some_and(|p| !p.is_unknown()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn accept_header_lists_media_types_in_required_order() {
        assert_eq!(
            accept_header_value(),
            "application/vnd.docker.distribution.manifest.v2+json, \
             application/vnd.oci.image.manifest.v1+json, \
             application/vnd.docker.distribution.manifest.list.v2+json, \
             application/vnd.oci.image.index.v1+json"
        );
    }

    #[test]
    fn decodes_single_manifest_by_declared_media_type() {
        let body = json!({
            "mediaType": OCI_MANIFEST_V1,
            "config": {"mediaType": "application/vnd.oci.image.config.v1+json", "digest": "sha256:aaa", "size": 10},
            "layers": [
                {"mediaType": "application/vnd.oci.image.layer.v1.tar+gzip", "digest": "sha256:bbb", "size": 100}
            ],
        });

        match decode_manifest("", &body) {
            Manifest::Single(single) => {
                assert_eq!(single.config.unwrap().digest, "sha256:aaa");
                assert_eq!(single.layers.len(), 1);
            }
            Manifest::Index(_) => panic!("expected a single manifest"),
        }
    }

    #[test]
    fn decodes_index_by_presence_of_manifests_array_even_without_declared_media_type() {
        let body = json!({
            "manifests": [
                {"mediaType": OCI_MANIFEST_V1, "digest": "sha256:ccc", "size": 1, "platform": {"os": "linux", "architecture": "amd64"}}
            ],
        });

        match decode_manifest("some/unknown+json", &body) {
            Manifest::Index(index) => assert_eq!(index.manifests.len(), 1),
            Manifest::Single(_) => panic!("expected an index"),
        }
    }

    #[test]
    fn first_resolvable_entry_skips_unknown_platform_entries() {
        let index = IndexManifest {
            media_type: OCI_INDEX_V1.to_owned(),
            raw: json!({}),
            manifests: vec![
                IndexEntry {
                    digest: "sha256:unknown".to_owned(),
                    media_type: OCI_MANIFEST_V1.to_owned(),
                    platform: Some(Platform {
                        os: "unknown".to_owned(),
                        architecture: "amd64".to_owned(),
                    }),
                    annotations: BTreeMap::new(),
                },
                IndexEntry {
                    digest: "sha256:linux-amd64".to_owned(),
                    media_type: OCI_MANIFEST_V1.to_owned(),
                    platform: Some(Platform {
                        os: "linux".to_owned(),
                        architecture: "amd64".to_owned(),
                    }),
                    annotations: BTreeMap::new(),
                },
            ],
        };

        assert_eq!(
            first_resolvable_entry(&index).map(|e| e.digest.as_str()),
            Some("sha256:linux-amd64")
        );
    }

    #[test]
    fn is_attestation_detects_non_empty_reference_type_annotation() {
        let mut annotations = BTreeMap::new();
        annotations.insert(
            DOCKER_REFERENCE_TYPE_ANNOTATION.to_owned(),
            "attestation-manifest".to_owned(),
        );

        let entry = IndexEntry {
            digest: "sha256:ddd".to_owned(),
            media_type: OCI_MANIFEST_V1.to_owned(),
            platform: None,
            annotations,
        };

        assert!(entry.is_attestation());
    }
}
