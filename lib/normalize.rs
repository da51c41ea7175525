//! Manifest Normalizer (C2): decodes a platform manifest + its image config into a
//! uniform candidate `TagMetadata`.

use serde_json::Value;

use crate::models::NewTagMetadata;
use crate::registry::{SingleManifest, OCI_MANIFEST_V1};

/// Author label keys checked, in priority order, before falling back to the config's
/// top-level `author` field and finally the literal `Unknown` (spec.md 4.2).
const AUTHOR_LABEL_PRIORITY: &[&str] = &[
    "org.opencontainers.image.authors",
    "org.opencontainers.image.vendor",
    "maintainer",
    "MAINTAINER",
    "Author",
    "author",
];

/// Builds a candidate `NewTagMetadata` from a resolved single-platform `manifest` and its
/// decoded image config JSON. Digests are supplied by the caller, which already knows
/// them from the fetch that produced `manifest`.
pub fn normalize_tag_metadata(
    manifest: &SingleManifest,
    config: &Value,
    config_digest: &str,
    content_digest: &str,
    index_digest: &str,
) -> NewTagMetadata {
    let config_section = config.get("config");

    let exposed_ports = config_section
        .and_then(|c| c.get("ExposedPorts"))
        .and_then(Value::as_object)
        .map(|m| m.keys().cloned().collect::<Vec<_>>().join(","))
        .unwrap_or_default();

    let command = join_string_array(config_section.and_then(|c| c.get("Cmd")));
    let entrypoint = join_string_array(config_section.and_then(|c| c.get("Entrypoint")));
    let work_dir = config_section
        .and_then(|c| c.get("WorkingDir"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();

    let docker_file = synthesize_dockerfile(config.get("history"));
    let author = resolve_author(config_section.and_then(|c| c.get("Labels")), config);

    let os = config
        .get("os")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();
    let architecture = config
        .get("architecture")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();
    let created = config
        .get("created")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();

    let total_size = manifest.config.as_ref().map(|d| d.size).unwrap_or(0);

    let layers = manifest
        .layers
        .iter()
        .map(|d| (d.size, d.digest.clone()))
        .collect();

    NewTagMetadata {
        created,
        os,
        architecture,
        author,
        work_dir,
        command,
        entrypoint,
        exposed_ports,
        total_size,
        docker_file,
        config_digest: config_digest.to_owned(),
        content_digest: content_digest.to_owned(),
        index_digest: index_digest.to_owned(),
        is_oci: manifest.media_type == OCI_MANIFEST_V1,
        layers,
    }
}

/// Picks the first non-empty label in `AUTHOR_LABEL_PRIORITY`, then the config's
/// top-level `author`, then `Unknown`.
fn resolve_author(labels: Option<&Value>, config: &Value) -> String {
    if let Some(labels) = labels.and_then(Value::as_object) {
        for key in AUTHOR_LABEL_PRIORITY {
            if let Some(value) = labels.get(*key).and_then(Value::as_str) {
                if !value.is_empty() {
                    return value.to_owned();
                }
            }
        }
    }

    let top_level = config
        .get("author")
        .and_then(Value::as_str)
        .unwrap_or_default();

    if !top_level.is_empty() {
        top_level.to_owned()
    } else {
        "Unknown".to_owned()
    }
}

/// Maps each history entry whose `created_by` is non-empty through: strip prefix
/// `/bin/sh -c `, then strip prefix `#(nop) `, then trim. Joins survivors by newline; if
/// none survive, returns the literal `No Dockerfile found`.
fn synthesize_dockerfile(history: Option<&Value>) -> String {
    let lines: Vec<String> = history
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| entry.get("created_by").and_then(Value::as_str))
                .filter(|s| !s.is_empty())
                .map(|s| {
                    let s = s.strip_prefix("/bin/sh -c ").unwrap_or(s);
                    let s = s.strip_prefix("#(nop) ").unwrap_or(s);
                    s.trim().to_owned()
                })
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();

    if lines.is_empty() {
        "No Dockerfile found".to_owned()
    } else {
        lines.join("\n")
    }
}

fn join_string_array(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default()
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Descriptor;

    fn manifest_with_config(size: i64, media_type: &str) -> SingleManifest {
        SingleManifest {
            media_type: media_type.to_owned(),
            config: Some(Descriptor {
                digest: "sha256:cfg".to_owned(),
                size,
                media_type: String::new(),
            }),
            layers: vec![],
            platform: None,
            raw: serde_json::json!({}),
        }
    }

    #[test]
    fn synthesizes_dockerfile_from_history() {
        let config = serde_json::json!({
            "os": "linux",
            "architecture": "amd64",
            "config": {"Cmd": ["/bin/sh"], "Entrypoint": [], "WorkingDir": "/", "ExposedPorts": {}},
            "history": [{"created_by": "/bin/sh -c #(nop) CMD [\"/bin/sh\"]"}],
        });

        let manifest = manifest_with_config(1234, OCI_MANIFEST_V1);
        let metadata = normalize_tag_metadata(&manifest, &config, "sha256:cfg", "sha256:content", "");

        assert_eq!(metadata.docker_file, "CMD [\"/bin/sh\"]");
        assert_eq!(metadata.author, "Unknown");
        assert_eq!(metadata.command, "/bin/sh");
        assert_eq!(metadata.total_size, 1234);
        assert!(metadata.is_oci);
    }

    #[test]
    fn resolves_author_from_label_priority() {
        let config = serde_json::json!({
            "config": {"Labels": {"org.opencontainers.image.vendor": "Acme Corp"}},
        });
        assert_eq!(
            resolve_author(config["config"].get("Labels"), &config),
            "Acme Corp"
        );
    }

    #[test]
    fn falls_back_to_no_dockerfile_found() {
        assert_eq!(synthesize_dockerfile(None), "No Dockerfile found");
        assert_eq!(
            synthesize_dockerfile(Some(&serde_json::json!([{"created_by": ""}]))),
            "No Dockerfile found"
        );
    }
}
