//! `dump` mode: serialize what would have been issued instead of issuing it
//! (`SPEC_FULL.md` §4.4, §6's dump format).

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::client::DeletionPropagation;
use crate::error::Result;

/// The `{apiVersion, kind, name, namespace?}` addressing tuple a dump record
/// uses instead of repeating the full manifest for patch/delete records.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceRef {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum DumpRecord {
    Create {
        body: JsonValue,
    },
    Patch {
        resource: ResourceRef,
        body: JsonValue,
    },
    Delete {
        resource: ResourceRef,
        propagation_policy: DumpPropagation,
    },
}

/// Serializes as the policy's Kubernetes wire name rather than the internal
/// enum debug name.
#[derive(Debug, Clone, Copy)]
pub struct DumpPropagation(pub DeletionPropagation);

impl Serialize for DumpPropagation {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let name = match self.0 {
            DeletionPropagation::Background => "Background",
            DeletionPropagation::Foreground => "Foreground",
            DeletionPropagation::Orphan => "Orphan",
        };
        serializer.serialize_str(name)
    }
}

/// The output encoding selected by the CLI's `-o` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpFormat {
    Json,
    JsonPretty,
    Yaml,
}

/// Serialize the accumulated records in application order, as a JSON array
/// (optionally pretty) or a YAML sequence.
pub fn render(records: &[DumpRecord], format: DumpFormat) -> Result<String> {
    Ok(match format {
        DumpFormat::Json => serde_json::to_string(records)?,
        DumpFormat::JsonPretty => serde_json::to_string_pretty(records)?,
        DumpFormat::Yaml => serde_yaml::to_string(records)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_record_serializes_with_method_tag() {
        let records = vec![DumpRecord::Create { body: json!({"kind": "ConfigMap"}) }];
        let out = render(&records, DumpFormat::Json).unwrap();
        assert!(out.contains("\"method\":\"create\""));
        assert!(out.contains("\"kind\":\"ConfigMap\""));
    }

    #[test]
    fn delete_record_carries_propagation_policy_by_name() {
        let records = vec![DumpRecord::Delete {
            resource: ResourceRef {
                api_version: "apps/v1".into(),
                kind: "StatefulSet".into(),
                name: "sts1".into(),
                namespace: Some("default".into()),
            },
            propagation_policy: DumpPropagation(DeletionPropagation::Orphan),
        }];
        let out = render(&records, DumpFormat::Json).unwrap();
        assert!(out.contains("\"propagation_policy\":\"Orphan\""));
        assert!(out.contains("\"namespace\":\"default\""));
    }

    #[test]
    fn yaml_render_produces_a_sequence() {
        let records = vec![DumpRecord::Create { body: json!({"kind": "ConfigMap"}) }];
        let out = render(&records, DumpFormat::Yaml).unwrap();
        assert!(out.trim_start().starts_with('-'));
    }
}
