//! Hypercat catalogue entries for registering data sources.

use crate::error::KvError;
use serde::{Deserialize, Serialize};

pub const REL_DESCRIPTION: &str = "urn:X-hypercat:rels:hasDescription:en";
pub const REL_CONTENT_TYPE: &str = "urn:X-hypercat:rels:isContentType";
pub const REL_VENDOR: &str = "urn:X-databox:rels:hasVendor";
pub const REL_TYPE: &str = "urn:X-databox:rels:hasType";
pub const REL_DATASOURCE_ID: &str = "urn:X-databox:rels:hasDatasourceid";
pub const REL_STORE_TYPE: &str = "urn:X-databox:rels:hasStoreType";
pub const REL_IS_ACTUATOR: &str = "urn:X-databox:rels:isActuator";
pub const REL_LOCATION: &str = "urn:X-databox:rels:hasLocation";
pub const REL_UNIT: &str = "urn:X-databox:rels:hasUnit";

/// Description of a data source as registered in a store's catalogue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSourceMetadata {
    pub description: String,
    pub content_type: String,
    pub vendor: String,
    pub data_source_type: String,
    pub data_source_id: String,
    pub store_type: String,
    pub is_actuator: bool,
    pub unit: Option<String>,
    pub location: Option<String>,
}

impl DataSourceMetadata {
    /// Fail on the first empty required field.
    pub fn validate(&self) -> Result<(), KvError> {
        let required = [
            ("description", &self.description),
            ("content_type", &self.content_type),
            ("vendor", &self.vendor),
            ("data_source_type", &self.data_source_type),
            ("data_source_id", &self.data_source_id),
            ("store_type", &self.store_type),
        ];
        match required.iter().find(|(_, v)| v.trim().is_empty()) {
            Some((name, _)) => Err(KvError::InvalidMetadata(*name)),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelVal {
    Text { rel: String, val: String },
    Flag { rel: String, val: bool },
}

impl RelVal {
    fn text(rel: &str, val: &str) -> Self {
        Self::Text {
            rel: rel.to_string(),
            val: val.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HypercatItem {
    #[serde(rename = "item-metadata")]
    pub item_metadata: Vec<RelVal>,
    pub href: String,
}

/// Build the catalogue item for `metadata`, with its href under
/// `kv_base_href` (e.g. `nats://store:4222/kv/`).
pub fn hypercat_item(
    metadata: &DataSourceMetadata,
    kv_base_href: &str,
) -> Result<HypercatItem, KvError> {
    metadata.validate()?;

    let mut item_metadata = vec![
        RelVal::text(REL_DESCRIPTION, &metadata.description),
        RelVal::text(REL_CONTENT_TYPE, &metadata.content_type),
        RelVal::text(REL_VENDOR, &metadata.vendor),
        RelVal::text(REL_TYPE, &metadata.data_source_type),
        RelVal::text(REL_DATASOURCE_ID, &metadata.data_source_id),
        RelVal::text(REL_STORE_TYPE, &metadata.store_type),
    ];

    if metadata.is_actuator {
        item_metadata.push(RelVal::Flag {
            rel: REL_IS_ACTUATOR.to_string(),
            val: true,
        });
    }
    if let Some(location) = metadata.location.as_deref().filter(|s| !s.is_empty()) {
        item_metadata.push(RelVal::text(REL_LOCATION, location));
    }
    if let Some(unit) = metadata.unit.as_deref().filter(|s| !s.is_empty()) {
        item_metadata.push(RelVal::text(REL_UNIT, unit));
    }

    Ok(HypercatItem {
        item_metadata,
        href: format!("{kv_base_href}{}", metadata.data_source_id),
    })
}

/// [`hypercat_item`] serialized as the JSON body sent to `/cat`.
pub fn hypercat_document(
    metadata: &DataSourceMetadata,
    kv_base_href: &str,
) -> Result<Vec<u8>, KvError> {
    let item = hypercat_item(metadata, kv_base_href)?;
    serde_json::to_vec(&item).map_err(|e| KvError::InvalidInput(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> DataSourceMetadata {
        DataSourceMetadata {
            description: "Living room temperature".into(),
            content_type: "text/plain".into(),
            vendor: "acme".into(),
            data_source_type: "temperature".into(),
            data_source_id: "temp-1".into(),
            store_type: "kv".into(),
            ..Default::default()
        }
    }

    #[test]
    fn required_fields_in_fixed_order() {
        let item = hypercat_item(&metadata(), "nats://store:4222/kv/").unwrap();
        let rels: Vec<&str> = item
            .item_metadata
            .iter()
            .map(|rv| match rv {
                RelVal::Text { rel, .. } | RelVal::Flag { rel, .. } => rel.as_str(),
            })
            .collect();
        assert_eq!(
            rels,
            vec![
                REL_DESCRIPTION,
                REL_CONTENT_TYPE,
                REL_VENDOR,
                REL_TYPE,
                REL_DATASOURCE_ID,
                REL_STORE_TYPE
            ]
        );
        assert_eq!(item.href, "nats://store:4222/kv/temp-1");
    }

    #[test]
    fn optional_fields_appended_when_set() {
        let meta = DataSourceMetadata {
            is_actuator: true,
            unit: Some("celsius".into()),
            location: Some("kitchen".into()),
            ..metadata()
        };
        let item = hypercat_item(&meta, "nats://store:4222/kv/").unwrap();
        assert_eq!(item.item_metadata.len(), 9);
        assert_eq!(
            item.item_metadata[6],
            RelVal::Flag {
                rel: REL_IS_ACTUATOR.into(),
                val: true
            }
        );
        assert_eq!(item.item_metadata[7], RelVal::text(REL_LOCATION, "kitchen"));
        assert_eq!(item.item_metadata[8], RelVal::text(REL_UNIT, "celsius"));
    }

    #[test]
    fn document_uses_hypercat_field_names() {
        let doc = hypercat_document(&metadata(), "nats://store:4222/kv/").unwrap();
        let json: serde_json::Value = serde_json::from_slice(&doc).unwrap();
        assert_eq!(json["href"], "nats://store:4222/kv/temp-1");
        assert_eq!(json["item-metadata"][0]["rel"], REL_DESCRIPTION);
        assert_eq!(json["item-metadata"][0]["val"], "Living room temperature");
    }

    #[test]
    fn missing_vendor_is_rejected() {
        let meta = DataSourceMetadata {
            vendor: " ".into(),
            ..metadata()
        };
        assert!(matches!(
            hypercat_item(&meta, "x"),
            Err(KvError::InvalidMetadata("vendor"))
        ));
    }
}
