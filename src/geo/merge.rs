//! Field-level merge of two provider replies into one canonical record

use crate::geo::record::{FieldValue, GeoRecord, ProviderResponse};

/// Where one canonical field lives in each provider's reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMapping {
    pub name: &'static str,
    pub primary_path: &'static str,
    pub secondary_path: &'static str,
}

impl FieldMapping {
    pub const fn new(
        name: &'static str,
        primary_path: &'static str,
        secondary_path: &'static str,
    ) -> Self {
        Self {
            name,
            primary_path,
            secondary_path,
        }
    }
}

/// ip-api (primary) and ipwho.is (secondary) field table
pub const DEFAULT_FIELDS: [FieldMapping; 10] = [
    FieldMapping::new("ip", "query", "ip"),
    FieldMapping::new("country", "country", "country"),
    FieldMapping::new("region", "regionName", "region"),
    FieldMapping::new("city", "city", "city"),
    FieldMapping::new("timezone", "timezone", "timezone.id"),
    FieldMapping::new("isp", "isp", "connection.isp"),
    FieldMapping::new("org", "org", "connection.org"),
    FieldMapping::new("asn", "as", "connection.asn"),
    FieldMapping::new("latitude", "lat", "latitude"),
    FieldMapping::new("longitude", "lon", "longitude"),
];

/// Merges a primary and a secondary reply field by field.
///
/// A field comes from the primary when it is not an error reply and the
/// path resolves to a non-null value, else from the secondary under the
/// same rule, else it is null. Pure and deterministic.
#[derive(Debug, Clone)]
pub struct GeoMerger {
    fields: Vec<FieldMapping>,
}

impl Default for GeoMerger {
    fn default() -> Self {
        Self::new(DEFAULT_FIELDS.to_vec())
    }
}

impl GeoMerger {
    pub fn new(fields: Vec<FieldMapping>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[FieldMapping] {
        &self.fields
    }

    pub fn merge(&self, primary: ProviderResponse, secondary: ProviderResponse) -> GeoRecord {
        let fields = self
            .fields
            .iter()
            .map(|mapping| {
                let value = primary
                    .lookup(mapping.primary_path)
                    .or_else(|| secondary.lookup(mapping.secondary_path))
                    .and_then(FieldValue::from_json);
                (mapping.name.to_string(), value)
            })
            .collect();

        GeoRecord::new(fields, primary, secondary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn simple_merger() -> GeoMerger {
        GeoMerger::new(vec![
            FieldMapping::new("country", "country", "country"),
            FieldMapping::new("lat", "lat", "lat"),
            FieldMapping::new("city", "city", "city"),
        ])
    }

    #[test]
    fn test_primary_wins_when_present() {
        let primary = ProviderResponse::from_value(json!({"country": "Wonderland", "lat": null}));
        let secondary = ProviderResponse::from_value(json!({"country": "Elsewhere", "lat": 51.5}));

        let record = simple_merger().merge(primary, secondary);

        assert_eq!(record.get("country"), Some(&FieldValue::Text("Wonderland".into())));
        assert_eq!(record.get("lat"), Some(&FieldValue::Float(51.5)));
        assert_eq!(record.get("city"), None);
        assert!(record.has_data());
    }

    #[test]
    fn test_error_primary_falls_back_entirely() {
        let primary = ProviderResponse::from_value(json!({
            "error": "quota",
            "country": "Wonderland",
            "lat": 1.0
        }));
        let secondary = ProviderResponse::from_value(json!({"country": "Elsewhere", "lat": 51.5}));

        let record = simple_merger().merge(primary, secondary);

        assert_eq!(record.get("country"), Some(&FieldValue::Text("Elsewhere".into())));
        assert_eq!(record.get("lat"), Some(&FieldValue::Float(51.5)));
    }

    #[test]
    fn test_both_errors_yield_no_data() {
        let record = GeoMerger::default().merge(
            ProviderResponse::error("No response"),
            ProviderResponse::error("Invalid JSON"),
        );
        assert!(!record.has_data());
        assert_eq!(record.fields().count(), DEFAULT_FIELDS.len());
        assert_eq!(record.primary(), &ProviderResponse::error("No response"));
    }

    #[test]
    fn test_default_table_nested_secondary() {
        let primary = ProviderResponse::error("rate limited (HTTP 429)");
        let secondary = ProviderResponse::from_value(json!({
            "ip": "8.8.8.8",
            "country": "United States",
            "region": "California",
            "city": "Mountain View",
            "latitude": 37.386,
            "longitude": -122.0838,
            "timezone": {"id": "America/Los_Angeles"},
            "connection": {"asn": 15169, "org": "Google LLC", "isp": "Google LLC"}
        }));

        let record = GeoMerger::default().merge(primary, secondary);

        assert_eq!(record.get("ip"), Some(&FieldValue::Text("8.8.8.8".into())));
        assert_eq!(record.get("asn"), Some(&FieldValue::Integer(15169)));
        assert_eq!(
            record.get("timezone"),
            Some(&FieldValue::Text("America/Los_Angeles".into()))
        );
        assert_eq!(record.coordinates(), Some((37.386, -122.0838)));
    }

    #[test]
    fn test_merge_is_deterministic() {
        let primary = ProviderResponse::from_value(json!({"country": "A", "city": "B"}));
        let secondary = ProviderResponse::from_value(json!({"lat": 1}));
        let merger = simple_merger();

        assert_eq!(
            merger.merge(primary.clone(), secondary.clone()),
            merger.merge(primary, secondary)
        );
    }
}
