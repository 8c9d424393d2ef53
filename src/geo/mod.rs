//! Geolocation lookups and the field-level merge of provider replies

pub mod lookup;
pub mod merge;
pub mod record;

pub use lookup::{
    resolve_target, GeoLookup, LookupConfig, ProviderEndpoints, ReverseGeocode,
    ReverseGeocodeError,
};
pub use merge::{FieldMapping, GeoMerger, DEFAULT_FIELDS};
pub use record::{FieldValue, GeoRecord, ProviderResponse};
