//! Versioned translation boundary between the legacy (v1) and current (v2)
//! data models. Provider adapters that still speak v1 convert here and
//! nowhere else.

pub mod conversions;
pub mod legacy;

pub use conversions::{
    DEFAULT_SERVICE_TYPE, commitment_from_internal, commitment_to_internal, from_internal,
    offering_details_from_internal, offering_details_to_internal, result_from_internal,
    result_to_internal, service_code, service_from_code, to_internal,
};
pub use legacy::{
    LegacyCommitment, LegacyOfferingDetails, LegacyPaymentOption, LegacyPurchaseResult,
    LegacyRecommendation, LegacyServiceDetails,
};
