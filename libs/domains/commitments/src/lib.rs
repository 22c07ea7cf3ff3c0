//! Commitments Domain
//!
//! Matches reservation purchase recommendations (Reserved Instances, Reserved
//! Capacity, Savings Plans) to concrete provider offerings, purchases them and
//! reads back the resulting commitment inventory.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │   Service   │  ← Provider-bound entry point
//! └──────┬──────┘
//!        │
//! ┌──────▼──────┐     ┌─────────────┐
//! │ Batch/Exec  │ ──▶ │  Resolver   │  ← Offering selection
//! └──────┬──────┘     └──────┬──────┘
//!        │                   │
//! ┌──────▼───────────────────▼──────┐
//! │      Provider traits            │  ← Catalog, purchase, listing, pricing
//! └──────┬──────────────────────────┘
//!        │
//! ┌──────▼──────┐     ┌─────────────┐
//! │   Models    │ ◀─▶ │   Schema    │  ← Legacy (v1) translation
//! └─────────────┘     └─────────────┘
//! ```

pub mod batch;
pub mod context;
pub mod error;
pub mod executor;
pub mod inventory;
pub mod models;
pub mod pricing;
pub mod provider;
pub mod resolver;
pub mod retry;
pub mod schema;
pub mod service;

// Re-export commonly used types
pub use batch::BatchDriver;
pub use context::{CancelHandle, Context};
pub use error::{CommitmentError, CommitmentResult};
pub use executor::{PurchaseExecutor, Purchaser};
pub use inventory::{InventoryReader, PaginationPolicy};
pub use models::{
    CloudProvider, Commitment, CommitmentState, CommitmentType, Offering, OfferingClass,
    OfferingDetails, PaymentOption, PriceQuote, PurchaseResult, Recommendation,
    RecommendationParams, ServiceDetails, ServiceType, Term,
};
pub use provider::{
    CommitmentLister, CommitmentPage, CommitmentRecord, OfferingCatalog, OfferingFilter,
    OfferingPage, PricingLookup, ProviderCommitment, PurchaseApi, PurchaseRequest,
    RecommendationSource, TokenSource,
};
pub use resolver::OfferingResolver;
pub use retry::{RetryConfig, RetryingPurchaseApi};
pub use service::{CommitmentService, ProviderBindings};
