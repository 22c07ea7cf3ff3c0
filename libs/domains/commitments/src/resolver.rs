//! Offering resolution.
//!
//! Maps a recommendation onto the first catalog entry, in catalog order,
//! whose resource type, duration and commercial structure fit it. The
//! catalog is fetched fresh on every call.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::context::Context;
use crate::error::{CommitmentError, CommitmentResult};
use crate::models::{Offering, Recommendation, Term};
use crate::provider::{OfferingCatalog, OfferingFilter};

/// One 30-day month in seconds
pub const SECONDS_PER_MONTH: i64 = 2_592_000;

/// Page size requested from catalogs unless overridden
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Whole 30-day months in `duration_seconds`, truncating.
pub fn duration_to_months(duration_seconds: i64) -> Option<u32> {
    if duration_seconds <= 0 {
        return None;
    }
    u32::try_from(duration_seconds / SECONDS_PER_MONTH).ok()
}

/// Whether `offering` can satisfy a purchase of `resource_type` for `term`.
///
/// Payment option is deliberately not inspected: any resolvable commercial
/// structure is accepted regardless of the requested upfront split.
pub fn offering_matches(offering: &Offering, resource_type: &str, term: Term) -> bool {
    if offering.resource_type != resource_type {
        return false;
    }

    let Some(months) = offering.duration_seconds.and_then(duration_to_months) else {
        return false;
    };
    if months != term.months() {
        return false;
    }

    offering.offering_class.is_resolvable()
}

#[derive(Clone)]
pub struct OfferingResolver {
    catalog: Arc<dyn OfferingCatalog>,
    page_size: usize,
}

impl OfferingResolver {
    pub fn new(catalog: Arc<dyn OfferingCatalog>) -> Self {
        Self {
            catalog,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Find the offering to purchase for `rec`
    #[instrument(
        skip(self, ctx, rec),
        fields(resource_type = %rec.resource_type, term = %rec.term)
    )]
    pub async fn resolve(&self, ctx: &Context, rec: &Recommendation) -> CommitmentResult<Offering> {
        let filter = OfferingFilter {
            resource_type: Some(rec.resource_type.clone()),
            region: Some(rec.region.clone()),
            term: Some(rec.term),
            payment_option: Some(rec.payment_option),
            page_size: self.page_size,
        };

        let mut page_token: Option<String> = None;
        let mut scanned = 0usize;

        loop {
            let page = ctx
                .run(self.catalog.list_offerings(&filter, page_token.take()))
                .await?;
            scanned += page.offerings.len();

            if let Some(offering) = page
                .offerings
                .into_iter()
                .find(|o| offering_matches(o, &rec.resource_type, rec.term))
            {
                debug!(
                    offering_id = %offering.offering_id,
                    scanned = scanned,
                    "Resolved offering"
                );
                return Ok(offering);
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!(scanned = scanned, "No matching offering in catalog");
        Err(CommitmentError::not_found(&rec.resource_type))
    }

    /// Distinct resource types present in the catalog, sorted
    pub async fn resource_types(
        &self,
        ctx: &Context,
        region: Option<&str>,
    ) -> CommitmentResult<Vec<String>> {
        let filter = OfferingFilter {
            region: region.map(str::to_string),
            page_size: self.page_size,
            ..Default::default()
        };

        let mut types = BTreeSet::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = ctx
                .run(self.catalog.list_offerings(&filter, page_token.take()))
                .await?;
            types.extend(page.offerings.into_iter().map(|o| o.resource_type));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(types.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        CloudProvider, DataWarehouseDetails, OfferingClass, PaymentOption, ServiceDetails,
        ServiceType,
    };
    use crate::provider::{MockOfferingCatalog, OfferingPage};
    use crate::models::{ONE_YEAR_SECONDS, THREE_YEAR_SECONDS};

    fn offering(id: &str, resource_type: &str, duration: Option<i64>) -> Offering {
        Offering {
            offering_id: id.to_string(),
            resource_type: resource_type.to_string(),
            duration_seconds: duration,
            offering_class: OfferingClass::Regular,
            fixed_price: Some(1000.0),
            usage_price: 0.0,
            currency: "USD".to_string(),
            recurring_charges: vec![],
        }
    }

    fn recommendation(resource_type: &str, term: Term) -> Recommendation {
        Recommendation {
            provider: CloudProvider::Aws,
            service: ServiceType::DataWarehouse,
            account_id: String::new(),
            region: "us-east-1".to_string(),
            resource_type: resource_type.to_string(),
            count: 1,
            term,
            payment_option: PaymentOption::AllUpfront,
            details: ServiceDetails::DataWarehouse(DataWarehouseDetails::default()),
            upfront_cost: 0.0,
            recurring_monthly_cost: 0.0,
            estimated_monthly_savings: 0.0,
            estimated_savings_percent: 0.0,
        }
    }

    #[test]
    fn test_duration_to_months() {
        assert_eq!(duration_to_months(ONE_YEAR_SECONDS), Some(12));
        assert_eq!(duration_to_months(THREE_YEAR_SECONDS), Some(36));
        assert_eq!(duration_to_months(15_552_000), Some(6));
        assert_eq!(duration_to_months(0), None);
        assert_eq!(duration_to_months(-5), None);
    }

    #[test]
    fn test_duration_matching_examples() {
        let six_months = offering("a", "dc2.large", Some(15_552_000));
        assert!(!offering_matches(&six_months, "dc2.large", Term::OneYear));

        let one_year = offering("b", "dc2.large", Some(31_536_000));
        assert!(offering_matches(&one_year, "dc2.large", Term::OneYear));
        assert!(!offering_matches(&one_year, "dc2.large", Term::ThreeYear));

        let three_year = offering("c", "dc2.large", Some(94_608_000));
        assert!(offering_matches(&three_year, "dc2.large", Term::ThreeYear));
    }

    #[test]
    fn test_absent_duration_never_matches() {
        let o = offering("a", "dc2.large", None);
        assert!(!offering_matches(&o, "dc2.large", Term::OneYear));
    }

    #[test]
    fn test_resource_type_must_match_exactly() {
        let o = offering("a", "dc2.large", Some(ONE_YEAR_SECONDS));
        assert!(!offering_matches(&o, "DC2.LARGE", Term::OneYear));
        assert!(!offering_matches(&o, "dc2.8xlarge", Term::OneYear));
    }

    #[test]
    fn test_unresolvable_class_is_skipped() {
        let mut o = offering("a", "dc2.large", Some(ONE_YEAR_SECONDS));
        o.offering_class = OfferingClass::Upgradable;
        assert!(offering_matches(&o, "dc2.large", Term::OneYear));
        o.offering_class = OfferingClass::Other;
        assert!(!offering_matches(&o, "dc2.large", Term::OneYear));
    }

    #[tokio::test]
    async fn test_resolve_returns_first_match_across_pages() {
        let mut catalog = MockOfferingCatalog::new();
        catalog
            .expect_list_offerings()
            .withf(|_, token| token.is_none())
            .times(1)
            .returning(|_, _| {
                Ok(OfferingPage {
                    offerings: vec![
                        offering("six-month", "dc2.large", Some(15_552_000)),
                        offering("other-type", "ra3.xlplus", Some(ONE_YEAR_SECONDS)),
                    ],
                    next_page_token: Some("page-2".to_string()),
                })
            });
        catalog
            .expect_list_offerings()
            .withf(|_, token| token.as_deref() == Some("page-2"))
            .times(1)
            .returning(|_, _| {
                Ok(OfferingPage {
                    offerings: vec![
                        offering("first", "dc2.large", Some(ONE_YEAR_SECONDS)),
                        offering("second", "dc2.large", Some(ONE_YEAR_SECONDS)),
                    ],
                    next_page_token: None,
                })
            });

        let resolver = OfferingResolver::new(Arc::new(catalog));
        let found = resolver
            .resolve(&Context::background(), &recommendation("dc2.large", Term::OneYear))
            .await
            .unwrap();

        assert_eq!(found.offering_id, "first");
    }

    #[tokio::test]
    async fn test_resolve_empty_catalog_is_not_found() {
        let mut catalog = MockOfferingCatalog::new();
        catalog
            .expect_list_offerings()
            .returning(|_, _| Ok(OfferingPage::default()));

        let resolver = OfferingResolver::new(Arc::new(catalog));
        let err = resolver
            .resolve(&Context::background(), &recommendation("ra3.4xlarge", Term::OneYear))
            .await
            .unwrap_err();

        assert_eq!(err, CommitmentError::not_found("ra3.4xlarge"));
        assert_eq!(err.to_string(), "no offerings found for ra3.4xlarge");
    }

    #[tokio::test]
    async fn test_resolve_passes_filter_hints() {
        let mut catalog = MockOfferingCatalog::new();
        catalog
            .expect_list_offerings()
            .withf(|filter, _| {
                filter.resource_type.as_deref() == Some("dc2.large")
                    && filter.term == Some(Term::ThreeYear)
                    && filter.page_size == 25
            })
            .returning(|_, _| {
                Ok(OfferingPage {
                    offerings: vec![offering("x", "dc2.large", Some(THREE_YEAR_SECONDS))],
                    next_page_token: None,
                })
            });

        let resolver = OfferingResolver::new(Arc::new(catalog)).with_page_size(25);
        let found = resolver
            .resolve(&Context::background(), &recommendation("dc2.large", Term::ThreeYear))
            .await
            .unwrap();
        assert_eq!(found.offering_id, "x");
    }

    #[tokio::test]
    async fn test_resolve_propagates_catalog_errors() {
        let mut catalog = MockOfferingCatalog::new();
        catalog
            .expect_list_offerings()
            .returning(|_, _| Err(CommitmentError::Transport("connection reset".into())));

        let resolver = OfferingResolver::new(Arc::new(catalog));
        let err = resolver
            .resolve(&Context::background(), &recommendation("dc2.large", Term::OneYear))
            .await
            .unwrap_err();
        assert!(matches!(err, CommitmentError::Transport(_)));
    }

    #[tokio::test]
    async fn test_resource_types_are_distinct_and_sorted() {
        let mut catalog = MockOfferingCatalog::new();
        catalog
            .expect_list_offerings()
            .withf(|filter, token| filter.resource_type.is_none() && token.is_none())
            .returning(|_, _| {
                Ok(OfferingPage {
                    offerings: vec![
                        offering("1", "ra3.xlplus", Some(ONE_YEAR_SECONDS)),
                        offering("2", "dc2.large", Some(ONE_YEAR_SECONDS)),
                    ],
                    next_page_token: Some("next".to_string()),
                })
            });
        catalog
            .expect_list_offerings()
            .withf(|_, token| token.as_deref() == Some("next"))
            .returning(|_, _| {
                Ok(OfferingPage {
                    offerings: vec![offering("3", "dc2.large", Some(THREE_YEAR_SECONDS))],
                    next_page_token: None,
                })
            });

        let resolver = OfferingResolver::new(Arc::new(catalog));
        let types = resolver
            .resource_types(&Context::background(), Some("us-east-1"))
            .await
            .unwrap();
        assert_eq!(types, vec!["dc2.large".to_string(), "ra3.xlplus".to_string()]);
    }
}
