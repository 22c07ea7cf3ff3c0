//! Azure Reservations Provider
//!
//! Catalog, purchase and listing go through the Microsoft.Capacity
//! resource provider; prices come from the public Retail Prices API.
//! https://learn.microsoft.com/en-us/rest/api/reserved-vm-instances/
//! https://learn.microsoft.com/en-us/rest/api/cost-management/retail-prices/azure-retail-prices

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use domain_commitments::models::{
    ChargeFrequency, RecurringCharge, ONE_YEAR_SECONDS, THREE_YEAR_SECONDS,
};
use domain_commitments::pricing::HOURS_PER_MONTH;
use domain_commitments::{
    CloudProvider, CommitmentError, CommitmentLister, CommitmentPage,
    CommitmentRecord, CommitmentResult, CommitmentType, Offering, OfferingCatalog, OfferingClass,
    OfferingFilter, OfferingPage, PaymentOption, PriceQuote, PricingLookup, ProviderBindings,
    ProviderCommitment, PurchaseApi, PurchaseRequest, RecommendationSource, ServiceType, Term,
    TokenSource,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{check_status, read_json, transport_error, ProviderAdapter};
use crate::config::AzureConfig;

/// Azure Resource Manager endpoint
const AZURE_MANAGEMENT_API: &str = "https://management.azure.com";
/// Microsoft identity platform endpoint
const AZURE_LOGIN_API: &str = "https://login.microsoftonline.com";
/// Azure Retail Prices API endpoint
const AZURE_PRICING_API: &str = "https://prices.azure.com/api/retail/prices";

const CAPACITY_API_VERSION: &str = "2022-11-01";
const MANAGEMENT_SCOPE: &str = "https://management.azure.com/.default";

/// Largest page the catalog API returns
const MAX_CATALOG_PAGE: usize = 1000;
/// Retail price pages scanned per lookup
const MAX_PRICE_PAGES: usize = 10;

const SUPPORTED_SERVICES: &[ServiceType] = &[
    ServiceType::Compute,
    ServiceType::RelationalDb,
    ServiceType::Cache,
    ServiceType::DataWarehouse,
];

/// Azure Reservations Provider
pub struct AzureCommitmentProvider {
    config: AzureConfig,
    client: Client,
}

impl AzureCommitmentProvider {
    pub fn new(config: AzureConfig, client: Client) -> Self {
        Self { config, client }
    }
}

impl ProviderAdapter for AzureCommitmentProvider {
    fn provider(&self) -> CloudProvider {
        CloudProvider::Azure
    }

    fn name(&self) -> &'static str {
        "Azure"
    }

    fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    fn supported_services(&self) -> &'static [ServiceType] {
        SUPPORTED_SERVICES
    }

    fn bindings(
        &self,
        service: ServiceType,
        recommendations: Arc<dyn RecommendationSource>,
    ) -> CommitmentResult<ProviderBindings> {
        let reserved_resource_type = reserved_resource_type(service).ok_or_else(|| {
            CommitmentError::NotConfigured(format!("Azure reservations do not cover {}", service))
        })?;

        let missing = |name: &str| CommitmentError::NotConfigured(format!("{} is not set", name));
        let token = AzureClientCredentials {
            client: self.client.clone(),
            tenant_id: self.config.tenant_id.clone().ok_or_else(|| missing("AZURE_TENANT_ID"))?,
            client_id: self.config.client_id.clone().ok_or_else(|| missing("AZURE_CLIENT_ID"))?,
            client_secret: self
                .config
                .client_secret
                .clone()
                .ok_or_else(|| missing("AZURE_CLIENT_SECRET"))?,
        };
        let subscription_id = self
            .config
            .subscription_id
            .clone()
            .ok_or_else(|| missing("AZURE_SUBSCRIPTION_ID"))?;

        let reservations = Arc::new(AzureReservations {
            client: self.client.clone(),
            token: Arc::new(token),
            subscription_id,
            default_region: self.config.region.clone(),
            reserved_resource_type,
        });

        Ok(ProviderBindings {
            provider: CloudProvider::Azure,
            service,
            catalog: reservations.clone(),
            purchase_api: reservations.clone(),
            lister: reservations.clone(),
            pricing: reservations,
            recommendations,
        })
    }
}

// ============================================================================
// Mappings
// ============================================================================

/// `reservedResourceType` for a service
pub fn reserved_resource_type(service: ServiceType) -> Option<&'static str> {
    match service {
        ServiceType::Compute => Some("VirtualMachines"),
        ServiceType::RelationalDb => Some("SqlDatabases"),
        ServiceType::Cache => Some("RedisCache"),
        ServiceType::DataWarehouse => Some("SqlDataWarehouse"),
        ServiceType::Search | ServiceType::SavingsPlans => None,
    }
}

fn service_from_resource_type(value: &str) -> ServiceType {
    match value.to_ascii_lowercase().as_str() {
        "sqldatabases" | "postgresql" | "mysql" | "mariadb" => ServiceType::RelationalDb,
        "rediscache" => ServiceType::Cache,
        "sqldatawarehouse" => ServiceType::DataWarehouse,
        _ => ServiceType::Compute,
    }
}

pub fn term_code(term: Term) -> &'static str {
    match term {
        Term::OneYear => "P1Y",
        Term::ThreeYear => "P3Y",
    }
}

/// Duration of an ISO-8601 term code such as `P1Y`
pub fn term_code_seconds(code: &str) -> Option<i64> {
    match code.to_ascii_uppercase().as_str() {
        "P1Y" => Some(ONE_YEAR_SECONDS),
        "P3Y" => Some(THREE_YEAR_SECONDS),
        "P5Y" => Some(5 * ONE_YEAR_SECONDS),
        _ => None,
    }
}

/// Azure only bills reservations fully upfront or monthly
pub fn billing_plan(option: PaymentOption) -> CommitmentResult<&'static str> {
    match option {
        PaymentOption::AllUpfront => Ok("Upfront"),
        PaymentOption::NoUpfront => Ok("Monthly"),
        PaymentOption::PartialUpfront => Err(CommitmentError::Validation(
            "Azure reservations do not offer partial upfront billing".to_string(),
        )),
    }
}

fn reservation_term_label(term: Term) -> &'static str {
    match term {
        Term::OneYear => "1 Year",
        Term::ThreeYear => "3 Years",
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|d| d.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|n| n.and_utc())
        })
}

// ============================================================================
// Token
// ============================================================================

/// OAuth2 client-credentials grant against Microsoft Entra ID
pub struct AzureClientCredentials {
    client: Client,
    tenant_id: String,
    client_id: String,
    client_secret: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[async_trait]
impl TokenSource for AzureClientCredentials {
    async fn access_token(&self) -> CommitmentResult<String> {
        let url = format!("{}/{}/oauth2/v2.0/token", AZURE_LOGIN_API, self.tenant_id);
        let response = self
            .client
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("scope", MANAGEMENT_SCOPE),
            ])
            .send()
            .await
            .map_err(transport_error)?;

        let token: TokenResponse = read_json(response).await.map_err(|e| match e {
            CommitmentError::Transport(msg) => CommitmentError::Auth(msg),
            other => other,
        })?;
        Ok(token.access_token)
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct CatalogsResult {
    #[serde(default)]
    value: Vec<AzureCatalog>,
    #[serde(rename = "nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzureCatalog {
    name: String,
    #[serde(default)]
    terms: Vec<String>,
}

#[derive(Debug, Serialize)]
struct SkuName {
    name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PurchaseProperties {
    reserved_resource_type: &'static str,
    billing_scope_id: String,
    term: &'static str,
    billing_plan: &'static str,
    quantity: u32,
    display_name: String,
    applied_scope_type: &'static str,
    renew: bool,
}

#[derive(Debug, Serialize)]
struct AzurePurchaseBody {
    sku: SkuName,
    location: String,
    properties: PurchaseProperties,
}

#[derive(Debug, Deserialize)]
struct CalculatePriceResponse {
    properties: Option<CalculatePriceProperties>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalculatePriceProperties {
    reservation_order_id: Option<String>,
    billing_currency_total: Option<AzureAmount>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzureAmount {
    amount: f64,
}

#[derive(Debug, Deserialize)]
struct ReservationOrderResponse {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReservationList {
    #[serde(default)]
    value: Vec<AzureReservation>,
    #[serde(rename = "nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AzureReservation {
    name: String,
    location: Option<String>,
    sku: Option<AzureSku>,
    properties: Option<ReservationProperties>,
}

#[derive(Debug, Deserialize)]
struct AzureSku {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReservationProperties {
    quantity: Option<u32>,
    reserved_resource_type: Option<String>,
    provisioning_state: Option<String>,
    display_provisioning_state: Option<String>,
    benefit_start_time: Option<String>,
    effective_date_time: Option<String>,
    purchase_date: Option<String>,
    term: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AzurePriceResponse {
    #[serde(rename = "Items", default)]
    items: Vec<AzurePriceItem>,
    #[serde(rename = "NextPageLink")]
    next_page_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AzurePriceItem {
    #[serde(rename = "currencyCode")]
    currency_code: String,
    #[serde(rename = "unitPrice")]
    unit_price: f64,
    #[serde(rename = "meterName", default)]
    meter_name: String,
    #[serde(rename = "productName", default)]
    product_name: String,
    #[serde(rename = "type")]
    price_type: String,
    #[serde(rename = "reservationTerm")]
    reservation_term: Option<String>,
}

// ============================================================================
// Conversions
// ============================================================================

fn catalog_offerings(catalog: AzureCatalog) -> Vec<Offering> {
    catalog
        .terms
        .iter()
        .map(|term| Offering {
            offering_id: format!("{}:{}", catalog.name, term),
            resource_type: catalog.name.clone(),
            duration_seconds: term_code_seconds(term),
            offering_class: OfferingClass::Regular,
            fixed_price: None,
            usage_price: 0.0,
            currency: String::new(),
            recurring_charges: vec![],
        })
        .collect()
}

fn reservation_to_commitment(
    subscription_id: &str,
    reservation: AzureReservation,
) -> Option<ProviderCommitment> {
    let props = reservation.properties?;
    let start = [
        props.benefit_start_time.as_deref(),
        props.effective_date_time.as_deref(),
        props.purchase_date.as_deref(),
    ]
    .into_iter()
    .flatten()
    .find_map(parse_timestamp);

    let Some(start_date) = start else {
        warn!(reservation = %reservation.name, "Reservation has no start date, skipping");
        return None;
    };

    let resource_kind = props.reserved_resource_type.unwrap_or_default();
    let commitment_type = if resource_kind.eq_ignore_ascii_case("VirtualMachines") {
        CommitmentType::ReservedInstance
    } else {
        CommitmentType::ReservedCapacity
    };

    Some(ProviderCommitment {
        commitment_id: reservation.name,
        commitment_type,
        service: service_from_resource_type(&resource_kind),
        account_id: subscription_id.to_string(),
        region: reservation.location.unwrap_or_default(),
        resource_type: reservation.sku.map(|s| s.name).unwrap_or_default(),
        count: props.quantity.unwrap_or(1),
        start_date,
        duration_seconds: props
            .term
            .as_deref()
            .and_then(term_code_seconds)
            .unwrap_or(0),
        state: props
            .display_provisioning_state
            .or(props.provisioning_state)
            .unwrap_or_default(),
    })
}

/// Reserved and on-demand hourly rates from retail price items
fn quote_from_items(items: &[AzurePriceItem], term: Term) -> Option<PriceQuote> {
    let label = reservation_term_label(term);
    let reservation = items
        .iter()
        .find(|i| i.price_type == "Reservation" && i.reservation_term.as_deref() == Some(label))?;

    let on_demand = items
        .iter()
        .filter(|i| i.price_type == "Consumption")
        .filter(|i| !i.meter_name.contains("Spot") && !i.meter_name.contains("Low Priority"))
        .filter(|i| !i.product_name.contains("Windows"))
        .map(|i| i.unit_price)
        .fold(None, |min: Option<f64>, p| Some(min.map_or(p, |m| m.min(p))))
        .unwrap_or(0.0);

    let hours = HOURS_PER_MONTH * f64::from(term.months());
    Some(PriceQuote {
        on_demand_rate: on_demand,
        reserved_rate: reservation.unit_price / hours,
        currency: reservation.currency_code.clone(),
    })
}

// ============================================================================
// API client
// ============================================================================

/// Microsoft.Capacity client bound to one subscription and resource type
pub struct AzureReservations {
    client: Client,
    token: Arc<dyn TokenSource>,
    subscription_id: String,
    default_region: String,
    reserved_resource_type: &'static str,
}

impl AzureReservations {
    fn billing_scope(&self) -> String {
        format!("/subscriptions/{}", self.subscription_id)
    }

    fn purchase_body(&self, request: &PurchaseRequest) -> CommitmentResult<AzurePurchaseBody> {
        let region = if request.region.is_empty() {
            self.default_region.clone()
        } else {
            request.region.clone()
        };

        Ok(AzurePurchaseBody {
            sku: SkuName {
                name: request.resource_type.clone(),
            },
            location: region,
            properties: PurchaseProperties {
                reserved_resource_type: self.reserved_resource_type,
                billing_scope_id: self.billing_scope(),
                term: term_code(request.term),
                billing_plan: billing_plan(request.payment_option)?,
                quantity: request.quantity,
                display_name: format!(
                    "{}-{}",
                    request.resource_type,
                    Utc::now().format("%Y%m%d%H%M%S")
                ),
                applied_scope_type: "Shared",
                renew: false,
            },
        })
    }
}

#[async_trait]
impl OfferingCatalog for AzureReservations {
    async fn list_offerings(
        &self,
        filter: &OfferingFilter,
        page_token: Option<String>,
    ) -> CommitmentResult<OfferingPage> {
        let url = match page_token {
            Some(next) => next,
            None => {
                let region = filter.region.as_deref().unwrap_or(&self.default_region);
                format!(
                    "{}/subscriptions/{}/providers/Microsoft.Capacity/catalogs?api-version={}&reservedResourceType={}&location={}&$take={}",
                    AZURE_MANAGEMENT_API,
                    self.subscription_id,
                    CAPACITY_API_VERSION,
                    self.reserved_resource_type,
                    urlencoding::encode(region),
                    filter.page_size.clamp(1, MAX_CATALOG_PAGE)
                )
            }
        };

        let token = self.token.access_token().await?;
        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(transport_error)?;
        let result: CatalogsResult = read_json(response).await?;

        let offerings: Vec<Offering> = result
            .value
            .into_iter()
            .filter(|c| {
                filter
                    .resource_type
                    .as_deref()
                    .is_none_or(|rt| c.name.eq_ignore_ascii_case(rt))
            })
            .flat_map(catalog_offerings)
            .collect();

        debug!(count = offerings.len(), "Fetched Azure catalog page");
        Ok(OfferingPage {
            offerings,
            next_page_token: result.next_link,
        })
    }
}

#[async_trait]
impl PurchaseApi for AzureReservations {
    async fn submit(
        &self,
        request: &PurchaseRequest,
    ) -> CommitmentResult<Option<CommitmentRecord>> {
        let body = self.purchase_body(request)?;
        let token = self.token.access_token().await?;

        let calculate_url = format!(
            "{}/providers/Microsoft.Capacity/calculatePrice?api-version={}",
            AZURE_MANAGEMENT_API, CAPACITY_API_VERSION
        );
        let response = self
            .client
            .post(&calculate_url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let quote: CalculatePriceResponse = read_json(response).await?;
        let quote = quote.properties.ok_or_else(|| {
            CommitmentError::Parse("calculatePrice returned no properties".to_string())
        })?;
        let order_id = quote.reservation_order_id.ok_or_else(|| {
            CommitmentError::Parse("calculatePrice returned no reservation order id".to_string())
        })?;

        let order_url = format!(
            "{}/providers/Microsoft.Capacity/reservationOrders/{}?api-version={}",
            AZURE_MANAGEMENT_API, order_id, CAPACITY_API_VERSION
        );
        let response = self
            .client
            .put(&order_url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let text = check_status(response)
            .await?
            .text()
            .await
            .map_err(transport_error)?;

        if text.trim().is_empty() {
            return Ok(None);
        }
        let order: ReservationOrderResponse =
            serde_json::from_str(&text).map_err(|e| CommitmentError::Parse(e.to_string()))?;
        let Some(commitment_id) = order.name.filter(|n| !n.is_empty()) else {
            return Ok(None);
        };

        info!(
            reservation_order = %commitment_id,
            sku = %request.resource_type,
            quantity = request.quantity,
            "Azure reservation order placed"
        );

        let total = quote.billing_currency_total.map(|t| t.amount);
        let record = match (body.properties.billing_plan, total) {
            ("Monthly", Some(amount)) => {
                let hours = HOURS_PER_MONTH * f64::from(request.term.months());
                CommitmentRecord {
                    commitment_id,
                    fixed_price: None,
                    recurring_charges: vec![RecurringCharge {
                        amount: amount / hours,
                        frequency: ChargeFrequency::Hourly,
                    }],
                }
            }
            _ => CommitmentRecord {
                commitment_id,
                fixed_price: total,
                recurring_charges: vec![],
            },
        };
        Ok(Some(record))
    }
}

#[async_trait]
impl CommitmentLister for AzureReservations {
    fn provider(&self) -> CloudProvider {
        CloudProvider::Azure
    }

    async fn list_commitments(
        &self,
        page_token: Option<String>,
    ) -> CommitmentResult<CommitmentPage> {
        let url = page_token.unwrap_or_else(|| {
            format!(
                "{}/providers/Microsoft.Capacity/reservations?api-version={}",
                AZURE_MANAGEMENT_API, CAPACITY_API_VERSION
            )
        });

        let token = self.token.access_token().await?;
        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(transport_error)?;
        let list: ReservationList = read_json(response).await?;

        Ok(CommitmentPage {
            commitments: list
                .value
                .into_iter()
                .filter_map(|r| reservation_to_commitment(&self.subscription_id, r))
                .collect(),
            next_page_token: list.next_link,
        })
    }
}

#[async_trait]
impl PricingLookup for AzureReservations {
    async fn get_price(
        &self,
        resource_type: &str,
        region: &str,
        term: Term,
    ) -> CommitmentResult<PriceQuote> {
        let filter = format!(
            "armRegionName eq '{}' and armSkuName eq '{}'",
            region, resource_type
        );
        let mut url = Some(format!(
            "{}?$filter={}",
            AZURE_PRICING_API,
            urlencoding::encode(&filter)
        ));
        let mut items = Vec::new();

        for _ in 0..MAX_PRICE_PAGES {
            let Some(page_url) = url.take() else { break };
            let response = self
                .client
                .get(&page_url)
                .send()
                .await
                .map_err(transport_error)?;
            let page: AzurePriceResponse = read_json(response).await?;
            items.extend(page.items);
            url = page.next_page_link;
        }

        quote_from_items(&items, term).ok_or_else(|| CommitmentError::not_found(resource_type))
    }
}
