//! GCP Committed Use Discounts Provider
//!
//! Resource-based commitments through the Compute Engine API.
//! https://cloud.google.com/compute/docs/reference/rest/v1/regionCommitments

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain_commitments::models::{ONE_YEAR_SECONDS, THREE_YEAR_SECONDS};
use domain_commitments::{
    CloudProvider, CommitmentError, CommitmentLister, CommitmentPage, CommitmentRecord,
    CommitmentResult, CommitmentType, Offering, OfferingCatalog, OfferingClass, OfferingFilter,
    OfferingPage, PaymentOption, ProviderBindings, ProviderCommitment, PurchaseApi,
    PurchaseRequest, RecommendationSource, ServiceType, Term, TokenSource,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{read_json, transport_error, ProviderAdapter, Unpriced};
use crate::config::GcpConfig;

/// Compute Engine API endpoint
const GCP_COMPUTE_API: &str = "https://compute.googleapis.com/compute/v1";
/// Instance metadata token endpoint
const GCP_METADATA_TOKEN: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

const MAX_PAGE_SIZE: usize = 500;

const TWELVE_MONTH: &str = "TWELVE_MONTH";
const THIRTY_SIX_MONTH: &str = "THIRTY_SIX_MONTH";

const SUPPORTED_SERVICES: &[ServiceType] = &[ServiceType::Compute];

/// GCP Committed Use Discounts Provider
pub struct GcpCommitmentProvider {
    config: GcpConfig,
    client: Client,
}

impl GcpCommitmentProvider {
    pub fn new(config: GcpConfig, client: Client) -> Self {
        Self { config, client }
    }
}

impl ProviderAdapter for GcpCommitmentProvider {
    fn provider(&self) -> CloudProvider {
        CloudProvider::Gcp
    }

    fn name(&self) -> &'static str {
        "GCP"
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
        if service != ServiceType::Compute {
            return Err(CommitmentError::NotConfigured(format!(
                "GCP committed use discounts do not cover {}",
                service
            )));
        }
        let project_id = self
            .config
            .project_id
            .clone()
            .ok_or_else(|| CommitmentError::NotConfigured("GCP_PROJECT_ID is not set".into()))?;

        let token: Arc<dyn TokenSource> = match &self.config.access_token {
            Some(token) => Arc::new(StaticToken(token.clone())),
            None => Arc::new(MetadataToken {
                client: self.client.clone(),
            }),
        };

        let commitments = Arc::new(GcpCommitments {
            client: self.client.clone(),
            token,
            project_id,
            region: self.config.region.clone(),
            zone: self.config.catalog_zone(),
        });

        Ok(ProviderBindings {
            provider: CloudProvider::Gcp,
            service,
            catalog: commitments.clone(),
            purchase_api: commitments.clone(),
            lister: commitments,
            // Compute Engine has no public per-plan CUD price endpoint
            pricing: Arc::new(Unpriced("GCP")),
            recommendations,
        })
    }
}

// ============================================================================
// Tokens
// ============================================================================

/// Token supplied through configuration
pub struct StaticToken(String);

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> CommitmentResult<String> {
        Ok(self.0.clone())
    }
}

/// Default service account token from the instance metadata server
pub struct MetadataToken {
    client: Client,
}

#[derive(Debug, Deserialize)]
struct MetadataTokenResponse {
    access_token: String,
}

#[async_trait]
impl TokenSource for MetadataToken {
    async fn access_token(&self) -> CommitmentResult<String> {
        let response = self
            .client
            .get(GCP_METADATA_TOKEN)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| CommitmentError::Auth(format!("metadata server unreachable: {}", e)))?;
        let token: MetadataTokenResponse = read_json(response).await?;
        Ok(token.access_token)
    }
}

// ============================================================================
// Mappings
// ============================================================================

pub fn plan_for_term(term: Term) -> &'static str {
    match term {
        Term::OneYear => TWELVE_MONTH,
        Term::ThreeYear => THIRTY_SIX_MONTH,
    }
}

pub fn plan_seconds(plan: &str) -> Option<i64> {
    match plan {
        TWELVE_MONTH => Some(ONE_YEAR_SECONDS),
        THIRTY_SIX_MONTH => Some(THREE_YEAR_SECONDS),
        _ => None,
    }
}

/// Commitment `type` for a machine type such as `n2-standard-4`
pub fn commitment_type_for_machine(machine_type: &str) -> &'static str {
    let family = machine_type.split('-').next().unwrap_or_default();
    match family {
        "n2" => "GENERAL_PURPOSE_N2",
        "n2d" => "GENERAL_PURPOSE_N2D",
        "e2" => "GENERAL_PURPOSE_E2",
        "t2d" => "GENERAL_PURPOSE_T2D",
        "c2" => "COMPUTE_OPTIMIZED",
        "c2d" => "COMPUTE_OPTIMIZED_C2D",
        "c3" => "COMPUTE_OPTIMIZED_C3",
        "m1" | "m2" => "MEMORY_OPTIMIZED",
        "m3" => "MEMORY_OPTIMIZED_M3",
        "a2" => "ACCELERATOR_OPTIMIZED",
        _ => "GENERAL_PURPOSE",
    }
}

/// Machine shape carried inside a synthesized offering id
#[derive(Debug, Clone, PartialEq)]
pub struct MachineShape {
    pub plan: String,
    pub machine_type: String,
    pub vcpus: u64,
    pub memory_mb: u64,
}

impl MachineShape {
    pub fn offering_id(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.plan, self.machine_type, self.vcpus, self.memory_mb
        )
    }

    pub fn parse(offering_id: &str) -> CommitmentResult<Self> {
        let invalid =
            || CommitmentError::Validation(format!("malformed offering id {}", offering_id));
        let mut parts = offering_id.split('/');
        let (Some(plan), Some(machine), Some(vcpus), Some(memory), None) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) else {
            return Err(invalid());
        };

        Ok(Self {
            plan: plan.to_string(),
            machine_type: machine.to_string(),
            vcpus: vcpus.parse().map_err(|_| invalid())?,
            memory_mb: memory.parse().map_err(|_| invalid())?,
        })
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MachineTypeList {
    #[serde(default)]
    items: Vec<GcpMachineType>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GcpMachineType {
    name: String,
    guest_cpus: u64,
    memory_mb: u64,
    #[serde(default)]
    is_shared_cpu: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GcpResource {
    #[serde(rename = "type")]
    resource_type: String,
    amount: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CommitmentBody {
    name: String,
    description: String,
    plan: String,
    #[serde(rename = "type")]
    commitment_type: &'static str,
    resources: Vec<GcpResource>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GcpOperation {
    #[serde(default)]
    name: String,
    target_link: Option<String>,
    error: Option<GcpOperationError>,
}

#[derive(Debug, Deserialize)]
struct GcpOperationError {
    #[serde(default)]
    errors: Vec<GcpErrorEntry>,
}

#[derive(Debug, Deserialize)]
struct GcpErrorEntry {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AggregatedCommitments {
    #[serde(default)]
    items: HashMap<String, CommitmentsScope>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommitmentsScope {
    #[serde(default)]
    commitments: Vec<GcpCommitment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GcpCommitment {
    name: String,
    region: Option<String>,
    status: Option<String>,
    plan: Option<String>,
    start_timestamp: Option<String>,
    #[serde(rename = "type")]
    commitment_type: Option<String>,
    #[serde(default)]
    resources: Vec<GcpResource>,
}

// ============================================================================
// Conversions
// ============================================================================

fn machine_offerings(machine: &GcpMachineType) -> Vec<Offering> {
    [TWELVE_MONTH, THIRTY_SIX_MONTH]
        .into_iter()
        .map(|plan| {
            let shape = MachineShape {
                plan: plan.to_string(),
                machine_type: machine.name.clone(),
                vcpus: machine.guest_cpus,
                memory_mb: machine.memory_mb,
            };
            Offering {
                offering_id: shape.offering_id(),
                resource_type: machine.name.clone(),
                duration_seconds: plan_seconds(plan),
                offering_class: OfferingClass::Regular,
                fixed_price: None,
                usage_price: 0.0,
                currency: "USD".to_string(),
                recurring_charges: vec![],
            }
        })
        .collect()
}

fn commitment_body(shape: &MachineShape, quantity: u32) -> CommitmentBody {
    let count = u64::from(quantity);
    CommitmentBody {
        name: format!("cmt-{}", Uuid::new_v4().simple()),
        description: format!("{} x {}", quantity, shape.machine_type),
        plan: shape.plan.clone(),
        commitment_type: commitment_type_for_machine(&shape.machine_type),
        resources: vec![
            GcpResource {
                resource_type: "VCPU".to_string(),
                amount: (shape.vcpus * count).to_string(),
            },
            GcpResource {
                resource_type: "MEMORY".to_string(),
                amount: (shape.memory_mb * count).to_string(),
            },
        ],
    }
}

fn operation_outcome(
    operation: GcpOperation,
    commitment_name: String,
) -> CommitmentResult<Option<CommitmentRecord>> {
    if let Some(error) = operation.error {
        let detail = error
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.code, e.message))
            .collect::<Vec<_>>()
            .join("; ");
        return Err(CommitmentError::Transport(format!(
            "operation {} failed: {}",
            operation.name, detail
        )));
    }
    if operation.name.is_empty() && operation.target_link.is_none() {
        return Ok(None);
    }
    Ok(Some(CommitmentRecord {
        commitment_id: commitment_name,
        fixed_price: None,
        recurring_charges: vec![],
    }))
}

/// Region name from `regions/us-central1` or a full self link
fn last_segment(value: &str) -> &str {
    value.rsplit('/').next().unwrap_or(value)
}

fn commitment_to_provider(
    project_id: &str,
    scope: &str,
    commitment: GcpCommitment,
) -> Option<ProviderCommitment> {
    let start_date = commitment
        .start_timestamp
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc));
    let Some(start_date) = start_date else {
        warn!(commitment = %commitment.name, "Commitment has no start timestamp, skipping");
        return None;
    };

    let vcpus = commitment
        .resources
        .iter()
        .find(|r| r.resource_type == "VCPU")
        .and_then(|r| r.amount.parse::<u32>().ok())
        .unwrap_or(0);
    let region = commitment
        .region
        .as_deref()
        .map(last_segment)
        .unwrap_or_else(|| last_segment(scope))
        .to_string();

    Some(ProviderCommitment {
        commitment_id: commitment.name,
        commitment_type: CommitmentType::ReservedCapacity,
        service: ServiceType::Compute,
        account_id: project_id.to_string(),
        region,
        resource_type: commitment.commitment_type.unwrap_or_default(),
        count: vcpus,
        start_date,
        duration_seconds: commitment.plan.as_deref().and_then(plan_seconds).unwrap_or(0),
        state: commitment.status.unwrap_or_default(),
    })
}

// ============================================================================
// API client
// ============================================================================

/// Compute Engine commitments client for one project
pub struct GcpCommitments {
    client: Client,
    token: Arc<dyn TokenSource>,
    project_id: String,
    region: String,
    zone: String,
}

impl GcpCommitments {
    /// Zone whose machine types stand in for `region`'s catalog. The
    /// configured zone serves the configured region; any other region reads
    /// its `-a` zone.
    fn catalog_zone(&self, region: Option<&str>) -> String {
        match region {
            Some(region) if !region.is_empty() && region != self.region => {
                format!("{}-a", region)
            }
            _ => self.zone.clone(),
        }
    }
}

#[async_trait]
impl OfferingCatalog for GcpCommitments {
    async fn list_offerings(
        &self,
        filter: &OfferingFilter,
        page_token: Option<String>,
    ) -> CommitmentResult<OfferingPage> {
        let zone = self.catalog_zone(filter.region.as_deref());
        let mut url = format!(
            "{}/projects/{}/zones/{}/machineTypes?maxResults={}",
            GCP_COMPUTE_API,
            self.project_id,
            zone,
            filter.page_size.clamp(1, MAX_PAGE_SIZE)
        );
        if let Some(resource_type) = &filter.resource_type {
            let expr = format!("name = \"{}\"", resource_type);
            url.push_str(&format!("&filter={}", urlencoding::encode(&expr)));
        }
        if let Some(token) = page_token {
            url.push_str(&format!("&pageToken={}", urlencoding::encode(&token)));
        }

        let token = self.token.access_token().await?;
        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(transport_error)?;
        let list: MachineTypeList = read_json(response).await?;

        // shared-core machine types cannot be committed
        let offerings: Vec<Offering> = list
            .items
            .iter()
            .filter(|m| !m.is_shared_cpu)
            .flat_map(machine_offerings)
            .collect();

        debug!(zone = %zone, count = offerings.len(), "Fetched GCP machine types page");
        Ok(OfferingPage {
            offerings,
            next_page_token: list.next_page_token,
        })
    }
}

#[async_trait]
impl PurchaseApi for GcpCommitments {
    async fn submit(
        &self,
        request: &PurchaseRequest,
    ) -> CommitmentResult<Option<CommitmentRecord>> {
        if request.payment_option != PaymentOption::NoUpfront {
            return Err(CommitmentError::Validation(format!(
                "GCP committed use discounts are billed monthly, {} is not available",
                request.payment_option
            )));
        }
        let shape = MachineShape::parse(&request.offering_id)?;
        let region = if request.region.is_empty() {
            self.region.as_str()
        } else {
            request.region.as_str()
        };

        let body = commitment_body(&shape, request.quantity);
        let url = format!(
            "{}/projects/{}/regions/{}/commitments",
            GCP_COMPUTE_API, self.project_id, region
        );

        let token = self.token.access_token().await?;
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let operation: GcpOperation = read_json(response).await?;

        let outcome = operation_outcome(operation, body.name.clone())?;
        if outcome.is_some() {
            info!(
                commitment = %body.name,
                plan = %shape.plan,
                machine_type = %shape.machine_type,
                quantity = request.quantity,
                "GCP commitment created"
            );
        }
        Ok(outcome)
    }
}

#[async_trait]
impl CommitmentLister for GcpCommitments {
    fn provider(&self) -> CloudProvider {
        CloudProvider::Gcp
    }

    async fn list_commitments(
        &self,
        page_token: Option<String>,
    ) -> CommitmentResult<CommitmentPage> {
        let mut url = format!(
            "{}/projects/{}/aggregated/commitments?maxResults={}",
            GCP_COMPUTE_API, self.project_id, MAX_PAGE_SIZE
        );
        if let Some(token) = page_token {
            url.push_str(&format!("&pageToken={}", urlencoding::encode(&token)));
        }

        let token = self.token.access_token().await?;
        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(transport_error)?;
        let list: AggregatedCommitments = read_json(response).await?;

        let commitments = list
            .items
            .into_iter()
            .flat_map(|(scope, s)| {
                s.commitments
                    .into_iter()
                    .map(move |c| (scope.clone(), c))
            })
            .filter_map(|(scope, c)| commitment_to_provider(&self.project_id, &scope, c))
            .collect();

        Ok(CommitmentPage {
            commitments,
            next_page_token: list.next_page_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commitment_type_from_family() {
        assert_eq!(commitment_type_for_machine("n2-standard-4"), "GENERAL_PURPOSE_N2");
        assert_eq!(commitment_type_for_machine("c2d-highcpu-8"), "COMPUTE_OPTIMIZED_C2D");
        assert_eq!(commitment_type_for_machine("n1-standard-1"), "GENERAL_PURPOSE");
    }

    #[test]
    fn test_machine_shape_parse() {
        let shape = MachineShape::parse("TWELVE_MONTH/n2-standard-4/4/16384").unwrap();
        assert_eq!(shape.machine_type, "n2-standard-4");
        assert_eq!(shape.vcpus, 4);
        assert_eq!(shape.offering_id(), "TWELVE_MONTH/n2-standard-4/4/16384");

        assert!(MachineShape::parse("TWELVE_MONTH/n2-standard-4").is_err());
        assert!(MachineShape::parse("TWELVE_MONTH/n2-standard-4/four/16384").is_err());
        assert!(MachineShape::parse("a/b/1/2/extra").is_err());
    }

    #[test]
    fn test_machine_types_expand_into_plans() {
        let list: MachineTypeList = serde_json::from_value(serde_json::json!({
            "items": [
                { "name": "n2-standard-4", "guestCpus": 4, "memoryMb": 16384 },
                { "name": "e2-micro", "guestCpus": 2, "memoryMb": 1024, "isSharedCpu": true }
            ],
            "nextPageToken": "p2"
        }))
        .unwrap();

        let offerings: Vec<Offering> = list
            .items
            .iter()
            .filter(|m| !m.is_shared_cpu)
            .flat_map(machine_offerings)
            .collect();

        assert_eq!(offerings.len(), 2);
        assert_eq!(offerings[0].offering_id, "TWELVE_MONTH/n2-standard-4/4/16384");
        assert_eq!(offerings[0].duration_seconds, Some(ONE_YEAR_SECONDS));
        assert_eq!(offerings[1].duration_seconds, Some(THREE_YEAR_SECONDS));
        assert_eq!(list.next_page_token.as_deref(), Some("p2"));
    }

    #[test]
    fn test_commitment_body_scales_resources() {
        let shape = MachineShape::parse("THIRTY_SIX_MONTH/n2-standard-4/4/16384").unwrap();
        let body = commitment_body(&shape, 3);

        assert!(body.name.starts_with("cmt-"));
        assert_eq!(body.commitment_type, "GENERAL_PURPOSE_N2");
        assert_eq!(body.resources[0].amount, "12");
        assert_eq!(body.resources[1].amount, "49152");

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["plan"], "THIRTY_SIX_MONTH");
        assert_eq!(json["resources"][0]["type"], "VCPU");
    }

    #[test]
    fn test_operation_outcomes() {
        let ok: GcpOperation = serde_json::from_value(serde_json::json!({
            "name": "operation-123",
            "status": "RUNNING",
            "targetLink": "https://compute.googleapis.com/compute/v1/projects/p/regions/r/commitments/cmt-1"
        }))
        .unwrap();
        let record = operation_outcome(ok, "cmt-1".into()).unwrap().unwrap();
        assert_eq!(record.commitment_id, "cmt-1");

        let failed: GcpOperation = serde_json::from_value(serde_json::json!({
            "name": "operation-124",
            "error": { "errors": [{ "code": "QUOTA_EXCEEDED", "message": "Quota 'COMMITMENTS' exceeded" }] }
        }))
        .unwrap();
        let err = operation_outcome(failed, "cmt-2".into()).unwrap_err();
        assert!(err.to_string().contains("QUOTA_EXCEEDED"));

        let empty: GcpOperation = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(operation_outcome(empty, "cmt-3".into()).unwrap(), None);
    }

    #[test]
    fn test_aggregated_commitment_conversion() {
        let list: AggregatedCommitments = serde_json::from_value(serde_json::json!({
            "items": {
                "regions/us-central1": {
                    "commitments": [{
                        "name": "cmt-abc",
                        "status": "ACTIVE",
                        "plan": "TWELVE_MONTH",
                        "startTimestamp": "2024-05-01T00:00:00.000-07:00",
                        "type": "GENERAL_PURPOSE_N2",
                        "resources": [
                            { "type": "VCPU", "amount": "8" },
                            { "type": "MEMORY", "amount": "32768" }
                        ]
                    }]
                },
                "regions/europe-west1": {
                    "warning": { "code": "NO_RESULTS_ON_PAGE" }
                }
            }
        }))
        .unwrap();

        let commitments: Vec<_> = list
            .items
            .into_iter()
            .flat_map(|(scope, s)| s.commitments.into_iter().map(move |c| (scope.clone(), c)))
            .filter_map(|(scope, c)| commitment_to_provider("acme", &scope, c))
            .collect();

        assert_eq!(commitments.len(), 1);
        let c = &commitments[0];
        assert_eq!(c.region, "us-central1");
        assert_eq!(c.count, 8);
        assert_eq!(c.duration_seconds, ONE_YEAR_SECONDS);
        assert_eq!(c.state, "ACTIVE");
        assert_eq!(c.account_id, "acme");
    }

    fn commitments_client() -> GcpCommitments {
        GcpCommitments {
            client: Client::new(),
            token: Arc::new(StaticToken("t".into())),
            project_id: "acme".into(),
            region: "us-central1".into(),
            zone: "us-central1-c".into(),
        }
    }

    #[test]
    fn test_catalog_zone_follows_requested_region() {
        let api = commitments_client();
        assert_eq!(api.catalog_zone(Some("europe-west4")), "europe-west4-a");
        assert_eq!(api.catalog_zone(Some("us-central1")), "us-central1-c");
        assert_eq!(api.catalog_zone(Some("")), "us-central1-c");
        assert_eq!(api.catalog_zone(None), "us-central1-c");
    }

    #[tokio::test]
    async fn test_partial_upfront_is_rejected_before_any_call() {
        let api = commitments_client();
        let request = PurchaseRequest {
            offering_id: "TWELVE_MONTH/n2-standard-4/4/16384".into(),
            resource_type: "n2-standard-4".into(),
            quantity: 1,
            service: ServiceType::Compute,
            account_id: "acme".into(),
            region: "us-central1".into(),
            term: Term::OneYear,
            payment_option: PaymentOption::AllUpfront,
        };

        assert!(matches!(
            api.submit(&request).await,
            Err(CommitmentError::Validation(_))
        ));
    }
}
