//! Recommendation inputs
//!
//! Recommendations are produced upstream and handed over as JSON files,
//! either in the current model or the legacy flat schema.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use domain_commitments::schema::{self, LegacyRecommendation};
use domain_commitments::{
    CloudProvider, CommitmentError, CommitmentResult, Recommendation, RecommendationParams,
    RecommendationSource,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

fn decode<T: DeserializeOwned>(path: &Path, raw: &str) -> CommitmentResult<Vec<T>> {
    serde_json::from_str::<OneOrMany<T>>(raw)
        .map(OneOrMany::into_vec)
        .map_err(|e| CommitmentError::Parse(format!("{}: {}", path.display(), e)))
}

/// Load recommendations from a JSON file holding one object or an array.
///
/// Legacy records that cannot be translated are logged and skipped.
pub async fn load_recommendations(
    path: &Path,
    legacy: bool,
) -> CommitmentResult<Vec<Recommendation>> {
    let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
        CommitmentError::NotConfigured(format!("cannot read {}: {}", path.display(), e))
    })?;

    if !legacy {
        return decode(path, &raw);
    }

    let records: Vec<LegacyRecommendation> = decode(path, &raw)?;
    let total = records.len();
    let recommendations: Vec<Recommendation> = records
        .iter()
        .enumerate()
        .filter_map(|(index, record)| match schema::from_internal(record) {
            Ok(rec) => Some(rec),
            Err(e) => {
                warn!(
                    index,
                    instance_type = %record.instance_type,
                    error = %e,
                    "Skipping untranslatable legacy recommendation"
                );
                None
            }
        })
        .collect();

    debug!(total, translated = recommendations.len(), "Translated legacy recommendations");
    Ok(recommendations)
}

/// Recommendations read from a file, restricted to one provider
pub struct JsonFileSource {
    path: PathBuf,
    legacy: bool,
    provider: CloudProvider,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>, legacy: bool, provider: CloudProvider) -> Self {
        Self {
            path: path.into(),
            legacy,
            provider,
        }
    }
}

#[async_trait]
impl RecommendationSource for JsonFileSource {
    async fn fetch_recommendations(
        &self,
        _params: &RecommendationParams,
    ) -> CommitmentResult<Vec<Recommendation>> {
        // filtering by params happens in the service
        let recommendations = load_recommendations(&self.path, self.legacy).await?;
        Ok(recommendations
            .into_iter()
            .filter(|r| r.provider == self.provider)
            .collect())
    }
}

/// Source used when no recommendation input was given
pub struct NoRecommendations;

#[async_trait]
impl RecommendationSource for NoRecommendations {
    async fn fetch_recommendations(
        &self,
        _params: &RecommendationParams,
    ) -> CommitmentResult<Vec<Recommendation>> {
        Ok(Vec::new())
    }
}
