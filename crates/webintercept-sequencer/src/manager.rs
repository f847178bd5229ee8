//! Analysis lifecycle
//!
//! An analysis accumulates samples (appended manually or extracted from
//! captured exchanges), is analysed on demand, and can be reset back to an
//! empty `configured` state. The statistics themselves live in
//! [`crate::analyzer`] and are pure.

use crate::analyzer::analyze_tokens;
use crate::extract::extract_sample;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;
use webintercept_core::model::{AnalysisStatus, Exchange, TokenAnalysis};
use webintercept_core::{Error, Repository, Result};

/// Drives token analyses over the repository
pub struct SequencerManager {
    repo: Arc<dyn Repository>,
}

impl SequencerManager {
    /// Create a manager over the given repository
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }

    /// Append samples, capped at the analysis's target count
    pub async fn add_samples(&self, analysis_id: Uuid, samples: Vec<String>) -> Result<TokenAnalysis> {
        let mut analysis = self.repo.get_analysis(analysis_id).await?;
        if analysis.status == AnalysisStatus::Analyzing {
            return Err(Error::conflict("analysis is currently running"));
        }

        // Appends beyond the target are dropped; the operator triggers the
        // analysis run explicitly once enough samples are in.
        let capacity = (analysis.sample_count as usize).saturating_sub(analysis.samples.len());
        analysis.samples.extend(samples.into_iter().take(capacity));
        analysis.status = AnalysisStatus::Collecting;
        self.repo.update_analysis(analysis.clone()).await?;
        Ok(analysis)
    }

    /// Extract a sample from a captured exchange using the analysis recipe
    pub async fn collect_from_exchange(
        &self,
        analysis_id: Uuid,
        exchange: &Exchange,
    ) -> Result<Option<String>> {
        let analysis = self.repo.get_analysis(analysis_id).await?;
        let sample = extract_sample(&analysis.recipe, exchange)?;
        if let Some(sample) = sample.clone() {
            self.add_samples(analysis_id, vec![sample]).await?;
        }
        Ok(sample)
    }

    /// Run the statistics over the collected samples
    pub async fn analyze(&self, analysis_id: Uuid) -> Result<TokenAnalysis> {
        let mut analysis = self.repo.get_analysis(analysis_id).await?;
        if analysis.samples.is_empty() {
            return Err(Error::invalid_config("no samples collected"));
        }

        analysis.status = AnalysisStatus::Analyzing;
        self.repo.update_analysis(analysis.clone()).await?;

        analysis.results = Some(analyze_tokens(&analysis.samples));
        analysis.status = AnalysisStatus::Completed;
        analysis.completed_at = Some(Utc::now());
        self.repo.update_analysis(analysis.clone()).await?;
        Ok(analysis)
    }

    /// Drop samples and results, returning to `configured`
    pub async fn reset(&self, analysis_id: Uuid) -> Result<TokenAnalysis> {
        let mut analysis = self.repo.get_analysis(analysis_id).await?;
        analysis.samples.clear();
        analysis.results = None;
        analysis.status = AnalysisStatus::Configured;
        analysis.completed_at = None;
        analysis.error_message = None;
        self.repo.update_analysis(analysis.clone()).await?;
        Ok(analysis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use webintercept_core::model::ExtractionRecipe;
    use webintercept_core::MemoryRepository;

    async fn setup() -> (SequencerManager, Arc<MemoryRepository>, Uuid) {
        let repo = Arc::new(MemoryRepository::new());
        let mut analysis = TokenAnalysis::new(
            "session tokens",
            ExtractionRecipe::Cookie("session".to_string()),
        );
        analysis.sample_count = 5;
        let id = analysis.id;
        repo.put_analysis(analysis).await.expect("store");
        (SequencerManager::new(repo.clone()), repo, id)
    }

    #[tokio::test]
    async fn samples_are_capped_at_target_count() {
        let (manager, _repo, id) = setup().await;
        let analysis = manager
            .add_samples(id, (0..10).map(|i| format!("tok{i}")).collect())
            .await
            .expect("add");
        assert_eq!(analysis.samples.len(), 5);
        assert_eq!(analysis.status, AnalysisStatus::Collecting);
    }

    #[tokio::test]
    async fn analyze_then_reset_round_trip() {
        let (manager, repo, id) = setup().await;
        manager
            .add_samples(id, vec!["aX91".into(), "bQ72".into(), "cZ53".into()])
            .await
            .expect("add");

        let analysed = manager.analyze(id).await.expect("analyze");
        assert_eq!(analysed.status, AnalysisStatus::Completed);
        let results = analysed.results.expect("results");
        assert_eq!(results.total_samples, 3);
        assert!(analysed.completed_at.is_some());

        let reset = manager.reset(id).await.expect("reset");
        assert_eq!(reset.status, AnalysisStatus::Configured);
        assert!(reset.samples.is_empty());
        assert!(reset.results.is_none());

        let stored = repo.get_analysis(id).await.expect("stored");
        assert!(stored.results.is_none());
    }

    #[tokio::test]
    async fn analyze_requires_samples() {
        let (manager, _repo, id) = setup().await;
        assert!(matches!(
            manager.analyze(id).await,
            Err(Error::InvalidConfig { .. })
        ));
    }

    #[tokio::test]
    async fn collect_from_exchange_applies_recipe() {
        let (manager, _repo, id) = setup().await;

        let mut exchange = Exchange::new("GET", "http://t.test/login", "t.test", "/login", "http");
        let mut headers = webintercept_core::model::HeaderList::new();
        headers.append("Set-Cookie", "session=s3cr3t; HttpOnly");
        exchange.response_headers = Some(headers);
        exchange.response_status = Some(200);

        let sample = manager
            .collect_from_exchange(id, &exchange)
            .await
            .expect("collect");
        assert_eq!(sample.as_deref(), Some("s3cr3t"));
    }
}
