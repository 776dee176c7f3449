//! Sample operations.

use std::collections::HashSet;

use super::SeerClient;
use crate::common::trim_raw_file_path;
use crate::error::{Error, Result};
use crate::model::{Extra, MsRun, Paged, Sample, SampleField};

/// Which entity a sample listing is scoped to. Exactly one scope per
/// call; the backend has no unscoped sample listing.
#[derive(Debug, Clone)]
pub enum SampleQuery {
    Plate(String),
    Project(String),
    Analysis(String),
    AnalysisName(String),
}

/// Filter applied when collecting sample ids for a group analysis plot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFilter {
    Control,
    Sample,
}

impl SeerClient {
    /// Fetches the samples attached to a plate, project, or analysis.
    pub async fn samples(&self, query: SampleQuery) -> Result<Vec<Sample>> {
        let mut samples = match &query {
            SampleQuery::Plate(plate_id) => {
                self.plates(Some(plate_id))
                    .await
                    .map_err(|_| Error::InvalidInput("plate id is invalid".into()))?;
                self.scoped_samples("plateId", plate_id).await?
            }
            SampleQuery::Project(project_id) => {
                self.projects(Some(project_id))
                    .await
                    .map_err(|_| Error::InvalidInput("project id is invalid".into()))?;
                self.scoped_samples("projectId", project_id).await?
            }
            SampleQuery::Analysis(analysis_id) => {
                self.analysis_samples(std::slice::from_ref(analysis_id))
                    .await?
            }
            SampleQuery::AnalysisName(name) => {
                let analyses = self
                    .analyses(super::AnalysisQuery::default().search(
                        super::AnalysisSearch::AnalysisName(name.clone()),
                    ))
                    .await?;
                let ids: Vec<String> = analyses.into_iter().map(|a| a.id).collect();
                self.analysis_samples(&ids).await?
            }
        };

        let fields = self.sample_custom_fields().await?;
        let defined: HashSet<&str> = fields.iter().map(|f| f.field_name.as_str()).collect();
        for sample in &mut samples {
            sample.extra.remove("tenant_id");
            sample
                .extra
                .retain(|key, _| !key.starts_with("custom_") || defined.contains(key.as_str()));
        }
        Ok(samples)
    }

    async fn scoped_samples(&self, key: &str, id: &str) -> Result<Vec<Sample>> {
        let query = [("all", "true".to_string()), (key, id.to_string())];
        let page: Paged<Sample> = self
            .get_json("get_samples", "api/v1/samples", &query)
            .await?;
        let mut samples = page.data;
        // The backend sends empty strings for non-control samples.
        for sample in &mut samples {
            if sample.control.as_deref() == Some("") {
                sample.control = None;
            }
        }
        Ok(samples)
    }

    /// Custom sample columns defined for the tenant.
    pub async fn sample_custom_fields(&self) -> Result<Vec<SampleField>> {
        let mut fields: Vec<SampleField> = self
            .get_json("get_sample_custom_fields", "api/v1/samplefields", &[])
            .await?;
        for field in &mut fields {
            field.extra.remove("tenant_id");
        }
        Ok(fields)
    }

    /// MS runs recorded for the given samples. Every sample id must
    /// resolve to at least one run.
    pub async fn msruns(&self, sample_ids: &[String]) -> Result<Vec<MsRun>> {
        let mut runs = Vec::new();
        for sample_id in sample_ids {
            let page: Paged<MsRun> = self
                .post_json(
                    "get_msruns",
                    "api/v1/msdatas/items",
                    &serde_json::json!({ "sampleId": sample_id }),
                )
                .await?;
            if page.data.is_empty() {
                return Err(Error::NotFound(format!(
                    "no MS data for sample id {sample_id}"
                )));
            }
            runs.extend(page.data);
        }

        for run in &mut runs {
            run.extra.remove("tenant_id");
            if let Some(path) = &run.raw_file_path {
                run.raw_file_path = Some(trim_raw_file_path(path));
            }
        }
        Ok(runs)
    }

    /// Registers one sample. The entry must carry `plateID`, `sampleID`,
    /// and `sampleName`.
    pub(crate) async fn add_sample(&self, entry: &Extra) -> Result<Sample> {
        validate_sample_entry(entry)?;
        self.post_json("add_sample", "api/v1/samples", entry).await
    }

    /// Registers samples in one batch call.
    pub(crate) async fn add_samples(&self, entries: &[Extra]) -> Result<Vec<Sample>> {
        for entry in entries {
            validate_sample_entry(entry)?;
        }
        self.post_json(
            "add_samples",
            "api/v1/samples/batch",
            &serde_json::json!({ "samples": entries }),
        )
        .await
    }

    /// Sample ids of a project, optionally restricted to controls or
    /// non-controls and intersected with a caller-provided id list.
    pub(crate) async fn filter_sample_ids(
        &self,
        project_id: &str,
        filter: Option<SampleFilter>,
        sample_ids: Option<&[String]>,
    ) -> Result<Vec<String>> {
        let samples = self
            .samples(SampleQuery::Project(project_id.to_string()))
            .await?;
        let mut ids: Vec<String> = samples
            .into_iter()
            .filter(|sample| match filter {
                Some(SampleFilter::Control) => sample.control.is_some(),
                Some(SampleFilter::Sample) => sample.control.is_none(),
                None => true,
            })
            .map(|sample| sample.id)
            .collect();
        if let Some(requested) = sample_ids {
            let requested: HashSet<&str> = requested.iter().map(String::as_str).collect();
            ids.retain(|id| requested.contains(id.as_str()));
        }
        Ok(ids)
    }
}

fn validate_sample_entry(entry: &Extra) -> Result<()> {
    for key in ["plateID", "sampleID", "sampleName"] {
        if !entry.contains_key(key) {
            return Err(Error::InvalidInput(format!("{key} is missing")));
        }
    }
    Ok(())
}
