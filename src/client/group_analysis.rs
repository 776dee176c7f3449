//! Group analysis: saved differential statistics and the derived plots.

use std::collections::HashMap;

use serde_json::Value;

use super::SeerClient;
use crate::common::validate_contrast;
use crate::error::{Error, Result};
use crate::model::{
    BoxPlotRow, Extra, FeatureStats, GroupAnalysis, GroupAnalysisResults, HierarchicalClustering,
    PcaData, PcaResponse, ProcessedFileUrls,
};
use crate::volcano::{FeatureKind, VolcanoPlotBuilder, VolcanoPlotSettings, VolcanoPoint};

/// Query for [`SeerClient::group_analyses`]. A group-analysis id pins
/// the lookup to one saved run; otherwise an optional name or
/// description search narrows the listing.
#[derive(Debug, Clone)]
pub struct GroupAnalysisQuery {
    analysis_id: String,
    group_analysis_id: Option<String>,
    search_field: Option<&'static str>,
    search_item: Option<String>,
}

impl GroupAnalysisQuery {
    pub fn new(analysis_id: impl Into<String>) -> Self {
        GroupAnalysisQuery {
            analysis_id: analysis_id.into(),
            group_analysis_id: None,
            search_field: None,
            search_item: None,
        }
    }

    pub fn group_analysis(mut self, group_analysis_id: impl Into<String>) -> Self {
        self.group_analysis_id = Some(group_analysis_id.into());
        self
    }

    pub fn search_name(mut self, name: impl Into<String>) -> Self {
        self.search_field = Some("name");
        self.search_item = Some(name.into());
        self
    }

    pub fn search_description(mut self, description: impl Into<String>) -> Self {
        self.search_field = Some("description");
        self.search_item = Some(description.into());
        self
    }
}

/// Statistical test behind a cluster heatmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatTest {
    TTest,
    Wilcoxon,
}

impl StatTest {
    fn as_str(self) -> &'static str {
        match self {
            StatTest::TTest => "ttest",
            StatTest::Wilcoxon => "wilcoxon",
        }
    }
}

/// Per-group-analysis plot bundle returned by
/// [`SeerClient::all_volcano_plot_data`].
#[derive(Debug)]
pub struct GroupAnalysisPlots {
    pub volcano_plot: Vec<VolcanoPoint>,
    pub box_plot: Option<Vec<BoxPlotRow>>,
}

impl SeerClient {
    /// Lists the saved group analyses of an analysis, or fetches one by
    /// id.
    pub async fn group_analyses(&self, query: GroupAnalysisQuery) -> Result<Vec<GroupAnalysis>> {
        let raw = self.group_analyses_raw(&query).await?;
        if query.group_analysis_id.is_some() {
            Ok(vec![serde_json::from_value(raw)?])
        } else {
            let rows = raw.get("data").cloned().unwrap_or(Value::Array(vec![]));
            Ok(serde_json::from_value(rows)?)
        }
    }

    async fn group_analyses_raw(&self, query: &GroupAnalysisQuery) -> Result<Value> {
        let mut params = vec![("analysisid", query.analysis_id.clone())];
        let mut path = "api/v1/groupanalysis/groupanalyses".to_string();
        match &query.group_analysis_id {
            Some(id) => {
                path = format!("{path}/{id}");
                params.push(("id", id.clone()));
            }
            None => {
                if let (Some(field), Some(item)) = (query.search_field, &query.search_item) {
                    if item.is_empty() {
                        return Err(Error::InvalidInput(format!(
                            "a non-empty value is required for {field}"
                        )));
                    }
                    params.push(("searchFields", field.to_string()));
                    params.push(("searchItem", item.clone()));
                }
            }
        }
        self.get_json("get_group_analysis", &path, &params).await
    }

    /// Assembles the pre- and post-analysis data of a group analysis.
    /// Without a group-analysis id the most recent saved results are
    /// used.
    pub async fn group_analysis_results(
        &self,
        analysis_id: &str,
        group_analysis_id: Option<&str>,
    ) -> Result<GroupAnalysisResults> {
        if analysis_id.is_empty() {
            return Err(Error::InvalidInput("analysis id cannot be empty".into()));
        }

        let pre_protein: Value = self
            .post_json(
                "group_analysis_results",
                "api/v2/groupanalysis/protein",
                &serde_json::json!({ "analysisId": analysis_id, "grouping": "condition" }),
            )
            .await?;
        let pre_peptide: Value = self
            .post_json(
                "group_analysis_results",
                "api/v2/groupanalysis/peptide",
                &serde_json::json!({ "analysisId": analysis_id, "grouping": "condition" }),
            )
            .await?;

        let saved: Value = match group_analysis_id {
            Some(id) => {
                self.group_analyses_raw(
                    &GroupAnalysisQuery::new(analysis_id).group_analysis(id),
                )
                .await?
            }
            None => {
                self.get_json(
                    "group_analysis_results",
                    "api/v1/groupanalysis/getSavedResults",
                    &[("analysisid", analysis_id.to_string())],
                )
                .await?
            }
        };

        let protein = feature_stats(&saved, "pgResult")?;
        let peptide = feature_stats(&saved, "peptideResult")?;
        if protein.is_none() && peptide.is_none() {
            return Err(Error::UnexpectedResponse(
                "no group analysis data returned from server".into(),
            ));
        }

        Ok(GroupAnalysisResults {
            pre_protein,
            pre_peptide,
            protein,
            peptide,
            protein_urls: ProcessedFileUrls {
                processed_file_url: url_field(&saved, "pgProcessedFileUrl"),
                processed_long_form_file_url: url_field(&saved, "pgProcessedLongFormFileUrl"),
            },
            peptide_urls: ProcessedFileUrls {
                processed_file_url: url_field(&saved, "peptideProcessedFileUrl"),
                processed_long_form_file_url: url_field(
                    &saved,
                    "peptideProcessedLongFormFileUrl",
                ),
            },
        })
    }

    /// Builds a reusable volcano plot from the saved group-analysis
    /// statistics.
    pub async fn volcano_plot_builder(
        &self,
        analysis_id: &str,
        group_analysis_id: Option<&str>,
        settings: VolcanoPlotSettings,
    ) -> Result<VolcanoPlotBuilder> {
        let results = self
            .group_analysis_results(analysis_id, group_analysis_id)
            .await?;
        VolcanoPlotBuilder::new(&results, settings)
    }

    /// Volcano plot points for one analysis.
    pub async fn volcano_plot_data(
        &self,
        analysis_id: &str,
        group_analysis_id: Option<&str>,
        settings: VolcanoPlotSettings,
    ) -> Result<Vec<VolcanoPoint>> {
        let builder = self
            .volcano_plot_builder(analysis_id, group_analysis_id, settings)
            .await?;
        Ok(builder.points().to_vec())
    }

    /// Volcano plot points for every saved group analysis of an
    /// analysis, keyed by group-analysis id, optionally with box plot
    /// rows.
    pub async fn all_volcano_plot_data(
        &self,
        analysis_id: &str,
        include_box_plot: bool,
    ) -> Result<HashMap<String, GroupAnalysisPlots>> {
        let group_analyses = self
            .group_analyses(GroupAnalysisQuery::new(analysis_id))
            .await?;

        let mut results = HashMap::new();
        for group_analysis in group_analyses {
            let Some(id) = group_analysis.id else {
                continue;
            };
            let builder = self
                .volcano_plot_builder(analysis_id, Some(&id), VolcanoPlotSettings::default())
                .await?;
            let box_plot = if include_box_plot {
                Some(
                    self.box_plot_rows(analysis_id, Some(&id), &[], false, &builder)
                        .await?,
                )
            } else {
                None
            };
            results.insert(
                id,
                GroupAnalysisPlots {
                    volcano_plot: builder.points().to_vec(),
                    box_plot,
                },
            );
        }
        Ok(results)
    }

    /// Per-sample intensities for box plots, with `condition` joined in
    /// from the analysis samples and `gene` from the volcano gene map.
    pub async fn box_plot_data(
        &self,
        analysis_id: &str,
        group_analysis_id: Option<&str>,
        feature_ids: &[String],
        show_significant_only: bool,
    ) -> Result<Vec<BoxPlotRow>> {
        let builder = self
            .volcano_plot_builder(analysis_id, group_analysis_id, VolcanoPlotSettings::default())
            .await?;
        self.box_plot_rows(
            analysis_id,
            group_analysis_id,
            feature_ids,
            show_significant_only,
            &builder,
        )
        .await
    }

    async fn box_plot_rows(
        &self,
        analysis_id: &str,
        group_analysis_id: Option<&str>,
        feature_ids: &[String],
        show_significant_only: bool,
        builder: &VolcanoPlotBuilder,
    ) -> Result<Vec<BoxPlotRow>> {
        let analysis_ids = [analysis_id.to_string()];
        let samples = self.analysis_samples(&analysis_ids).await?;
        let conditions: HashMap<String, Option<String>> = samples
            .into_iter()
            .map(|sample| (sample.id, sample.condition))
            .collect();

        let mut payload = serde_json::json!({
            "analysisId": analysis_id,
            "featureType": match builder.kind() {
                FeatureKind::Peptide => "peptide",
                FeatureKind::Protein => "proteingroup",
            },
        });
        if !feature_ids.is_empty() {
            payload["featureIds"] = Value::from(feature_ids.join(","));
        }
        // The saved run's filters scope the raw intensities the same way
        // the saved statistics were scoped.
        if let Some(id) = group_analysis_id {
            let group_analysis = self
                .group_analyses(GroupAnalysisQuery::new(analysis_id).group_analysis(id))
                .await?;
            let filters = group_analysis
                .first()
                .and_then(|ga| ga.parameters.as_ref())
                .and_then(|p| p.filters.clone());
            if let Some(filters) = filters {
                if !filters.is_null() {
                    payload["filters"] = filters;
                }
            }
        }

        let mut rows: Vec<BoxPlotRow> = self
            .post_json("get_box_plot_data", "api/v1/groupanalysis/rawdata", &payload)
            .await?;

        let gene_map = builder.gene_map();
        rows.retain(|row| {
            feature_key(row, builder.kind())
                .map(|key| gene_map.contains_key(key))
                .unwrap_or(false)
        });
        if show_significant_only {
            let significant: std::collections::HashSet<String> =
                builder.significant_rows().into_iter().collect();
            rows.retain(|row| {
                feature_key(row, builder.kind())
                    .map(|key| significant.contains(key))
                    .unwrap_or(false)
            });
        }

        for row in &mut rows {
            row.condition = row
                .sample_id
                .as_ref()
                .and_then(|id| conditions.get(id).cloned())
                .flatten();
            row.gene = feature_key(row, builder.kind())
                .and_then(|key| gene_map.get(key).cloned())
                .flatten();
        }
        Ok(rows)
    }

    /// Principal component analysis over one or more analyses, joined
    /// per sample. Custom sample columns with no data are dropped.
    pub async fn analysis_pca(
        &self,
        analysis_ids: &[String],
        analyte_type: FeatureKind,
        sample_ids: &[String],
        hide_control: bool,
    ) -> Result<PcaData> {
        if analysis_ids.is_empty() {
            return Err(Error::InvalidInput("analysis ids cannot be empty".into()));
        }

        let mut payload = serde_json::json!({
            "analysisIds": analysis_ids.join(","),
            "type": analyte_type.as_str(),
            // The backend only understands string booleans here.
            "hideControl": if hide_control { "true" } else { "false" },
        });
        if !sample_ids.is_empty() {
            payload["sampleIds"] = Value::from(sample_ids.join(","));
        }

        let response: PcaResponse = self
            .post_json("get_analysis_pca_data", "api/v1/analysisqcpca", &payload)
            .await?;

        let mut data: Vec<Extra> = Vec::with_capacity(response.samples.len());
        for (sample, point) in response.samples.into_iter().zip(response.points) {
            let mut row = sample;
            if let (Some(x), Some(y)) = (point.first(), point.get(1)) {
                row.insert("PC1".into(), Value::from(*x));
                row.insert("PC2".into(), Value::from(*y));
            }
            data.push(row);
        }
        filter_pca_columns(&mut data);

        Ok(PcaData {
            x_contribution_ratio: response.x_contribution_ratio,
            y_contribution_ratio: response.y_contribution_ratio,
            data,
        })
    }

    /// Hierarchical clustering over one or more analyses.
    pub async fn hierarchical_clustering(
        &self,
        analysis_ids: &[String],
        sample_ids: &[String],
        hide_control: bool,
    ) -> Result<HierarchicalClustering> {
        if analysis_ids.is_empty() {
            return Err(Error::InvalidInput("analysis ids cannot be empty".into()));
        }

        let mut payload = serde_json::json!({
            "analysisIds": analysis_ids.join(","),
            "hideControl": if hide_control { "true" } else { "false" },
        });
        if !sample_ids.is_empty() {
            payload["sampleIds"] = Value::from(sample_ids.join(","));
        }

        let response: Value = self
            .post_json(
                "get_analysis_hierarchical_clustering",
                "api/v1/analysishcluster",
                &payload,
            )
            .await?;
        if response.get("samples").is_none() {
            return Err(Error::UnexpectedResponse(
                "no sample data returned from server".into(),
            ));
        }
        Ok(serde_json::from_value(response)?)
    }

    /// Protein-protein interaction network for the given significant
    /// protein groups, backed by StringDB.
    pub async fn ppi_network(
        &self,
        significant_pgs: &[String],
        species: Option<&str>,
    ) -> Result<Value> {
        if significant_pgs.is_empty() {
            return Err(Error::InvalidInput(
                "significant protein groups cannot be empty".into(),
            ));
        }

        let mut payload = serde_json::json!({
            "significantPGs": significant_pgs.join(","),
        });
        if let Some(species) = species {
            payload["species"] = Value::from(species);
        }
        self.post_json(
            "get_ppi_network_data",
            "api/v1/groupanalysis/stringdb",
            &payload,
        )
        .await
    }

    /// Cluster heatmap over user-defined sample groups. Each contrast
    /// assigns every group a weight of -1, 0, or 1.
    #[allow(clippy::too_many_arguments)]
    pub async fn cluster_heatmap(
        &self,
        analysis_id: &str,
        grouping: &str,
        groups: &[String],
        contrasts: &[Vec<i32>],
        stat_test: StatTest,
        feature_type: FeatureKind,
        significant_pgs: &[String],
    ) -> Result<Value> {
        for contrast in contrasts {
            validate_contrast(contrast, groups.len())?;
        }
        let formatted_contrasts = contrasts
            .iter()
            .map(|contrast| {
                contrast
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(",")
            })
            .collect::<Vec<_>>()
            .join(";");

        self.post_json(
            "get_cluster_heatmap_data",
            "api/v2/clusterheatmap",
            &serde_json::json!({
                "analysisId": analysis_id,
                "grouping": grouping,
                "groups": groups.join(","),
                "contrasts": formatted_contrasts,
                "statTest": stat_test.as_str(),
                "featureType": match feature_type {
                    FeatureKind::Protein => "proteingroup",
                    FeatureKind::Peptide => "peptide",
                },
                "significantPGs": significant_pgs.join(","),
            }),
        )
        .await
    }

    /// Gene-ontology enrichment over the given significant protein
    /// groups.
    pub async fn enrichment(
        &self,
        analysis_id: &str,
        significant_pgs: &[String],
        summarize_output: bool,
        exclude_singleton: bool,
        cutoff: Option<f64>,
        species: Option<&str>,
    ) -> Result<Value> {
        if significant_pgs.is_empty() {
            return Err(Error::InvalidInput(
                "significant protein groups cannot be empty".into(),
            ));
        }

        let mut payload = serde_json::json!({
            "analysisId": analysis_id,
            "significantPGs": significant_pgs,
            "summarizeOutput": summarize_output,
            "excludeSingleton": exclude_singleton,
        });
        if let Some(cutoff) = cutoff {
            payload["cutoff"] = Value::from(cutoff);
        }
        if let Some(species) = species {
            payload["species"] = Value::from(species);
        }
        self.post_json(
            "get_enrichment_plot",
            "api/v1/groupanalysis/enrichmentgo",
            &payload,
        )
        .await
    }
}

fn feature_key(row: &BoxPlotRow, kind: FeatureKind) -> Option<&str> {
    match kind {
        FeatureKind::Protein => row.protein_id.as_deref(),
        FeatureKind::Peptide => row.peptide.as_deref(),
    }
}

fn feature_stats(saved: &Value, key: &str) -> Result<Option<FeatureStats>> {
    match saved.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) if value.as_object().is_some_and(|o| o.is_empty()) => Ok(None),
        Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
    }
}

fn url_field(saved: &Value, key: &str) -> String {
    saved
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Keeps the generic PCA columns plus any custom sample column that
/// holds at least one value across the rows.
fn filter_pca_columns(rows: &mut [Extra]) {
    const GENERIC: [&str; 6] = [
        "sample_name",
        "plate_name",
        "sample_id",
        "condition",
        "PC1",
        "PC2",
    ];

    let mut meaningful: std::collections::HashSet<String> = std::collections::HashSet::new();
    for row in rows.iter() {
        for (key, value) in row.iter() {
            if key.starts_with("custom_") && !value.is_null() {
                meaningful.insert(key.clone());
            }
        }
    }

    for row in rows.iter_mut() {
        row.retain(|key, _| GENERIC.contains(&key.as_str()) || meaningful.contains(key));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pca_columns_drop_empty_custom_fields() {
        let mut rows: Vec<Extra> = vec![
            serde_json::from_value(serde_json::json!({
                "sample_name": "s1",
                "plate_name": "p1",
                "sample_id": "id1",
                "condition": "healthy",
                "PC1": 0.1,
                "PC2": 0.2,
                "custom_age": 42,
                "custom_empty": null,
                "internal_flag": true,
            }))
            .unwrap(),
            serde_json::from_value(serde_json::json!({
                "sample_name": "s2",
                "custom_age": null,
                "custom_empty": null,
            }))
            .unwrap(),
        ];
        filter_pca_columns(&mut rows);

        assert!(rows[0].contains_key("custom_age"));
        assert!(!rows[0].contains_key("custom_empty"));
        assert!(!rows[0].contains_key("internal_flag"));
        assert!(rows[0].contains_key("PC1"));
        // The column survives in every row once any row holds a value.
        assert!(rows[1].contains_key("custom_age"));
    }

    #[test]
    fn saved_results_may_omit_a_feature_kind() {
        let saved = serde_json::json!({
            "pgResult": {
                "totalFeature": 2,
                "mergedStats": [],
            },
            "peptideResult": {},
            "pgProcessedFileUrl": "https://example.org/pg.csv",
        });
        assert!(feature_stats(&saved, "pgResult").unwrap().is_some());
        assert!(feature_stats(&saved, "peptideResult").unwrap().is_none());
        assert!(feature_stats(&saved, "missing").unwrap().is_none());
        assert_eq!(
            url_field(&saved, "pgProcessedFileUrl"),
            "https://example.org/pg.csv"
        );
        assert_eq!(url_field(&saved, "peptideProcessedFileUrl"), "");
    }

    #[test]
    fn stat_tests_use_backend_names() {
        assert_eq!(StatTest::TTest.as_str(), "ttest");
        assert_eq!(StatTest::Wilcoxon.as_str(), "wilcoxon");
    }
}
