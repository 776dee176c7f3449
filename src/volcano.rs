//! Volcano plot derivation from saved group-analysis statistics.
//!
//! The builder keeps the parsed statistics around so the same saved
//! results can be replotted under different thresholds without another
//! round trip to the backend.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::model::{GroupAnalysisResults, MergedStat};

/// Metric the plot rows are sorted by, descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LabelBy {
    Euclidean,
    #[default]
    FoldChange,
    Significance,
}

/// Thresholds and sort metric for one rendering of the plot.
#[derive(Debug, Clone, Copy)]
pub struct VolcanoPlotSettings {
    /// P-value below which a point counts as significant.
    pub significance_threshold: f64,
    /// Minimum absolute log fold change for significance.
    pub fold_change_threshold: f64,
    pub label_by: LabelBy,
}

impl Default for VolcanoPlotSettings {
    fn default() -> Self {
        VolcanoPlotSettings {
            significance_threshold: 0.05,
            fold_change_threshold: 1.0,
            label_by: LabelBy::FoldChange,
        }
    }
}

/// Which feature kind the saved results carried statistics for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureKind {
    Protein,
    Peptide,
}

impl FeatureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FeatureKind::Protein => "protein",
            FeatureKind::Peptide => "peptide",
        }
    }
}

/// One plotted point. `row_id` carries the source row as JSON so a point
/// can be traced back to its statistics.
#[derive(Debug, Clone, Serialize)]
pub struct VolcanoPoint {
    #[serde(rename = "logFD")]
    pub log_fd: f64,
    #[serde(rename = "negativeLog10P")]
    pub negative_log10_p: f64,
    #[serde(rename = "dataIndex")]
    pub data_index: usize,
    #[serde(rename = "rowID")]
    pub row_id: String,
    pub gene: Option<String>,
    /// "G1/G2" contrast label when both group names are present.
    pub group: Option<String>,
    /// 0 when not significant, otherwise the sign of the fold change.
    pub significant: i8,
    #[serde(rename = "euclideanDistance")]
    pub euclidean_distance: f64,
    #[serde(rename = "featureId")]
    pub feature_id: String,
}

/// Builds volcano plots from one set of saved group-analysis results.
#[derive(Debug)]
pub struct VolcanoPlotBuilder {
    settings: VolcanoPlotSettings,
    kind: FeatureKind,
    stat_test: Option<String>,
    data: Vec<MergedStat>,
    minus_log10_p_sig: f64,
    max_log_fd: f64,
    max_negative_log10_p: f64,
    gene_map: HashMap<String, Option<String>>,
    points: Vec<VolcanoPoint>,
}

impl VolcanoPlotBuilder {
    /// Picks the protein statistics when any protein features exist,
    /// falling back to peptides. Results without features cannot be
    /// plotted.
    pub fn new(results: &GroupAnalysisResults, settings: VolcanoPlotSettings) -> Result<Self> {
        let (kind, stats) = match (&results.protein, &results.peptide) {
            (Some(protein), _) if protein.total_feature > 0 => (FeatureKind::Protein, protein),
            (_, Some(peptide)) if peptide.total_feature > 0 => (FeatureKind::Peptide, peptide),
            _ => {
                return Err(Error::UnexpectedResponse(
                    "no features found in saved group analysis results".into(),
                ))
            }
        };

        let data = stats.merged_stats.clone();
        let (max_log_fd, max_negative_log10_p) = max_values(&data);

        let mut builder = VolcanoPlotBuilder {
            settings,
            kind,
            stat_test: stats
                .parameters
                .as_ref()
                .and_then(|p| p.stat_test.clone()),
            data,
            minus_log10_p_sig: -settings.significance_threshold.log10(),
            max_log_fd,
            max_negative_log10_p,
            gene_map: HashMap::new(),
            points: Vec::new(),
        };
        builder.points = builder.build()?;
        Ok(builder)
    }

    pub fn kind(&self) -> FeatureKind {
        self.kind
    }

    pub fn settings(&self) -> VolcanoPlotSettings {
        self.settings
    }

    /// Statistical test the backend used for the saved results.
    pub fn stat_test(&self) -> Option<&str> {
        self.stat_test.as_deref()
    }

    /// The plotted points, sorted descending by the configured metric.
    pub fn points(&self) -> &[VolcanoPoint] {
        &self.points
    }

    /// Feature id to gene symbol, for joining genes into other views.
    pub fn gene_map(&self) -> &HashMap<String, Option<String>> {
        &self.gene_map
    }

    /// Feature ids of every significant point.
    pub fn significant_rows(&self) -> Vec<String> {
        self.points
            .iter()
            .filter(|p| p.significant != 0)
            .map(|p| p.feature_id.clone())
            .collect()
    }

    /// Replaces any supplied settings and rebuilds the points.
    pub fn update(
        &mut self,
        significance_threshold: Option<f64>,
        fold_change_threshold: Option<f64>,
        label_by: Option<LabelBy>,
    ) -> Result<()> {
        if let Some(value) = significance_threshold {
            self.settings.significance_threshold = value;
        }
        if let Some(value) = fold_change_threshold {
            self.settings.fold_change_threshold = value;
        }
        if let Some(value) = label_by {
            self.settings.label_by = value;
        }
        self.minus_log10_p_sig = -self.settings.significance_threshold.log10();
        self.points = self.build()?;
        Ok(())
    }

    fn build(&mut self) -> Result<Vec<VolcanoPoint>> {
        let mut points = Vec::with_capacity(self.data.len());
        for i in 0..self.data.len() {
            points.push(self.build_point(i)?);
        }
        let key = |p: &VolcanoPoint| match self.settings.label_by {
            LabelBy::Euclidean => p.euclidean_distance,
            LabelBy::FoldChange => p.log_fd.abs(),
            LabelBy::Significance => p.negative_log10_p,
        };
        points.sort_by(|a, b| key(b).total_cmp(&key(a)));
        Ok(points)
    }

    fn build_point(&mut self, index: usize) -> Result<VolcanoPoint> {
        let row = &self.data[index];
        let feature_id = self.feature_id(row);
        self.gene_map.insert(feature_id.clone(), row.gene.clone());

        Ok(VolcanoPoint {
            log_fd: row.log_fd,
            negative_log10_p: row.negative_log10_p,
            data_index: index,
            row_id: serde_json::to_string(row)?,
            gene: row.gene.clone(),
            group: contrast_group_label(row),
            significant: self.significance_class(row),
            euclidean_distance: euclidean_distance(
                row.log_fd / self.max_log_fd,
                row.negative_log10_p / self.max_negative_log10_p,
            ),
            feature_id,
        })
    }

    fn feature_id(&self, row: &MergedStat) -> String {
        let id = match self.kind {
            FeatureKind::Protein => row.pg.as_deref(),
            FeatureKind::Peptide => row.peptide.as_deref(),
        };
        id.unwrap_or_default().to_string()
    }

    fn is_significant(&self, row: &MergedStat) -> bool {
        row.negative_log10_p >= self.minus_log10_p_sig
            && row.log_fd.abs() >= self.settings.fold_change_threshold
    }

    fn significance_class(&self, row: &MergedStat) -> i8 {
        if !self.is_significant(row) {
            0
        } else if row.log_fd >= 1.0 {
            1
        } else if row.log_fd <= -1.0 {
            -1
        } else {
            0
        }
    }
}

fn contrast_group_label(row: &MergedStat) -> Option<String> {
    let group = row.contrast_group.as_ref()?;
    match (group.g1.as_deref(), group.g2.as_deref()) {
        (Some(g1), Some(g2)) if !g1.is_empty() && !g2.is_empty() => Some(format!("{g1}/{g2}")),
        _ => None,
    }
}

fn euclidean_distance(x: f64, y: f64) -> f64 {
    (x * x + y * y).sqrt()
}

fn max_values(data: &[MergedStat]) -> (f64, f64) {
    let mut max_log_fd = f64::NEG_INFINITY;
    let mut max_negative_log10_p = f64::NEG_INFINITY;
    for row in data {
        max_log_fd = max_log_fd.max(row.log_fd);
        max_negative_log10_p = max_negative_log10_p.max(row.negative_log10_p);
    }
    (max_log_fd, max_negative_log10_p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FeatureStats, RawContrastGroup};

    fn stat(pg: &str, log_fd: f64, negative_log10_p: f64) -> MergedStat {
        MergedStat {
            log_fd,
            negative_log10_p,
            gene: Some(format!("GENE-{pg}")),
            pg: Some(pg.to_string()),
            peptide: None,
            contrast_group: Some(RawContrastGroup {
                g1: Some("treated".into()),
                g2: Some("control".into()),
            }),
            extra: Default::default(),
        }
    }

    fn results(stats: Vec<MergedStat>) -> GroupAnalysisResults {
        GroupAnalysisResults {
            protein: Some(FeatureStats {
                total_feature: stats.len() as u64,
                merged_stats: stats,
                parameters: None,
            }),
            ..GroupAnalysisResults::default()
        }
    }

    #[test]
    fn no_features_is_an_error() {
        let empty = GroupAnalysisResults::default();
        assert!(VolcanoPlotBuilder::new(&empty, VolcanoPlotSettings::default()).is_err());
    }

    #[test]
    fn falls_back_to_peptides_when_no_proteins() {
        let mut peptide = stat("unused", 2.0, 3.0);
        peptide.pg = None;
        peptide.peptide = Some("PEPTIDESEQ".into());
        let results = GroupAnalysisResults {
            peptide: Some(FeatureStats {
                total_feature: 1,
                merged_stats: vec![peptide],
                parameters: None,
            }),
            ..GroupAnalysisResults::default()
        };

        let builder = VolcanoPlotBuilder::new(&results, VolcanoPlotSettings::default()).unwrap();
        assert_eq!(builder.kind(), FeatureKind::Peptide);
        assert_eq!(builder.points()[0].feature_id, "PEPTIDESEQ");
    }

    #[test]
    fn classifies_significance_by_both_thresholds() {
        // p = 0.05 maps to negativeLog10P just above 1.3.
        let results = results(vec![
            stat("up", 2.5, 4.0),
            stat("down", -1.5, 2.0),
            stat("weak-p", 3.0, 0.5),
            stat("weak-fd", 0.2, 5.0),
        ]);
        let builder = VolcanoPlotBuilder::new(&results, VolcanoPlotSettings::default()).unwrap();

        let by_id: HashMap<&str, i8> = builder
            .points()
            .iter()
            .map(|p| (p.feature_id.as_str(), p.significant))
            .collect();
        assert_eq!(by_id["up"], 1);
        assert_eq!(by_id["down"], -1);
        assert_eq!(by_id["weak-p"], 0);
        assert_eq!(by_id["weak-fd"], 0);

        let mut significant = builder.significant_rows();
        significant.sort();
        assert_eq!(significant, vec!["down", "up"]);
    }

    #[test]
    fn sorts_descending_by_absolute_fold_change() {
        let results = results(vec![
            stat("small", 0.5, 1.0),
            stat("negative", -3.0, 1.0),
            stat("positive", 2.0, 1.0),
        ]);
        let builder = VolcanoPlotBuilder::new(&results, VolcanoPlotSettings::default()).unwrap();
        let order: Vec<&str> = builder
            .points()
            .iter()
            .map(|p| p.feature_id.as_str())
            .collect();
        assert_eq!(order, vec!["negative", "positive", "small"]);
    }

    #[test]
    fn update_rebuilds_with_new_thresholds() {
        let results = results(vec![stat("borderline", 1.2, 1.5)]);
        let mut builder =
            VolcanoPlotBuilder::new(&results, VolcanoPlotSettings::default()).unwrap();
        assert_eq!(builder.points()[0].significant, 1);

        builder.update(Some(0.001), None, Some(LabelBy::Significance)).unwrap();
        assert_eq!(builder.points()[0].significant, 0);
        assert_eq!(builder.settings().significance_threshold, 0.001);
    }

    #[test]
    fn contrast_group_label_requires_both_names() {
        let mut row = stat("pg-1", 1.0, 1.0);
        assert_eq!(contrast_group_label(&row).as_deref(), Some("treated/control"));

        row.contrast_group = Some(RawContrastGroup {
            g1: Some("treated".into()),
            g2: None,
        });
        assert!(contrast_group_label(&row).is_none());

        row.contrast_group = None;
        assert!(contrast_group_label(&row).is_none());
    }

    #[test]
    fn row_id_round_trips_the_source_row() {
        let results = results(vec![stat("pg-9", 1.0, 2.0)]);
        let builder = VolcanoPlotBuilder::new(&results, VolcanoPlotSettings::default()).unwrap();
        let parsed: MergedStat = serde_json::from_str(&builder.points()[0].row_id).unwrap();
        assert_eq!(parsed.pg.as_deref(), Some("pg-9"));
        assert_eq!(parsed.log_fd, 1.0);
    }
}
