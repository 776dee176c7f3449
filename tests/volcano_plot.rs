use seer_pas_sdk::model::{FeatureStats, GroupAnalysisResults};
use seer_pas_sdk::{LabelBy, VolcanoPlotBuilder, VolcanoPlotSettings};

fn saved_protein_results() -> GroupAnalysisResults {
    let stats: FeatureStats = serde_json::from_value(serde_json::json!({
        "totalFeature": 3,
        "mergedStats": [
            {
                "logFD": 2.4,
                "negativeLog10P": 3.1,
                "gene": "ALB",
                "pg": "P02768",
                "contrastGroup": {"G1": "disease", "G2": "healthy"}
            },
            {
                "logFD": -1.8,
                "negativeLog10P": 5.0,
                "gene": "APOA1",
                "pg": "P02647",
                "contrastGroup": {"G1": "disease", "G2": "healthy"}
            },
            {
                "logFD": 0.3,
                "negativeLog10P": 0.4,
                "gene": null,
                "pg": "Q12345",
                "contrastGroup": {"G1": "disease", "G2": "healthy"}
            }
        ],
        "parameters": {"statTest": "ttest"}
    }))
    .unwrap();

    GroupAnalysisResults {
        protein: Some(stats),
        ..GroupAnalysisResults::default()
    }
}

#[test]
fn builds_points_from_saved_results() {
    let builder =
        VolcanoPlotBuilder::new(&saved_protein_results(), VolcanoPlotSettings::default()).unwrap();

    assert_eq!(builder.points().len(), 3);
    assert_eq!(builder.stat_test(), Some("ttest"));

    let up = builder
        .points()
        .iter()
        .find(|p| p.feature_id == "P02768")
        .unwrap();
    assert_eq!(up.significant, 1);
    assert_eq!(up.group.as_deref(), Some("disease/healthy"));
    assert_eq!(up.gene.as_deref(), Some("ALB"));

    let mut significant = builder.significant_rows();
    significant.sort();
    assert_eq!(significant, vec!["P02647", "P02768"]);
}

#[test]
fn gene_map_covers_every_feature() {
    let builder =
        VolcanoPlotBuilder::new(&saved_protein_results(), VolcanoPlotSettings::default()).unwrap();
    let gene_map = builder.gene_map();
    assert_eq!(gene_map.len(), 3);
    assert_eq!(gene_map["P02768"].as_deref(), Some("ALB"));
    assert_eq!(gene_map["Q12345"], None);
}

#[test]
fn relabelling_changes_the_sort_order() {
    let mut builder =
        VolcanoPlotBuilder::new(&saved_protein_results(), VolcanoPlotSettings::default()).unwrap();
    // Default sort is by absolute fold change.
    assert_eq!(builder.points()[0].feature_id, "P02768");

    builder
        .update(None, None, Some(LabelBy::Significance))
        .unwrap();
    assert_eq!(builder.points()[0].feature_id, "P02647");
    assert_eq!(builder.points()[1].feature_id, "P02768");
}

#[test]
fn serialized_points_use_the_wire_names() {
    let builder =
        VolcanoPlotBuilder::new(&saved_protein_results(), VolcanoPlotSettings::default()).unwrap();
    let json = serde_json::to_value(&builder.points()[0]).unwrap();
    assert!(json.get("logFD").is_some());
    assert!(json.get("negativeLog10P").is_some());
    assert!(json.get("euclideanDistance").is_some());
    assert!(json.get("rowID").is_some());
}
