//! Wire models for the PAS REST API.
//!
//! Responses carry many tenant- and UI-specific columns beyond what the
//! SDK needs, so each model types the fields the SDK reads and keeps the
//! remainder in a flattened `extra` map. `tenant_id` is removed from
//! `extra` before models are handed to callers.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub type Extra = Map<String, Value>;

/// List responses wrap their rows in a `data` field.
#[derive(Debug, Deserialize)]
pub struct Paged<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

fn truthy<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    // The backend is inconsistent about booleans; folders arrive as
    // true/false, 0/1, or "0"/"1" depending on the endpoint version.
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !(s.is_empty() || s == "0" || s == "false"),
        _ => false,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plate {
    pub id: String,
    #[serde(default)]
    pub plate_id: Option<String>,
    #[serde(default)]
    pub plate_name: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub raw_file_path: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Sample {
    pub id: String,
    #[serde(default)]
    pub plate_id: Option<String>,
    #[serde(default)]
    pub sample_id: Option<String>,
    #[serde(default)]
    pub sample_name: Option<String>,
    #[serde(default)]
    pub control: Option<String>,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// A tenant-defined custom sample column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleField {
    #[serde(default)]
    pub field_name: String,
    #[serde(flatten)]
    pub extra: Extra,
}

/// One MS run row as stored in the msdata index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MsRun {
    pub id: String,
    #[serde(default)]
    pub raw_file_path: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisProtocol {
    pub id: String,
    #[serde(default)]
    pub analysis_protocol_name: Option<String>,
    #[serde(default)]
    pub analysis_engine: Option<String>,
    #[serde(default)]
    pub parameter_file_path: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "truthy")]
    pub is_folder: bool,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub analysis_protocol_id: Option<String>,
    #[serde(default)]
    pub parameter_file_path: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Single-analysis lookups wrap the row in an `analysis` field.
#[derive(Debug, Deserialize)]
pub struct AnalysisEnvelope {
    pub analysis: Analysis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantMembership {
    #[serde(rename = "tenantId")]
    pub tenant_id: String,
    pub institution: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// A user group ("space") files and entities can be scoped to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Space {
    pub id: String,
    #[serde(default)]
    pub usergroup_name: String,
    #[serde(flatten)]
    pub extra: Extra,
}

/// S3 destination the backend assigns for a plate upload.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    #[serde(rename = "s3Bucket")]
    pub s3_bucket: String,
    #[serde(rename = "s3UploadPath")]
    pub s3_upload_path: String,
}

#[derive(Debug, Deserialize)]
pub struct AwsCredentialEnvelope {
    pub credentials: AwsSessionCredentials,
}

/// Short-lived credentials issued by `auth/getawscredential` for direct
/// uploads to the tenant bucket.
#[derive(Debug, Clone, Deserialize)]
pub struct AwsSessionCredentials {
    #[serde(rename = "AccessKeyId")]
    pub access_key_id: String,
    #[serde(rename = "SecretAccessKey")]
    pub secret_access_key: String,
    #[serde(rename = "SessionToken")]
    pub session_token: String,
    #[serde(rename = "S3Bucket", default)]
    pub s3_bucket: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisResultFile {
    pub filename: String,
    #[serde(flatten)]
    pub extra: Extra,
}

/// A signed download URL for one result file.
#[derive(Debug, Clone, Deserialize)]
pub struct SignedUrl {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FilesInFolder {
    #[serde(rename = "filesList", default)]
    pub files_list: Vec<String>,
}

/// Metadata row from the msdata index, used to resolve display paths to
/// cloud paths and to discover which space a file lives in.
#[derive(Debug, Clone, Deserialize)]
pub struct MsDataIndexEntry {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(rename = "rawFilePath", default)]
    pub raw_file_path: Option<String>,
    #[serde(rename = "userGroupId", default)]
    pub user_group_id: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Deserialize)]
pub struct MsDataIndexMetadata {
    #[serde(default)]
    pub files: Vec<MsDataIndexEntry>,
    #[serde(default)]
    pub data: Vec<MsDataIndexEntry>,
}

/// File registration payload for `api/v1/msdataindex/file`.
#[derive(Debug, Clone, Serialize)]
pub struct FileRegistration {
    #[serde(rename = "filePath")]
    pub file_path: String,
    #[serde(rename = "fileSize")]
    pub file_size: u64,
    #[serde(rename = "userGroupId")]
    pub user_group_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisteredFile {
    #[serde(rename = "filePath")]
    pub file_path: String,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Deserialize)]
pub struct RegisterFilesResponse {
    #[serde(default)]
    pub created: Option<Value>,
    #[serde(default)]
    pub files: Vec<RegisteredFile>,
}

#[derive(Debug, Deserialize)]
pub struct Created {
    pub id: String,
}

/// Raw PCA response; `y_contribution_ratio` is absent when the query
/// matched zero points.
#[derive(Debug, Deserialize)]
pub struct PcaResponse {
    #[serde(rename = "xContributionRatio")]
    pub x_contribution_ratio: f64,
    #[serde(rename = "yContributionRatio", default)]
    pub y_contribution_ratio: Option<f64>,
    #[serde(default)]
    pub samples: Vec<Extra>,
    #[serde(default)]
    pub points: Vec<Vec<f64>>,
}

/// PCA data joined per sample, with custom columns filtered down to the
/// meaningful ones.
#[derive(Debug, Serialize)]
pub struct PcaData {
    pub x_contribution_ratio: f64,
    pub y_contribution_ratio: Option<f64>,
    pub data: Vec<Extra>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupAnalysis {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub parameters: Option<GroupAnalysisParameters>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupAnalysisParameters {
    #[serde(default)]
    pub filters: Option<Value>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// One row of merged differential statistics from a saved group
/// analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergedStat {
    #[serde(rename = "logFD")]
    pub log_fd: f64,
    #[serde(rename = "negativeLog10P")]
    pub negative_log10_p: f64,
    #[serde(default)]
    pub gene: Option<String>,
    #[serde(default)]
    pub pg: Option<String>,
    #[serde(default)]
    pub peptide: Option<String>,
    #[serde(
        rename = "contrastGroup",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub contrast_group: Option<RawContrastGroup>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Contrast group labels kept serializable so a row can be round-tripped
/// into its `row_id` JSON form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawContrastGroup {
    #[serde(rename = "G1", default)]
    pub g1: Option<String>,
    #[serde(rename = "G2", default)]
    pub g2: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatParameters {
    #[serde(rename = "statTest", default)]
    pub stat_test: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Saved post-analysis statistics for one feature kind.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeatureStats {
    #[serde(rename = "totalFeature", default)]
    pub total_feature: u64,
    #[serde(rename = "mergedStats", default)]
    pub merged_stats: Vec<MergedStat>,
    #[serde(default)]
    pub parameters: Option<StatParameters>,
}

/// Processed-file URLs attached to saved group analysis results.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessedFileUrls {
    pub processed_file_url: String,
    pub processed_long_form_file_url: String,
}

/// Combined pre and post data for a group analysis, as assembled by
/// `SeerClient::group_analysis_results`.
#[derive(Debug, Default)]
pub struct GroupAnalysisResults {
    pub pre_protein: Value,
    pub pre_peptide: Value,
    pub protein: Option<FeatureStats>,
    pub peptide: Option<FeatureStats>,
    pub protein_urls: ProcessedFileUrls,
    pub peptide_urls: ProcessedFileUrls,
}

/// One intensity row for box plots; `condition` and `gene` are joined in
/// client-side from the analysis samples and the volcano gene map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoxPlotRow {
    #[serde(rename = "proteinId", default)]
    pub protein_id: Option<String>,
    #[serde(default)]
    pub peptide: Option<String>,
    #[serde(default)]
    pub intensity: Option<f64>,
    #[serde(rename = "sampleName", default)]
    pub sample_name: Option<String>,
    #[serde(rename = "sampleId", default)]
    pub sample_id: Option<String>,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub gene: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Deserialize)]
pub struct HierarchicalClustering {
    pub samples: Vec<Extra>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthy_folder_flags() {
        let analysis: Analysis =
            serde_json::from_value(serde_json::json!({"id": "a", "is_folder": 1})).unwrap();
        assert!(analysis.is_folder);

        let analysis: Analysis =
            serde_json::from_value(serde_json::json!({"id": "a", "is_folder": false})).unwrap();
        assert!(!analysis.is_folder);

        let analysis: Analysis = serde_json::from_value(serde_json::json!({"id": "a"})).unwrap();
        assert!(!analysis.is_folder);
    }

    #[test]
    fn extra_fields_are_kept() {
        let plate: Plate = serde_json::from_value(serde_json::json!({
            "id": "uuid-1",
            "plate_id": "P1",
            "tenant_id": "t-1",
            "user_group": null,
        }))
        .unwrap();
        assert_eq!(plate.extra.get("tenant_id"), Some(&Value::from("t-1")));
    }
}
