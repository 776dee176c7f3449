//! Analysis operations: listing, starting, and pulling search results.

use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use super::samples::SampleFilter;
use super::SeerClient;
use crate::common::trim_raw_file_path;
use crate::error::{Error, Result};
use crate::model::{
    Analysis, AnalysisEnvelope, AnalysisProtocol, AnalysisResultFile, Paged, Sample, SignedUrl,
};
use crate::table::{fetch_table, Table};
use crate::transfer::download_to_file;

/// Search over a single analysis field. A folder-name search runs
/// against the backend's analysis-name index, which covers folders too.
#[derive(Debug, Clone)]
pub enum AnalysisSearch {
    AnalysisName(String),
    FolderName(String),
    AnalysisProtocolName(String),
    Description(String),
    Notes(String),
    NumberMsDataFile(String),
}

impl AnalysisSearch {
    fn field(&self) -> &'static str {
        match self {
            AnalysisSearch::AnalysisName(_) | AnalysisSearch::FolderName(_) => "analysis_name",
            AnalysisSearch::AnalysisProtocolName(_) => "analysis_protocol_name",
            AnalysisSearch::Description(_) => "description",
            AnalysisSearch::Notes(_) => "notes",
            AnalysisSearch::NumberMsDataFile(_) => "number_msdatafile",
        }
    }

    fn item(&self) -> &str {
        match self {
            AnalysisSearch::AnalysisName(item)
            | AnalysisSearch::FolderName(item)
            | AnalysisSearch::AnalysisProtocolName(item)
            | AnalysisSearch::Description(item)
            | AnalysisSearch::Notes(item)
            | AnalysisSearch::NumberMsDataFile(item) => item,
        }
    }
}

/// Query for [`SeerClient::analyses`]. The default lists every analysis,
/// descending into folders and returning analysis objects only.
#[derive(Debug, Clone)]
pub struct AnalysisQuery {
    analysis_id: Option<String>,
    folder_id: Option<String>,
    show_folders: bool,
    analysis_only: bool,
    project_id: Option<String>,
    plate_name: Option<String>,
    search: Option<AnalysisSearch>,
}

impl Default for AnalysisQuery {
    fn default() -> Self {
        AnalysisQuery {
            analysis_id: None,
            folder_id: None,
            show_folders: true,
            analysis_only: true,
            project_id: None,
            plate_name: None,
            search: None,
        }
    }
}

impl AnalysisQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, analysis_id: impl Into<String>) -> Self {
        self.analysis_id = Some(analysis_id.into());
        self
    }

    pub fn folder(mut self, folder_id: impl Into<String>) -> Self {
        self.folder_id = Some(folder_id.into());
        self
    }

    pub fn project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn plate_name(mut self, plate_name: impl Into<String>) -> Self {
        self.plate_name = Some(plate_name.into());
        self
    }

    pub fn search(mut self, search: AnalysisSearch) -> Self {
        self.search = Some(search);
        self
    }

    /// Whether folder contents are fetched recursively.
    pub fn show_folders(mut self, show: bool) -> Self {
        self.show_folders = show;
        self
    }

    /// When false, folder objects are returned alongside analyses.
    pub fn analysis_only(mut self, only: bool) -> Self {
        self.analysis_only = only;
        self
    }
}

#[derive(Deserialize)]
struct AnalysisSamples {
    #[serde(default)]
    samples: Vec<Sample>,
}

#[derive(Deserialize)]
struct EditableParameter {
    #[serde(rename = "Key", default)]
    key: String,
    #[serde(rename = "Value", default)]
    value: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EditableParameters {
    Wrapped {
        #[serde(rename = "editableParameters")]
        editable_parameters: Vec<EditableParameter>,
    },
    Bare(Vec<EditableParameter>),
}

impl SeerClient {
    /// Lists analyses matching the query.
    pub async fn analyses(&self, query: AnalysisQuery) -> Result<Vec<Analysis>> {
        if let Some(search) = &query.search {
            if search.item().is_empty() {
                return Err(Error::InvalidInput(format!(
                    "a non-empty value is required for {}",
                    search.field()
                )));
            }
        }
        self.analyses_inner(query).await
    }

    /// Fetches one analysis by id.
    pub async fn analysis(&self, analysis_id: &str) -> Result<Analysis> {
        let mut analyses = self
            .analyses_inner(AnalysisQuery::new().id(analysis_id))
            .await?;
        analyses
            .pop()
            .ok_or_else(|| Error::NotFound(format!("no analysis with id {analysis_id}")))
    }

    fn analyses_inner<'a>(
        &'a self,
        query: AnalysisQuery,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Analysis>>> + Send + 'a>> {
        Box::pin(async move {
            let mut params: Vec<(&str, String)> = Vec::new();
            // A field search replaces the exhaustive listing.
            if let Some(search) = &query.search {
                params.push(("searchFields", search.field().to_string()));
                params.push(("searchItem", search.item().to_string()));
            } else {
                params.push(("all", "true".to_string()));
            }
            if let Some(folder_id) = &query.folder_id {
                params.push(("folder", folder_id.clone()));
            }
            if let Some(project_id) = &query.project_id {
                params.push(("projectId", project_id.clone()));
            }
            if let Some(plate_name) = &query.plate_name {
                params.push(("plateName", plate_name.clone()));
            }

            let mut analyses = match &query.analysis_id {
                Some(id) => {
                    let envelope: AnalysisEnvelope = self
                        .get_json("get_analysis", &format!("api/v1/analyses/{id}"), &params)
                        .await?;
                    vec![envelope.analysis]
                }
                None => {
                    let page: Paged<Analysis> = self
                        .get_json("get_analysis", "api/v1/analyses", &params)
                        .await?;
                    page.data
                }
            };

            let mut folders = Vec::new();
            for analysis in &mut analyses {
                analysis.extra.remove("tenant_id");
                if let Some(path) = &analysis.parameter_file_path {
                    analysis.parameter_file_path = Some(trim_raw_file_path(path));
                }
                if query.show_folders && query.analysis_id.is_none() && analysis.is_folder {
                    folders.push(analysis.id.clone());
                }
            }

            for folder in folders {
                let nested = self
                    .analyses_inner(AnalysisQuery::new().folder(folder))
                    .await?;
                analyses.extend(nested);
            }

            if query.analysis_only {
                analyses.retain(|analysis| !analysis.is_folder);
            }
            Ok(analyses)
        })
    }

    /// Fetches all analysis protocols, a single protocol by id, or the
    /// protocols matching a name. An id supersedes a name.
    pub async fn analysis_protocols(
        &self,
        protocol_id: Option<&str>,
        protocol_name: Option<&str>,
    ) -> Result<Vec<AnalysisProtocol>> {
        let query = [("all", "true".to_string())];
        let mut protocols = match protocol_id {
            Some(id) => {
                let protocol: AnalysisProtocol = self
                    .get_json(
                        "get_analysis_protocols",
                        &format!("api/v1/analysisProtocols/{id}"),
                        &query,
                    )
                    .await?;
                vec![protocol]
            }
            None => {
                let page: Paged<AnalysisProtocol> = self
                    .get_json("get_analysis_protocols", "api/v1/analysisProtocols", &query)
                    .await?;
                let mut protocols = page.data;
                if let Some(name) = protocol_name {
                    protocols.retain(|p| p.analysis_protocol_name.as_deref() == Some(name));
                }
                protocols
            }
        };

        for protocol in &mut protocols {
            protocol.extra.remove("tenant_id");
            if let Some(path) = &protocol.parameter_file_path {
                protocol.parameter_file_path = Some(trim_raw_file_path(path));
            }
        }
        Ok(protocols)
    }

    /// Starts an analysis over a project's samples. The protocol is
    /// addressed by id or by name; omitting `sample_ids` runs all
    /// samples, and `filter` restricts the run to controls or
    /// non-controls.
    #[allow(clippy::too_many_arguments)]
    pub async fn start_analysis(
        &self,
        name: &str,
        project_id: &str,
        sample_ids: Option<&[String]>,
        protocol_id: Option<&str>,
        protocol_name: Option<&str>,
        notes: &str,
        description: &str,
        space: Option<&str>,
        filter: Option<SampleFilter>,
    ) -> Result<Value> {
        if name.is_empty() {
            return Err(Error::InvalidInput("analysis name cannot be empty".into()));
        }
        if project_id.is_empty() {
            return Err(Error::InvalidInput("project id cannot be empty".into()));
        }

        let protocol_id = match (protocol_id, protocol_name) {
            (Some(id), _) => {
                let found = self.analysis_protocols(Some(id), None).await?;
                if found.is_empty() {
                    return Err(Error::NotFound(format!(
                        "analysis protocol not found with id {id}"
                    )));
                }
                id.to_string()
            }
            (None, Some(name)) => {
                let found = self.analysis_protocols(None, Some(name)).await?;
                found
                    .first()
                    .map(|p| p.id.clone())
                    .ok_or_else(|| {
                        Error::NotFound(format!("analysis protocol not found with name {name}"))
                    })?
            }
            (None, None) => {
                return Err(Error::InvalidInput(
                    "specify either a protocol id or a protocol name".into(),
                ))
            }
        };

        if let Some(sample_ids) = sample_ids {
            let valid: HashSet<String> = self
                .samples(super::SampleQuery::Project(project_id.to_string()))
                .await?
                .into_iter()
                .map(|sample| sample.id)
                .collect();
            for sample_id in sample_ids {
                if !valid.contains(sample_id) {
                    return Err(Error::InvalidInput(format!(
                        "sample id '{sample_id}' is not associated with the project"
                    )));
                }
            }
        }

        let selected = match filter {
            Some(_) => Some(
                self.filter_sample_ids(project_id, filter, sample_ids)
                    .await?,
            ),
            None => sample_ids.map(|ids| ids.to_vec()),
        };

        let mut payload = serde_json::json!({
            "analysisName": name,
            "analysisProtocolId": protocol_id,
            "projectId": project_id,
            "notes": notes,
            "description": description,
            "userGroupId": space,
        });
        if let Some(selected) = selected {
            if !selected.is_empty() {
                payload["selectedSampleIDs"] = Value::from(selected.join(","));
            }
        }

        // The analysis id is not part of the response.
        let response = self
            .post_json("start_analysis", "api/v1/analyze", &payload)
            .await?;
        info!(analysis = name, project = project_id, "analysis started");
        Ok(response)
    }

    /// Current status of an analysis, e.g. `SUCCEEDED` while a run is
    /// still pending it may be absent.
    pub async fn analysis_complete(&self, analysis_id: &str) -> Result<Option<String>> {
        if analysis_id.is_empty() {
            return Err(Error::InvalidInput("analysis id cannot be empty".into()));
        }
        let analysis = self.analysis(analysis_id).await?;
        Ok(analysis.status)
    }

    /// The samples behind one or more analyses, deduplicated by sample
    /// id. Analyses that cannot be resolved are skipped; at least one
    /// must yield samples.
    pub(crate) async fn analysis_samples(&self, analysis_ids: &[String]) -> Result<Vec<Sample>> {
        let mut samples = Vec::new();
        for analysis_id in analysis_ids {
            let response: Result<Vec<AnalysisSamples>> = self
                .get_json(
                    "get_analysis_samples",
                    &format!("api/v1/analyses/samples/{analysis_id}"),
                    &[],
                )
                .await;
            match response {
                Ok(mut groups) if !groups.is_empty() => {
                    samples.append(&mut groups.remove(0).samples)
                }
                _ => continue,
            }
        }

        if samples.is_empty() {
            return Err(Error::NotFound(format!(
                "could not retrieve samples for analyses {analysis_ids:?}"
            )));
        }

        let mut seen = HashSet::new();
        samples.retain(|sample| seen.insert(sample.id.clone()));
        Ok(samples)
    }

    /// Names of the downloadable result files of a completed analysis.
    pub async fn list_search_result_files(&self, analysis_id: &str) -> Result<Vec<String>> {
        let analysis = self
            .analysis(analysis_id)
            .await
            .map_err(|_| Error::InvalidInput("invalid analysis id".into()))?;
        if !analysis_succeeded(&analysis) {
            return Err(Error::InvalidInput(
                "cannot find files for a failed analysis".into(),
            ));
        }

        let page: Paged<AnalysisResultFile> = self
            .get_json(
                "list_search_result_files",
                &format!("api/v2/analysisResultFiles/{analysis_id}"),
                &[],
            )
            .await?;
        Ok(page.data.into_iter().map(|file| file.filename).collect())
    }

    /// Signed URL for one result file. The filename is matched without
    /// its extension and case-insensitively.
    pub async fn search_result_file_url(
        &self,
        analysis_id: &str,
        filename: &str,
    ) -> Result<SignedUrl> {
        let wanted = strip_extension(filename).to_lowercase();

        let available = self.list_search_result_files(analysis_id).await?;
        let resolved = available
            .iter()
            .find(|name| strip_extension(name).to_lowercase() == wanted)
            .cloned()
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "filename {filename} not among the available result files"
                ))
            })?;

        let analysis = self.analysis(analysis_id).await?;
        if !analysis_succeeded(&analysis) {
            return Err(Error::InvalidInput(
                "cannot generate links for failed searches".into(),
            ));
        }

        let response: SignedUrl = self
            .post_json(
                "get_search_result_file_url",
                "api/v1/analysisResultFiles/getUrl",
                &serde_json::json!({
                    "analysisId": analysis_id,
                    "projectId": analysis.project_id,
                    "filename": resolved,
                }),
            )
            .await?;
        if response.url.is_empty() {
            return Err(Error::NotFound(format!("file {resolved} not found")));
        }
        Ok(SignedUrl {
            url: response.url,
            filename: Some(resolved),
        })
    }

    /// Loads one of the analysis result tables: protein and peptide at
    /// nanoparticle or panel rollup, or the precursor report (which only
    /// exists at nanoparticle rollup).
    pub async fn search_result(
        &self,
        analysis_id: &str,
        analyte_type: AnalyteType,
        rollup: Rollup,
    ) -> Result<Table> {
        if analysis_id.is_empty() {
            return Err(Error::InvalidInput("analysis id cannot be empty".into()));
        }
        let url = match analyte_type {
            AnalyteType::Precursor => match rollup {
                Rollup::Panel => {
                    return Err(Error::InvalidInput(
                        "precursor data is not available at panel rollup".into(),
                    ))
                }
                Rollup::Np => {
                    self.search_result_file_url(analysis_id, "report.tsv")
                        .await?
                        .url
                }
            },
            AnalyteType::Protein | AnalyteType::Peptide => {
                self.search_result_link(analysis_id, analyte_type, rollup)
                    .await?
            }
        };
        fetch_table(self.http(), &url).await
    }

    /// Resolves the np or panel link from the result-data listing.
    async fn search_result_link(
        &self,
        analysis_id: &str,
        analyte_type: AnalyteType,
        rollup: Rollup,
    ) -> Result<String> {
        let kind = match analyte_type {
            AnalyteType::Protein => "protein",
            AnalyteType::Peptide => "peptide",
            AnalyteType::Precursor => unreachable!("precursor has no data listing"),
        };
        let rows: Vec<Value> = self
            .get_json(
                "get_search_result",
                &format!("api/v1/data/{kind}"),
                &[
                    ("analysisId", analysis_id.to_string()),
                    ("retry", "false".to_string()),
                ],
            )
            .await?;

        let link_name = match rollup {
            Rollup::Np => "npLink",
            Rollup::Panel => "panelLink",
        };
        let url = rows
            .iter()
            .find(|row| row.get("name").and_then(Value::as_str) == Some(link_name))
            .and_then(|row| row.pointer("/link/url"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        if url.is_empty() {
            return Err(Error::NotFound(format!(
                "no {kind} result file at {link_name} rollup"
            )));
        }
        Ok(url.to_string())
    }

    /// Downloads one result file into `download_path`.
    pub async fn download_search_output_file(
        &self,
        analysis_id: &str,
        filename: &str,
        download_path: &Path,
    ) -> Result<PathBuf> {
        if analysis_id.is_empty() {
            return Err(Error::InvalidInput("analysis id cannot be empty".into()));
        }
        if !download_path.exists() {
            return Err(Error::InvalidInput(
                "download path must be an existing folder".into(),
            ));
        }
        let file = self.search_result_file_url(analysis_id, filename).await?;
        let filename = file.filename.unwrap_or_else(|| filename.to_string());
        download_to_file(self.http(), &file.url, download_path, &filename).await
    }

    /// Downloads analysis result files into
    /// `download_path/downloads/<analysis id>`, all of them or a single
    /// one by name.
    pub async fn download_analysis_files(
        &self,
        analysis_id: &str,
        download_path: &Path,
        file_name: Option<&str>,
    ) -> Result<Vec<PathBuf>> {
        if analysis_id.is_empty() {
            return Err(Error::InvalidInput("analysis id cannot be empty".into()));
        }
        let analysis = self
            .analysis(analysis_id)
            .await
            .map_err(|_| Error::InvalidInput("invalid analysis id".into()))?;

        let target = download_path.join("downloads").join(analysis_id);
        tokio::fs::create_dir_all(&target).await?;

        let mut files: Vec<AnalysisResultFile> = self
            .get_json(
                "download_analysis_files",
                &format!("api/v1/analysisResultFiles/{analysis_id}"),
                &[],
            )
            .await?;
        if let Some(name) = file_name {
            files.retain(|file| file.filename == name);
            if files.is_empty() {
                return Err(Error::NotFound(format!("no result file named {name}")));
            }
        }

        let mut downloaded = Vec::with_capacity(files.len());
        for file in files {
            let signed: SignedUrl = self
                .post_json(
                    "download_analysis_files",
                    "api/v1/analysisResultFiles/getUrl",
                    &serde_json::json!({
                        "analysisId": analysis_id,
                        "filename": file.filename,
                        "projectId": analysis.project_id,
                    }),
                )
                .await?;
            downloaded
                .push(download_to_file(self.http(), &signed.url, &target, &file.filename).await?);
        }
        Ok(downloaded)
    }

    /// Downloads the FASTA (or reference genome) files of the protocol
    /// behind an analysis. Supported engines are DIA-NN, EncyclopeDIA,
    /// MSFragger, and proteogenomics.
    pub async fn analysis_protocol_fasta(
        &self,
        analysis_id: &str,
        download_path: &Path,
    ) -> Result<Vec<PathBuf>> {
        if analysis_id.is_empty() {
            return Err(Error::InvalidInput("analysis id cannot be empty".into()));
        }

        let analysis = self.analysis(analysis_id).await?;
        let protocol_id = analysis.analysis_protocol_id.ok_or_else(|| {
            Error::UnexpectedResponse("analysis carries no protocol id".into())
        })?;
        let protocols = self.analysis_protocols(Some(&protocol_id), None).await?;
        let engine = protocols
            .first()
            .and_then(|p| p.analysis_engine.clone())
            .ok_or_else(|| {
                Error::UnexpectedResponse("protocol carries no analysis engine".into())
            })?
            .to_lowercase();

        let segment = match engine.as_str() {
            "diann" => "diann",
            "encyclopedia" => "dia",
            "msfragger" => "msfragger",
            "proteogenomics" => "proteogenomics",
            other => {
                return Err(Error::InvalidInput(format!(
                    "analysis protocol engine {other} not supported for fasta download"
                )))
            }
        };

        let parameters: EditableParameters = self
            .get_json(
                "get_analysis_protocol_fasta",
                &format!("api/v1/analysisProtocols/editableParameters/{segment}/{protocol_id}"),
                &[],
            )
            .await?;
        let parameters = match parameters {
            EditableParameters::Wrapped {
                editable_parameters,
            } => editable_parameters,
            EditableParameters::Bare(parameters) => parameters,
        };
        let fasta_paths: Vec<String> = parameters
            .into_iter()
            .filter(|p| matches!(p.key.as_str(), "fasta" | "fastaFilePath" | "referencegenome"))
            .map(|p| p.value)
            .collect();
        if fasta_paths.is_empty() {
            return Err(Error::UnexpectedResponse(
                "no fasta file name returned from server".into(),
            ));
        }

        tokio::fs::create_dir_all(download_path).await?;
        let mut downloaded = Vec::with_capacity(fasta_paths.len());
        for path in fasta_paths {
            let signed: SignedUrl = self
                .post_json(
                    "get_analysis_protocol_fasta",
                    "api/v1/analysisProtocolFiles/getUrl",
                    &serde_json::json!({ "filepath": path }),
                )
                .await?;
            let filename = path.rsplit('/').next().unwrap_or(&path).to_string();
            downloaded
                .push(download_to_file(self.http(), &signed.url, download_path, &filename).await?);
        }
        Ok(downloaded)
    }
}

/// Analyte kind of a result table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyteType {
    Protein,
    Peptide,
    Precursor,
}

/// Rollup level of a result table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rollup {
    Np,
    Panel,
}

fn analysis_succeeded(analysis: &Analysis) -> bool {
    !matches!(analysis.status.as_deref(), None | Some("Failed"))
}

/// `report.tsv` and `REPORT` both address the same file.
fn strip_extension(filename: &str) -> &str {
    match filename.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => filename,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_fields_map_to_backend_names() {
        let search = AnalysisSearch::FolderName("my folder".into());
        assert_eq!(search.field(), "analysis_name");
        assert_eq!(search.item(), "my folder");
        assert_eq!(
            AnalysisSearch::NumberMsDataFile("8".into()).field(),
            "number_msdatafile"
        );
    }

    #[test]
    fn extensions_are_stripped_once() {
        assert_eq!(strip_extension("report.tsv"), "report");
        assert_eq!(strip_extension("archive.tar.gz"), "archive.tar");
        assert_eq!(strip_extension("README"), "README");
        assert_eq!(strip_extension(".hidden"), ".hidden");
    }

    #[test]
    fn extensionless_names_stay_addressable() {
        // The same rule applies to the requested name and to the
        // available files, so a dot-free file can be looked up by its
        // own name regardless of case.
        let wanted = strip_extension("report").to_lowercase();
        let available = strip_extension("REPORT").to_lowercase();
        assert_eq!(wanted, available);
        assert_ne!(available, "");
    }

    #[test]
    fn failed_or_pending_analyses_have_no_files() {
        let analysis: Analysis =
            serde_json::from_value(serde_json::json!({"id": "a", "status": "Failed"})).unwrap();
        assert!(!analysis_succeeded(&analysis));

        let analysis: Analysis = serde_json::from_value(serde_json::json!({"id": "a"})).unwrap();
        assert!(!analysis_succeeded(&analysis));

        let analysis: Analysis =
            serde_json::from_value(serde_json::json!({"id": "a", "status": "SUCCEEDED"})).unwrap();
        assert!(analysis_succeeded(&analysis));
    }
}
