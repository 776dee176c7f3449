//! Project operations.

use serde_json::Value;

use super::SeerClient;
use crate::common::trim_raw_file_path;
use crate::error::{Error, Result};
use crate::model::{Created, Paged, Project};

impl SeerClient {
    /// Fetches all projects, or a single project by id.
    pub async fn projects(&self, project_id: Option<&str>) -> Result<Vec<Project>> {
        let query = [("all", "true".to_string())];
        let mut projects = match project_id {
            None => {
                let page: Paged<Project> =
                    self.get_json("get_projects", "api/v1/projects", &query).await?;
                page.data
            }
            Some(id) => {
                let project: Project = self
                    .get_json("get_projects", &format!("api/v1/projects/{id}"), &query)
                    .await?;
                vec![project]
            }
        };

        for project in &mut projects {
            project.extra.remove("tenant_id");
            if let Some(path) = &project.raw_file_path {
                project.raw_file_path = Some(trim_raw_file_path(path));
            }
        }
        Ok(projects)
    }

    /// Creates a project over the given plates and returns its id.
    /// Every plate id must refer to an existing plate.
    pub async fn create_project(
        &self,
        project_name: &str,
        plate_ids: &[String],
        description: Option<&str>,
        notes: Option<&str>,
        space: Option<&str>,
    ) -> Result<String> {
        if project_name.is_empty() {
            return Err(Error::InvalidInput("project name cannot be empty".into()));
        }

        let known = self.plates(None).await?;
        for plate_id in plate_ids {
            if !known.iter().any(|plate| &plate.id == plate_id) {
                return Err(Error::InvalidInput(format!(
                    "plate id '{plate_id}' is not valid"
                )));
            }
        }

        let created: Created = self
            .post_json(
                "add_project",
                "api/v1/projects",
                &serde_json::json!({
                    "projectName": project_name,
                    "plateIDs": plate_ids,
                    "notes": notes,
                    "description": description,
                    "projectUserGroup": space,
                }),
            )
            .await?;
        Ok(created.id)
    }

    /// Adds existing samples to a project.
    pub async fn add_samples_to_project(
        &self,
        sample_ids: &[String],
        project_id: &str,
    ) -> Result<()> {
        if project_id.is_empty() {
            return Err(Error::InvalidInput("project id cannot be empty".into()));
        }
        if sample_ids.is_empty() {
            return Err(Error::InvalidInput("samples cannot be empty".into()));
        }
        let _: Value = self
            .put_json(
                "add_samples_to_project",
                &format!("api/v1/addSamplesToProject/{project_id}"),
                &serde_json::json!({ "sampleIDs": sample_ids }),
            )
            .await?;
        Ok(())
    }

    /// Adds every sample on the given plates to a project.
    pub async fn add_plates_to_project(
        &self,
        plate_ids: &[String],
        project_id: &str,
    ) -> Result<()> {
        if project_id.is_empty() {
            return Err(Error::InvalidInput("project id cannot be empty".into()));
        }
        if plate_ids.is_empty() {
            return Err(Error::InvalidInput("plates cannot be empty".into()));
        }

        let mut sample_ids = Vec::new();
        for plate_id in plate_ids {
            let samples = self
                .samples(super::SampleQuery::Plate(plate_id.clone()))
                .await?;
            sample_ids.extend(samples.into_iter().map(|sample| sample.id));
        }
        self.add_samples_to_project(&sample_ids, project_id).await
    }
}
