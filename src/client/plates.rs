//! Plate operations, including the full plate ingestion flow.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::info;

use super::SeerClient;
use crate::common::entity_name_ruler;
use crate::error::{Error, Result};
use crate::model::{Created, FileRegistration, Paged, Plate, UploadConfig};
use crate::platemap::{
    msdata_rows_from_plate_map, sample_info_from_plate_map, validate_plate_map, PlateMap,
};
use crate::storage::{ObjectStore, S3ObjectStore};
use crate::table::Table;

/// A plate map supplied either as a CSV file on disk or as an in-memory
/// [`PlateMap`]. An in-memory map is rendered to `plateMap_<uuid>.csv`
/// and uploaded alongside the MS data files.
#[derive(Debug)]
pub enum PlateMapFile<'a> {
    Path(&'a Path),
    Map(&'a PlateMap),
}

impl SeerClient {
    /// Fetches all plates, or a single plate by id.
    pub async fn plates(&self, plate_id: Option<&str>) -> Result<Vec<Plate>> {
        let query = [("all", "true".to_string())];
        let mut plates = match plate_id {
            None => {
                let page: Paged<Plate> =
                    self.get_json("get_plates", "api/v1/plates", &query).await?;
                page.data
            }
            Some(id) => {
                let plate: Plate = self
                    .get_json("get_plates", &format!("api/v1/plates/{id}"), &query)
                    .await?;
                vec![plate]
            }
        };
        for plate in &mut plates {
            plate.extra.remove("tenant_id");
        }
        Ok(plates)
    }

    /// The user-assigned plate ids already in use.
    pub async fn plate_ids(&self) -> Result<Vec<String>> {
        let page: Paged<String> = self.get_json("get_plate_ids", "api/v1/plateids", &[]).await?;
        Ok(page.data)
    }

    /// Uploads local MS data files as a new plate and returns the plate
    /// UUID. The plate map must cover exactly the given files.
    pub async fn add_plate(
        &self,
        ms_data_files: &[PathBuf],
        plate_map: PlateMapFile<'_>,
        plate_id: &str,
        plate_name: &str,
        sample_description_file: Option<&Path>,
        space: Option<&str>,
    ) -> Result<String> {
        for file in ms_data_files {
            if !file.exists() {
                return Err(Error::InvalidInput(format!(
                    "file path '{}' is invalid",
                    file.display()
                )));
            }
        }
        if let PlateMapFile::Path(path) = &plate_map {
            if !path.exists() {
                return Err(Error::InvalidInput(format!(
                    "file path '{}' is invalid",
                    path.display()
                )));
            }
        }
        if let Some(path) = sample_description_file {
            if !path.exists() {
                return Err(Error::InvalidInput(format!(
                    "file path '{}' is invalid",
                    path.display()
                )));
            }
        }

        let table = load_plate_map(&plate_map)?;
        let local_names: Vec<String> = ms_data_files.iter().map(|p| basename(p)).collect();
        validate_plate_map(&table, &local_names)?;

        let uuid = self
            .create_plate_record(plate_id, plate_name, space)
            .await?;
        let config = self.plate_upload_config(&uuid).await?;
        let credentials = self.aws_credentials().await?;
        let store = S3ObjectStore::new(&credentials).await;

        let staging = tempfile::tempdir()?;
        let (plate_map_path, plate_map_name) =
            materialize_plate_map(&plate_map, &uuid, staging.path())?;
        self.upload_and_register(
            &store,
            &config,
            &plate_map_path,
            &plate_map_name,
            space,
        )
        .await?;

        // Raw file paths the msdata rows will point at once the MS
        // files land in the bucket.
        let mut raw_file_paths = HashMap::new();
        for name in &local_names {
            raw_file_paths.insert(
                name.clone(),
                format!("/{}/{}{name}", config.s3_bucket, config.s3_upload_path),
            );
        }

        let description = sample_description_file
            .map(Table::from_csv_path)
            .transpose()?;
        let sample_info =
            sample_info_from_plate_map(&uuid, &table, space, description.as_ref())?;

        if let Some(path) = sample_description_file {
            self.upload_and_register(&store, &config, path, &basename(path), space)
                .await?;
        }

        let samples = self.add_samples(&sample_info).await?;

        let msdata = msdata_rows_from_plate_map(&table, &samples, &raw_file_paths, space)?;
        let _: Value = self
            .post_json(
                "add_plate",
                "api/v1/msdatas/batch",
                &serde_json::json!({ "msdatas": msdata }),
            )
            .await?;

        // Fresh credentials for the bulk upload; the first set may be
        // close to expiry by now.
        let credentials = self.aws_credentials().await?;
        let store = S3ObjectStore::new(&credentials).await;
        let progress = indicatif::ProgressBar::new(ms_data_files.len() as u64);
        let mut registrations = Vec::with_capacity(ms_data_files.len());
        for file in ms_data_files {
            let name = basename(file);
            progress.set_message(name.clone());
            let key = format!("{}{name}", config.s3_upload_path);
            store.put_file(&config.s3_bucket, &key, file).await?;
            registrations.push(FileRegistration {
                file_path: key,
                file_size: std::fs::metadata(file)?.len(),
                user_group_id: space.map(str::to_string),
            });
            progress.inc(1);
        }
        progress.finish_and_clear();

        // Registered only after every upload finished, so the files view
        // never shows partial plates.
        self.register_files(&registrations).await?;

        info!(plate = %uuid, "plate generated");
        Ok(uuid)
    }

    /// Creates a plate from MS data files already present on PAS.
    /// `ms_data_files` are display paths as shown in the files view.
    pub async fn link_plate(
        &self,
        ms_data_files: &[String],
        plate_map: PlateMapFile<'_>,
        plate_id: &str,
        plate_name: &str,
        sample_description_file: Option<&Path>,
        space: Option<&str>,
    ) -> Result<String> {
        for file in ms_data_files {
            if self.list_ms_data_files(file, None).await?.is_empty() {
                return Err(Error::InvalidInput(format!("file '{file}' does not exist")));
            }
        }
        if let Some(path) = sample_description_file {
            if !path.exists() {
                return Err(Error::InvalidInput(format!(
                    "file path '{}' is invalid",
                    path.display()
                )));
            }
        }

        let table = load_plate_map(&plate_map)?;
        validate_plate_map(&table, ms_data_files)?;

        let uuid = self
            .create_plate_record(plate_id, plate_name, space)
            .await?;
        let config = self.plate_upload_config(&uuid).await?;
        let credentials = self.aws_credentials().await?;
        let store = S3ObjectStore::new(&credentials).await;

        let staging = tempfile::tempdir()?;
        let (plate_map_path, plate_map_name) =
            materialize_plate_map(&plate_map, &uuid, staging.path())?;
        self.upload_and_register(
            &store,
            &config,
            &plate_map_path,
            &plate_map_name,
            space,
        )
        .await?;

        // Resolve display paths to cloud paths, keyed by basename so
        // they line up with the plate map rows.
        let resolved = self.msdataindex_paths(ms_data_files).await?;
        let raw_file_paths: HashMap<String, String> = resolved
            .into_iter()
            .map(|(display, raw)| {
                let name = display.rsplit('/').next().unwrap_or(&display).to_string();
                (name, raw)
            })
            .collect();

        let description = sample_description_file
            .map(Table::from_csv_path)
            .transpose()?;
        let sample_info =
            sample_info_from_plate_map(&uuid, &table, space, description.as_ref())?;

        if let Some(path) = sample_description_file {
            self.upload_and_register(&store, &config, path, &basename(path), space)
                .await?;
        }

        let mut samples = Vec::with_capacity(sample_info.len());
        for entry in &sample_info {
            samples.push(self.add_sample(entry).await?);
        }

        let msdata = msdata_rows_from_plate_map(&table, &samples, &raw_file_paths, space)?;
        let _: Value = self
            .post_json(
                "link_plate",
                "api/v1/msdatas/batch",
                &serde_json::json!({ "msdatas": msdata }),
            )
            .await?;

        info!(plate = %uuid, "plate generated from linked files");
        Ok(uuid)
    }

    async fn create_plate_record(
        &self,
        plate_id: &str,
        plate_name: &str,
        space: Option<&str>,
    ) -> Result<String> {
        if !entity_name_ruler(plate_id) {
            return Err(Error::InvalidInput(
                "plate id contains unsupported characters".into(),
            ));
        }
        if !entity_name_ruler(plate_name) {
            return Err(Error::InvalidInput(
                "plate name contains unsupported characters".into(),
            ));
        }

        let existing = self.plate_ids().await?;
        if existing.is_empty() {
            return Err(Error::UnexpectedResponse(
                "no plate ids returned from the server".into(),
            ));
        }

        let created: Created = self
            .post_json(
                "add_plate",
                "api/v1/plates",
                &serde_json::json!({
                    "plateId": plate_id,
                    "plateName": plate_name,
                    "plateUserGroup": space,
                }),
            )
            .await?;
        Ok(created.id)
    }

    async fn plate_upload_config(&self, plate_uuid: &str) -> Result<UploadConfig> {
        self.post_json(
            "add_plate",
            "api/v1/msdatas/getuploadconfig",
            &serde_json::json!({ "plateId": plate_uuid }),
        )
        .await
    }

    /// Uploads one auxiliary file (plate map, sample description) and
    /// registers it with the files view.
    async fn upload_and_register(
        &self,
        store: &dyn ObjectStore,
        config: &UploadConfig,
        path: &Path,
        filename: &str,
        space: Option<&str>,
    ) -> Result<()> {
        let key = format!("{}{filename}", config.s3_upload_path);
        store.put_file(&config.s3_bucket, &key, path).await?;
        self.register_files(&[FileRegistration {
            file_path: key,
            file_size: std::fs::metadata(path)?.len(),
            user_group_id: space.map(str::to_string),
        }])
        .await?;
        Ok(())
    }
}

fn basename(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn load_plate_map(plate_map: &PlateMapFile<'_>) -> Result<Table> {
    match plate_map {
        PlateMapFile::Path(path) => Table::from_csv_path(path),
        PlateMapFile::Map(map) => map.to_table(),
    }
}

/// Returns the on-disk path and upload name of the plate map, writing
/// in-memory maps to the staging directory first.
fn materialize_plate_map(
    plate_map: &PlateMapFile<'_>,
    plate_uuid: &str,
    staging: &Path,
) -> Result<(PathBuf, String)> {
    match plate_map {
        PlateMapFile::Path(path) => Ok((path.to_path_buf(), basename(path))),
        PlateMapFile::Map(map) => {
            let name = format!("plateMap_{plate_uuid}.csv");
            let path = staging.join(&name);
            map.write_csv(&path)?;
            Ok((path, name))
        }
    }
}
