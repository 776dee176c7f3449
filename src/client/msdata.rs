//! MS data file operations: the files view, uploads, downloads, and
//! moves between folders and spaces.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::info;

use super::SeerClient;
use crate::common::{valid_ms_data_file, valid_pas_folder_path};
use crate::error::{Error, Result};
use crate::model::{
    AwsCredentialEnvelope, AwsSessionCredentials, FileRegistration, FilesInFolder,
    MsDataIndexEntry, MsDataIndexMetadata, RegisterFilesResponse, RegisteredFile,
};
use crate::storage::{ObjectStore, S3ObjectStore};
use crate::transfer::download_to_file;

impl SeerClient {
    /// Short-lived credentials for direct bucket access.
    pub(crate) async fn aws_credentials(&self) -> Result<AwsSessionCredentials> {
        let envelope: AwsCredentialEnvelope = self
            .get_json("get_aws_credentials", "auth/getawscredential", &[])
            .await?;
        Ok(envelope.credentials)
    }

    /// Registers uploaded files with the files view. Called only after
    /// every upload finished.
    pub(crate) async fn register_files(
        &self,
        files: &[FileRegistration],
    ) -> Result<Vec<RegisteredFile>> {
        let response: RegisterFilesResponse = self
            .post_json(
                "register_files",
                "api/v1/msdataindex/file",
                &serde_json::json!({ "files": files }),
            )
            .await?;
        if response.created.is_none() {
            return Err(Error::UnexpectedResponse(
                "file registration was not acknowledged".into(),
            ));
        }
        Ok(response.files)
    }

    /// Lists MS data files under a folder, or all files when `folder` is
    /// empty.
    pub async fn list_ms_data_files(
        &self,
        folder: &str,
        space: Option<&str>,
    ) -> Result<Vec<String>> {
        let mut query = vec![("folder", folder.to_string())];
        if let Some(space) = space {
            query.push(("userGroupId", space.to_string()));
        }
        let response: FilesInFolder = self
            .get_json(
                "list_ms_data_files",
                "api/v1/msdataindex/filesinfolder",
                &query,
            )
            .await?;
        Ok(response.files_list)
    }

    /// Uploads local MS data files into a PAS folder and returns the
    /// registered files, with paths as shown in the files view.
    ///
    /// `filenames` optionally renames each file on upload; it cannot be
    /// used with `.d.zip` archives, whose names are tied to the `.d`
    /// directory inside.
    pub async fn upload_ms_data_files(
        &self,
        ms_data_files: &[PathBuf],
        path: &str,
        space: Option<&str>,
        filenames: &[String],
    ) -> Result<Vec<RegisteredFile>> {
        let tenant_id = self.tenant_id().await?;
        let targets = upload_targets(ms_data_files, path, &tenant_id, filenames)?;

        let credentials = self.aws_credentials().await?;
        let bucket = credentials.s3_bucket.clone().ok_or_else(|| {
            Error::UnexpectedResponse("credential response without an S3 bucket".into())
        })?;
        let store = S3ObjectStore::new(&credentials).await;

        let registrations = upload_to_store(&store, &bucket, &targets, space).await?;
        let mut files = self.register_files(&registrations).await?;

        // The tenant prefix is backend-internal; callers see display
        // paths.
        for file in &mut files {
            if let Some((_, rest)) = file.file_path.split_once('/') {
                file.file_path = rest.to_string();
            }
        }
        info!(count = files.len(), folder = path, "uploaded MS data files");
        Ok(files)
    }

    /// Downloads MS data files by display path into `download_path`,
    /// which is created when missing.
    pub async fn download_ms_data_files(
        &self,
        paths: &[String],
        download_path: &Path,
        space: Option<&str>,
    ) -> Result<Vec<PathBuf>> {
        tokio::fs::create_dir_all(download_path).await?;
        let tenant_id = self.tenant_id().await?;

        let mut downloaded = Vec::with_capacity(paths.len());
        for path in paths {
            let url = self
                .post_text(
                    "download_ms_data_files",
                    "api/v1/msdataindex/download/getUrl",
                    &serde_json::json!({
                        "filepath": format!("{tenant_id}/{path}"),
                        "userGroupId": space,
                    }),
                )
                .await?;
            let filename = basename(path);
            downloaded.push(download_to_file(self.http(), &url, download_path, &filename).await?);
        }
        Ok(downloaded)
    }

    /// Moves files to another folder. Paths are display paths; all
    /// sources must share one folder, and likewise all targets. The
    /// space is unchanged.
    pub async fn move_ms_data_files(
        &self,
        source_files: &[String],
        target_files: &[String],
    ) -> Result<Vec<String>> {
        self.move_files(source_files, target_files, None).await
    }

    /// Moves files into another space, keeping their paths.
    /// `destination_space` is a space name, matched case-insensitively.
    pub async fn change_ms_file_space(
        &self,
        ms_data_files: &[String],
        destination_space: &str,
    ) -> Result<Vec<String>> {
        self.move_files(ms_data_files, ms_data_files, Some(destination_space))
            .await
    }

    async fn move_files(
        &self,
        source_files: &[String],
        target_files: &[String],
        target_space: Option<&str>,
    ) -> Result<Vec<String>> {
        if source_files.is_empty() {
            return Err(Error::InvalidInput("source files cannot be empty".into()));
        }
        if source_files.len() != target_files.len() {
            return Err(Error::InvalidInput(
                "source and target must have the same number of files".into(),
            ));
        }

        let source_folder = single_folder(source_files)
            .ok_or_else(|| Error::InvalidInput("files can only be moved from one folder".into()))?;
        let target_folder = single_folder(target_files)
            .ok_or_else(|| Error::InvalidInput("files can only be moved to one folder".into()))?;

        let target_space_id = match target_space {
            Some(name) => Some(self.space_id_by_name(name).await?),
            None => None,
        };

        let tenant_id = self.tenant_id().await?;
        let source_key = format!("{tenant_id}/{source_folder}");

        // The source space is a lookup criterion for the move, so it is
        // read from the index rather than taken as a parameter.
        let metadata: MsDataIndexMetadata = self
            .get_json(
                "move_ms_data_files",
                "api/v1/msdataindex/getmetadata",
                &[("folderKey", source_key.clone())],
            )
            .await?;
        let source_names: Vec<String> = source_files.iter().map(|p| basename(p)).collect();
        let found: Vec<&MsDataIndexEntry> = metadata
            .files
            .iter()
            .filter(|entry| {
                entry
                    .filename
                    .as_deref()
                    .map(|name| source_names.iter().any(|n| n == name))
                    .unwrap_or(false)
            })
            .collect();
        if found.len() != source_files.len() {
            return Err(Error::NotFound(
                "not all source files were found in the source folder".into(),
            ));
        }
        let spaces: HashSet<Option<&str>> =
            found.iter().map(|entry| entry.user_group_id.as_deref()).collect();
        if spaces.len() > 1 {
            return Err(Error::InvalidInput(
                "files are located in multiple spaces, separate the move requests".into(),
            ));
        }
        let base_space = found
            .first()
            .and_then(|entry| entry.user_group_id.clone());

        let target_space_id = target_space_id.or_else(|| base_space.clone());

        let mut payload = serde_json::json!({
            "type": "file",
            "sourceFolder": source_key,
            "targetFolder": format!("{tenant_id}/{target_folder}"),
            "sourceFiles": source_names,
            "targetFiles": target_files.iter().map(|p| basename(p)).collect::<Vec<_>>(),
        });
        if let Some(space) = &base_space {
            payload["sourceUserGroupId"] = Value::from(space.clone());
        }
        if let Some(space) = target_space_id {
            if base_space.as_deref() != Some(space.as_str()) {
                payload["targetUserGroupId"] = Value::from(space);
            }
        }

        let _: Value = self
            .post_json("move_ms_data_files", "api/v1/msdataindex/move", &payload)
            .await?;
        Ok(target_files.to_vec())
    }

    /// Index metadata for one folder, with cloud paths.
    pub(crate) async fn msdataindex_metadata(
        &self,
        folder: &str,
    ) -> Result<Vec<MsDataIndexEntry>> {
        let tenant_id = self.tenant_id().await?;
        let mut query = vec![("all", "true".to_string())];
        if !folder.is_empty() {
            query.push(("folderKey", format!("{tenant_id}/{folder}")));
        }
        let metadata: MsDataIndexMetadata = self
            .get_json(
                "get_msdataindex_metadata",
                "api/v2/msdataindex/getmetadata",
                &query,
            )
            .await?;
        Ok(metadata.data)
    }

    /// Resolves display paths to their underlying cloud paths. Every
    /// path must resolve.
    pub(crate) async fn msdataindex_paths(
        &self,
        display_paths: &[String],
    ) -> Result<HashMap<String, String>> {
        let tenant_id = self.tenant_id().await?;

        let mut folders: HashMap<String, Vec<&String>> = HashMap::new();
        for path in display_paths {
            folders.entry(dirname(path).to_string()).or_default().push(path);
        }

        let mut result = HashMap::new();
        let mut missing = Vec::new();
        for (folder, paths) in folders {
            let index: HashMap<String, String> = match self.msdataindex_metadata(&folder).await {
                Ok(entries) => entries
                    .into_iter()
                    .filter_map(|entry| Some((entry.key?, entry.raw_file_path?)))
                    .collect(),
                Err(_) => HashMap::new(),
            };
            for path in paths {
                match index.get(&format!("{tenant_id}/{path}")) {
                    Some(raw) => {
                        result.insert(path.clone(), raw.clone());
                    }
                    None => missing.push(path.clone()),
                }
            }
        }

        if !missing.is_empty() {
            return Err(Error::NotFound(format!(
                "could not fetch metadata for files: {missing:?}"
            )));
        }
        Ok(result)
    }
}

fn basename(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_string()
}

fn dirname(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// All source files must live in one folder; returns that folder.
fn single_folder(paths: &[String]) -> Option<String> {
    let folders: HashSet<&str> = paths.iter().map(|p| dirname(p)).collect();
    if folders.len() == 1 {
        folders.into_iter().next().map(str::to_string)
    } else {
        None
    }
}

/// Validates the upload request and maps each local file to its cloud
/// key `{tenant_id}/{path}/{filename}`.
pub(crate) fn upload_targets(
    ms_data_files: &[PathBuf],
    path: &str,
    tenant_id: &str,
    filenames: &[String],
) -> Result<Vec<(PathBuf, String)>> {
    if !valid_pas_folder_path(path) {
        return Err(Error::InvalidInput(
            "a folder path without leading, trailing, or consecutive slashes is required".into(),
        ));
    }
    for file in ms_data_files {
        if !valid_ms_data_file(file) {
            return Err(Error::InvalidInput(format!(
                "invalid file or file format: '{}'",
                file.display()
            )));
        }
    }
    if !filenames.is_empty() {
        if filenames.len() != ms_data_files.len() {
            return Err(Error::InvalidInput(
                "filenames must map one to one onto the MS data files".into(),
            ));
        }
        let has_d_zip = ms_data_files.iter().any(|file| {
            file.file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.to_lowercase().ends_with(".d.zip"))
                .unwrap_or(false)
        });
        if has_d_zip {
            return Err(Error::InvalidInput(
                "filenames cannot be used with .d.zip files".into(),
            ));
        }
        if filenames.iter().any(|name| name.contains('/')) {
            return Err(Error::InvalidInput(
                "filenames cannot contain folder paths".into(),
            ));
        }
    }

    Ok(ms_data_files
        .iter()
        .enumerate()
        .map(|(i, file)| {
            let filename = if filenames.is_empty() {
                file.file_name()
                    .map(|name| name.to_string_lossy().replace('/', ""))
                    .unwrap_or_default()
            } else {
                filenames[i].clone()
            };
            (file.clone(), format!("{tenant_id}/{path}/{filename}"))
        })
        .collect())
}

/// Uploads every target and returns the registrations for the files
/// view. Registration is left to the caller so it happens only once all
/// uploads finished.
pub(crate) async fn upload_to_store(
    store: &dyn ObjectStore,
    bucket: &str,
    targets: &[(PathBuf, String)],
    space: Option<&str>,
) -> Result<Vec<FileRegistration>> {
    let progress = indicatif::ProgressBar::new(targets.len() as u64);
    let mut registrations = Vec::with_capacity(targets.len());
    for (local, key) in targets {
        progress.set_message(basename(key));
        store.put_file(bucket, key, local).await?;
        registrations.push(FileRegistration {
            file_path: key.clone(),
            file_size: std::fs::metadata(local)?.len(),
            user_group_id: space.map(str::to_string),
        });
        progress.inc(1);
    }
    progress.finish_and_clear();
    Ok(registrations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MockObjectStore;
    use mockall::predicate::*;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"spectra").unwrap();
        path
    }

    #[test]
    fn upload_targets_build_tenant_scoped_keys() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![touch(dir.path(), "run1.raw"), touch(dir.path(), "run2.raw")];

        let targets = upload_targets(&files, "folder/sub", "tenant-1", &[]).unwrap();
        assert_eq!(targets[0].1, "tenant-1/folder/sub/run1.raw");
        assert_eq!(targets[1].1, "tenant-1/folder/sub/run2.raw");
    }

    #[test]
    fn upload_targets_apply_renames() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![touch(dir.path(), "run1.raw")];

        let targets =
            upload_targets(&files, "folder", "tenant-1", &["renamed.raw".to_string()]).unwrap();
        assert_eq!(targets[0].1, "tenant-1/folder/renamed.raw");

        assert!(upload_targets(&files, "folder", "tenant-1", &["a/b.raw".to_string()]).is_err());
        assert!(upload_targets(
            &files,
            "folder",
            "tenant-1",
            &["a.raw".to_string(), "b.raw".to_string()]
        )
        .is_err());
    }

    #[test]
    fn upload_targets_reject_renaming_d_zip() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![touch(dir.path(), "run1.d.zip")];

        assert!(upload_targets(&files, "folder", "t", &[]).is_ok());
        assert!(upload_targets(&files, "folder", "t", &["other.d.zip".to_string()]).is_err());
    }

    #[test]
    fn upload_targets_validate_folder_and_files() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![touch(dir.path(), "run1.raw")];

        assert!(upload_targets(&files, "/leading", "t", &[]).is_err());
        assert!(upload_targets(&files, "", "t", &[]).is_err());

        let bad = vec![touch(dir.path(), "notes.txt")];
        assert!(upload_targets(&bad, "folder", "t", &[]).is_err());
    }

    #[tokio::test]
    async fn upload_to_store_registers_after_uploading() {
        let dir = tempfile::tempdir().unwrap();
        let local = touch(dir.path(), "run1.raw");
        let targets = vec![(local, "tenant-1/folder/run1.raw".to_string())];

        let mut store = MockObjectStore::new();
        store
            .expect_put_file()
            .with(
                eq("bucket-a"),
                eq("tenant-1/folder/run1.raw"),
                always(),
            )
            .times(1)
            .returning(|_, _, _| Ok(()));

        let registrations = upload_to_store(&store, "bucket-a", &targets, Some("space-1"))
            .await
            .unwrap();
        assert_eq!(registrations.len(), 1);
        assert_eq!(registrations[0].file_path, "tenant-1/folder/run1.raw");
        assert_eq!(registrations[0].file_size, 7);
        assert_eq!(registrations[0].user_group_id.as_deref(), Some("space-1"));
    }

    #[tokio::test]
    async fn upload_to_store_stops_on_first_failure() {
        let dir = tempfile::tempdir().unwrap();
        let targets = vec![
            (touch(dir.path(), "a.raw"), "t/f/a.raw".to_string()),
            (touch(dir.path(), "b.raw"), "t/f/b.raw".to_string()),
        ];

        let mut store = MockObjectStore::new();
        store
            .expect_put_file()
            .times(1)
            .returning(|_, _, _| Err(Error::Storage("connection reset".into())));

        assert!(upload_to_store(&store, "bucket", &targets, None)
            .await
            .is_err());
    }

    #[test]
    fn folder_helpers() {
        assert_eq!(dirname("a/b/c.raw"), "a/b");
        assert_eq!(dirname("c.raw"), "");
        assert_eq!(basename("a/b/c.raw"), "c.raw");

        let one = vec!["a/b/x.raw".to_string(), "a/b/y.raw".to_string()];
        assert_eq!(single_folder(&one).as_deref(), Some("a/b"));
        let two = vec!["a/x.raw".to_string(), "b/y.raw".to_string()];
        assert!(single_folder(&two).is_none());
    }
}
