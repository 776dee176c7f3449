//! Plate maps: the per-plate table tying MS data files to samples.
//!
//! A [`PlateMap`] can be built in memory and serialized to the CSV
//! layout PAS expects, in either the `XT` or `XTR` header dialect. The
//! free functions validate and translate plate-map tables into the
//! sample and msdata payloads used during plate ingestion.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use crate::common::camel_case;
use crate::error::{Error, Result};
use crate::model::{Extra, Sample};
use crate::table::Table;

/// Proteograph product whose plate-map header layout is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Product {
    #[default]
    Xt,
    Xtr,
}

/// Plate-map attributes, in canonical column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    MsFileName,
    SampleName,
    SampleId,
    WellLocation,
    Nanoparticle,
    NanoparticleId,
    Control,
    ControlId,
    InstrumentName,
    DateSamplePreparation,
    SampleVolume,
    PeptideConcentration,
    PeptideMassSample,
    ReconVolume,
    DilutionFactor,
    KitId,
    PlateId,
    PlateName,
    AssayVersion,
    SampleTubeId,
    MethodSetId,
    AssayMethodId,
}

const COLUMNS: [Column; 22] = [
    Column::MsFileName,
    Column::SampleName,
    Column::SampleId,
    Column::WellLocation,
    Column::Nanoparticle,
    Column::NanoparticleId,
    Column::Control,
    Column::ControlId,
    Column::InstrumentName,
    Column::DateSamplePreparation,
    Column::SampleVolume,
    Column::PeptideConcentration,
    Column::PeptideMassSample,
    Column::ReconVolume,
    Column::DilutionFactor,
    Column::KitId,
    Column::PlateId,
    Column::PlateName,
    Column::AssayVersion,
    Column::SampleTubeId,
    Column::MethodSetId,
    Column::AssayMethodId,
];

impl Column {
    /// CSV header for this attribute under the given product dialect.
    /// `None` when the dialect does not carry the column.
    pub fn header(self, product: Product) -> Option<&'static str> {
        match product {
            Product::Xt => match self {
                Column::MsFileName => Some("MS file name"),
                Column::SampleName => Some("Sample name"),
                Column::SampleId => Some("Sample ID"),
                Column::WellLocation => Some("Well location"),
                Column::Nanoparticle => Some("Nanoparticle"),
                Column::NanoparticleId => Some("Nanoparticle ID"),
                Column::Control => Some("Control"),
                Column::ControlId => Some("Control ID"),
                Column::InstrumentName => Some("Instrument name"),
                Column::DateSamplePreparation => Some("Date sample preparation"),
                Column::SampleVolume => Some("Sample volume"),
                Column::PeptideConcentration => Some("Peptide concentration"),
                Column::PeptideMassSample => Some("Peptide mass sample"),
                Column::ReconVolume => Some("Recon volume"),
                Column::DilutionFactor => Some("Dilution factor"),
                Column::KitId => Some("Kit ID"),
                Column::PlateId => Some("Plate ID"),
                Column::PlateName => Some("Plate Name"),
                Column::AssayVersion => Some("Assay"),
                Column::SampleTubeId | Column::MethodSetId | Column::AssayMethodId => None,
            },
            Product::Xtr => match self {
                Column::MsFileName => Some("MS file name"),
                Column::SampleName => Some("Sample name"),
                Column::SampleId => Some("Sample ID"),
                Column::WellLocation => Some("Well location"),
                Column::Nanoparticle => Some("Nanoparticle set"),
                Column::NanoparticleId => Some("Nanoparticle set ID"),
                Column::ControlId => Some("Control ID"),
                Column::InstrumentName => Some("Instrument ID"),
                Column::DateSamplePreparation => Some("Date assay initiated"),
                Column::SampleVolume => Some("Sample volume"),
                Column::PeptideConcentration => Some("Reconstituted peptide concentration"),
                Column::PeptideMassSample => Some("Recovered peptide mass"),
                Column::ReconVolume => Some("Reconstitution volume"),
                Column::PlateId => Some("Plate ID"),
                Column::PlateName => Some("Plate Name"),
                Column::AssayVersion => Some("Assay product"),
                Column::SampleTubeId => Some("Sample tube ID"),
                Column::MethodSetId => Some("Method set ID"),
                Column::AssayMethodId => Some("Assay method ID"),
                Column::Control | Column::DilutionFactor | Column::KitId => None,
            },
        }
    }
}

/// Column-oriented plate map keyed by MS file name.
///
/// Attribute vectors are padded with `None` up to the MS file count and
/// may never exceed it.
#[derive(Debug, Clone)]
pub struct PlateMap {
    ms_file_name: Vec<String>,
    columns: Vec<(Column, Vec<Option<String>>)>,
    product: Product,
}

impl PlateMap {
    pub fn new(ms_file_name: Vec<String>) -> Result<Self> {
        if ms_file_name.is_empty() {
            return Err(Error::InvalidInput(
                "MS file name(s) must be provided".into(),
            ));
        }
        let length = ms_file_name.len();
        let columns = COLUMNS
            .iter()
            .filter(|c| **c != Column::MsFileName)
            .map(|c| (*c, vec![None; length]))
            .collect();
        Ok(PlateMap {
            ms_file_name,
            columns,
            product: Product::default(),
        })
    }

    pub fn with_product(mut self, product: Product) -> Self {
        self.product = product;
        self
    }

    pub fn product(&self) -> Product {
        self.product
    }

    /// Number of MS files (and therefore rows).
    pub fn len(&self) -> usize {
        self.ms_file_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ms_file_name.is_empty()
    }

    pub fn ms_file_names(&self) -> &[String] {
        &self.ms_file_name
    }

    /// Sets an attribute column. Shorter vectors are padded with `None`;
    /// vectors longer than the MS file count are rejected.
    pub fn set<S: Into<String>>(&mut self, column: Column, values: Vec<S>) -> Result<()> {
        if column == Column::MsFileName {
            return Err(Error::InvalidInput(
                "MS file names are fixed at construction".into(),
            ));
        }
        if values.len() > self.len() {
            return Err(Error::InvalidInput(
                "parameter lengths must not exceed the number of MS files".into(),
            ));
        }
        let mut padded: Vec<Option<String>> = values.into_iter().map(|v| Some(v.into())).collect();
        padded.resize(self.len(), None);
        for slot in &mut self.columns {
            if slot.0 == column {
                slot.1 = padded;
                return Ok(());
            }
        }
        unreachable!("all columns are present from construction")
    }

    pub fn column(&self, column: Column) -> Option<&[Option<String>]> {
        if column == Column::MsFileName {
            return None;
        }
        self.columns
            .iter()
            .find(|(c, _)| *c == column)
            .map(|(_, values)| values.as_slice())
    }

    /// Renders the plate map as a [`Table`] with the product dialect's
    /// headers, in canonical column order. Empty cells stand in for
    /// unset values.
    pub fn to_table(&self) -> Result<Table> {
        let mut headers = Vec::new();
        let mut included = Vec::new();
        for column in COLUMNS {
            if let Some(header) = column.header(self.product) {
                headers.push(header.to_string());
                included.push(column);
            }
        }
        let mut table = Table::new(headers);
        for row in 0..self.len() {
            let mut record = Vec::with_capacity(included.len());
            for column in &included {
                if *column == Column::MsFileName {
                    record.push(self.ms_file_name[row].clone());
                } else {
                    let value = self
                        .column(*column)
                        .and_then(|values| values[row].clone())
                        .unwrap_or_default();
                    record.push(value);
                }
            }
            table.push_row(record)?;
        }
        Ok(table)
    }

    pub fn to_csv(&self) -> Result<String> {
        self.to_table()?.to_csv()
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        self.to_table()?.write_csv(path)
    }
}

/// Payload for one msdata row posted to `api/v1/msdatas/batch`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MsDataRow {
    #[serde(rename = "sampleId")]
    pub sample_id: String,
    pub sample_id_tracking: String,
    #[serde(rename = "wellLocation")]
    pub well_location: String,
    pub nanoparticle: String,
    #[serde(rename = "nanoparticleID")]
    pub nanoparticle_id: String,
    pub control: String,
    #[serde(rename = "controlID")]
    pub control_id: String,
    #[serde(rename = "instrumentName")]
    pub instrument_name: String,
    #[serde(rename = "dateSamplePrep")]
    pub date_sample_prep: String,
    #[serde(rename = "sampleVolume")]
    pub sample_volume: String,
    #[serde(rename = "peptideConcentration")]
    pub peptide_concentration: String,
    #[serde(rename = "peptideMassSample")]
    pub peptide_mass_sample: String,
    #[serde(rename = "dilutionFactor")]
    pub dilution_factor: String,
    #[serde(rename = "msdataUserGroup")]
    pub msdata_user_group: Option<String>,
    #[serde(rename = "rawFilePath")]
    pub raw_file_path: String,
}

fn required_column<'t>(table: &'t Table, name: &str) -> Result<Vec<&'t str>> {
    table
        .column(name)
        .ok_or_else(|| Error::InvalidInput(format!("plate map is missing the '{name}' column")))
}

/// Checks a plate-map table against the MS data files staged for
/// upload: one row per file, and every listed file present.
pub fn validate_plate_map(plate_map: &Table, local_file_names: &[String]) -> Result<()> {
    let files = required_column(plate_map, "MS file name")?;
    let local: HashSet<&str> = local_file_names.iter().map(String::as_str).collect();
    if files.len() != local.len() {
        return Err(Error::InvalidInput("plate map file is invalid".into()));
    }
    for file in files {
        if !local.contains(file) {
            return Err(Error::InvalidInput(
                "plate map file does not contain the attached MS data files".into(),
            ));
        }
    }
    Ok(())
}

/// Builds the `samples/batch` payload rows from a plate-map table.
///
/// When a sample description table is supplied, its columns are merged
/// into the matching row (matched on `Sample name`) with camelCased
/// keys.
pub fn sample_info_from_plate_map(
    plate_id: &str,
    plate_map: &Table,
    space: Option<&str>,
    sample_description: Option<&Table>,
) -> Result<Vec<Extra>> {
    let sample_ids = required_column(plate_map, "Sample ID")?;
    let sample_names = required_column(plate_map, "Sample name")?;

    let mut result = Vec::with_capacity(plate_map.len());
    for row in 0..plate_map.len() {
        let mut info = Extra::new();
        info.insert("plateID".into(), Value::from(plate_id));
        info.insert("sampleID".into(), Value::from(sample_ids[row]));
        info.insert("sampleName".into(), Value::from(sample_names[row]));
        info.insert(
            "sampleUserGroup".into(),
            space.map(Value::from).unwrap_or(Value::Null),
        );

        if let Some(description) = sample_description {
            if let Some(record) = description.record(row) {
                // "Sample Name" and "Sample name" are both seen in the
                // wild for the join column.
                let name = record
                    .get("Sample name")
                    .or_else(|| record.get("Sample Name"))
                    .copied();
                if name == Some(sample_names[row]) {
                    for (key, value) in record {
                        let key = if key == "Sample Name" { "Sample name" } else { key };
                        info.insert(camel_case(key), Value::from(value));
                    }
                }
            }
        }

        result.push(info);
    }
    Ok(result)
}

/// Builds the `msdatas/batch` payload rows, pairing each plate-map row
/// with the sample record created for it and the raw file path its MS
/// file was uploaded to.
pub fn msdata_rows_from_plate_map(
    plate_map: &Table,
    samples: &[Sample],
    raw_file_paths: &HashMap<String, String>,
    space: Option<&str>,
) -> Result<Vec<MsDataRow>> {
    let files = required_column(plate_map, "MS file name")?;
    let sample_ids = required_column(plate_map, "Sample ID")?;
    let sample_names = required_column(plate_map, "Sample name")?;

    if samples.len() < plate_map.len() {
        return Err(Error::InvalidInput("plate map file is invalid".into()));
    }

    let cell = |row: usize, column: &str| -> String {
        plate_map.get(row, column).unwrap_or_default().to_string()
    };

    let mut result = Vec::with_capacity(plate_map.len());
    for row in 0..plate_map.len() {
        let sample = &samples[row];
        let matches = sample.sample_id.as_deref() == Some(sample_ids[row])
            && sample.sample_name.as_deref() == Some(sample_names[row]);
        let path = raw_file_paths.get(files[row]);
        let (sample_uuid, path) = match (matches, path) {
            (true, Some(path)) if !path.is_empty() => (sample.id.clone(), path.clone()),
            _ => return Err(Error::InvalidInput("plate map file is invalid".into())),
        };

        result.push(MsDataRow {
            sample_id: sample_uuid,
            sample_id_tracking: sample_ids[row].to_string(),
            well_location: cell(row, "Well location"),
            nanoparticle: cell(row, "Nanoparticle"),
            nanoparticle_id: cell(row, "Nanoparticle ID"),
            control: cell(row, "Control"),
            control_id: cell(row, "Control ID"),
            instrument_name: cell(row, "Instrument name"),
            date_sample_prep: cell(row, "Date sample preparation"),
            sample_volume: cell(row, "Sample volume"),
            peptide_concentration: cell(row, "Peptide concentration"),
            peptide_mass_sample: cell(row, "Peptide mass sample"),
            dilution_factor: cell(row, "Dilution factor"),
            msdata_user_group: space.map(str::to_string),
            raw_file_path: path,
        });
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Sample;

    fn sample(id: &str, sample_id: &str, name: &str) -> Sample {
        Sample {
            id: id.to_string(),
            sample_id: Some(sample_id.to_string()),
            sample_name: Some(name.to_string()),
            ..Sample::default()
        }
    }

    #[test]
    fn xt_headers_in_canonical_order() {
        let map = PlateMap::new(vec!["run1.raw".into(), "run2.raw".into()]).unwrap();
        let table = map.to_table().unwrap();
        assert_eq!(
            table.headers(),
            &[
                "MS file name",
                "Sample name",
                "Sample ID",
                "Well location",
                "Nanoparticle",
                "Nanoparticle ID",
                "Control",
                "Control ID",
                "Instrument name",
                "Date sample preparation",
                "Sample volume",
                "Peptide concentration",
                "Peptide mass sample",
                "Recon volume",
                "Dilution factor",
                "Kit ID",
                "Plate ID",
                "Plate Name",
                "Assay",
            ]
        );
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0, "MS file name"), Some("run1.raw"));
        assert_eq!(table.get(0, "Sample name"), Some(""));
    }

    #[test]
    fn xtr_headers_swap_dialect_specific_columns() {
        let map = PlateMap::new(vec!["run1.raw".into()])
            .unwrap()
            .with_product(Product::Xtr);
        let table = map.to_table().unwrap();
        let headers = table.headers();
        assert!(headers.contains(&"Nanoparticle set".to_string()));
        assert!(headers.contains(&"Sample tube ID".to_string()));
        assert!(headers.contains(&"Assay product".to_string()));
        assert!(!headers.contains(&"Control".to_string()));
        assert!(!headers.contains(&"Kit ID".to_string()));
        assert!(!headers.contains(&"Dilution factor".to_string()));
    }

    #[test]
    fn attribute_vectors_are_padded_not_extended() {
        let mut map =
            PlateMap::new(vec!["a.raw".into(), "b.raw".into(), "c.raw".into()]).unwrap();
        map.set(Column::SampleName, vec!["one", "two"]).unwrap();
        assert_eq!(
            map.column(Column::SampleName).unwrap(),
            &[Some("one".to_string()), Some("two".to_string()), None]
        );
        assert!(map
            .set(Column::SampleId, vec!["1", "2", "3", "4"])
            .is_err());
    }

    #[test]
    fn empty_file_list_is_rejected() {
        assert!(PlateMap::new(Vec::new()).is_err());
    }

    #[test]
    fn plate_map_must_cover_local_files_exactly() {
        let table =
            Table::from_csv("MS file name,Sample ID\na.raw,S1\nb.raw,S2\n").unwrap();
        let both = vec!["a.raw".to_string(), "b.raw".to_string()];
        assert!(validate_plate_map(&table, &both).is_ok());

        let missing = vec!["a.raw".to_string()];
        assert!(validate_plate_map(&table, &missing).is_err());

        let other = vec!["a.raw".to_string(), "c.raw".to_string()];
        assert!(validate_plate_map(&table, &other).is_err());
    }

    #[test]
    fn sample_info_merges_description_columns() {
        let plate_map = Table::from_csv(
            "MS file name,Sample ID,Sample name\na.raw,S1,First\nb.raw,S2,Second\n",
        )
        .unwrap();
        let description =
            Table::from_csv("Sample Name,Tissue type\nFirst,plasma\nOther,serum\n").unwrap();

        let info = sample_info_from_plate_map(
            "plate-1",
            &plate_map,
            Some("my-space"),
            Some(&description),
        )
        .unwrap();
        assert_eq!(info.len(), 2);
        assert_eq!(info[0]["plateID"], "plate-1");
        assert_eq!(info[0]["sampleID"], "S1");
        assert_eq!(info[0]["sampleName"], "First");
        assert_eq!(info[0]["sampleUserGroup"], "my-space");
        assert_eq!(info[0]["tissueType"], "plasma");
        // Second row's description name does not match, so nothing merges.
        assert!(!info[1].contains_key("tissueType"));
        assert_eq!(info[1]["sampleUserGroup"], "my-space");
    }

    #[test]
    fn msdata_rows_pair_samples_with_uploaded_paths() {
        let plate_map = Table::from_csv(
            "MS file name,Sample ID,Sample name,Well location\na.raw,S1,First,A1\n",
        )
        .unwrap();
        let samples = vec![sample("uuid-1", "S1", "First")];
        let mut paths = HashMap::new();
        paths.insert(
            "a.raw".to_string(),
            "/bucket/upload/prefix/a.raw".to_string(),
        );

        let rows =
            msdata_rows_from_plate_map(&plate_map, &samples, &paths, Some("my-space")).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].sample_id, "uuid-1");
        assert_eq!(rows[0].sample_id_tracking, "S1");
        assert_eq!(rows[0].well_location, "A1");
        assert_eq!(rows[0].nanoparticle, "");
        assert_eq!(rows[0].msdata_user_group.as_deref(), Some("my-space"));
        assert_eq!(rows[0].raw_file_path, "/bucket/upload/prefix/a.raw");
    }

    #[test]
    fn msdata_rows_reject_mismatched_samples() {
        let plate_map =
            Table::from_csv("MS file name,Sample ID,Sample name\na.raw,S1,First\n").unwrap();
        let wrong = vec![sample("uuid-1", "S9", "First")];
        let mut paths = HashMap::new();
        paths.insert("a.raw".to_string(), "/bucket/x/y/a.raw".to_string());
        assert!(msdata_rows_from_plate_map(&plate_map, &wrong, &paths, None).is_err());

        let right = vec![sample("uuid-1", "S1", "First")];
        let empty = HashMap::new();
        assert!(msdata_rows_from_plate_map(&plate_map, &right, &empty, None).is_err());
    }
}
