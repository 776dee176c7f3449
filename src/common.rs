//! Shared validation and string helpers used across the SDK surface.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, Result};

/// SDK version reported to the backend in the `x-seer-id` header.
pub fn sdk_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Extensions the backend accepts for MS data uploads. Dotted pairs
/// (`.d.zip`, `.wiff.scan`) count as a single extension.
const MS_DATA_EXTENSIONS: [&str; 6] = [".d", ".d.zip", ".mzml", ".raw", ".wiff", ".wiff.scan"];

/// Converts a column or field name into camelCase.
///
/// Underscores and hyphens are treated as word separators, each word is
/// title-cased, separators are dropped, and the leading character is
/// lowercased. Uncased characters (digits, CJK, emoji) act as word
/// boundaries without being altered.
pub fn camel_case(s: &str) -> String {
    static SEPARATORS: OnceLock<Regex> = OnceLock::new();
    let separators = SEPARATORS.get_or_init(|| Regex::new(r"(_|-)+").expect("static regex"));

    let spaced = separators.replace_all(s, " ");

    let mut titled = String::with_capacity(spaced.len());
    let mut prev_cased = false;
    for ch in spaced.chars() {
        let cased = ch.is_lowercase() || ch.is_uppercase();
        if ch == ' ' {
            prev_cased = false;
            continue;
        }
        if cased && !prev_cased {
            titled.extend(ch.to_uppercase());
        } else if cased {
            titled.extend(ch.to_lowercase());
        } else {
            titled.push(ch);
        }
        prev_cased = cased;
    }

    let mut chars = titled.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => titled,
    }
}

/// A PAS folder path must not carry leading, trailing, or consecutive
/// forward slashes.
pub fn valid_pas_folder_path(path: &str) -> bool {
    !path.is_empty()
        && !path.starts_with('/')
        && !path.ends_with('/')
        && !path.contains("//")
}

/// Character whitelist for user-supplied entity names such as plate ids
/// and plate names. Enforced client-side so a rejected name does not
/// leave an empty record behind on the backend.
pub fn entity_name_ruler(name: &str) -> bool {
    static RULER: OnceLock<Regex> = OnceLock::new();
    let ruler =
        RULER.get_or_init(|| Regex::new(r"^[A-Za-z0-9 ._()+-]+$").expect("static regex"));
    !name.trim().is_empty() && ruler.is_match(name)
}

/// Whether a file name carries an accepted MS data extension.
pub fn valid_ms_data_extension(filename: &str) -> bool {
    let basename = filename.rsplit('/').next().unwrap_or(filename);
    let parts: Vec<&str> = basename.split('.').collect();
    let extension = if parts.len() >= 3 {
        format!(".{}.{}", parts[parts.len() - 2], parts[parts.len() - 1])
    } else {
        match parts.last() {
            Some(last) if parts.len() == 2 => format!(".{last}"),
            _ => return false,
        }
    };
    MS_DATA_EXTENSIONS.contains(&extension.to_lowercase().as_str())
}

/// Whether an MS data file exists on disk and carries an accepted
/// extension.
pub fn valid_ms_data_file(path: &Path) -> bool {
    if !path.exists() {
        return false;
    }
    path.file_name()
        .and_then(|name| name.to_str())
        .map(valid_ms_data_extension)
        .unwrap_or(false)
}

/// Strips the storage prefix (bucket, tenant, plate segments) from a raw
/// file path as returned by the backend, keeping everything after the
/// third `/`.
pub fn trim_raw_file_path(path: &str) -> String {
    path.splitn(4, '/').last().unwrap_or(path).to_string()
}

/// Validates a contrast vector against the number of sample groups.
///
/// A contrast must have one entry per group (and at least two), every
/// entry must be -1, 0, or 1, and exactly one 1 and one -1 must appear.
pub fn validate_contrast(contrast: &[i32], ngroups: usize) -> Result<()> {
    if contrast.len() < 2 {
        return Err(Error::InvalidInput(
            "contrast must have at least 2 elements".into(),
        ));
    }
    if contrast.len() != ngroups {
        return Err(Error::InvalidInput(format!(
            "contrast {contrast:?} must have {ngroups} elements"
        )));
    }
    if contrast.iter().any(|v| !(-1..=1).contains(v)) {
        return Err(Error::InvalidInput(format!(
            "contrast {contrast:?} must be a list of -1, 0, or 1"
        )));
    }
    let ones = contrast.iter().filter(|&&v| v == 1).count();
    let neg_ones = contrast.iter().filter(|&&v| v == -1).count();
    if ones != 1 {
        return Err(Error::InvalidInput(format!(
            "contrast {contrast:?} must have exactly one 1"
        )));
    }
    if neg_ones != 1 {
        return Err(Error::InvalidInput(format!(
            "contrast {contrast:?} must have exactly one -1"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camel_case_separators() {
        assert_eq!(camel_case("my favorite"), "myFavorite");
        assert_eq!(camel_case("my Favorite"), "myFavorite");
        assert_eq!(camel_case("My favorite"), "myFavorite");
        assert_eq!(camel_case("My Favorite"), "myFavorite");
        assert_eq!(camel_case("snake_case"), "snakeCase");
        assert_eq!(camel_case("snake_Case"), "snakeCase");
        assert_eq!(camel_case("Snake_case"), "snakeCase");
        assert_eq!(camel_case("Snake_Case"), "snakeCase");
        assert_eq!(camel_case("kebab-case"), "kebabCase");
        assert_eq!(camel_case("Kebab-Case"), "kebabCase");
    }

    #[test]
    fn camel_case_single_word() {
        assert_eq!(camel_case("camelcase"), "camelcase");
        assert_eq!(camel_case("camelCase"), "camelcase");
        assert_eq!(camel_case("Camelcase"), "camelcase");
        assert_eq!(camel_case("CamelCase"), "camelcase");
    }

    #[test]
    fn camel_case_corner_cases() {
        assert_eq!(camel_case("two\nlines"), "two\nLines");
        assert_eq!(camel_case("Two\nLines"), "two\nLines");
        assert_eq!(camel_case("über コンピュータコード"), "überコンピュータコード");
        assert_eq!(camel_case("Über コンピュータコード"), "überコンピュータコード");
        assert_eq!(camel_case("clap👏back"), "clap👏Back");
        assert_eq!(camel_case("Clap👏Back"), "clap👏Back");
    }

    #[test]
    fn folder_paths() {
        assert!(valid_pas_folder_path("foo"));
        assert!(valid_pas_folder_path("foo/bar"));
        assert!(valid_pas_folder_path("foo/bar/baz"));
        assert!(!valid_pas_folder_path("foo/bar/"));
        assert!(!valid_pas_folder_path("/foo/bar"));
        assert!(!valid_pas_folder_path("foo//bar"));
        assert!(!valid_pas_folder_path("foo/bar//"));
        assert!(!valid_pas_folder_path("//foo/bar/"));
        assert!(!valid_pas_folder_path("foo///bar"));
        assert!(!valid_pas_folder_path(""));
    }

    #[test]
    fn entity_names() {
        assert!(entity_name_ruler("Plate 12"));
        assert!(entity_name_ruler("SDK-plate.2024 (rev+1)"));
        assert!(!entity_name_ruler(""));
        assert!(!entity_name_ruler("   "));
        assert!(!entity_name_ruler("plate/12"));
        assert!(!entity_name_ruler("plate#12"));
    }

    #[test]
    fn ms_data_extensions() {
        assert!(valid_ms_data_extension("run1.raw"));
        assert!(valid_ms_data_extension("run1.RAW"));
        assert!(valid_ms_data_extension("run1.d"));
        assert!(valid_ms_data_extension("run1.d.zip"));
        assert!(valid_ms_data_extension("run1.mzML"));
        assert!(valid_ms_data_extension("run1.wiff"));
        assert!(valid_ms_data_extension("run1.wiff.scan"));
        assert!(!valid_ms_data_extension("run1.txt"));
        assert!(!valid_ms_data_extension("run1.zip"));
        assert!(!valid_ms_data_extension("run1"));
    }

    #[test]
    fn ms_data_file_requires_existing_path() {
        assert!(!valid_ms_data_file(Path::new("/definitely/not/here.raw")));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run1.raw");
        std::fs::write(&path, b"").unwrap();
        assert!(valid_ms_data_file(&path));

        let bad = dir.path().join("run1.csv");
        std::fs::write(&bad, b"").unwrap();
        assert!(!valid_ms_data_file(&bad));
    }

    #[test]
    fn raw_file_path_trimming() {
        assert_eq!(
            trim_raw_file_path("bucket/tenant-id/plate-uuid/run1.raw"),
            "run1.raw"
        );
        // A leading slash counts as an empty first segment.
        assert_eq!(
            trim_raw_file_path("/bucket/tenant-id/plate-uuid/run1.raw"),
            "plate-uuid/run1.raw"
        );
        assert_eq!(
            trim_raw_file_path("bucket/tenant-id/folder/sub/run1.raw"),
            "sub/run1.raw"
        );
        assert_eq!(trim_raw_file_path("a/b"), "b");
    }

    #[test]
    fn contrast_validation() {
        assert!(validate_contrast(&[1, -1], 2).is_ok());
        assert!(validate_contrast(&[0, 1, -1, 0], 4).is_ok());
        assert!(validate_contrast(&[1], 1).is_err());
        assert!(validate_contrast(&[1, -1], 3).is_err());
        assert!(validate_contrast(&[2, -1], 2).is_err());
        assert!(validate_contrast(&[1, 1, -1], 3).is_err());
        assert!(validate_contrast(&[1, -1, -1], 3).is_err());
        assert!(validate_contrast(&[0, 0], 2).is_err());
    }
}
