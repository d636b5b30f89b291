//! Validation of user-editable configuration values and message identifiers
//!
//! Values arrive either from the YAML configuration or from service messages
//! sent by the UI layer, so both are checked before they reach the observers.

use crate::media::FileType;
use anyhow::{bail, Result};
use std::collections::BTreeMap;

/// Validate extra file extensions
///
/// Extensions are given without the leading dot. They end up inside a glob
/// pattern, so anything that changes the glob's meaning is rejected.
pub fn validate_extensions(extensions: &[String]) -> Result<()> {
    const MAX_EXTENSIONS: usize = 64;
    const MAX_EXTENSION_LENGTH: usize = 16;

    if extensions.len() > MAX_EXTENSIONS {
        bail!(
            "Too many extra extensions: {} (max: {})",
            extensions.len(),
            MAX_EXTENSIONS
        );
    }

    for extension in extensions {
        let trimmed = extension.trim().trim_start_matches('.');

        if trimmed.is_empty() {
            continue;
        }

        if trimmed.len() > MAX_EXTENSION_LENGTH {
            bail!(
                "Extension too long: '{}' ({} chars, max: {})",
                trimmed,
                trimmed.len(),
                MAX_EXTENSION_LENGTH
            );
        }

        if !trimmed.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            bail!("Extension contains invalid characters: '{}'", trimmed);
        }

        globset::Glob::new(&format!("*.{trimmed}"))
            .map_err(|e| anyhow::anyhow!("Invalid extension '{}': {}", trimmed, e))?;
    }

    Ok(())
}

/// Validate a known app directory name
///
/// Compared against single path components, so separators are not allowed.
pub fn validate_app_dir_name(name: &str) -> Result<()> {
    const MAX_NAME_LENGTH: usize = 255;

    if name.trim().is_empty() {
        bail!("App directory name cannot be empty");
    }

    if name.len() > MAX_NAME_LENGTH {
        bail!(
            "App directory name too long: {} chars (max: {})",
            name.len(),
            MAX_NAME_LENGTH
        );
    }

    if name.contains('/') || name.contains('\\') || name.contains('\0') || name == ".." {
        bail!("App directory name must be a single path component: '{}'", name);
    }

    Ok(())
}

/// Validate a batch id carried by a service message
pub fn validate_batch_id(batch_id: &str) -> Result<()> {
    const MAX_BATCH_ID_LENGTH: usize = 100;

    if batch_id.is_empty() {
        bail!("Batch ID cannot be empty");
    }

    if batch_id.len() > MAX_BATCH_ID_LENGTH {
        bail!(
            "Batch ID too long: {} chars (max: {})",
            batch_id.len(),
            MAX_BATCH_ID_LENGTH
        );
    }

    if !batch_id.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_') {
        bail!("Batch ID contains invalid characters: '{}'", batch_id);
    }

    Ok(())
}

/// Lists extensions declared by more than one file type
///
/// Overlaps are not an error: the classifier resolves them by declaration
/// order. Each returned string names the extension and the winning type.
pub fn find_extension_overlaps(declared: &[(FileType, Vec<String>)]) -> Vec<String> {
    let mut owners: BTreeMap<&str, Vec<FileType>> = BTreeMap::new();
    for (file_type, extensions) in declared {
        for extension in extensions {
            let types = owners.entry(extension.as_str()).or_default();
            if !types.contains(file_type) {
                types.push(*file_type);
            }
        }
    }

    owners
        .into_iter()
        .filter(|(_, types)| types.len() > 1)
        .map(|(extension, types)| {
            let labels: Vec<&str> = types.iter().map(|t| t.label()).collect();
            format!(
                "Extension '{}' is declared by {}; {} takes priority",
                extension,
                labels.join(", "),
                labels[0]
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_extensions_valid() {
        let extensions = vec!["cr2".to_string(), ".nef".to_string(), "".to_string()];
        assert!(validate_extensions(&extensions).is_ok());
    }

    #[test]
    fn test_validate_extensions_rejects_glob_syntax() {
        assert!(validate_extensions(&["{png,jpg}".to_string()]).is_err());
        assert!(validate_extensions(&["p*g".to_string()]).is_err());
        assert!(validate_extensions(&["a/b".to_string()]).is_err());
    }

    #[test]
    fn test_validate_extensions_too_many() {
        let extensions: Vec<String> = (0..65).map(|i| format!("e{i}")).collect();
        assert!(validate_extensions(&extensions).is_err());
    }

    #[test]
    fn test_validate_app_dir_name() {
        assert!(validate_app_dir_name("Telegram").is_ok());
        assert!(validate_app_dir_name("WhatsApp Images").is_ok());
        assert!(validate_app_dir_name("").is_err());
        assert!(validate_app_dir_name("a/b").is_err());
        assert!(validate_app_dir_name("..").is_err());
    }

    #[test]
    fn test_validate_batch_id() {
        assert!(validate_batch_id("batch-1").is_ok());
        assert!(validate_batch_id("").is_err());
        assert!(validate_batch_id("batch;rm -rf /").is_err());
        assert!(validate_batch_id(&"a".repeat(101)).is_err());
    }

    #[test]
    fn test_find_extension_overlaps_names_first_declared() {
        let declared = vec![
            (FileType::Text, vec!["txt".to_string(), "xml".to_string()]),
            (FileType::EBook, vec!["xml".to_string(), "epub".to_string()]),
        ];
        let overlaps = find_extension_overlaps(&declared);
        assert_eq!(overlaps.len(), 1);
        assert!(overlaps[0].contains("'xml'"));
        assert!(overlaps[0].ends_with("Text takes priority"));
    }
}
