use std::path::{Component, Path, PathBuf};

/// Maximum allowed path length for security
const MAX_PATH_LENGTH: usize = 4096;

/// Maximum length of a single file name
const MAX_NAME_LENGTH: usize = 255;

/// Validate a path received through a service message
///
/// Paths must be absolute and free of `..` components, since they name
/// files and destinations chosen elsewhere and are used as-is.
pub fn validate_path(path: &Path) -> Result<(), String> {
    let path_str = path.to_string_lossy();

    if path_str.len() > MAX_PATH_LENGTH {
        return Err(format!("Path too long (max {MAX_PATH_LENGTH} bytes)"));
    }

    if path_str.bytes().any(|b| b == 0) {
        return Err("Path contains null bytes".to_string());
    }

    if !path.is_absolute() {
        return Err(format!("Path must be absolute: {}", path.display()));
    }

    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err("Path traversal detected (..)".to_string());
    }

    Ok(())
}

/// Validate a bare file name (no directory part)
pub fn validate_file_name(name: &str) -> Result<(), String> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(format!("Invalid file name: '{name}'"));
    }

    if name.len() > MAX_NAME_LENGTH {
        return Err(format!("File name too long (max {MAX_NAME_LENGTH} bytes)"));
    }

    if name.contains('/') || name.contains('\0') {
        return Err(format!("File name contains a separator or null byte: '{name}'"));
    }

    Ok(())
}

/// Join `name` onto `dir`, ensuring the result stays directly inside `dir`
pub fn join_file_name(dir: &Path, name: &str) -> Result<PathBuf, String> {
    validate_file_name(name)?;
    let joined = dir.join(name);

    if joined.parent() != Some(dir) {
        return Err("Path traversal detected: file would land outside the destination".to_string());
    }

    Ok(joined)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_path_rejects_traversal() {
        assert!(validate_path(Path::new("/storage/../etc/passwd")).is_err());
        assert!(validate_path(Path::new("relative/dir")).is_err());
    }

    #[test]
    fn test_validate_path_rejects_null_bytes() {
        assert!(validate_path(Path::new("/test\0file")).is_err());
    }

    #[test]
    fn test_validate_path_accepts_valid() {
        assert!(validate_path(Path::new("/storage/emulated/0/Pictures")).is_ok());
        assert!(validate_path(Path::new("/tmp/Screen recordings/a b.mp4")).is_ok());
    }

    #[test]
    fn test_join_file_name_blocks_traversal() {
        let dir = Path::new("/dest");
        assert_eq!(join_file_name(dir, "a.jpg").unwrap(), PathBuf::from("/dest/a.jpg"));
        assert!(join_file_name(dir, "../a.jpg").is_err());
        assert!(join_file_name(dir, "..").is_err());
        assert!(join_file_name(dir, "").is_err());
    }
}
