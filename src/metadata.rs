use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Relevant slice of `/opt/ml/metadata/resource-metadata.json`, the file
/// SageMaker drops on every notebook instance with its own identity.
#[derive(Debug, Deserialize)]
struct ResourceMetadata {
    #[serde(rename = "ResourceName")]
    resource_name: String,
}

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("failed to read instance metadata {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse instance metadata {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error("instance metadata {path} has an empty ResourceName")]
    EmptyName { path: String },
}

/// Name of the notebook instance this process is running on.
pub fn instance_name(path: &Path) -> Result<String, MetadataError> {
    let path_display = path.display().to_string();
    let text = fs::read_to_string(path).map_err(|source| MetadataError::Read {
        path: path_display.clone(),
        source,
    })?;
    let metadata: ResourceMetadata =
        serde_json::from_str(&text).map_err(|source| MetadataError::Parse {
            path: path_display.clone(),
            source,
        })?;
    if metadata.resource_name.trim().is_empty() {
        return Err(MetadataError::EmptyName { path: path_display });
    }
    Ok(metadata.resource_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn metadata_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(contents.as_bytes()).expect("write metadata");
        file
    }

    #[test]
    fn reads_resource_name() {
        let file = metadata_file(
            r#"{"ResourceArn": "arn:aws:sagemaker:us-east-1:123456789012:notebook-instance/my-notebook", "ResourceName": "my-notebook"}"#,
        );
        let name = instance_name(file.path()).expect("should read name");
        assert_eq!(name, "my-notebook");
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let result = instance_name(Path::new("/nonexistent/resource-metadata.json"));
        assert!(matches!(result, Err(MetadataError::Read { .. })));
    }

    #[test]
    fn invalid_json_is_a_parse_error() {
        let file = metadata_file("not json at all");
        let result = instance_name(file.path());
        assert!(matches!(result, Err(MetadataError::Parse { .. })));
    }

    #[test]
    fn blank_name_is_rejected() {
        let file = metadata_file(r#"{"ResourceName": "   "}"#);
        let result = instance_name(file.path());
        assert!(matches!(result, Err(MetadataError::EmptyName { .. })));
    }
}
