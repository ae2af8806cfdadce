//! Specification type and version detection

use super::DocumentIndex;
use crate::error::DocumentError;
use crate::rule::SpecFormat;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecType {
    OpenApi,
    Swagger,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Yaml,
    Json,
}

impl FileType {
    pub fn detect(source: &str) -> Self {
        match source.trim_start().chars().next() {
            Some('{') | Some('[') => FileType::Json,
            _ => FileType::Yaml,
        }
    }
}

/// What kind of document is being linted
#[derive(Debug, Clone, Serialize)]
pub struct SpecInfo {
    pub spec_type: SpecType,
    pub format: Option<SpecFormat>,
    pub version: String,
    pub file_name: String,
    pub file_type: FileType,
}

impl SpecInfo {
    /// Detect the specification type of the root document
    pub fn extract(index: &DocumentIndex, file_name: &str) -> Result<Self, DocumentError> {
        let root = index.raw().root();
        let file_type = index
            .files()
            .first()
            .map(|f| f.file_type)
            .unwrap_or(FileType::Yaml);

        if let Some(version) = root.get("openapi").and_then(|v| v.text()) {
            let (major, minor) = parse_version(version);
            if major < 3 {
                return Err(DocumentError::OpenApiVersion(version.to_string()));
            }
            let format = if major > 3 || minor >= 1 {
                SpecFormat::Oas31
            } else {
                SpecFormat::Oas3
            };
            return Ok(Self {
                spec_type: SpecType::OpenApi,
                format: Some(format),
                version: version.to_string(),
                file_name: file_name.to_string(),
                file_type,
            });
        }

        if let Some(version) = root.get("swagger").and_then(|v| v.text()) {
            let (major, _) = parse_version(version);
            if major > 2 || major == 0 {
                return Err(DocumentError::SwaggerVersion(version.to_string()));
            }
            return Ok(Self {
                spec_type: SpecType::Swagger,
                format: Some(SpecFormat::Oas2),
                version: version.to_string(),
                file_name: file_name.to_string(),
                file_type,
            });
        }

        Err(DocumentError::Unsupported)
    }

    /// Info for a document whose type could not be determined
    pub fn unknown(index: &DocumentIndex, file_name: &str) -> Self {
        Self {
            spec_type: SpecType::Unknown,
            format: None,
            version: String::new(),
            file_name: file_name.to_string(),
            file_type: index
                .files()
                .first()
                .map(|f| f.file_type)
                .unwrap_or(FileType::Yaml),
        }
    }

    pub fn is_oas3(&self) -> bool {
        matches!(self.format, Some(SpecFormat::Oas3) | Some(SpecFormat::Oas31))
    }
}

fn parse_version(version: &str) -> (u32, u32) {
    let mut parts = version.trim().split('.');
    let major = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    let minor = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    (major, minor)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(doc: &str) -> Result<SpecInfo, DocumentError> {
        let index = DocumentIndex::parse(doc.as_bytes(), "spec.yaml").unwrap();
        SpecInfo::extract(&index, "spec.yaml")
    }

    #[test]
    fn test_detect_formats() {
        assert_eq!(extract("openapi: 3.0.3\n").unwrap().format, Some(SpecFormat::Oas3));
        assert_eq!(extract("openapi: '3.1.0'\n").unwrap().format, Some(SpecFormat::Oas31));
        assert_eq!(extract("openapi: 3.1\n").unwrap().format, Some(SpecFormat::Oas31));
        let swagger = extract("swagger: '2.0'\n").unwrap();
        assert_eq!(swagger.format, Some(SpecFormat::Oas2));
        assert_eq!(swagger.spec_type, SpecType::Swagger);
    }

    #[test]
    fn test_version_mismatches() {
        assert!(matches!(
            extract("openapi: 2.0\n"),
            Err(DocumentError::OpenApiVersion(_))
        ));
        assert!(matches!(
            extract("swagger: 3.0\n"),
            Err(DocumentError::SwaggerVersion(_))
        ));
        assert!(matches!(
            extract("asyncapi: 2.0.0\n"),
            Err(DocumentError::Unsupported)
        ));
    }

    #[test]
    fn test_file_type() {
        let index = DocumentIndex::parse(br#"{"openapi": "3.0.0"}"#, "spec.json").unwrap();
        let info = SpecInfo::extract(&index, "spec.json").unwrap();
        assert_eq!(info.file_type, FileType::Json);
        assert!(info.is_oas3());
    }
}
