use std::fmt;
use thiserror::Error;

/// Boxed underlying cause carried by storage and provider errors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Coarse category a caller can map onto its own response codes
/// (not found, invalid input, dependency failure).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorStatus {
    NotFound,
    Invalid,
    Repository,
    Provider,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryName {
    Products,
    ProductsImportHistory,
}

impl fmt::Display for RepositoryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryName::Products => f.write_str("products"),
            RepositoryName::ProductsImportHistory => f.write_str("products import history"),
        }
    }
}

#[derive(Error, Debug)]
#[error("error in {repository} repository in {method} method: {source}")]
pub struct StorageError {
    pub repository: RepositoryName,
    pub method: &'static str,
    #[source]
    pub source: BoxError,
}

impl StorageError {
    pub fn new(repository: RepositoryName, method: &'static str, source: impl Into<BoxError>) -> Self {
        Self {
            repository,
            method,
            source: source.into(),
        }
    }

    pub fn status(&self) -> ErrorStatus {
        ErrorStatus::Repository
    }
}

/// Stage of the catalog fetch pipeline that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStage {
    DownloadIndex,
    ReadIndex,
    DownloadShard,
    DecompressShard,
    ParseShard,
}

impl FetchStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchStage::DownloadIndex => "download_index",
            FetchStage::ReadIndex => "read_index",
            FetchStage::DownloadShard => "download_shard",
            FetchStage::DecompressShard => "decompress_shard",
            FetchStage::ParseShard => "parse_shard",
        }
    }
}

impl fmt::Display for FetchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
#[error("catalog provider failed at {stage} for `{target}`: {source}")]
pub struct FetchError {
    pub stage: FetchStage,
    pub target: String,
    #[source]
    pub source: BoxError,
}

impl FetchError {
    pub fn new(stage: FetchStage, target: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            stage,
            target: target.into(),
            source: source.into(),
        }
    }

    pub fn status(&self) -> ErrorStatus {
        ErrorStatus::Provider
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {message}")]
    Invalid { key: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_error_names_repository_and_method() {
        let err = StorageError::new(
            RepositoryName::ProductsImportHistory,
            "find last",
            std::io::Error::new(std::io::ErrorKind::Other, "disk gone"),
        );
        assert_eq!(
            err.to_string(),
            "error in products import history repository in find last method: disk gone"
        );
        assert_eq!(err.status(), ErrorStatus::Repository);
    }

    #[test]
    fn fetch_error_keeps_its_cause() {
        let err = FetchError::new(FetchStage::DecompressShard, "products_01.json.gz", "corrupt deflate stream");
        assert!(err.to_string().contains("decompress_shard"));
        assert!(err.to_string().contains("products_01.json.gz"));
        assert_eq!(std::error::Error::source(&err).map(|s| s.to_string()).as_deref(), Some("corrupt deflate stream"));
    }
}
