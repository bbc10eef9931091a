//! Catalog dump fetcher
//!
//! Downloads the index of shard files, downloads and gunzips every shard,
//! then streams each shard's NDJSON records, keeping only products whose
//! code is not known locally, up to a per-shard cap.
//!
//! Stages 3 to 5 run their shards concurrently and wait for every shard to
//! settle before looking at failures, so no write into the temporary
//! directory is still in flight when cleanup starts. Every exit path removes
//! the files this run created.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flate2::read::MultiGzDecoder;
use futures::future::join_all;
use std::collections::HashSet;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tracing::{debug, error, info, instrument, warn};

use crate::app::ports::{CatalogProviderPort, FileDownloaderPort};
use crate::domain::{CatalogRecord, NewProduct};
use crate::error::{BoxError, FetchError, FetchStage};

/// Local name of the downloaded index inside the temporary directory.
pub const INDEX_LOCAL_NAME: &str = "file-list-products.txt";

pub struct CatalogFetcher {
    downloader: Arc<dyn FileDownloaderPort>,
    base_url: String,
    index_file: String,
    tmp_dir: PathBuf,
}

impl CatalogFetcher {
    pub fn new(
        downloader: Arc<dyn FileDownloaderPort>,
        base_url: impl Into<String>,
        index_file: impl Into<String>,
        tmp_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            downloader,
            base_url: base_url.into(),
            index_file: index_file.into(),
            tmp_dir: tmp_dir.into(),
        }
    }

    fn url_for(&self, file_name: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), file_name)
    }

    fn index_path(&self) -> PathBuf {
        self.tmp_dir.join(INDEX_LOCAL_NAME)
    }

    fn shard_path(&self, shard: &str) -> PathBuf {
        self.tmp_dir.join(shard)
    }

    fn decompressed_path(&self, shard: &str) -> PathBuf {
        match shard.strip_suffix(".gz") {
            Some(stem) => self.tmp_dir.join(stem),
            None => self.tmp_dir.join(format!("{shard}.ndjson")),
        }
    }

    async fn download_index(&self) -> Result<(), FetchError> {
        tokio::fs::create_dir_all(&self.tmp_dir)
            .await
            .map_err(|e| stage_error(FetchStage::DownloadIndex, self.tmp_dir.display().to_string(), e))?;
        let url = self.url_for(&self.index_file);
        self.downloader
            .download(&url, &self.index_path())
            .await
            .map_err(|e| stage_error(FetchStage::DownloadIndex, url, e))?;
        Ok(())
    }

    async fn read_index(&self) -> Result<Vec<String>, FetchError> {
        let target = INDEX_LOCAL_NAME;
        let file = tokio::fs::File::open(self.index_path())
            .await
            .map_err(|e| stage_error(FetchStage::ReadIndex, target, e))?;
        let mut lines = tokio::io::BufReader::new(file).lines();
        let mut shards = Vec::new();
        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| stage_error(FetchStage::ReadIndex, target, e))?
        {
            let name = line.trim();
            if !name.is_empty() {
                shards.push(name.to_string());
            }
        }
        self.check_shard_names(&shards)
            .map_err(|reason| stage_error(FetchStage::ReadIndex, target, reason))?;
        Ok(shards)
    }

    /// Every shard must be a bare file name whose download and decompressed
    /// files land in `tmp_dir` without colliding with each other or with the
    /// index.
    fn check_shard_names(&self, shards: &[String]) -> Result<(), String> {
        let mut taken: HashSet<PathBuf> = HashSet::new();
        taken.insert(self.index_path());
        for shard in shards {
            let mut components = Path::new(shard).components();
            let plain = matches!(
                (components.next(), components.next()),
                (Some(Component::Normal(_)), None)
            ) && !shard.contains(['/', '\\'])
                && shard != ".gz";
            if !plain {
                return Err(format!("index entry `{shard}` is not a plain file name"));
            }
            for path in [self.shard_path(shard), self.decompressed_path(shard)] {
                if !taken.insert(path) {
                    return Err(format!("index entry `{shard}` collides with another temporary file"));
                }
            }
        }
        Ok(())
    }

    async fn download_shard(&self, shard: &str) -> Result<(), FetchError> {
        let url = self.url_for(shard);
        let bytes = self
            .downloader
            .download(&url, &self.shard_path(shard))
            .await
            .map_err(|e| stage_error(FetchStage::DownloadShard, shard, e))?;
        crate::metrics::fetch::shard_downloaded(bytes);
        debug!(shard, bytes, "Downloaded shard");
        Ok(())
    }

    async fn decompress_shard(&self, shard: &str) -> Result<(), FetchError> {
        let src = self.shard_path(shard);
        let dst = self.decompressed_path(shard);
        let written = tokio::task::spawn_blocking(move || gunzip(&src, &dst))
            .await
            .map_err(|e| stage_error(FetchStage::DecompressShard, shard, e))?
            .map_err(|e| stage_error(FetchStage::DecompressShard, shard, e))?;
        debug!(shard, bytes = written, "Decompressed shard");
        Ok(())
    }

    /// Streams one decompressed shard, stopping as soon as `cap` products
    /// have been accepted.
    async fn parse_shard(
        &self,
        shard: &str,
        known_codes: &HashSet<&str>,
        per_shard_cap: usize,
        imported_t: DateTime<Utc>,
    ) -> Result<Vec<NewProduct>, FetchError> {
        let mut accepted = Vec::new();
        if per_shard_cap == 0 {
            return Ok(accepted);
        }

        let file = tokio::fs::File::open(self.decompressed_path(shard))
            .await
            .map_err(|e| stage_error(FetchStage::ParseShard, shard, e))?;
        let mut lines = tokio::io::BufReader::new(file).lines();
        let mut line_no = 0usize;
        let mut skipped_known = 0usize;

        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| stage_error(FetchStage::ParseShard, shard, e))?
        {
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            let record: CatalogRecord = serde_json::from_str(&line)
                .map_err(|e| stage_error(FetchStage::ParseShard, format!("{shard}:{line_no}"), e))?;
            let product = record.into_new_product(imported_t);
            if known_codes.contains(product.code.as_str()) {
                skipped_known += 1;
                continue;
            }
            accepted.push(product);
            if accepted.len() >= per_shard_cap {
                break;
            }
        }

        crate::metrics::fetch::shard_parsed(accepted.len(), skipped_known);
        debug!(shard, accepted = accepted.len(), skipped_known, lines_read = line_no, "Parsed shard");
        Ok(accepted)
    }

    async fn process_shards(
        &self,
        shards: &[String],
        known_codes: &[String],
        per_shard_cap: usize,
    ) -> Result<Vec<NewProduct>, FetchError> {
        let downloads = join_all(shards.iter().map(|s| self.download_shard(s))).await;
        settle(downloads)?;

        let decompressions = join_all(shards.iter().map(|s| self.decompress_shard(s))).await;
        settle(decompressions)?;

        let known: HashSet<&str> = known_codes.iter().map(String::as_str).collect();
        let imported_t = Utc::now();
        let parsed = join_all(
            shards
                .iter()
                .map(|s| self.parse_shard(s, &known, per_shard_cap, imported_t)),
        )
        .await;

        Ok(settle(parsed)?.into_iter().flatten().collect())
    }

    /// Removes the index and every shard artifact. Files that were never
    /// created are skipped.
    async fn cleanup(&self, shards: &[String]) {
        remove_if_exists(&self.index_path()).await;
        for shard in shards {
            remove_if_exists(&self.shard_path(shard)).await;
            remove_if_exists(&self.decompressed_path(shard)).await;
        }
    }
}

#[async_trait]
impl CatalogProviderPort for CatalogFetcher {
    #[instrument(skip(self, known_codes), fields(known = known_codes.len()))]
    async fn fetch_new_products(
        &self,
        known_codes: &[String],
        per_shard_cap: usize,
    ) -> Result<Vec<NewProduct>, FetchError> {
        if let Err(e) = self.download_index().await {
            self.cleanup(&[]).await;
            return Err(e);
        }

        let shards = match self.read_index().await {
            Ok(shards) => shards,
            Err(e) => {
                self.cleanup(&[]).await;
                return Err(e);
            }
        };
        info!("Catalog index lists {} shard files", shards.len());

        let result = self.process_shards(&shards, known_codes, per_shard_cap).await;
        self.cleanup(&shards).await;

        if let Ok(products) = &result {
            info!("Fetched {} new products from {} shards", products.len(), shards.len());
        }
        result
    }
}

/// Scans settled results in order; the first failure fails the stage.
fn settle<T>(results: Vec<Result<T, FetchError>>) -> Result<Vec<T>, FetchError> {
    results.into_iter().collect()
}

/// Builds, logs and counts a stage failure where it happens.
fn stage_error(stage: FetchStage, target: impl Into<String>, source: impl Into<BoxError>) -> FetchError {
    let err = FetchError::new(stage, target, source);
    error!(stage = %stage, "{}", err);
    crate::metrics::fetch::stage_failed(stage);
    err
}

fn gunzip(src: &Path, dst: &Path) -> std::io::Result<u64> {
    let input = std::fs::File::open(src)?;
    let mut decoder = MultiGzDecoder::new(BufReader::new(input));
    let mut output = BufWriter::new(std::fs::File::create(dst)?);
    let written = std::io::copy(&mut decoder, &mut output)?;
    output.flush()?;
    Ok(written)
}

async fn remove_if_exists(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed temporary file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), "Failed to remove temporary file: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ProductStatus;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Serves files from memory by their last path segment; anything
    /// unknown fails like a 404.
    #[derive(Default)]
    struct FakeCatalog {
        files: HashMap<String, Vec<u8>>,
        requested: Mutex<Vec<String>>,
    }

    impl FakeCatalog {
        fn with_file(mut self, name: &str, bytes: Vec<u8>) -> Self {
            self.files.insert(name.to_string(), bytes);
            self
        }
    }

    #[async_trait]
    impl FileDownloaderPort for FakeCatalog {
        async fn download(&self, url: &str, dest: &Path) -> anyhow::Result<u64> {
            self.requested.lock().unwrap().push(url.to_string());
            let name = url.rsplit('/').next().unwrap_or_default();
            let bytes = self
                .files
                .get(name)
                .ok_or_else(|| anyhow::anyhow!("HTTP status client error (404 Not Found) for url ({url})"))?;
            tokio::fs::write(dest, bytes).await?;
            Ok(bytes.len() as u64)
        }
    }

    fn gz(text: &str) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(text.as_bytes()).unwrap();
        encoder.finish().unwrap()
    }

    fn shard(codes: &[&str]) -> Vec<u8> {
        let lines: Vec<String> = codes
            .iter()
            .map(|c| json!({ "code": c, "product_name": format!("product {c}") }).to_string())
            .collect();
        gz(&(lines.join("\n") + "\n"))
    }

    fn fetcher(catalog: FakeCatalog, tmp: &Path) -> CatalogFetcher {
        CatalogFetcher::new(Arc::new(catalog), "https://catalog.test/json/", "index.txt", tmp)
    }

    fn codes(products: &[NewProduct]) -> Vec<&str> {
        products.iter().map(|p| p.code.as_str()).collect()
    }

    fn dir_is_empty(dir: &Path) -> bool {
        std::fs::read_dir(dir).map(|mut d| d.next().is_none()).unwrap_or(true)
    }

    #[tokio::test]
    async fn skips_known_codes_and_keeps_index_then_stream_order() {
        let tmp = tempdir().unwrap();
        let catalog = FakeCatalog::default()
            .with_file("index.txt", b"a.json.gz\nb.json.gz\n".to_vec())
            .with_file("a.json.gz", shard(&["1", "2", "3"]))
            .with_file("b.json.gz", shard(&["4", "5"]));
        let fetcher = fetcher(catalog, tmp.path());

        let known = vec!["2".to_string(), "5".to_string()];
        let products = fetcher.fetch_new_products(&known, 100).await.unwrap();

        assert_eq!(codes(&products), vec!["1", "3", "4"]);
        assert!(products.iter().all(|p| p.status == ProductStatus::Draft));
        assert!(dir_is_empty(tmp.path()));
    }

    #[tokio::test]
    async fn caps_each_shard_independently() {
        let tmp = tempdir().unwrap();
        let catalog = FakeCatalog::default()
            .with_file("index.txt", b"a.json.gz\nb.json.gz".to_vec())
            .with_file("a.json.gz", shard(&["1", "2", "3", "4", "5"]))
            .with_file("b.json.gz", shard(&["6"]));
        let fetcher = fetcher(catalog, tmp.path());

        let known = vec!["1".to_string()];
        let products = fetcher.fetch_new_products(&known, 2).await.unwrap();

        // min(4 eligible, 2) from a, min(1, 2) from b
        assert_eq!(codes(&products), vec!["2", "3", "6"]);
    }

    #[tokio::test]
    async fn stops_reading_once_cap_is_reached() {
        let tmp = tempdir().unwrap();
        // The garbage after the second record is never parsed.
        let content = format!(
            "{}\n{}\nthis is not json\n",
            json!({ "code": "1" }),
            json!({ "code": "2" })
        );
        let catalog = FakeCatalog::default()
            .with_file("index.txt", b"a.json.gz\n".to_vec())
            .with_file("a.json.gz", gz(&content));
        let fetcher = fetcher(catalog, tmp.path());

        let products = fetcher.fetch_new_products(&[], 2).await.unwrap();
        assert_eq!(codes(&products), vec!["1", "2"]);
    }

    #[tokio::test]
    async fn zero_cap_accepts_nothing() {
        let tmp = tempdir().unwrap();
        let catalog = FakeCatalog::default()
            .with_file("index.txt", b"a.json.gz\n".to_vec())
            .with_file("a.json.gz", shard(&["1", "2"]));
        let products = fetcher(catalog, tmp.path()).fetch_new_products(&[], 0).await.unwrap();
        assert!(products.is_empty());
        assert!(dir_is_empty(tmp.path()));
    }

    #[tokio::test]
    async fn index_download_failure_is_typed_and_leaves_nothing_behind() {
        let tmp = tempdir().unwrap();
        let fetcher = fetcher(FakeCatalog::default(), tmp.path());

        let err = fetcher.fetch_new_products(&[], 100).await.unwrap_err();
        assert_eq!(err.stage, FetchStage::DownloadIndex);
        assert!(dir_is_empty(tmp.path()));
    }

    #[tokio::test]
    async fn shard_download_failure_waits_for_all_and_removes_every_targeted_file() {
        let tmp = tempdir().unwrap();
        let catalog = FakeCatalog::default()
            .with_file("index.txt", b"a.json.gz\nmissing.json.gz\nc.json.gz\n".to_vec())
            .with_file("a.json.gz", shard(&["1"]))
            .with_file("c.json.gz", shard(&["3"]));
        let catalog = Arc::new(catalog);
        let fetcher = CatalogFetcher::new(catalog.clone(), "https://catalog.test/json", "index.txt", tmp.path());

        let err = fetcher.fetch_new_products(&[], 100).await.unwrap_err();

        assert_eq!(err.stage, FetchStage::DownloadShard);
        assert_eq!(err.target, "missing.json.gz");
        // index + all three shards were requested even though one failed
        assert_eq!(catalog.requested.lock().unwrap().len(), 4);
        assert!(dir_is_empty(tmp.path()));
    }

    #[tokio::test]
    async fn corrupt_shard_fails_decompression_and_cleans_up() {
        let tmp = tempdir().unwrap();
        let catalog = FakeCatalog::default()
            .with_file("index.txt", b"a.json.gz\nb.json.gz\n".to_vec())
            .with_file("a.json.gz", shard(&["1"]))
            .with_file("b.json.gz", b"definitely not gzip".to_vec());

        let err = fetcher(catalog, tmp.path()).fetch_new_products(&[], 100).await.unwrap_err();
        assert_eq!(err.stage, FetchStage::DecompressShard);
        assert_eq!(err.target, "b.json.gz");
        assert!(dir_is_empty(tmp.path()));
    }

    #[tokio::test]
    async fn malformed_record_fails_parse_stage_and_cleans_up() {
        let tmp = tempdir().unwrap();
        let catalog = FakeCatalog::default()
            .with_file("index.txt", b"a.json.gz\n".to_vec())
            .with_file("a.json.gz", gz("{\"code\":\"1\"}\n{\"code\": \n"));

        let err = fetcher(catalog, tmp.path()).fetch_new_products(&[], 100).await.unwrap_err();
        assert_eq!(err.stage, FetchStage::ParseShard);
        assert_eq!(err.target, "a.json.gz:2");
        assert!(dir_is_empty(tmp.path()));
    }

    #[tokio::test]
    async fn blank_index_lines_are_ignored() {
        let tmp = tempdir().unwrap();
        let catalog = FakeCatalog::default()
            .with_file("index.txt", b"\n  a.json.gz  \n\n".to_vec())
            .with_file("a.json.gz", shard(&["1"]));
        let catalog = Arc::new(catalog);
        let fetcher = CatalogFetcher::new(catalog.clone(), "https://catalog.test/json/", "index.txt", tmp.path());

        let products = fetcher.fetch_new_products(&[], 100).await.unwrap();
        assert_eq!(codes(&products), vec!["1"]);
        assert_eq!(
            *catalog.requested.lock().unwrap(),
            vec![
                "https://catalog.test/json/index.txt".to_string(),
                "https://catalog.test/json/a.json.gz".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn index_entries_outside_tmp_dir_are_rejected_untouched() {
        let root = tempdir().unwrap();
        let tmp = root.path().join("tmp");
        let outside = root.path().join("keep.json.gz");
        std::fs::write(&outside, b"precious").unwrap();

        let entries = [
            outside.display().to_string(),
            "../keep.json.gz".to_string(),
            "nested/a.json.gz".to_string(),
            "a.json.gz/".to_string(),
            ".".to_string(),
            ".gz".to_string(),
        ];
        for entry in entries {
            let catalog = FakeCatalog::default()
                .with_file("index.txt", format!("{entry}\n").into_bytes())
                .with_file("keep.json.gz", shard(&["1"]))
                .with_file("a.json.gz", shard(&["1"]));
            let catalog = Arc::new(catalog);
            let fetcher = CatalogFetcher::new(catalog.clone(), "https://catalog.test/json/", "index.txt", &tmp);

            let err = fetcher.fetch_new_products(&[], 10).await.unwrap_err();

            assert_eq!(err.stage, FetchStage::ReadIndex, "entry {entry}");
            assert_eq!(catalog.requested.lock().unwrap().len(), 1, "entry {entry}");
            assert_eq!(std::fs::read(&outside).unwrap(), b"precious", "entry {entry}");
            assert!(dir_is_empty(&tmp));
        }
    }

    #[tokio::test]
    async fn duplicate_or_colliding_index_entries_are_rejected() {
        for index in [
            "a.json.gz\na.json.gz\n",
            "a.json\na.json.gz\n",
            "file-list-products.txt\n",
            "file-list-products.txt.gz\n",
        ] {
            let tmp = tempdir().unwrap();
            let catalog = FakeCatalog::default()
                .with_file("index.txt", index.as_bytes().to_vec())
                .with_file("a.json.gz", shard(&["1"]));

            let err = fetcher(catalog, tmp.path()).fetch_new_products(&[], 10).await.unwrap_err();
            assert_eq!(err.stage, FetchStage::ReadIndex, "index {index:?}");
            assert!(dir_is_empty(tmp.path()));
        }
    }

    #[test]
    fn decompressed_name_drops_gz_suffix() {
        let fetcher = fetcher(FakeCatalog::default(), Path::new("/tmp/catalog"));
        assert_eq!(fetcher.decompressed_path("p.json.gz"), Path::new("/tmp/catalog/p.json"));
        assert_eq!(fetcher.decompressed_path("p.json"), Path::new("/tmp/catalog/p.json.ndjson"));
    }
}
