use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info, warn};

use super::{catch_panic, finalize, run_blocking, with_deadline, JobHandler, JobKind};
use crate::db::ImageJobRepository;
use crate::models::ImageJobRecord;
use crate::render::ImageTransformer;
use crate::storage::StorageProvider;
use crate::types::{WorkerError, WorkerResult};

pub const OUTPUT_NAMESPACE: &str = "optimized";
const OUTPUT_SUFFIX: &str = "-optimized.webp";

/// Downloads source images.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> WorkerResult<Bytes>;
}

#[derive(Clone)]
pub struct HttpImageFetcher {
    client: reqwest::Client,
}

impl HttpImageFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub fn with_timeout(timeout: Duration) -> WorkerResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> WorkerResult<Bytes> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(WorkerError::Download(format!(
                "failed to download image, status: {}",
                status.as_u16()
            )));
        }

        Ok(response.bytes().await?)
    }
}

/// Downloads, re-encodes and stores one image.
pub struct ImageHandler {
    repo: Arc<ImageJobRepository>,
    fetcher: Arc<dyn ImageFetcher>,
    transformer: Arc<dyn ImageTransformer>,
    storage: Arc<dyn StorageProvider>,
    deadline: Option<Duration>,
}

impl ImageHandler {
    pub fn new(
        repo: Arc<ImageJobRepository>,
        fetcher: Arc<dyn ImageFetcher>,
        transformer: Arc<dyn ImageTransformer>,
        storage: Arc<dyn StorageProvider>,
    ) -> Self {
        Self {
            repo,
            fetcher,
            transformer,
            storage,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    async fn produce(&self, record: &ImageJobRecord) -> WorkerResult<String> {
        let source = self.fetcher.fetch(&record.source_image_url).await?;
        debug!(image_job_id = %record.id, bytes = source.len(), "source image downloaded");

        let transformer = Arc::clone(&self.transformer);
        let encoded = run_blocking(move || transformer.transform(&source), WorkerError::Render).await?;

        let filename = output_filename(&record.source_image_url, &record.id);
        self.storage
            .save(OUTPUT_NAMESPACE, &filename, Bytes::from(encoded))
            .await
    }
}

#[async_trait]
impl JobHandler for ImageHandler {
    fn kind(&self) -> JobKind {
        JobKind::Image
    }

    async fn handle(&self, job_id: &str) -> WorkerResult<()> {
        let record = match self.repo.get_by_id(job_id).await {
            Ok(record) => record,
            Err(e) => {
                warn!(image_job_id = job_id, error = %e, "image job lookup failed, skipping");
                return Err(e);
            }
        };

        info!(image_job_id = job_id, source = %record.source_image_url, "processing image");
        let outcome = catch_panic(with_deadline(self.deadline, self.produce(&record))).await;
        finalize(self.repo.as_ref(), JobKind::Image, job_id, outcome).await
    }
}

/// `<base>-optimized.webp`, where `<base>` is the last path segment of the source URL
/// without query, fragment or extension. Falls back to the job id.
pub fn output_filename(source_url: &str, job_id: &str) -> String {
    let path = source_url
        .split(['?', '#'])
        .next()
        .unwrap_or_default();
    let segment = path.rsplit(['/', '\\']).next().unwrap_or_default();
    let base = match segment.rfind('.') {
        Some(dot) => &segment[..dot],
        None => segment,
    };

    if base.trim().is_empty() {
        format!("{}{}", job_id, OUTPUT_SUFFIX)
    } else {
        format!("{}{}", base, OUTPUT_SUFFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::InMemoryRepository;
    use crate::models::JobStatus;
    use crate::processor::testing::RecordingStorage;
    use crate::render::WebpTransformer;
    use std::io::Cursor;

    fn png_bytes() -> Vec<u8> {
        let img = ::image::RgbImage::from_pixel(32, 16, ::image::Rgb([200, 30, 30]));
        let mut buf = Vec::new();
        ::image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), ::image::ImageFormat::Png)
            .unwrap();
        buf
    }

    fn handler(
        repo: Arc<InMemoryRepository<ImageJobRecord>>,
        storage: Arc<RecordingStorage>,
    ) -> ImageHandler {
        ImageHandler::new(
            repo,
            Arc::new(HttpImageFetcher::with_timeout(Duration::from_secs(5)).unwrap()),
            Arc::new(WebpTransformer::with_width(16)),
            storage,
        )
    }

    #[test]
    fn test_output_filename() {
        assert_eq!(output_filename("https://src/cat.png", "id1"), "cat-optimized.webp");
        assert_eq!(output_filename("https://src/a/b/photo.jpeg?w=200#top", "id1"), "photo-optimized.webp");
        assert_eq!(output_filename("https://src/archive.tar.gz", "id1"), "archive.tar-optimized.webp");
        assert_eq!(output_filename("https://src/noext", "id1"), "noext-optimized.webp");
        assert_eq!(output_filename("https://src/", "id1"), "id1-optimized.webp");
        assert_eq!(output_filename("https://src/.hidden", "id1"), "id1-optimized.webp");
    }

    #[tokio::test]
    async fn test_not_found_source_fails_without_storing() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server.mock("GET", "/cat.png").with_status(404).create_async().await;

        let repo = Arc::new(InMemoryRepository::new());
        repo.insert(ImageJobRecord::new("img-1", format!("{}/cat.png", server.url()))).await;
        let storage = Arc::new(RecordingStorage::default());

        let err = handler(repo.clone(), storage.clone()).handle("img-1").await.unwrap_err();
        assert!(matches!(err, WorkerError::Download(_)));

        let record = repo.get("img-1").await.unwrap();
        assert_eq!(record.status, JobStatus::Failed);
        assert_eq!(record.error_msg, "failed to download image, status: 404");
        assert_eq!(record.output_image_url, "");
        assert!(storage.saves().is_empty());
    }

    #[tokio::test]
    async fn test_image_is_optimized_and_stored() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/uploads/cat.png")
            .with_status(200)
            .with_header("content-type", "image/png")
            .with_body(png_bytes())
            .create_async()
            .await;

        let repo = Arc::new(InMemoryRepository::new());
        repo.insert(ImageJobRecord::new("img-2", format!("{}/uploads/cat.png", server.url()))).await;
        let storage = Arc::new(RecordingStorage::default());

        handler(repo.clone(), storage.clone()).handle("img-2").await.unwrap();

        let record = repo.get("img-2").await.unwrap();
        assert_eq!(record.status, JobStatus::Completed);
        assert_eq!(record.output_image_url, "https://cdn/optimized/cat-optimized.webp");
        assert_eq!(record.error_msg, "");

        let saves = storage.saves();
        assert_eq!(saves.len(), 1);
        assert_eq!(saves[0].0, "optimized");
        assert_eq!(saves[0].1, "cat-optimized.webp");
    }

    #[tokio::test]
    async fn test_undecodable_source_fails_job() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/notes.txt")
            .with_status(200)
            .with_body("plain text")
            .create_async()
            .await;

        let repo = Arc::new(InMemoryRepository::new());
        repo.insert(ImageJobRecord::new("img-3", format!("{}/notes.txt", server.url()))).await;
        let storage = Arc::new(RecordingStorage::default());

        handler(repo.clone(), storage.clone()).handle("img-3").await.unwrap_err();

        let record = repo.get("img-3").await.unwrap();
        assert_eq!(record.status, JobStatus::Failed);
        assert!(record.error_msg.starts_with("Image error"));
        assert!(storage.saves().is_empty());
    }

    #[tokio::test]
    async fn test_fetcher_panic_becomes_failed_status() {
        struct PanickingFetcher;

        #[async_trait]
        impl ImageFetcher for PanickingFetcher {
            async fn fetch(&self, _url: &str) -> WorkerResult<Bytes> {
                panic!("connection pool poisoned")
            }
        }

        let repo = Arc::new(InMemoryRepository::new());
        repo.insert(ImageJobRecord::new("img-4", "https://src/cat.png")).await;
        let storage = Arc::new(RecordingStorage::default());

        let handler = ImageHandler::new(
            repo.clone(),
            Arc::new(PanickingFetcher),
            Arc::new(WebpTransformer::with_width(16)),
            storage.clone(),
        );
        let err = handler.handle("img-4").await.unwrap_err();
        assert!(matches!(err, WorkerError::Panicked(_)));

        let record = repo.get("img-4").await.unwrap();
        assert_eq!(record.status, JobStatus::Failed);
        assert_eq!(record.error_msg, "Job panicked: connection pool poisoned");
        assert!(storage.saves().is_empty());
    }

    #[tokio::test]
    async fn test_fetcher_reports_status_code() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server.mock("GET", "/gone.jpg").with_status(410).create_async().await;

        let fetcher = HttpImageFetcher::with_timeout(Duration::from_secs(5)).unwrap();
        let err = fetcher.fetch(&format!("{}/gone.jpg", server.url())).await.unwrap_err();
        assert_eq!(err.to_string(), "failed to download image, status: 410");
    }
}
