//! Executes single requests against the image-processing endpoint.
//!
//! [`HttpRemote`] is the only component performing network I/O. It never fails: every problem
//! between reading the input and storing the result is converted into an
//! [`OutcomeRecord`] with [`Status::Error`](crate::record::Status::Error).

use std::error::Error as StdError;
use std::fmt::{self, Debug};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use image::ImageReader;
use reqwest::multipart::{Form, Part};

use crate::record::{Job, OutcomeRecord, Resolution, WorkItem};

/// Name of the multipart field carrying the image.
pub const FILE_FIELD: &str = "file";

/// Runs a [`Job`] and reports its outcome.
#[async_trait::async_trait]
pub trait Executor: Debug + Send + Sync + 'static {
    /// Executes the job. Failures are part of the returned record.
    async fn execute(&self, job: &Job) -> OutcomeRecord;
}

/// A type-erased [`Executor`] shared between dispatcher tasks.
pub type SharedExecutor = Arc<dyn Executor>;

/// A builder for creating an [`HttpRemote`].
#[derive(Debug)]
pub struct HttpRemoteBuilder {
    endpoint: String,
    request_timeout: Duration,
    connect_timeout: Duration,
    rotation: Option<i32>,
}

impl HttpRemoteBuilder {
    /// Upper bound for one request, from connecting until the whole body was received.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Upper bound for establishing the connection.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Rotation hint sent as the `rotation` query parameter.
    pub fn rotation(mut self, rotation: Option<i32>) -> Self {
        self.rotation = rotation;
        self
    }

    /// Creates the remote and its HTTP client.
    pub fn build(self) -> reqwest::Result<HttpRemote> {
        let client = reqwest::Client::builder()
            .timeout(self.request_timeout)
            .connect_timeout(self.connect_timeout)
            .build()?;

        Ok(HttpRemote {
            endpoint: self.endpoint,
            rotation: self.rotation,
            client,
        })
    }
}

/// An [`Executor`] uploading images to a remote endpoint over HTTP.
#[derive(Debug)]
pub struct HttpRemote {
    endpoint: String,
    rotation: Option<i32>,
    client: reqwest::Client,
}

impl HttpRemote {
    /// Constructs a new builder for the given endpoint URL.
    pub fn builder(endpoint: impl Into<String>) -> HttpRemoteBuilder {
        HttpRemoteBuilder {
            endpoint: endpoint.into(),
            request_timeout: Duration::from_secs(120),
            connect_timeout: Duration::from_secs(10),
            rotation: None,
        }
    }

    async fn upload(&self, item: &WorkItem, contents: Vec<u8>) -> reqwest::Result<Bytes> {
        let part = Part::bytes(contents)
            .file_name(item.file_name.clone())
            .mime_str(content_type(&item.source))?;
        let form = Form::new().part(FILE_FIELD, part);

        let mut request = self.client.post(&self.endpoint).multipart(form);
        if let Some(rotation) = self.rotation {
            request = request.query(&[("rotation", rotation)]);
        }

        request.send().await?.error_for_status()?.bytes().await
    }
}

#[async_trait::async_trait]
impl Executor for HttpRemote {
    async fn execute(&self, job: &Job) -> OutcomeRecord {
        let item = &job.item;

        let contents = match tokio::fs::read(&item.source).await {
            Ok(contents) => contents,
            Err(err) => {
                tracing::warn!(path = %item.source.display(), "cannot read input: {err}");
                let error = format!("failed to read input: {err}");
                return OutcomeRecord::failure(job, 0, Resolution::Unknown, Duration::ZERO, error);
            }
        };

        let file_size = contents.len() as u64;
        let resolution = read_resolution(&contents);
        tracing::debug!(
            path = %item.source.display(),
            file_size,
            %resolution,
            "processing image"
        );

        let start = Instant::now();
        let result = self.upload(item, contents).await;
        let elapsed = start.elapsed();

        let body = match result {
            Ok(body) => body,
            Err(err) => {
                let error = ErrorChain(&err).to_string();
                tracing::warn!(file = %item.file_name, "error processing image: {error}");
                return OutcomeRecord::failure(job, file_size, resolution, elapsed, error);
            }
        };

        if let Err(err) = store(&item.destination, &body).await {
            tracing::warn!(path = %item.destination.display(), "cannot write result: {err}");
            let error = format!("failed to write output: {err}");
            return OutcomeRecord::failure(job, file_size, resolution, elapsed, error);
        }

        tracing::debug!(file = %item.file_name, ?elapsed, "completed");
        OutcomeRecord::success(job, file_size, resolution, elapsed)
    }
}

/// Reads the pixel dimensions from the image header.
pub fn read_resolution(contents: &[u8]) -> Resolution {
    let dimensions = ImageReader::new(Cursor::new(contents))
        .with_guessed_format()
        .map_err(image::ImageError::from)
        .and_then(|reader| reader.into_dimensions());

    match dimensions {
        Ok((width, height)) => Resolution::Known { width, height },
        Err(_) => Resolution::Unknown,
    }
}

fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("png") => "image/png",
        _ => "image/jpeg",
    }
}

/// Writes the result, creating missing parent directories.
async fn store(destination: &Path, body: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = destination.parent() {
        // `create_dir_all` succeeds if a concurrent task created the directory first.
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(destination, body).await
}

/// Formats an error together with all of its sources.
struct ErrorChain<'a>(&'a (dyn StdError + 'static));

impl fmt::Display for ErrorChain<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)?;
        let mut source = self.0.source();
        while let Some(err) = source {
            write!(f, ": {err}")?;
            source = err.source();
        }
        Ok(())
    }
}
