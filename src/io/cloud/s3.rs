//! [`ObjectIO`] over the AWS SDK (feature `s3`).
//!
//! The SDK is async; every call blocks on a private current-thread runtime.
//! That runtime accepts concurrent `block_on` calls, so one client is shared
//! by every backend handle of a component, worker threads included.

use crate::config::StorageOptions;
use crate::error::{Error, Result};
use crate::io::cloud::traits::{CloudIOError, CloudResult, ErrorKind, ObjectIO, ObjectMetadata};
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use std::future::Future;
use tokio::runtime::Runtime;
use tracing::{debug, instrument};

const DEFAULT_REGION: &str = "us-east-1";

pub struct S3ObjectIO {
    client: Client,
    runtime: Runtime,
}

impl std::fmt::Debug for S3ObjectIO {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3ObjectIO").finish_non_exhaustive()
    }
}

impl S3ObjectIO {
    /// Build a client from storage options.
    ///
    /// Recognised keys: `region` (default `us-east-1`), `endpoint_url` and
    /// `force_path_style` (`true`/`false`, for MinIO and similar).
    ///
    /// # Errors
    /// [`Error::Io`] if the runtime cannot be started, [`Error::InvalidConfig`]
    /// on an unparsable `force_path_style`.
    pub fn from_options(options: &StorageOptions) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let region = options
            .get("region")
            .cloned()
            .unwrap_or_else(|| DEFAULT_REGION.to_string());
        let force_path_style = match options.get("force_path_style").map(String::as_str) {
            None => false,
            Some(v) => v.parse::<bool>().map_err(|_| {
                Error::InvalidConfig(format!("force_path_style must be true or false, got \"{v}\""))
            })?,
        };

        let aws_config = runtime.block_on(
            aws_config::defaults(BehaviorVersion::latest())
                .region(aws_sdk_s3::config::Region::new(region))
                .load(),
        );

        let mut builder = S3ConfigBuilder::from(&aws_config);
        if let Some(endpoint) = options.get("endpoint_url") {
            builder = builder.endpoint_url(endpoint);
        }
        if force_path_style {
            builder = builder.force_path_style(true);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            runtime,
        })
    }

    fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}

fn kind_for_status(status: u16) -> ErrorKind {
    match status {
        401 => ErrorKind::Authentication,
        403 => ErrorKind::Authorization,
        404 => ErrorKind::NotFound,
        408 => ErrorKind::Timeout,
        409 => ErrorKind::AlreadyExists,
        400 | 411 | 413 | 416 => ErrorKind::InvalidInput,
        429 => ErrorKind::RateLimited,
        500 => ErrorKind::InternalError,
        502..=504 => ErrorKind::ServiceUnavailable,
        _ => ErrorKind::Other,
    }
}

fn sdk_error<E>(op: &str, err: &SdkError<E, HttpResponse>) -> CloudIOError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let kind = match err {
        SdkError::TimeoutError(_) => ErrorKind::Timeout,
        SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => ErrorKind::Network,
        SdkError::ServiceError(ctx) => kind_for_status(ctx.raw().status().as_u16()),
        _ => ErrorKind::Other,
    };
    CloudIOError::new(kind, format!("s3 {op} failed"))
        .with_detail(DisplayErrorContext(err).to_string())
}

impl ObjectIO for S3ObjectIO {
    #[instrument(skip(self, data), fields(backend = "s3", size = data.len()))]
    fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> CloudResult<()> {
        self.block_on(
            self.client
                .put_object()
                .bucket(bucket)
                .key(key)
                .body(ByteStream::from(data.to_vec()))
                .send(),
        )
        .map_err(|e| sdk_error("put_object", &e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    fn get_object(&self, bucket: &str, key: &str) -> CloudResult<Vec<u8>> {
        self.block_on(async {
            let output = self
                .client
                .get_object()
                .bucket(bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| {
                    if e.as_service_error().is_some_and(|s| s.is_no_such_key()) {
                        CloudIOError::not_found(bucket, key)
                    } else {
                        sdk_error("get_object", &e)
                    }
                })?;
            let body = output.body.collect().await.map_err(|e| {
                CloudIOError::new(ErrorKind::Network, "s3 get_object body failed")
                    .with_detail(e.to_string())
            })?;
            Ok(body.into_bytes().to_vec())
        })
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    fn delete_object(&self, bucket: &str, key: &str) -> CloudResult<()> {
        self.block_on(self.client.delete_object().bucket(bucket).key(key).send())
            .map_err(|e| sdk_error("delete_object", &e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    fn list_objects(&self, bucket: &str, prefix: Option<&str>) -> CloudResult<Vec<ObjectMetadata>> {
        self.block_on(async {
            let mut results = Vec::new();
            let mut continuation_token: Option<String> = None;

            loop {
                let mut request = self.client.list_objects_v2().bucket(bucket);
                if let Some(prefix) = prefix {
                    request = request.prefix(prefix);
                }
                if let Some(token) = continuation_token.take() {
                    request = request.continuation_token(token);
                }

                let response = request
                    .send()
                    .await
                    .map_err(|e| sdk_error("list_objects", &e))?;

                for object in response.contents() {
                    if let Some(key) = object.key() {
                        results.push(ObjectMetadata {
                            key: key.to_string(),
                            size: object.size().and_then(|s| u64::try_from(s).ok()).unwrap_or(0),
                            etag: object.e_tag().map(String::from),
                        });
                    }
                }

                match response.next_continuation_token() {
                    Some(token) if response.is_truncated().unwrap_or(false) => {
                        continuation_token = Some(token.to_string());
                    }
                    _ => break,
                }
            }

            debug!(count = results.len(), "listed s3 objects");
            results.sort_by(|a, b| a.key.cmp(&b.key));
            Ok(results)
        })
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    fn object_exists(&self, bucket: &str, key: &str) -> CloudResult<bool> {
        match self.block_on(self.client.head_object().bucket(bucket).key(key).send()) {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().is_some_and(|s| s.is_not_found()) => Ok(false),
            Err(e) => {
                let err = sdk_error("head_object", &e);
                if err.is_not_found() { Ok(false) } else { Err(err) }
            }
        }
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> CloudResult<()> {
        self.block_on(
            self.client
                .copy_object()
                .copy_source(format!("{src_bucket}/{src_key}"))
                .bucket(dst_bucket)
                .key(dst_key)
                .send(),
        )
        .map_err(|e| sdk_error("copy_object", &e))?;
        Ok(())
    }
}
