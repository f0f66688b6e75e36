use std::fmt;
use std::io::Read;

use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use chrono::{NaiveDate, Utc};
use log::debug;
use tokio::runtime::{self, Runtime};

use super::{MailStore, StorageError, day_prefix, email_key, is_valid_id};

pub const DEFAULT_ENDPOINT: &str = "https://fly.storage.tigris.dev";
pub const DEFAULT_REGION: &str = "auto";

/// Where and how to reach an S3-compatible bucket
#[derive(Clone, PartialEq, Eq)]
pub struct S3Settings {
    pub bucket: String,
    pub endpoint: String,
    pub region: String,
    pub force_path_style: bool,
    /// Static keys. When unset the standard AWS credential chain is used
    /// (`AWS_ACCESS_KEY_ID`, profiles, instance metadata).
    pub credentials: Option<(String, String)>,
}

impl S3Settings {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            region: DEFAULT_REGION.to_string(),
            force_path_style: false,
            credentials: None,
        }
    }
}

impl fmt::Debug for S3Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Settings")
            .field("bucket", &self.bucket)
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("force_path_style", &self.force_path_style)
            .field("credentials", &self.credentials.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Stores each message as an object keyed `emails/<yyyy>/<mm>/<dd>/<id>.eml`
/// in an S3-compatible bucket.
///
/// Sessions run on plain threads, so the store owns a small runtime and
/// blocks on each request.
pub struct S3Store {
    client: Client,
    bucket: String,
    runtime: Runtime,
}

impl S3Store {
    pub fn connect(settings: &S3Settings) -> Result<Self, StorageError> {
        let runtime = runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("ghostpost-s3")
            .enable_all()
            .build()?;

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .endpoint_url(settings.endpoint.as_str());
        if let Some((access_key_id, secret_access_key)) = &settings.credentials {
            loader = loader.credentials_provider(Credentials::new(
                access_key_id,
                secret_access_key,
                None,
                None,
                "ghostpost-config",
            ));
        }
        let shared_config = runtime.block_on(loader.load());
        let s3_config = aws_sdk_s3::config::Builder::from(&shared_config)
            .force_path_style(settings.force_path_style)
            .build();

        Ok(Self {
            client: Client::from_conf(s3_config),
            bucket: settings.bucket.clone(),
            runtime,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Ids of the messages saved on `date`, sorted
    pub fn list_day(&self, date: NaiveDate) -> Result<Vec<String>, StorageError> {
        let prefix = format!("{}/", day_prefix(date));
        let mut ids = Vec::new();
        let mut token = None;

        loop {
            let page = self
                .runtime
                .block_on(
                    self.client
                        .list_objects_v2()
                        .bucket(&self.bucket)
                        .prefix(&prefix)
                        .set_continuation_token(token.take())
                        .send(),
                )
                .map_err(|e| {
                    StorageError::Unavailable(format!("s3 list objects failed for {prefix}: {e}"))
                })?;

            ids.extend(
                page.contents()
                    .iter()
                    .filter_map(|object| object.key())
                    .filter_map(|key| id_from_key(&prefix, key))
                    .map(str::to_string),
            );

            match page.next_continuation_token() {
                Some(next) => token = Some(next.to_string()),
                None => break,
            }
        }

        ids.sort();
        Ok(ids)
    }

    /// Read back a message saved on `date`
    pub fn get(&self, date: NaiveDate, id: &str) -> Result<Option<Vec<u8>>, StorageError> {
        if !is_valid_id(id) {
            return Err(StorageError::InvalidId(id.to_string()));
        }
        let key = email_key(date, id);

        self.runtime.block_on(async {
            let object = match self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(&key)
                .send()
                .await
            {
                Ok(object) => object,
                Err(e) => {
                    let e = e.into_service_error();
                    if e.is_no_such_key() {
                        return Ok(None);
                    }
                    return Err(StorageError::Unavailable(format!(
                        "s3 get object failed for {key}: {e}"
                    )));
                }
            };

            let data = object.body.collect().await.map_err(|e| {
                StorageError::Unavailable(format!("s3 read failed for {key}: {e}"))
            })?;
            Ok(Some(data.into_bytes().to_vec()))
        })
    }

    fn save_on(
        &self,
        date: NaiveDate,
        id: &str,
        content: &mut dyn Read,
    ) -> Result<String, StorageError> {
        if !is_valid_id(id) {
            return Err(StorageError::InvalidId(id.to_string()));
        }

        let mut body = Vec::new();
        content.read_to_end(&mut body)?;

        let key = email_key(date, id);
        self.runtime
            .block_on(
                self.client
                    .put_object()
                    .bucket(&self.bucket)
                    .key(&key)
                    .content_type("message/rfc822")
                    .body(ByteStream::from(body))
                    .send(),
            )
            .map_err(|e| StorageError::Unavailable(format!("s3 put object failed for {key}: {e}")))?;
        Ok(key)
    }
}

impl MailStore for S3Store {
    fn save_email(&self, id: &str, content: &mut dyn Read) -> Result<(), StorageError> {
        let key = self.save_on(Utc::now().date_naive(), id, content)?;
        debug!("Put s3://{}/{key}", self.bucket);
        Ok(())
    }
}

/// Message id from an object key listed under `prefix`. Keys that are not
/// direct `<id>.eml` children of the prefix are skipped.
fn id_from_key<'a>(prefix: &str, key: &'a str) -> Option<&'a str> {
    let id = key.strip_prefix(prefix)?.strip_suffix(".eml")?;
    is_valid_id(id).then_some(id)
}
