//! HttpObjectStore: client for a remote S3-compatible object store.
//!
//! Speaks the path-style REST dialect:
//! - `PUT    {endpoint}/{bucket}/{key}`: write object (with `Content-MD5`)
//! - `HEAD   {endpoint}/{bucket}/{key}`: existence check, no payload
//! - `DELETE {endpoint}/{bucket}/{key}`: delete object
//! - `GET    {endpoint}/{bucket}?list-type=2`: ListObjectsV2, paginated
//!
//! Requests are signed with SigV4 when credentials are configured.
//!
//! Paths and queries are percent-encoded by hand with the SigV4 unreserved
//! set, so the signed URL is exactly the one sent. URL parsing drops `.`
//! and `..` path segments (in any percent-encoded spelling too), so a key
//! segment made only of one or two dots followed by any number of `~`
//! gains one extra `~` on the wire and loses it again when listed.

use crate::services::{
    object_store::{DeleteOutcome, ObjectStore, ObjectStoreError, ObjectStoreResult},
    sigv4::{self, EMPTY_PAYLOAD_SHA256, Signer, UNRESERVED},
};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use bytes::Bytes;
use chrono::Utc;
use percent_encoding::utf8_percent_encode;
use reqwest::{Client, Method, Response, StatusCode, Url};
use std::time::Duration;
use tracing::debug;

const DOT_ESCAPE: char = '~';

#[derive(Clone, Debug)]
pub struct HttpObjectStore {
    client: Client,
    endpoint: Url,
    bucket: String,
    signer: Option<Signer>,
}

/// One page of a ListObjectsV2 response.
#[derive(Debug, Default, PartialEq)]
struct ListPage {
    keys: Vec<String>,
    next_continuation_token: Option<String>,
}

impl HttpObjectStore {
    pub fn new(
        endpoint: &str,
        bucket: impl Into<String>,
        timeout: Duration,
        signer: Option<Signer>,
    ) -> ObjectStoreResult<Self> {
        let invalid = |detail: String| ObjectStoreError::InvalidEndpoint(detail);
        let endpoint =
            Url::parse(endpoint).map_err(|err| invalid(format!("{}: {}", endpoint, err)))?;
        if endpoint.cannot_be_a_base() || endpoint.host_str().is_none() {
            return Err(invalid(endpoint.to_string()));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            bucket: bucket.into(),
            signer,
        })
    }

    fn bucket_url(&self) -> Url {
        let mut url = self.endpoint.clone();
        let path = format!(
            "{}/{}",
            url.path().trim_end_matches('/'),
            utf8_percent_encode(&self.bucket, UNRESERVED)
        );
        url.set_path(&path);
        url.set_query(None);
        url.set_fragment(None);
        url
    }

    fn object_url(&self, key: &str) -> ObjectStoreResult<Url> {
        if key.is_empty() {
            return Err(ObjectStoreError::InvalidKey(key.to_string()));
        }
        let mut url = self.bucket_url();
        let path = format!("{}/{}", url.path(), wire_path(key));
        url.set_path(&path);
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<Bytes>,
    ) -> ObjectStoreResult<Response> {
        let mut request = self.client.request(method.clone(), url.clone());
        if let Some(signer) = &self.signer {
            let payload_sha256 = match &body {
                Some(body) => sigv4::payload_sha256(body),
                None => EMPTY_PAYLOAD_SHA256.to_string(),
            };
            for (name, value) in signer.sign(&method, &url, &payload_sha256, Utc::now())? {
                request = request.header(name, value);
            }
        }
        if let Some(body) = body {
            request = request
                .header("content-md5", STANDARD.encode(md5::compute(&body).0))
                .body(body);
        }
        Ok(request.send().await?)
    }

    async fn list_page(&self, continuation: Option<&str>) -> ObjectStoreResult<ListPage> {
        let mut url = self.bucket_url();
        let query = match continuation {
            Some(token) => format!(
                "continuation-token={}&list-type=2",
                utf8_percent_encode(token, UNRESERVED)
            ),
            None => "list-type=2".to_string(),
        };
        url.set_query(Some(&query));

        let response = self.send(Method::GET, url, None).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ObjectStoreError::UnexpectedStatus {
                status: status.as_u16(),
                key: String::new(),
            });
        }
        parse_list_page(&response.text().await?)
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(&self, key: &str, body: Bytes) -> ObjectStoreResult<()> {
        let size = body.len();
        let response = self.send(Method::PUT, self.object_url(key)?, Some(body)).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(unexpected(status, key));
        }
        debug!(key, size, "uploaded object");
        Ok(())
    }

    async fn head_exists(&self, key: &str) -> ObjectStoreResult<bool> {
        let response = self.send(Method::HEAD, self.object_url(key)?, None).await?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(unexpected(status, key)),
        }
    }

    async fn delete(&self, key: &str) -> ObjectStoreResult<DeleteOutcome> {
        let response = self.send(Method::DELETE, self.object_url(key)?, None).await?;
        match response.status() {
            status if status.is_success() => Ok(DeleteOutcome::Deleted),
            StatusCode::NOT_FOUND => Ok(DeleteOutcome::AlreadyAbsent),
            status => Err(unexpected(status, key)),
        }
    }

    async fn list_keys(&self) -> ObjectStoreResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let page = self.list_page(continuation.as_deref()).await?;
            keys.extend(page.keys.iter().map(|wire| key_from_wire(wire)));
            match page.next_continuation_token {
                Some(token) if Some(&token) != continuation.as_ref() => {
                    continuation = Some(token)
                }
                _ => break,
            }
        }
        debug!(bucket = %self.bucket, count = keys.len(), "listed objects");
        Ok(keys)
    }
}

fn unexpected(status: StatusCode, key: &str) -> ObjectStoreError {
    ObjectStoreError::UnexpectedStatus {
        status: status.as_u16(),
        key: key.to_string(),
    }
}

fn is_dot_run(segment: &str) -> bool {
    matches!(segment.trim_end_matches(DOT_ESCAPE), "." | "..")
}

/// Encoded URL path for a key, one segment per `/`.
fn wire_path(key: &str) -> String {
    key.split('/')
        .map(|segment| {
            if is_dot_run(segment) {
                format!("{}{}", segment, DOT_ESCAPE)
            } else {
                utf8_percent_encode(segment, UNRESERVED).to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Inverse of the dot escaping in [`wire_path`], applied to listed keys.
fn key_from_wire(wire: &str) -> String {
    wire.split('/')
        .map(|segment| {
            if segment.ends_with(DOT_ESCAPE) && is_dot_run(segment) {
                &segment[..segment.len() - DOT_ESCAPE.len_utf8()]
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Extract keys and the continuation token from a ListBucketResult body.
fn parse_list_page(xml: &str) -> ObjectStoreResult<ListPage> {
    if !xml.contains("<ListBucketResult") {
        return Err(ObjectStoreError::MalformedListing(
            "missing ListBucketResult element".into(),
        ));
    }

    let keys = element_texts(xml, "Key")
        .into_iter()
        .map(xml_unescape)
        .collect();
    let truncated = element_texts(xml, "IsTruncated")
        .first()
        .is_some_and(|v| v.trim() == "true");
    let next_continuation_token = if truncated {
        let token = element_texts(xml, "NextContinuationToken")
            .first()
            .map(|t| xml_unescape(t))
            .ok_or_else(|| {
                ObjectStoreError::MalformedListing(
                    "truncated listing without NextContinuationToken".into(),
                )
            })?;
        Some(token)
    } else {
        None
    };

    Ok(ListPage {
        keys,
        next_continuation_token,
    })
}

/// Text content of every `<tag>...</tag>` occurrence, in document order.
fn element_texts<'a>(xml: &'a str, tag: &str) -> Vec<&'a str> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let mut out = Vec::new();
    let mut rest = xml;
    while let Some(start) = rest.find(&open) {
        let after = &rest[start + open.len()..];
        let Some(end) = after.find(&close) else { break };
        out.push(&after[..end]);
        rest = &after[end + close.len()..];
    }
    out
}

/// Decodes the predefined entities and `&#NN;` / `&#xNN;` references.
/// Anything unrecognised is kept verbatim.
fn xml_unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail
            .find(';')
            .and_then(|semi| Some((decode_entity(&tail[1..semi])?, semi)));
        match decoded {
            Some((ch, semi)) => {
                out.push(ch);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let code = entity.strip_prefix('#')?;
            let code = match code.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => code.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}
