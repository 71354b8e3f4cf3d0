//! Remote file metadata and per-file operations.
//!
//! Every operation goes through `Device::api`, which resolves the base
//! URL, attaches the bearer token and applies the failure-triggered
//! reprobe rule. Metadata GETs always request the same field list so a
//! `RemoteFile` is fully populated wherever it comes from.

use std::collections::HashMap;

use reqwest::{header, Method, StatusCode};
use serde::{Deserialize, Serialize};

use crate::device::Device;
use crate::error::{ClientError, ClientResult};
use crate::multipart::MultipartBody;
use crate::time::IsoTime;

/// MIME type marking directory entries.
pub const DIRECTORY_MIME_TYPE: &str = "application/x.wd.dir";

/// Metadata fields requested on every GET that returns file metadata.
pub const FILE_FIELDS: &str = "id,eTag,parentID,childCount,mimeType,name,size,mTime,cTime";

/// Well-known id of the filesystem root.
pub const ROOT_FILE_ID: &str = "root";

/// Metadata of one remote file or directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub id: String,
    #[serde(rename = "eTag", default)]
    pub etag: String,
    #[serde(rename = "parentID", default)]
    pub parent_id: String,
    #[serde(rename = "childCount", default)]
    pub child_count: u64,
    #[serde(rename = "mimeType", default)]
    pub mime_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(rename = "mTime", default)]
    pub mtime: IsoTime,
    #[serde(rename = "cTime", default)]
    pub ctime: IsoTime,
}

impl RemoteFile {
    pub fn is_directory(&self) -> bool {
        self.mime_type == DIRECTORY_MIME_TYPE
    }
}

/// One page of a directory listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilePage {
    #[serde(default)]
    pub files: Vec<RemoteFile>,
    #[serde(rename = "pageToken", default)]
    pub page_token: String,
    #[serde(rename = "eTag", default)]
    pub etag: String,
}

impl Device {
    /// Fetch the root directory.
    pub async fn root(&self) -> ClientResult<RemoteFile> {
        self.file_by_id(ROOT_FILE_ID).await
    }

    /// Fetch a file's metadata by id.
    pub async fn file_by_id(&self, id: &str) -> ClientResult<RemoteFile> {
        let path = format!("/v2/files/{id}");
        let resp = self
            .api(Method::GET, &path, |req| {
                req.query(&[("fields", FILE_FIELDS)])
            })
            .await?;
        if resp.status() != StatusCode::OK {
            return Err(ClientError::unexpected(Method::GET, &resp));
        }
        Ok(resp.json().await?)
    }

    /// Re-fetch a file's metadata, updating the record in place.
    pub async fn refresh(&self, file: &mut RemoteFile) -> ClientResult<()> {
        *file = self.file_by_id(&file.id).await?;
        Ok(())
    }

    /// List a directory, following pagination to the end.
    ///
    /// The result is keyed by entry name; when the server reports the same
    /// name twice the last occurrence wins.
    pub async fn list_directory(
        &self,
        dir: &RemoteFile,
    ) -> ClientResult<HashMap<String, RemoteFile>> {
        if !dir.is_directory() {
            return Err(ClientError::InvalidOperation(format!(
                "{} is not a directory",
                dir.name
            )));
        }

        let mut files = HashMap::new();
        let mut page_token = String::new();
        loop {
            let page = self.file_search_parents(&dir.id, &page_token).await?;
            for item in page.files {
                files.insert(item.name.clone(), item);
            }
            page_token = page.page_token;
            if page_token.is_empty() {
                break;
            }
        }
        Ok(files)
    }

    async fn file_search_parents(&self, ids: &str, page_token: &str) -> ClientResult<FilePage> {
        let fields = format!("pageToken,{FILE_FIELDS}");
        let hidden = self.session().os_type().as_str();

        let resp = self
            .api(Method::GET, "/v2/filesSearch/parents", |req| {
                let req = req.query(&[
                    ("ids", ids),
                    ("fields", fields.as_str()),
                    ("hidden", hidden),
                ]);
                if page_token.is_empty() {
                    req
                } else {
                    req.query(&[("pageToken", page_token)])
                }
            })
            .await?;
        if resp.status() != StatusCode::OK {
            return Err(ClientError::unexpected(Method::GET, &resp));
        }

        let etag = resp
            .headers()
            .get(header::ETAG)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let mut page: FilePage = resp.json().await?;
        page.etag = etag;
        Ok(page)
    }

    /// Look up a single child of a directory by name.
    ///
    /// Absence is not an error: a 404 yields `Ok(None)`.
    pub async fn lookup_directory(
        &self,
        dir: &RemoteFile,
        name: &str,
    ) -> ClientResult<Option<RemoteFile>> {
        if !dir.is_directory() {
            return Err(ClientError::InvalidOperation(format!(
                "{} is not a directory",
                dir.name
            )));
        }

        let resp = self
            .api(Method::GET, "/v2/filesSearch/parentAndName", |req| {
                req.query(&[
                    ("name", name),
                    ("parentID", dir.id.as_str()),
                    ("fields", FILE_FIELDS),
                ])
            })
            .await?;
        match resp.status() {
            StatusCode::OK => Ok(Some(resp.json().await?)),
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(ClientError::unexpected(Method::GET, &resp)),
        }
    }

    /// Create an empty directory under `parent`.
    pub async fn create_directory(
        &self,
        parent: &RemoteFile,
        name: &str,
    ) -> ClientResult<RemoteFile> {
        let metadata = serde_json::json!({
            "parentID": parent.id,
            "name": name,
            "mimeType": DIRECTORY_MIME_TYPE,
        });
        let body = MultipartBody::new(&metadata)?;
        let content_type = body.content_type();

        let resp = self
            .api(Method::POST, "/v2/files", |req| {
                req.header(header::CONTENT_TYPE, content_type)
                    .body(body.into_bytes())
            })
            .await?;
        if resp.status() != StatusCode::CREATED {
            return Err(ClientError::unexpected(Method::POST, &resp));
        }

        let id = location_basename(&resp)?;
        self.file_by_id(&id).await
    }

    /// Create an empty regular file under `parent`.
    pub async fn create_file(&self, parent: &RemoteFile, name: &str) -> ClientResult<RemoteFile> {
        let metadata = serde_json::json!({
            "parentID": parent.id,
            "name": name,
        });
        let body = MultipartBody::new(&metadata)?;
        let content_type = body.content_type();

        let resp = self
            .api(Method::POST, "/v2/files/resumable", |req| {
                req.query(&[("done", "true")])
                    .header(header::CONTENT_TYPE, content_type)
                    .body(body.into_bytes())
            })
            .await?;
        if resp.status() != StatusCode::CREATED {
            return Err(ClientError::unexpected(Method::POST, &resp));
        }

        let id = location_basename(&resp)?;
        self.file_by_id(&id).await
    }

    /// Delete a file or directory.
    ///
    /// The server may delete asynchronously (202), synchronously (204), or
    /// report the file already gone (404); all three are success.
    pub async fn delete(&self, file: &RemoteFile) -> ClientResult<()> {
        let path = format!("/v2/files/{}", file.id);
        let resp = self.api(Method::DELETE, &path, |req| req).await?;
        match resp.status() {
            StatusCode::ACCEPTED | StatusCode::NO_CONTENT | StatusCode::NOT_FOUND => Ok(()),
            _ => Err(ClientError::unexpected(Method::DELETE, &resp)),
        }
    }

    /// Move a file under `new_parent` with `new_name`.
    pub async fn rename(
        &self,
        file: &RemoteFile,
        new_parent: &RemoteFile,
        new_name: &str,
    ) -> ClientResult<()> {
        let changes = serde_json::json!({
            "parentID": new_parent.id,
            "name": new_name,
        });
        self.patch(file, &changes).await
    }

    /// Patch metadata fields. Recognized fields are `mTime` and `cTime`;
    /// anything else is passed through to the server untouched.
    pub async fn set_meta(&self, file: &RemoteFile, changes: serde_json::Value) -> ClientResult<()> {
        self.patch(file, &changes).await
    }

    async fn patch(&self, file: &RemoteFile, changes: &serde_json::Value) -> ClientResult<()> {
        let path = format!("/v2/files/{}", file.id);
        let resp = self.api(Method::PATCH, &path, |req| req.json(changes)).await?;
        if resp.status() != StatusCode::NO_CONTENT {
            return Err(ClientError::unexpected(Method::PATCH, &resp));
        }
        Ok(())
    }

    /// Read a byte range into `dest`, returning the number of bytes copied.
    pub async fn read(
        &self,
        file: &RemoteFile,
        dest: &mut [u8],
        offset: u64,
    ) -> ClientResult<usize> {
        if file.is_directory() {
            return Err(ClientError::InvalidOperation(format!(
                "{} is a directory",
                file.name
            )));
        }
        if dest.is_empty() {
            return Ok(0);
        }

        let path = format!("/v3/files/{}/content", file.id);
        let range = format!("bytes={}-{}", offset, offset + dest.len() as u64 - 1);

        let resp = self
            .api(Method::GET, &path, |req| req.header(header::RANGE, range))
            .await?;
        if resp.status() != StatusCode::PARTIAL_CONTENT {
            return Err(ClientError::unexpected(Method::GET, &resp));
        }

        let body = resp.bytes().await?;
        let n = body.len().min(dest.len());
        dest[..n].copy_from_slice(&body[..n]);
        Ok(n)
    }

    /// Write bytes at `offset`.
    pub async fn write(&self, file: &RemoteFile, data: &[u8], offset: u64) -> ClientResult<()> {
        let path = format!("/v2/files/{}/resumable", file.id);
        let offset = offset.to_string();

        let resp = self
            .api(Method::POST, &path, |req| {
                req.query(&[("done", "true"), ("offset", offset.as_str())])
                    .body(data.to_vec())
            })
            .await?;
        if resp.status() != StatusCode::CREATED {
            return Err(ClientError::unexpected(Method::POST, &resp));
        }
        Ok(())
    }

    /// Cut the file off at `offset`.
    pub async fn truncate(&self, file: &RemoteFile, offset: u64) -> ClientResult<()> {
        let path = format!("/v2/files/{}/resumable", file.id);
        let offset = offset.to_string();

        let resp = self
            .api(Method::POST, &path, |req| {
                req.query(&[
                    ("done", "true"),
                    ("truncate", "true"),
                    ("offset", offset.as_str()),
                ])
            })
            .await?;
        if resp.status() != StatusCode::CREATED {
            return Err(ClientError::unexpected(Method::POST, &resp));
        }
        Ok(())
    }

    /// Resolve a slash-separated path from the root.
    pub async fn file_by_path(&self, path: &str) -> ClientResult<RemoteFile> {
        let path = path.trim_matches('/');
        let mut current = self.root().await?;
        if path.is_empty() {
            return Ok(current);
        }

        for component in path.split('/') {
            if !current.is_directory() {
                return Err(ClientError::InvalidOperation(format!(
                    "path component {} is not a directory",
                    current.name
                )));
            }
            let mut entries = self.list_directory(&current).await?;
            current = entries.remove(component).ok_or_else(|| {
                ClientError::InvalidOperation(format!("path component {component} not found"))
            })?;
        }
        Ok(current)
    }
}

fn location_basename(resp: &reqwest::Response) -> ClientResult<String> {
    let location = resp
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            ClientError::Protocol("create response is missing a Location header".into())
        })?;
    let base = location.rsplit('/').next().unwrap_or(location);
    if base.is_empty() {
        return Err(ClientError::Protocol(format!(
            "create response has an unusable Location header: {location}"
        )));
    }
    Ok(base.to_string())
}
