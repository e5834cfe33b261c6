//! RegistryClient - OCI distribution registry の HTTP API
//!
//! - `GET /v2/_catalog`, `GET /v2/<repo>/tags/list`: `Link` ヘッダでページング
//! - `HEAD /v2/<repo>/manifests/<tag>`: `Docker-Content-Digest` を取得
//! - `DELETE /v2/<repo>/manifests/<digest>`: digest で削除
//!
//! 404 は「既に無い」として成功扱いにする。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, HeaderMap, LINK};
use serde::Deserialize;
use url::Url;

use crate::domain::{ArtifactRef, RegistryError};
use crate::ports::{ArtifactCatalog, ArtifactDeleter, DeleteOutcome};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const PAGE_SIZE: u32 = 1000;
const DIGEST_HEADER: &str = "Docker-Content-Digest";

const MANIFEST_ACCEPT: &str = "application/vnd.oci.image.index.v1+json, \
    application/vnd.oci.image.manifest.v1+json, \
    application/vnd.docker.distribution.manifest.list.v2+json, \
    application/vnd.docker.distribution.manifest.v2+json";

#[derive(Debug, Deserialize)]
struct CatalogResponse {
    #[serde(default)]
    repositories: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    tags: Option<Vec<String>>,
}

/// Client for the registry's distribution API.
#[derive(Clone)]
pub struct RegistryClient {
    http: reqwest::Client,
    base_url: String,
}

impl RegistryClient {
    pub fn new(registry_url: &str) -> Result<Self, RegistryError> {
        let base_url = registry_url.trim_end_matches('/').to_string();
        Url::parse(&base_url)?;
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> Result<Url, RegistryError> {
        Ok(Url::parse(&format!("{}{}", self.base_url, path))?)
    }

    /// Follow `Link: <...>; rel="next"` until the registry stops sending one.
    async fn list_paginated<T, F>(&self, first: Url, mut extract: F) -> Result<Vec<String>, RegistryError>
    where
        T: for<'de> Deserialize<'de>,
        F: FnMut(T) -> Vec<String>,
    {
        let mut all = Vec::new();
        let mut next = Some(first);

        while let Some(url) = next.take() {
            let response = self.http.get(url.clone()).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(RegistryError::UnexpectedStatus {
                    status: status.as_u16(),
                    url: url.to_string(),
                });
            }

            next = next_link(response.headers(), &self.base_url);
            let page: T = response.json().await?;
            all.extend(extract(page));
        }

        Ok(all)
    }

    /// Resolve a tag to its content digest. `None` when the manifest is gone.
    async fn resolve_digest(&self, reference: &ArtifactRef) -> Result<Option<String>, RegistryError> {
        let url = self.url(&format!(
            "/v2/{}/manifests/{}",
            reference.repository(),
            reference.tag()
        ))?;
        let response = self
            .http
            .head(url.clone())
            .header(ACCEPT, MANIFEST_ACCEPT)
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response
                .headers()
                .get(DIGEST_HEADER)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
                .map(|v| Some(v.to_string()))
                .ok_or_else(|| RegistryError::MissingDigest {
                    url: url.to_string(),
                }),
            status => Err(RegistryError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_string(),
            }),
        }
    }
}

/// Parse the registry's pagination header.
///
/// The registry returns: `Link: </v2/_catalog?n=1000&last=repo>; rel="next"`
fn next_link(headers: &HeaderMap, base_url: &str) -> Option<Url> {
    let link = headers.get(LINK)?.to_str().ok()?;
    let start = link.find('<')?;
    let end = link.find('>')?;
    if end <= start {
        return None;
    }
    let target = link.get(start + 1..end)?;
    if target.starts_with('/') {
        Url::parse(&format!("{base_url}{target}")).ok()
    } else {
        Url::parse(target).ok()
    }
}

#[async_trait]
impl ArtifactCatalog for RegistryClient {
    async fn list_repositories(&self) -> Result<Vec<String>, RegistryError> {
        let first = self.url(&format!("/v2/_catalog?n={PAGE_SIZE}"))?;
        self.list_paginated(first, |page: CatalogResponse| {
            page.repositories.unwrap_or_default()
        })
        .await
    }

    async fn list_tags(&self, repository: &str) -> Result<Vec<String>, RegistryError> {
        let first = self.url(&format!("/v2/{repository}/tags/list?n={PAGE_SIZE}"))?;
        self.list_paginated(first, |page: TagsResponse| page.tags.unwrap_or_default())
            .await
    }
}

#[async_trait]
impl ArtifactDeleter for RegistryClient {
    async fn delete_artifact(
        &self,
        reference: &ArtifactRef,
    ) -> Result<DeleteOutcome, RegistryError> {
        let Some(digest) = self.resolve_digest(reference).await? else {
            return Ok(DeleteOutcome::AlreadyGone);
        };

        let url = self.url(&format!(
            "/v2/{}/manifests/{}",
            reference.repository(),
            digest
        ))?;
        let response = self.http.delete(url.clone()).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(DeleteOutcome::AlreadyGone),
            status if status.is_success() => Ok(DeleteOutcome::Deleted),
            status => Err(RegistryError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::{DELETE, GET, HEAD};
    use httpmock::MockServer;
    use reqwest::header::HeaderValue;
    use serde_json::json;
    use std::net::TcpListener;

    fn can_bind_localhost() -> bool {
        TcpListener::bind("127.0.0.1:0").is_ok()
    }

    fn reference(raw: &str) -> ArtifactRef {
        ArtifactRef::parse(raw).unwrap()
    }

    #[test]
    fn next_link_resolves_relative_path() {
        let mut headers = HeaderMap::new();
        headers.insert(
            LINK,
            HeaderValue::from_static("</v2/_catalog?n=1000&last=b>; rel=\"next\""),
        );
        let url = next_link(&headers, "http://registry:5000").unwrap();
        assert_eq!(url.as_str(), "http://registry:5000/v2/_catalog?n=1000&last=b");
    }

    #[test]
    fn next_link_absent_or_malformed() {
        let mut headers = HeaderMap::new();
        assert!(next_link(&headers, "http://registry").is_none());
        headers.insert(LINK, HeaderValue::from_static("rel=\"next\""));
        assert!(next_link(&headers, "http://registry").is_none());
    }

    #[test]
    fn new_rejects_invalid_url() {
        assert!(matches!(
            RegistryClient::new("not a url"),
            Err(RegistryError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn list_repositories_drains_pagination() {
        if !can_bind_localhost() {
            eprintln!("Skipping httpmock tests: cannot bind to localhost");
            return;
        }
        let server = MockServer::start_async().await;
        let page1 = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/v2/_catalog")
                    .query_param("n", "1000");
                then.status(200)
                    .header("Link", "</v2/_catalog?last=b>; rel=\"next\"")
                    .json_body(json!({ "repositories": ["a", "b"] }));
            })
            .await;
        let page2 = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/v2/_catalog")
                    .query_param("last", "b");
                then.status(200).json_body(json!({ "repositories": ["c"] }));
            })
            .await;

        let client = RegistryClient::new(&server.base_url()).unwrap();
        let repos = client.list_repositories().await.unwrap();

        assert_eq!(repos, vec!["a", "b", "c"]);
        page1.assert_async().await;
        page2.assert_async().await;
    }

    #[tokio::test]
    async fn list_tags_treats_null_as_empty() {
        if !can_bind_localhost() {
            eprintln!("Skipping httpmock tests: cannot bind to localhost");
            return;
        }
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v2/team/service/tags/list");
                then.status(200)
                    .json_body(json!({ "name": "team/service", "tags": null }));
            })
            .await;

        let client = RegistryClient::new(&server.base_url()).unwrap();
        assert!(client.list_tags("team/service").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_tags_surfaces_server_errors() {
        if !can_bind_localhost() {
            eprintln!("Skipping httpmock tests: cannot bind to localhost");
            return;
        }
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v2/broken/tags/list");
                then.status(500);
            })
            .await;

        let client = RegistryClient::new(&server.base_url()).unwrap();
        let err = client.list_tags("broken").await.unwrap_err();
        assert!(matches!(
            err,
            RegistryError::UnexpectedStatus { status: 500, .. }
        ));
    }

    #[tokio::test]
    async fn delete_resolves_digest_then_deletes() {
        if !can_bind_localhost() {
            eprintln!("Skipping httpmock tests: cannot bind to localhost");
            return;
        }
        let server = MockServer::start_async().await;
        let head = server
            .mock_async(|when, then| {
                when.method(HEAD).path("/v2/myimage/manifests/1h");
                then.status(200)
                    .header("Docker-Content-Digest", "sha256:abc123");
            })
            .await;
        let delete = server
            .mock_async(|when, then| {
                when.method(DELETE)
                    .path("/v2/myimage/manifests/sha256:abc123");
                then.status(202);
            })
            .await;

        let client = RegistryClient::new(&server.base_url()).unwrap();
        let outcome = client
            .delete_artifact(&reference("myimage:1h"))
            .await
            .unwrap();

        assert_eq!(outcome, DeleteOutcome::Deleted);
        head.assert_async().await;
        delete.assert_async().await;
    }

    #[tokio::test]
    async fn missing_manifest_is_already_gone() {
        if !can_bind_localhost() {
            eprintln!("Skipping httpmock tests: cannot bind to localhost");
            return;
        }
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(HEAD).path("/v2/myimage/manifests/1h");
                then.status(404);
            })
            .await;
        let delete = server
            .mock_async(|when, then| {
                when.method(DELETE);
                then.status(202);
            })
            .await;

        let client = RegistryClient::new(&server.base_url()).unwrap();
        let outcome = client
            .delete_artifact(&reference("myimage:1h"))
            .await
            .unwrap();

        assert_eq!(outcome, DeleteOutcome::AlreadyGone);
        delete.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn head_without_digest_is_an_error() {
        if !can_bind_localhost() {
            eprintln!("Skipping httpmock tests: cannot bind to localhost");
            return;
        }
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(HEAD).path("/v2/myimage/manifests/1h");
                then.status(200);
            })
            .await;

        let client = RegistryClient::new(&server.base_url()).unwrap();
        let err = client
            .delete_artifact(&reference("myimage:1h"))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::MissingDigest { .. }));
    }

    #[tokio::test]
    async fn rejected_delete_is_an_error() {
        if !can_bind_localhost() {
            eprintln!("Skipping httpmock tests: cannot bind to localhost");
            return;
        }
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(HEAD).path("/v2/myimage/manifests/1h");
                then.status(200)
                    .header("Docker-Content-Digest", "sha256:abc123");
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(DELETE)
                    .path("/v2/myimage/manifests/sha256:abc123");
                then.status(405);
            })
            .await;

        let client = RegistryClient::new(&server.base_url()).unwrap();
        let err = client
            .delete_artifact(&reference("myimage:1h"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::UnexpectedStatus { status: 405, .. }
        ));
    }
}
