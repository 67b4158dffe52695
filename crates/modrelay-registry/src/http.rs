//! HTTP registry backend.
//!
//! Talks to a registry exposing the module proxy API under
//! `{base}/api/go/{repo}` and accepting deploys under `{base}/{repo}`.
//! Existence is a `HEAD` of the requirements file: 200 means present, 404
//! absent, anything else is an error.

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use tracing::{debug, info};

use crate::client::RegistryBackend;
use crate::coordinate::ModuleCoordinate;
use crate::endpoint::RegistryEndpoint;
use crate::error::{RegistryError, Result};
use crate::integrity::ContentHash;
use crate::publish::{ModuleInfo, PublishRequest};

const CHECKSUM_HEADER: &str = "X-Checksum-Sha256";

pub struct HttpRegistry {
    endpoint: RegistryEndpoint,
    client: Client,
}

impl HttpRegistry {
    pub fn new(endpoint: RegistryEndpoint) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("modrelay/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(HttpRegistry { endpoint, client })
    }

    pub fn endpoint(&self) -> &RegistryEndpoint {
        &self.endpoint
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let creds = self.endpoint.credentials();
        if let Some(token) = creds.access_token.as_deref().filter(|t| !t.is_empty()) {
            return request.bearer_auth(token);
        }
        match creds.user.as_deref().filter(|u| !u.is_empty()) {
            Some(user) => request.basic_auth(user, creds.password.clone()),
            None => request,
        }
    }

    /// GET a URL, mapping 404 to `None`.
    fn get_optional(&self, url: &str) -> Result<Option<Response>> {
        debug!("GET {url}");
        let response = self.authorize(self.client.get(url)).send()?;
        match response.status() {
            StatusCode::OK => Ok(Some(response)),
            StatusCode::NOT_FOUND => Ok(None),
            other => Err(RegistryError::UnexpectedStatus {
                status: other.as_u16(),
                url: url.to_string(),
            }),
        }
    }

    fn deploy(&self, url: &str, body: Vec<u8>, module: &str) -> Result<()> {
        let checksum = ContentHash::compute(&body);
        debug!("PUT {url}");
        let response = self
            .authorize(self.client.put(url))
            .header(CHECKSUM_HEADER, checksum.as_str())
            .body(body)
            .send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(RegistryError::PublishFailed {
                module: module.to_string(),
                detail: format!("{url} answered {}", status.as_u16()),
            });
        }
        Ok(())
    }
}

impl RegistryBackend for HttpRegistry {
    fn mod_exists(&self, coord: &ModuleCoordinate) -> Result<bool> {
        let url = self.endpoint.module_url(coord, "mod");
        debug!("HEAD {url}");
        let response = self.authorize(self.client.head(&url)).send()?;
        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            other => Err(RegistryError::UnexpectedStatus {
                status: other.as_u16(),
                url,
            }),
        }
    }

    fn fetch_mod(&self, coord: &ModuleCoordinate) -> Result<Option<Vec<u8>>> {
        let url = self.endpoint.module_url(coord, "mod");
        match self.get_optional(&url)? {
            Some(response) => Ok(Some(response.bytes()?.to_vec())),
            None => Ok(None),
        }
    }

    fn resolve_version(&self, module_path: &str, query: &str) -> Result<Option<String>> {
        let url = self.endpoint.info_query_url(module_path, query);
        match self.get_optional(&url)? {
            Some(response) => {
                let info: ModuleInfo = serde_json::from_slice(&response.bytes()?)?;
                Ok(Some(info.version))
            }
            None => Ok(None),
        }
    }

    fn publish(&self, request: &PublishRequest) -> Result<()> {
        let coord = request.coordinate();
        let module = coord.graph_key();
        let url_for = |ext: &str| self.endpoint.deploy_url(&request.target_repo, &coord, ext);
        self.deploy(&url_for("zip"), std::fs::read(&request.zip_path)?, &module)?;
        self.deploy(&url_for("mod"), request.mod_content.clone(), &module)?;
        self.deploy(&url_for("info"), request.info_bytes()?, &module)?;
        info!("Deployed {module} to {}", request.target_repo);
        Ok(())
    }

    fn proxy_value(&self, direct_fallback: bool) -> Result<String> {
        self.endpoint.proxy_value(direct_fallback)
    }
}
