//! reqwest adapters for the external room service and identity service.
//!
//! Both services use a bearer secret key. A 404 means "not present" and is
//! returned as `None`; any other non-2xx status is an error.

pub mod identity;
pub mod rooms;

use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use url::Url;

pub use identity::IdentityServiceClient;
pub use rooms::RoomServiceClient;

pub fn build_http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("lessonroom/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("build http client")
}

#[derive(Clone)]
pub(crate) struct RestClient {
    client: Client,
    base_url: Url,
    secret_key: String,
    service: &'static str,
}

impl RestClient {
    pub(crate) fn new(
        client: Client,
        service: &'static str,
        base_url: &str,
        secret_key: &str,
    ) -> Result<Self> {
        let base_url =
            Url::parse(base_url).with_context(|| format!("invalid {service} base url {base_url}"))?;
        if base_url.cannot_be_a_base() {
            bail!("{service} base url {base_url} cannot carry a path");
        }
        Ok(Self {
            client,
            base_url,
            secret_key: secret_key.to_owned(),
            service,
        })
    }

    /// Appends percent-encoded path segments to the base url.
    pub(crate) fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<Option<T>> {
        let request = self.client.get(url.clone());
        match self.send(request, &url).await? {
            Some(response) => self.decode(response, &url).await.map(Some),
            None => Ok(None),
        }
    }

    pub(crate) async fn post_json<B, T>(&self, url: Url, body: &B) -> Result<Option<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.client.post(url.clone()).json(body);
        match self.send(request, &url).await? {
            Some(response) => self.decode(response, &url).await.map(Some),
            None => Ok(None),
        }
    }

    /// POST whose response body is not needed. `false` on 404.
    pub(crate) async fn post_unit<B>(&self, url: Url, body: &B) -> Result<bool>
    where
        B: Serialize + ?Sized,
    {
        let request = self.client.post(url.clone()).json(body);
        Ok(self.send(request, &url).await?.is_some())
    }

    pub(crate) async fn delete(&self, url: Url) -> Result<bool> {
        let request = self.client.delete(url.clone());
        Ok(self.send(request, &url).await?.is_some())
    }

    async fn send(&self, request: RequestBuilder, url: &Url) -> Result<Option<Response>> {
        let response = request
            .bearer_auth(&self.secret_key)
            .header("accept", "application/json")
            .send()
            .await
            .with_context(|| format!("request {} {}", self.service, url.path()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unavailable>".to_string());
            return Err(anyhow!(
                "{} {} returned {}: {}",
                self.service,
                url.path(),
                status,
                body
            ));
        }
        Ok(Some(response))
    }

    async fn decode<T: DeserializeOwned>(&self, response: Response, url: &Url) -> Result<T> {
        response
            .json::<T>()
            .await
            .with_context(|| format!("decode {} {} response", self.service, url.path()))
    }
}
