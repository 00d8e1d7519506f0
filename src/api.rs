use std::future::Future;

use log::debug;
use reqwest::{
    header::{ACCEPT, CONTENT_TYPE, USER_AGENT},
    Client, Response,
};
use serde::de::DeserializeOwned;

use crate::{
    error::{Error, Result},
    structs::*,
};

/// Where stops and shuttles come from. The refresh loop and the initial
/// loader only ever talk to this trait.
pub trait ShuttleSource: Send + Sync {
    /// `GET /stops?campus=`
    fn stops(&self, campus: Campus) -> impl Future<Output = Result<Vec<Stop>>> + Send;

    /// `GET /shuttles?campus=`
    fn shuttles(&self, campus: Campus) -> impl Future<Output = Result<Vec<Shuttle>>> + Send;

    /// `POST /simulate/telemetry?campus=`, advances the backend's simulated fleet.
    fn simulate(&self, campus: Campus) -> impl Future<Output = Result<()>> + Send;
}

//////////////////////////////////////////////////////////
// API calls
//////////////////////////////////////////////////////////
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, campus: Campus) -> Result<T> {
        let url = self.url(path);
        debug!("GET {url}?campus={campus}");

        let resp = self
            .client
            .get(url)
            .query(&[("campus", campus.as_str())])
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, "campus-shuttle")
            .send()
            .await?;

        let body = ensure_success(resp).await?.text().await?;
        parse_json(&body)
    }

    /// Books a ride. Rejections carry the backend's `detail` message.
    pub async fn book(&self, request: &BookingRequest) -> Result<BookingConfirmation> {
        request.validate()?;

        let resp = self
            .client
            .post(self.url("bookings"))
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, "campus-shuttle")
            .json(request)
            .send()
            .await?;

        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::BookingRejected(rejection_detail(&body)));
        }

        let body = resp.text().await?;
        parse_json(&body)
    }
}

impl ShuttleSource for BackendClient {
    async fn stops(&self, campus: Campus) -> Result<Vec<Stop>> {
        self.get_json("stops", campus).await
    }

    async fn shuttles(&self, campus: Campus) -> Result<Vec<Shuttle>> {
        self.get_json("shuttles", campus).await
    }

    async fn simulate(&self, campus: Campus) -> Result<()> {
        let url = self.url("simulate/telemetry");
        debug!("POST {url}?campus={campus}");

        let resp = self
            .client
            .post(url)
            .query(&[("campus", campus.as_str())])
            .header(USER_AGENT, "campus-shuttle")
            .send()
            .await?;

        ensure_success(resp).await?;
        Ok(())
    }
}

async fn ensure_success(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let url = resp.url().clone();
    Err(Error::Network(format!("{url} answered {status}")))
}

pub fn parse_json<T: DeserializeOwned>(body: &str) -> Result<T> {
    Ok(serde_json::from_str(body)?)
}

fn rejection_detail(body: &str) -> String {
    serde_json::from_str::<ErrorDetail>(body)
        .ok()
        .and_then(|e| e.detail)
        .unwrap_or_else(|| "Booking failed".to_string())
}
