//! REST client for the container platform.

use crate::config::PlatformConfig;
use async_trait::async_trait;
use gearbox_core::file::{FileError, FileRef};
use gearbox_core::ids::{ContainerId, FileId, JobId};
use gearbox_core::job::{GearInfo, JobRequest, JobState, JobSummary};
use gearbox_core::ports::{CenterDirectory, FileStore, JobPlatform, ProvenanceLog, VisitStore};
use gearbox_core::provenance::ProvenanceRecord;
use gearbox_core::visit::{ChainProgress, QcStatus, Visit};
use gearbox_core::work_unit::WorkUnit;
use gearbox_core::{Error, Result};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

pub struct HttpPlatform {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct JobCreated {
    id: JobId,
}

#[derive(Deserialize)]
struct JobStatus {
    state: JobState,
}

#[derive(Deserialize)]
struct WriteAccess {
    write: bool,
}

#[derive(Serialize, Deserialize)]
struct QcBody {
    status: Option<QcStatus>,
}

impl HttpPlatform {
    pub fn new(config: &PlatformConfig) -> Result<Self> {
        let base_url = Url::parse(&config.api_url)
            .map_err(|e| Error::Configuration(format!("invalid api_url {}: {}", config.api_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Configuration(format!(
                "api_url {} cannot carry a path",
                config.api_url
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.clone(),
        })
    }

    /// `{api_url}/api/{segments..}`, each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Configuration(format!("api_url {} cannot carry a path", self.base_url)))?
            .pop_if_empty()
            .push("api")
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder> {
        let mut req = self.client.request(method, self.endpoint(segments)?);

        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        Ok(req)
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response> {
        let res = req
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let status = res.status();
        debug!(url = %res.url(), %status, "platform response");

        match status {
            s if s.is_success() => Ok(res),
            StatusCode::NOT_FOUND => Err(Error::NotFound(res.url().path().to_string())),
            StatusCode::CONFLICT => Err(Error::AlreadyExists(res.url().path().to_string())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(Error::Platform(format!("access denied ({status})")))
            }
            _ => {
                let body = res.text().await.unwrap_or_default();
                Err(Error::Platform(format!("{status}: {body}")))
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
    ) -> Result<T> {
        let req = self.request(Method::GET, segments)?.query(query);
        let res = self.send(req).await?;
        res.json().await.map_err(|e| Error::Serialization(e.to_string()))
    }

    async fn get_optional<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<Option<T>> {
        match self.get_json(segments, &[]).await {
            Ok(value) => Ok(Some(value)),
            Err(Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn put_json<B: Serialize + ?Sized>(&self, segments: &[&str], body: &B) -> Result<()> {
        self.send(self.request(Method::PUT, segments)?.json(body))
            .await?;
        Ok(())
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<Response> {
        self.send(self.request(Method::POST, segments)?.json(body))
            .await
    }
}

fn state_list(states: &[JobState]) -> String {
    states
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl JobPlatform for HttpPlatform {
    async fn gear(&self, name: &str) -> Result<Option<GearInfo>> {
        self.get_optional(&["gears", name]).await
    }

    async fn submit(&self, request: &JobRequest) -> Result<JobId> {
        let created: JobCreated = self
            .post_json(&["jobs"], request)
            .await?
            .json()
            .await
            .map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(created.id)
    }

    async fn job_state(&self, id: &JobId) -> Result<JobState> {
        let status: JobStatus = self.get_json(&["jobs", id.as_str()], &[]).await?;
        Ok(status.state)
    }

    async fn list_jobs(
        &self,
        destination: &ContainerId,
        states: &[JobState],
    ) -> Result<Vec<JobSummary>> {
        let states = state_list(states);
        self.get_json(
            &["containers", destination.as_str(), "jobs"],
            &[("states", states.as_str())],
        )
        .await
    }

    async fn can_write(&self, destination: &ContainerId) -> Result<bool> {
        let access: WriteAccess = self
            .get_json(&["containers", destination.as_str(), "access"], &[])
            .await?;
        Ok(access.write)
    }
}

#[async_trait]
impl CenterDirectory for HttpPlatform {
    async fn work_units(&self, source: &str) -> Result<Vec<WorkUnit>> {
        self.get_json(&["metadata", "centers"], &[("source", source)])
            .await
    }
}

#[async_trait]
impl FileStore for HttpPlatform {
    async fn file(&self, id: &FileId) -> Result<FileRef> {
        self.get_json(&["files", id.as_str()], &[]).await
    }

    async fn find_file(&self, container: &ContainerId, name: &str) -> Result<Option<FileRef>> {
        self.get_optional(&["containers", container.as_str(), "files", name])
            .await
    }

    async fn add_file_error(&self, file: &FileId, error: &FileError) -> Result<()> {
        self.post_json(&["files", file.as_str(), "errors"], error)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl VisitStore for HttpPlatform {
    async fn visits(&self, participant: &ContainerId, module: &str) -> Result<Vec<Visit>> {
        self.get_json(
            &["participants", participant.as_str(), "visits"],
            &[("module", module)],
        )
        .await
    }

    async fn set_qc_status(&self, file: &FileId, status: QcStatus) -> Result<()> {
        self.put_json(
            &["files", file.as_str(), "qc"],
            &QcBody {
                status: Some(status),
            },
        )
        .await
    }

    async fn qc_result(&self, file: &FileId) -> Result<Option<QcStatus>> {
        let body: Option<QcBody> = self
            .get_optional(&["files", file.as_str(), "qc", "result"])
            .await?;
        Ok(body.and_then(|b| b.status))
    }

    async fn write_progress(
        &self,
        participant: &ContainerId,
        progress: &ChainProgress,
    ) -> Result<()> {
        self.put_json(
            &[
                "participants",
                participant.as_str(),
                "qc-progress",
                progress.module.as_str(),
            ],
            progress,
        )
        .await
    }
}

#[async_trait]
impl ProvenanceLog for HttpPlatform {
    async fn append(&self, record: &ProvenanceRecord) -> Result<()> {
        self.post_json(&["provenance"], record).await?;
        Ok(())
    }
}
