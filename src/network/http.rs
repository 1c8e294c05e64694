use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::multipart::{Form, Part};

use crate::config::{Endpoints, UploadConfig};
use crate::integrity::Digest;
use crate::network::error::{NetworkError, NetworkResult};
use crate::network::transport::UploadTransport;
use crate::network::types::{
    fields, ChunkUploadRequest, MergeRequest, MergeResponse, ProbeRequest, ProbeResponse,
};

/// reqwest-backed transport for the check/chunk/merge endpoints.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoints: Endpoints,
    timeout: Option<Duration>,
}

impl HttpTransport {
    pub fn new(endpoints: Endpoints, timeout: Option<Duration>) -> NetworkResult<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| NetworkError::ClientSetup(e.to_string()))?;

        Ok(Self {
            client,
            endpoints,
            timeout,
        })
    }

    pub fn from_config(config: &UploadConfig) -> NetworkResult<Self> {
        Self::new(config.endpoints(), config.request_timeout())
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    fn request_error(&self, url: &str, err: reqwest::Error) -> NetworkError {
        match self.timeout {
            Some(timeout) if err.is_timeout() => NetworkError::Timeout(timeout),
            _ => NetworkError::from_reqwest(url, err),
        }
    }

    async fn send_probe(&self, digest: &Digest) -> NetworkResult<Vec<u32>> {
        let url = &self.endpoints.check;
        let response = self
            .client
            .post(url)
            .json(&ProbeRequest {
                digest: digest.to_string(),
            })
            .send()
            .await
            .map_err(|e| self.request_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NetworkError::UnexpectedStatus {
                url: url.clone(),
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ProbeResponse = response
            .json()
            .await
            .map_err(|e| NetworkError::InvalidResponse(e.to_string()))?;
        Ok(parsed.uploaded_chunks)
    }

    async fn send_chunk(&self, request: ChunkUploadRequest) -> NetworkResult<()> {
        let url = &self.endpoints.chunk;
        let part = Part::bytes(request.data.to_vec())
            .file_name(request.file_name.clone())
            .mime_str("application/octet-stream")
            .map_err(|e| NetworkError::ClientSetup(e.to_string()))?;

        let form = Form::new()
            .part(fields::CHUNK, part)
            .text(fields::HASH, request.digest.to_string())
            .text(fields::CHUNK_INDEX, request.chunk_index.to_string())
            .text(fields::TOTAL_CHUNKS, request.total_chunks.to_string())
            .text(fields::FILENAME, request.file_name);

        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.request_error(url, e))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(NetworkError::UnexpectedStatus {
                url: url.clone(),
                status: status.as_u16(),
                body,
            })
        }
    }

    async fn send_merge(&self, request: &MergeRequest) -> NetworkResult<MergeResponse> {
        let url = &self.endpoints.merge;
        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|e| self.request_error(url, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.request_error(url, e))?;

        if status.is_success() {
            let payload = serde_json::from_str(&body).unwrap_or(serde_json::Value::String(body));
            Ok(MergeResponse::Completed(payload))
        } else {
            Ok(MergeResponse::Failed {
                status: status.as_u16(),
                body,
            })
        }
    }
}

impl UploadTransport for HttpTransport {
    fn probe<'a>(&'a self, digest: &'a Digest) -> BoxFuture<'a, NetworkResult<Vec<u32>>> {
        self.send_probe(digest).boxed()
    }

    fn upload_chunk(&self, request: ChunkUploadRequest) -> BoxFuture<'_, NetworkResult<()>> {
        self.send_chunk(request).boxed()
    }

    fn merge<'a>(
        &'a self,
        request: &'a MergeRequest,
    ) -> BoxFuture<'a, NetworkResult<MergeResponse>> {
        self.send_merge(request).boxed()
    }
}
