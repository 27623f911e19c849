//! Request and response shapes of the environment RPC, and the transports
//! that carry them.

use std::fmt;
use std::io::Write;
use std::time::Duration;

use log::trace;
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::space::Space;
use crate::error::{GymkitError, Result};
use crate::tensor::{self, Tensor};

/// Tensor on the wire: flat data plus explicit shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireTensor {
    pub data: Vec<f32>,
    #[serde(default)]
    pub shape: Vec<usize>,
}

impl WireTensor {
    /// Rebuild a dense tensor. A missing shape means a flat vector.
    pub fn to_tensor(&self) -> Result<Tensor> {
        if self.shape.is_empty() {
            return Ok(tensor::vector(&self.data));
        }
        tensor::from_flat(self.data.clone(), &self.shape)
    }
}

impl From<&Tensor> for WireTensor {
    fn from(t: &Tensor) -> Self {
        WireTensor {
            data: t.iter().copied().collect(),
            shape: t.shape().to_vec(),
        }
    }
}

/// Server-side gym wrapper applied at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wrapper {
    pub name: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateEnvRequest {
    pub model_name: String,
    pub wrappers: Vec<Wrapper>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentInfo {
    pub id: String,
    pub action_space: Space,
    pub observation_space: Space,
    pub max_episode_steps: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateEnvResponse {
    pub environment: EnvironmentInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdRequest {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetEnvResponse {
    pub observation: WireTensor,
    #[serde(default)]
    pub goal: Option<WireTensor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepEnvRequest {
    pub id: String,
    pub action: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepEnvResponse {
    pub observation: WireTensor,
    pub reward: f32,
    pub done: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleActionResponse {
    pub value: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderEnvResponse {
    pub frame: WireTensor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeResult {
    pub reward: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRef {
    pub episode_id: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsResponse {
    #[serde(default)]
    pub episode_results: Vec<EpisodeResult>,
    #[serde(default)]
    pub videos: Vec<VideoRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetVideoRequest {
    pub id: String,
    pub episode_id: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfoResponse {
    pub server_name: String,
}

/// Client side of the environment RPC.
///
/// Every call may block on I/O. Implementations surface failures as
/// [`GymkitError::Network`].
pub trait EnvTransport: Send + Sync {
    fn create_env(&self, request: &CreateEnvRequest) -> Result<CreateEnvResponse>;
    fn reset_env(&self, id: &str) -> Result<ResetEnvResponse>;
    fn step_env(&self, id: &str, action: i32) -> Result<StepEnvResponse>;
    fn sample_action(&self, id: &str) -> Result<SampleActionResponse>;
    fn render_env(&self, id: &str) -> Result<RenderEnvResponse>;
    fn delete_env(&self, id: &str) -> Result<MessageResponse>;
    fn results(&self, id: &str) -> Result<ResultsResponse>;
    /// Stream a recorded episode's video into `sink`, returning the byte count.
    fn get_video(&self, id: &str, episode_id: i32, sink: &mut dyn Write) -> Result<u64>;
    fn start_record_env(&self, id: &str) -> Result<MessageResponse>;
    fn info(&self) -> Result<InfoResponse>;
}

impl fmt::Debug for dyn EnvTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EnvTransport")
    }
}

/// JSON-over-HTTP transport: each RPC is a `POST {base_url}/{rpc_name}`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: String,
    client: Client,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(None)
            .build()?;
        Ok(HttpTransport {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn post_raw<B: Serialize + ?Sized>(&self, rpc: &str, body: &B) -> Result<reqwest::blocking::Response> {
        let url = format!("{}/{}", self.base_url, rpc);
        trace!("POST {}", url);
        let response = self.client.post(&url).json(body).send()?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(GymkitError::Network(format!("{} returned {}: {}", rpc, status, text)));
        }
        Ok(response)
    }

    fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, rpc: &str, body: &B) -> Result<T> {
        Ok(self.post_raw(rpc, body)?.json()?)
    }

    fn id(id: &str) -> IdRequest {
        IdRequest { id: id.to_string() }
    }
}

impl EnvTransport for HttpTransport {
    fn create_env(&self, request: &CreateEnvRequest) -> Result<CreateEnvResponse> {
        self.post("create_env", request)
    }

    fn reset_env(&self, id: &str) -> Result<ResetEnvResponse> {
        self.post("reset_env", &Self::id(id))
    }

    fn step_env(&self, id: &str, action: i32) -> Result<StepEnvResponse> {
        self.post("step_env", &StepEnvRequest { id: id.to_string(), action })
    }

    fn sample_action(&self, id: &str) -> Result<SampleActionResponse> {
        self.post("sample_action", &Self::id(id))
    }

    fn render_env(&self, id: &str) -> Result<RenderEnvResponse> {
        self.post("render_env", &Self::id(id))
    }

    fn delete_env(&self, id: &str) -> Result<MessageResponse> {
        self.post("delete_env", &Self::id(id))
    }

    fn results(&self, id: &str) -> Result<ResultsResponse> {
        self.post("results", &Self::id(id))
    }

    fn get_video(&self, id: &str, episode_id: i32, sink: &mut dyn Write) -> Result<u64> {
        let mut response = self.post_raw(
            "get_video",
            &GetVideoRequest { id: id.to_string(), episode_id },
        )?;
        Ok(response.copy_to(sink)?)
    }

    fn start_record_env(&self, id: &str) -> Result<MessageResponse> {
        self.post("start_record_env", &Self::id(id))
    }

    fn info(&self) -> Result<InfoResponse> {
        self.post("info", &serde_json::json!({}))
    }
}
