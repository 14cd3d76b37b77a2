use std::{
    env,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
    str::FromStr,
};

use anyhow::{Context, bail};

use crate::store::Tag;

pub const DEFAULT_MODEL_NAME: &str = "flower_model";
pub const DEFAULT_MODEL_TAG: &str = "flower_model:cuh4o3gokoxi75fv";
pub const DEFAULT_MODEL_PATH: &str = "final_iris_model.json";
pub const DEFAULT_STORE_PATH: &str = "model_store";
pub const DEFAULT_LABELS: [&str; 3] = ["setosa", "versicolor", "virginica"];

/// What `classify` does with a request holding more than one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MultiRowPolicy {
    /// Infer every row, answer with the label of row 0.
    #[default]
    FirstRow,
    /// Refuse multi-row requests as invalid input.
    Reject,
}

impl FromStr for MultiRowPolicy {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "first-row" | "first_row" => Ok(MultiRowPolicy::FirstRow),
            "reject" => Ok(MultiRowPolicy::Reject),
            other => bail!("unknown multi-row policy '{other}', expected 'first-row' or 'reject'"),
        }
    }
}

/// Where TorchScript models run. The sequential runtime always uses the CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComputeDevice {
    #[default]
    Cpu,
    Cuda(usize),
}

impl FromStr for ComputeDevice {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let lower = raw.trim().to_ascii_lowercase();
        match lower.split_once(':') {
            None if lower == "cpu" => Ok(ComputeDevice::Cpu),
            None if lower == "cuda" => Ok(ComputeDevice::Cuda(0)),
            Some(("cuda", idx)) => idx
                .parse()
                .map(ComputeDevice::Cuda)
                .with_context(|| format!("invalid CUDA device index '{idx}'")),
            _ => bail!("unknown device '{raw}', expected 'cpu', 'cuda' or 'cuda:N'"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub service_name: String,
    pub store_path: PathBuf,
    pub model_tag: Tag,
    pub labels: Vec<String>,
    pub multi_row_policy: MultiRowPolicy,
    pub device: ComputeDevice,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let listen_addr = match lookup("SERVER_ADDR") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("SERVER_ADDR '{raw}' is not a socket address"))?,
            None => SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 3000),
        };

        let service_name = lookup("SERVICE_NAME").unwrap_or_else(|| "iris_classifier".to_string());
        let store_path = PathBuf::from(
            lookup("MODEL_STORE").unwrap_or_else(|| DEFAULT_STORE_PATH.to_string()),
        );

        let raw_tag = lookup("MODEL_TAG").unwrap_or_else(|| DEFAULT_MODEL_TAG.to_string());
        let model_tag = raw_tag
            .parse::<Tag>()
            .with_context(|| format!("MODEL_TAG '{raw_tag}' is invalid"))?;

        let labels = match lookup("CLASS_LABELS") {
            Some(raw) => parse_labels(&raw)?,
            None => DEFAULT_LABELS.iter().map(|s| s.to_string()).collect(),
        };

        let multi_row_policy = match lookup("MULTI_ROW_POLICY") {
            Some(raw) => raw.parse()?,
            None => MultiRowPolicy::default(),
        };

        let device = match lookup("DEVICE") {
            Some(raw) => raw.parse()?,
            None => ComputeDevice::default(),
        };
        ensure_device_available(device)?;

        Ok(Self {
            listen_addr,
            service_name,
            store_path,
            model_tag,
            labels,
            multi_row_policy,
            device,
        })
    }
}

/// Settings for the one-shot publisher.
#[derive(Debug, Clone)]
pub struct PublishConfig {
    pub model_path: PathBuf,
    pub model_name: String,
    pub store_path: PathBuf,
}

impl PublishConfig {
    /// Model path comes from the first positional argument, everything else
    /// from the environment.
    pub fn from_env() -> anyhow::Result<Self> {
        let path = env::args().nth(1);
        Self::from_parts(path, |key| env::var(key).ok())
    }

    pub fn from_parts<F>(path: Option<String>, lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let model_path = PathBuf::from(path.unwrap_or_else(|| DEFAULT_MODEL_PATH.to_string()));
        let model_name = lookup("MODEL_NAME").unwrap_or_else(|| DEFAULT_MODEL_NAME.to_string());
        Tag::new(&model_name, None)
            .with_context(|| format!("MODEL_NAME '{model_name}' is invalid"))?;
        let store_path = PathBuf::from(
            lookup("MODEL_STORE").unwrap_or_else(|| DEFAULT_STORE_PATH.to_string()),
        );
        Ok(Self {
            model_path,
            model_name,
            store_path,
        })
    }
}

fn parse_labels(raw: &str) -> anyhow::Result<Vec<String>> {
    let labels: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if labels.is_empty() {
        bail!("CLASS_LABELS must name at least one label");
    }
    Ok(labels)
}

#[cfg(feature = "tch-backend")]
fn ensure_device_available(device: ComputeDevice) -> anyhow::Result<()> {
    if let ComputeDevice::Cuda(idx) = device {
        let count = tch::Cuda::device_count();
        if idx as i64 >= count {
            bail!("DEVICE cuda:{idx} requested but {count} CUDA devices are available");
        }
    }
    Ok(())
}

#[cfg(not(feature = "tch-backend"))]
fn ensure_device_available(device: ComputeDevice) -> anyhow::Result<()> {
    if device != ComputeDevice::Cpu {
        bail!("DEVICE {device:?} requires the `tch-backend` feature");
    }
    Ok(())
}
