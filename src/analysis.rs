//! Image-analysis provider client. Returns brightness/sharpness/contrast
//! scores in [0, 1] for an uploaded page image; the quality gate in
//! `imaging` decides what to do with them.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use crate::imaging::QualityScores;

#[async_trait]
pub trait ImageAnalyzer: Send + Sync + 'static {
    async fn analyze(&self, image: Vec<u8>, file_name: &str) -> Result<QualityScores>;
}

pub struct HttpImageAnalyzer {
    client: reqwest::Client,
    endpoint: String,
    api_user: String,
    api_secret: String,
}

impl HttpImageAnalyzer {
    pub fn new(
        endpoint: impl Into<String>,
        api_user: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_user: api_user.into(),
            api_secret: api_secret.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AnalysisResponse {
    brightness: f64,
    sharpness: f64,
    contrast: f64,
}

#[async_trait]
impl ImageAnalyzer for HttpImageAnalyzer {
    async fn analyze(&self, image: Vec<u8>, file_name: &str) -> Result<QualityScores> {
        let media = Part::bytes(image).file_name(file_name.to_string());
        let form = Form::new()
            .part("media", media)
            .text("models", "properties")
            .text("api_user", self.api_user.clone())
            .text("api_secret", self.api_secret.clone());

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .context("image analysis request failed")?
            .error_for_status()
            .context("image analysis returned an error status")?;

        let parsed: AnalysisResponse = response
            .json()
            .await
            .context("failed to parse image analysis response")?;

        Ok(QualityScores {
            brightness: parsed.brightness,
            sharpness: parsed.sharpness,
            contrast: parsed.contrast,
        })
    }
}
