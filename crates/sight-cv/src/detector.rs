//! Vision model seam
//!
//! The model itself is an external collaborator: a frame goes in, a list
//! of `{class, confidence, box}` comes out. `HttpDetector` talks to a model
//! server over JSON; `DetectionFilter` decides which of its outputs reach
//! the tracker.

use crate::codec::{encode_base64, encode_jpeg};
use crate::{CvError, CvResult, DetectionFilterConfig};
use async_trait::async_trait;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use sight_core::{BoundingBox, Detection};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Produces detections for one frame
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectDetector: Send + Sync {
    /// Run the model on a frame; an empty list is a valid answer
    async fn infer(&self, frame: &RgbImage) -> CvResult<Vec<Detection>>;

    /// Short name for logs and the health report
    fn name(&self) -> &str;
}

// ============================================================================
// DETECTION FILTER
// ============================================================================

/// Class allow-list and confidence floor applied before association
#[derive(Debug, Clone)]
pub struct DetectionFilter {
    classes: HashSet<String>,
    min_confidence: f64,
}

impl DetectionFilter {
    pub fn new(config: &DetectionFilterConfig) -> Self {
        Self {
            classes: config.classes.iter().map(|c| c.to_lowercase()).collect(),
            min_confidence: config.min_confidence,
        }
    }

    pub fn accepts(&self, detection: &Detection) -> bool {
        if !detection.confidence.is_finite() || detection.confidence <= self.min_confidence {
            return false;
        }
        if !self.classes.is_empty() && !self.classes.contains(&detection.class.as_str().to_lowercase()) {
            return false;
        }
        let b = &detection.bbox;
        BoundingBox::try_new(b.x1, b.y1, b.x2, b.y2).is_ok()
    }

    pub fn apply(&self, detections: Vec<Detection>) -> Vec<Detection> {
        let before = detections.len();
        let kept: Vec<Detection> = detections.into_iter().filter(|d| self.accepts(d)).collect();
        if kept.len() != before {
            trace!("Detection filter kept {}/{}", kept.len(), before);
        }
        kept
    }
}

// ============================================================================
// HTTP MODEL CLIENT
// ============================================================================

#[derive(Debug, Serialize)]
struct InferRequest<'a> {
    image: &'a str,
    width: u32,
    height: u32,
}

#[derive(Debug, Deserialize)]
struct InferResponse {
    #[serde(default)]
    detections: Vec<WireDetection>,
}

#[derive(Debug, Deserialize)]
struct WireDetection {
    class: String,
    confidence: f64,
    bbox: [f64; 4],
}

impl WireDetection {
    fn into_detection(self) -> Option<Detection> {
        let [x1, y1, x2, y2] = self.bbox;
        match BoundingBox::try_new(x1, y1, x2, y2) {
            Ok(bbox) => Some(Detection::new(self.class.as_str(), self.confidence, bbox)),
            Err(e) => {
                trace!("Discarding model output: {}", e);
                None
            }
        }
    }
}

fn parse_response(body: &str) -> CvResult<Vec<Detection>> {
    let response: InferResponse = serde_json::from_str(body)
        .map_err(|e| CvError::inference(format!("malformed model response: {}", e)))?;
    Ok(response
        .detections
        .into_iter()
        .filter_map(WireDetection::into_detection)
        .collect())
}

/// Remote model server: `POST {endpoint}/infer`, `GET {endpoint}/health`
pub struct HttpDetector {
    client: reqwest::Client,
    endpoint: String,
    jpeg_quality: u8,
}

impl HttpDetector {
    pub fn new(endpoint: impl Into<String>, timeout: Duration, jpeg_quality: u8) -> CvResult<Self> {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        if endpoint.is_empty() {
            return Err(CvError::invalid_config("detector endpoint is empty"));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CvError::invalid_config(format!("http client: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            jpeg_quality,
        })
    }

    /// Check the model server answers before the pipeline starts
    pub async fn probe(&self) -> CvResult<()> {
        let url = format!("{}/health", self.endpoint);
        self.client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| CvError::ResourceUnavailable(format!("{}: {}", url, e)))?;
        debug!("Model server reachable at {}", self.endpoint);
        Ok(())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ObjectDetector for HttpDetector {
    async fn infer(&self, frame: &RgbImage) -> CvResult<Vec<Detection>> {
        let start = Instant::now();
        let jpeg = encode_jpeg(frame, self.jpeg_quality)?;
        let image = encode_base64(&jpeg);
        let request = InferRequest {
            image: &image,
            width: frame.width(),
            height: frame.height(),
        };

        let body = self
            .client
            .post(format!("{}/infer", self.endpoint))
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let detections = parse_response(&body)?;
        trace!(
            "Model returned {} detections in {:.1}ms",
            detections.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(detections)
    }

    fn name(&self) -> &str {
        "http"
    }
}

// ============================================================================
// TESTS
// ============================================================================
