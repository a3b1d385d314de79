use reqwest::header::HeaderMap;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::warn;

use super::coerce;
use super::coerce::PublishedState;
use super::error::PollError;
use super::http::HttpFetch;
use crate::config::SensorConfig;
use crate::engine::PollerMessage;
use crate::template::Render;

/// Poller for a single configured sensor
///
/// Owns the sensor's configuration, its prebuilt request headers, and
/// the fetch/render seams. One poll cycle runs to completion before the
/// next is scheduled; cycles for one sensor never overlap.
pub struct Poller {
    sensor_id: String,
    config: SensorConfig,
    headers: HeaderMap,
    fetch: Box<dyn HttpFetch>,
    render: Box<dyn Render>,
}

impl Poller {
    /// Create a poller for one sensor
    ///
    /// The request header map is built once here; `authorization` wins
    /// any collision with a configured `Authorization` header.
    pub fn new(
        sensor_id: String,
        config: SensorConfig,
        fetch: Box<dyn HttpFetch>,
        render: Box<dyn Render>,
    ) -> anyhow::Result<Self> {
        let headers = config.header_map()?;
        Ok(Self {
            sensor_id,
            config,
            headers,
            fetch,
            render,
        })
    }

    pub fn sensor_id(&self) -> &str {
        &self.sensor_id
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Execute one poll cycle: fetch, optionally reshape through the
    /// template, and coerce to a state string plus attributes.
    ///
    /// No retry happens here; a failed cycle is reported and the next
    /// scheduled tick tries again from scratch.
    pub async fn poll(&self) -> Result<PublishedState, PollError> {
        let body = self.fetch.fetch_json(&self.config.url, &self.headers).await?;

        let value = match &self.config.attributes_template {
            Some(source) => {
                let rendered = self
                    .render
                    .render(source, &body)
                    .map_err(PollError::TemplateRender)?;
                debug!(
                    "Rendered attributes template for {}: {} chars",
                    self.sensor_id,
                    rendered.len()
                );
                serde_json::from_str(&rendered).map_err(PollError::TemplateOutputParse)?
            }
            None => body,
        };

        Ok(coerce::from_value(&value))
    }

    /// Drive the poll loop until the engine goes away
    ///
    /// The first cycle fires immediately, then one per scan interval.
    /// Missed ticks are delayed rather than bursted, so a slow endpoint
    /// can never cause overlapping or back-to-back polls.
    pub async fn run(self, tx: mpsc::Sender<PollerMessage>) {
        let mut interval = tokio::time::interval(self.config.scan_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            let msg = match self.poll().await {
                Ok(published) => {
                    debug!(
                        "Poll cycle for {} succeeded: state={}",
                        self.sensor_id, published.state
                    );
                    PollerMessage::Published {
                        sensor_id: self.sensor_id.clone(),
                        state: published.state,
                        attributes: published.attributes,
                    }
                }
                Err(e) => {
                    warn!(
                        "Poll cycle for {} failed ({}): {}",
                        self.sensor_id,
                        e.kind(),
                        e
                    );
                    PollerMessage::Unavailable {
                        sensor_id: self.sensor_id.clone(),
                        reason: e.to_string(),
                    }
                }
            };

            if tx.send(msg).await.is_err() {
                // Engine dropped its receiver; nothing left to publish to.
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::poller::http::MockFetch;
    use crate::template::RenderError;

    fn sensor_config(template: Option<&str>) -> SensorConfig {
        SensorConfig {
            name: "Test Sensor".to_string(),
            url: "https://api.example.com/data".to_string(),
            authorization: None,
            headers: HashMap::new(),
            scan_interval: Duration::from_millis(10),
            timeout: Duration::from_secs(10),
            attributes_template: template.map(String::from),
        }
    }

    /// Render seam fake that ignores the template source
    struct FixedRender(Result<String, String>);

    impl Render for FixedRender {
        fn render(
            &self,
            _source: &str,
            _value_json: &serde_json::Value,
        ) -> Result<String, RenderError> {
            match &self.0 {
                Ok(s) => Ok(s.clone()),
                Err(e) => Err(RenderError::new(e.clone())),
            }
        }
    }

    fn ok_render() -> Box<dyn Render> {
        Box::new(FixedRender(Ok("{}".to_string())))
    }

    #[tokio::test]
    async fn test_poll_without_template_coerces_body() {
        let fetch = MockFetch::new();
        fetch.push_response(Ok(json!([{"id": 1}, {"id": 2}])));

        let poller = Poller::new(
            "test".to_string(),
            sensor_config(None),
            Box::new(fetch),
            ok_render(),
        )
        .unwrap();

        let published = poller.poll().await.unwrap();
        assert_eq!(published.state, "2");
        assert_eq!(published.attributes["items"], json!([{"id": 1}, {"id": 2}]));
    }

    #[tokio::test]
    async fn test_poll_sends_merged_headers() {
        let fetch = std::sync::Arc::new(MockFetch::new());
        fetch.push_response(Ok(json!({})));

        let mut config = sensor_config(None);
        config.authorization = Some("Bearer X".to_string());
        config.headers =
            HashMap::from([("Authorization".to_string(), "Bearer Y".to_string())]);

        let poller = Poller::new(
            "test".to_string(),
            config,
            Box::new(fetch.clone()),
            ok_render(),
        )
        .unwrap();

        let _ = poller.poll().await.unwrap();

        let requests = fetch.requests.lock().unwrap();
        let (url, headers) = &requests[0];
        assert_eq!(url, "https://api.example.com/data");
        assert_eq!(headers.get("Authorization").unwrap(), "Bearer X");
        assert_eq!(headers.len(), 1);
    }

    #[tokio::test]
    async fn test_poll_applies_template_output() {
        let fetch = MockFetch::new();
        fetch.push_response(Ok(json!([{"id": 1, "name": "a"}])));

        let poller = Poller::new(
            "test".to_string(),
            sensor_config(Some("unused by fake")),
            Box::new(fetch),
            Box::new(FixedRender(Ok(r#"{"out": [{"id": 1}], "count": 1}"#.to_string()))),
        )
        .unwrap();

        let published = poller.poll().await.unwrap();
        assert_eq!(published.state, "1");
        assert_eq!(published.attributes["out"], json!([{"id": 1}]));
    }

    #[tokio::test]
    async fn test_template_render_failure() {
        let fetch = MockFetch::new();
        fetch.push_response(Ok(json!({})));

        let poller = Poller::new(
            "test".to_string(),
            sensor_config(Some("{{ broken")),
            Box::new(fetch),
            Box::new(FixedRender(Err("unexpected end of template".to_string()))),
        )
        .unwrap();

        let err = poller.poll().await.unwrap_err();
        assert_eq!(err.kind(), "template_render");
    }

    #[tokio::test]
    async fn test_template_output_must_be_json() {
        let fetch = MockFetch::new();
        fetch.push_response(Ok(json!({})));

        let poller = Poller::new(
            "test".to_string(),
            sensor_config(Some("{{ value_json }}")),
            Box::new(fetch),
            Box::new(FixedRender(Ok("not json at all".to_string()))),
        )
        .unwrap();

        let err = poller.poll().await.unwrap_err();
        assert_eq!(err.kind(), "template_output_parse");
    }

    #[tokio::test]
    async fn test_http_status_error_propagates() {
        let fetch = MockFetch::new();
        fetch.push_response(Err(PollError::HttpStatus(
            reqwest::StatusCode::SERVICE_UNAVAILABLE,
        )));

        let poller = Poller::new(
            "test".to_string(),
            sensor_config(None),
            Box::new(fetch),
            ok_render(),
        )
        .unwrap();

        let err = poller.poll().await.unwrap_err();
        assert_eq!(err.kind(), "http_status");
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_run_reports_failure_then_recovers() {
        let fetch = MockFetch::new();
        fetch.push_response(Err(PollError::HttpStatus(
            reqwest::StatusCode::BAD_GATEWAY,
        )));
        fetch.push_response(Ok(json!({"count": 7})));

        let poller = Poller::new(
            "test".to_string(),
            sensor_config(None),
            Box::new(fetch),
            ok_render(),
        )
        .unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let handle = tokio::spawn(poller.run(tx));

        let first = rx.recv().await.unwrap();
        match first {
            PollerMessage::Unavailable { sensor_id, reason } => {
                assert_eq!(sensor_id, "test");
                assert!(reason.contains("502"));
            }
            other => panic!("expected Unavailable, got {:?}", other),
        }

        let second = rx.recv().await.unwrap();
        match second {
            PollerMessage::Published {
                sensor_id, state, ..
            } => {
                assert_eq!(sensor_id, "test");
                assert_eq!(state, "7");
            }
            other => panic!("expected Published, got {:?}", other),
        }

        drop(rx);
        handle.await.unwrap();
    }
}
