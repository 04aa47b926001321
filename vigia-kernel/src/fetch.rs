//! Client of the external monitoring service (Observium API v0).
//!
//! The pipeline only sees [`TelemetrySource`]; any failure it returns is
//! recoverable and aborts only the current job iteration.

use crate::error::FetchFailure;
use crate::models::{DeviceSnapshot, PortRecord};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Paramètres de requête (clé, valeur)
pub type Params = Vec<(String, String)>;

#[async_trait]
pub trait TelemetrySource: Send + Sync {
    async fn get_json(&self, endpoint: &str, params: &[(String, String)]) -> Result<Value, FetchFailure>;
}

#[derive(Clone)]
pub struct ObserviumClient {
    client: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
}

impl ObserviumClient {
    pub fn new(base_url: &str, username: &str, password: &str, timeout: Duration) -> Result<Self, FetchFailure> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("vigia-kernel/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchFailure::Transport {
                endpoint: base_url.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    /// URL absolue si l'endpoint en est déjà une, sinon jointure sur la base
    pub fn url_for(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
        }
    }
}

#[async_trait]
impl TelemetrySource for ObserviumClient {
    async fn get_json(&self, endpoint: &str, params: &[(String, String)]) -> Result<Value, FetchFailure> {
        let url = self.url_for(endpoint);
        debug!(%url, params = params.len(), "GET");

        let transport = |e: reqwest::Error| {
            if e.is_timeout() {
                FetchFailure::Timeout { endpoint: endpoint.to_string() }
            } else {
                FetchFailure::Transport {
                    endpoint: endpoint.to_string(),
                    message: e.to_string(),
                }
            }
        };

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .query(params)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchFailure::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(transport)?;
        serde_json::from_slice(&body).map_err(|e| FetchFailure::Decode {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })
    }
}

/// Borne chaque appel de `inner`; dépassement → `FetchFailure::Timeout`
pub struct TimeoutSource {
    inner: Arc<dyn TelemetrySource>,
    limit: Duration,
}

impl TimeoutSource {
    pub fn new(inner: Arc<dyn TelemetrySource>, limit: Duration) -> Self {
        Self { inner, limit }
    }
}

#[async_trait]
impl TelemetrySource for TimeoutSource {
    async fn get_json(&self, endpoint: &str, params: &[(String, String)]) -> Result<Value, FetchFailure> {
        tokio::time::timeout(self.limit, self.inner.get_json(endpoint, params))
            .await
            .map_err(|_| FetchFailure::Timeout { endpoint: endpoint.to_string() })?
    }
}

/// Membre `key` d'une réponse: objet indexé par id ou tableau
pub fn collection(body: &Value, key: &str) -> Vec<Value> {
    match body.get(key) {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::Object(map)) => map.values().cloned().collect(),
        _ => Vec::new(),
    }
}

fn decode_error(endpoint: &str, e: serde_json::Error) -> FetchFailure {
    FetchFailure::Decode {
        endpoint: endpoint.to_string(),
        message: e.to_string(),
    }
}

/// Liste paginée des alertes (`pagesize` / `pageno`, pages à partir de 1).
/// S'arrête sur une page incomplète, au `total` annoncé, ou après `max_pages`.
pub async fn fetch_alerts(
    source: &dyn TelemetrySource,
    page_size: usize,
    max_pages: usize,
) -> Result<Vec<Value>, FetchFailure> {
    let mut alerts = Vec::new();
    for page in 1..=max_pages.max(1) {
        let params = vec![
            ("pagesize".to_string(), page_size.to_string()),
            ("pageno".to_string(), page.to_string()),
        ];
        let body = source.get_json("alerts", &params).await?;
        let entries = collection(&body, "alerts");
        let received = entries.len();
        alerts.extend(entries);

        let total = body
            .get("total")
            .and_then(|t| t.as_u64().or_else(|| t.as_str().and_then(|s| s.parse().ok())));
        if received < page_size || total.is_some_and(|t| alerts.len() as u64 >= t) {
            break;
        }
    }
    debug!(count = alerts.len(), "alerts fetched");
    Ok(alerts)
}

pub async fn fetch_device(source: &dyn TelemetrySource, device_id: &str) -> Result<DeviceSnapshot, FetchFailure> {
    let endpoint = format!("devices/{device_id}");
    let body = source.get_json(&endpoint, &[]).await?;
    match body.get("device") {
        Some(device) => serde_json::from_value(device.clone()).map_err(|e| decode_error(&endpoint, e)),
        None => Ok(DeviceSnapshot::default()),
    }
}

pub async fn fetch_devices(source: &dyn TelemetrySource) -> Result<Vec<Value>, FetchFailure> {
    let body = source.get_json("devices", &[]).await?;
    Ok(collection(&body, "devices"))
}

/// Ports, filtrés côté service par `port_descr_type` si fourni
pub async fn fetch_ports(source: &dyn TelemetrySource, descr_type: Option<&str>) -> Result<Vec<PortRecord>, FetchFailure> {
    let params: Params = descr_type
        .map(|t| vec![("port_descr_type".to_string(), t.to_string())])
        .unwrap_or_default();
    let body = source.get_json("ports", &params).await?;
    collection(&body, "ports")
        .into_iter()
        .map(|raw| serde_json::from_value(raw).map_err(|e| decode_error("ports", e)))
        .collect()
}

pub async fn fetch_graph(
    source: &dyn TelemetrySource,
    endpoint: &str,
    params: &[(String, String)],
) -> Result<Value, FetchFailure> {
    source.get_json(endpoint, params).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    /// Source scriptée: une réponse par appel, journal des paramètres reçus
    struct Scripted {
        pages: Mutex<Vec<Value>>,
        calls: Mutex<Vec<(String, Params)>>,
    }

    impl Scripted {
        fn new(pages: Vec<Value>) -> Self {
            Self {
                pages: Mutex::new(pages.into_iter().rev().collect()),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TelemetrySource for Scripted {
        async fn get_json(&self, endpoint: &str, params: &[(String, String)]) -> Result<Value, FetchFailure> {
            self.calls.lock().push((endpoint.to_string(), params.to_vec()));
            self.pages.lock().pop().ok_or(FetchFailure::Status {
                endpoint: endpoint.to_string(),
                status: 404,
            })
        }
    }

    #[test]
    fn absolute_endpoints_bypass_base_url() {
        let client = ObserviumClient::new("http://nms/api/v0/", "u", "p", Duration::from_secs(1)).unwrap();
        assert_eq!(client.url_for("/alerts"), "http://nms/api/v0/alerts");
        assert_eq!(client.url_for("https://nms/graph.php"), "https://nms/graph.php");
    }

    #[test]
    fn collection_accepts_object_or_array() {
        let keyed = json!({"devices": {"1": {"device_id": 1}, "2": {"device_id": 2}}});
        assert_eq!(collection(&keyed, "devices").len(), 2);
        let listed = json!({"devices": [{"device_id": 1}]});
        assert_eq!(collection(&listed, "devices").len(), 1);
        assert!(collection(&json!({"status": "ok"}), "devices").is_empty());
    }

    #[tokio::test]
    async fn alerts_paging_stops_on_short_page() {
        let source = Scripted::new(vec![
            json!({"alerts": {"1": {"alert_table_id": 1}, "2": {"alert_table_id": 2}}}),
            json!({"alerts": [{"alert_table_id": 3}]}),
        ]);
        let alerts = fetch_alerts(&source, 2, 10).await.unwrap();
        assert_eq!(alerts.len(), 3);

        let calls = source.calls.lock();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].1.contains(&("pageno".to_string(), "2".to_string())));
    }

    #[tokio::test]
    async fn alerts_paging_respects_max_pages() {
        let page = json!({"alerts": [{"alert_table_id": 1}]});
        let source = Scripted::new(vec![page.clone(), page.clone(), page]);
        let alerts = fetch_alerts(&source, 1, 2).await.unwrap();
        assert_eq!(alerts.len(), 2);
    }

    #[tokio::test]
    async fn alerts_paging_stops_at_reported_total() {
        // page pleine, mais le total annoncé est déjà atteint
        let source = Scripted::new(vec![
            json!({"total": "2", "alerts": [{"alert_table_id": 1}, {"alert_table_id": 2}]}),
            json!({"alerts": [{"alert_table_id": 3}]}),
        ]);
        let alerts = fetch_alerts(&source, 2, 10).await.unwrap();
        assert_eq!(alerts.len(), 2);
        assert_eq!(source.calls.lock().len(), 1);

        let numeric = Scripted::new(vec![
            json!({"total": 3, "alerts": [{"alert_table_id": 1}, {"alert_table_id": 2}]}),
            json!({"total": 3, "alerts": [{"alert_table_id": 3}, {"alert_table_id": 4}]}),
            json!({"alerts": [{"alert_table_id": 5}]}),
        ]);
        assert_eq!(fetch_alerts(&numeric, 2, 10).await.unwrap().len(), 4);
        assert_eq!(numeric.calls.lock().len(), 2);
    }

    #[tokio::test]
    async fn ports_carry_descr_type_filter() {
        let source = Scripted::new(vec![json!({"ports": {"7": {"port_id": 7, "ifInOctets": "10"}}})]);
        let ports = fetch_ports(&source, Some("inet")).await.unwrap();
        assert_eq!(ports[0].if_in_octets.as_deref(), Some("10"));
        assert_eq!(
            source.calls.lock()[0].1,
            vec![("port_descr_type".to_string(), "inet".to_string())]
        );
    }

    struct Stalled;

    #[async_trait]
    impl TelemetrySource for Stalled {
        async fn get_json(&self, _endpoint: &str, _params: &[(String, String)]) -> Result<Value, FetchFailure> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Value::Null)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_source_times_out() {
        let source = TimeoutSource::new(Arc::new(Stalled), Duration::from_secs(5));
        assert!(matches!(
            source.get_json("alerts", &[]).await,
            Err(FetchFailure::Timeout { endpoint }) if endpoint == "alerts"
        ));
    }

    #[tokio::test]
    async fn failure_propagates() {
        let source = Scripted::new(vec![]);
        assert!(matches!(
            fetch_device(&source, "3").await,
            Err(FetchFailure::Status { status: 404, .. })
        ));
    }
}
