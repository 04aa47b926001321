/*!
Source de télémétrie simulée pour tests sans instance Observium

Routes scriptées par endpoint (et sous-ensemble de paramètres), journal de
tous les appels reçus, pannes injectables (statut HTTP, timeout).
*/

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use vigia_kernel::error::FetchFailure;
use vigia_kernel::fetch::TelemetrySource;

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub endpoint: String,
    pub params: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
enum Reply {
    Json(Value),
    Status(u16),
    /// Ne répond jamais dans les temps
    Hang,
}

#[derive(Debug, Clone)]
struct Route {
    endpoint: String,
    params: Vec<(String, String)>,
    reply: Reply,
}

/// Mock de `TelemetrySource`; la dernière route enregistrée qui correspond gagne
#[derive(Clone, Default)]
pub struct MockSource {
    routes: Arc<Mutex<Vec<Route>>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

fn owned(params: &[(&str, &str)]) -> Vec<(String, String)> {
    params.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, endpoint: &str, params: &[(&str, &str)], reply: Reply) -> &Self {
        self.routes.lock().push(Route {
            endpoint: endpoint.trim_start_matches('/').to_string(),
            params: owned(params),
            reply,
        });
        self
    }

    /// Répond `body` à tout appel sur `endpoint`
    pub fn on(&self, endpoint: &str, body: Value) -> &Self {
        self.push(endpoint, &[], Reply::Json(body))
    }

    /// Répond `body` quand tous les `params` sont présents dans la requête
    pub fn on_with(&self, endpoint: &str, params: &[(&str, &str)], body: Value) -> &Self {
        self.push(endpoint, params, Reply::Json(body))
    }

    pub fn fail(&self, endpoint: &str, status: u16) -> &Self {
        self.push(endpoint, &[], Reply::Status(status))
    }

    pub fn hang(&self, endpoint: &str) -> &Self {
        self.push(endpoint, &[], Reply::Hang)
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, endpoint: &str) -> usize {
        let endpoint = endpoint.trim_start_matches('/');
        self.calls.lock().iter().filter(|c| c.endpoint == endpoint).count()
    }

    fn resolve(&self, endpoint: &str, params: &[(String, String)]) -> Option<Reply> {
        self.routes
            .lock()
            .iter()
            .rev()
            .find(|route| route.endpoint == endpoint && route.params.iter().all(|p| params.contains(p)))
            .map(|route| route.reply.clone())
    }
}

#[async_trait]
impl TelemetrySource for MockSource {
    async fn get_json(&self, endpoint: &str, params: &[(String, String)]) -> Result<Value, FetchFailure> {
        let endpoint = endpoint.trim_start_matches('/');
        self.calls.lock().push(RecordedCall {
            endpoint: endpoint.to_string(),
            params: params.to_vec(),
        });
        tracing::debug!(endpoint, "mock source call");

        match self.resolve(endpoint, params) {
            Some(Reply::Json(body)) => Ok(body),
            Some(Reply::Status(status)) => Err(FetchFailure::Status {
                endpoint: endpoint.to_string(),
                status,
            }),
            Some(Reply::Hang) => {
                tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
                Err(FetchFailure::Timeout {
                    endpoint: endpoint.to_string(),
                })
            }
            None => Err(FetchFailure::Status {
                endpoint: endpoint.to_string(),
                status: 404,
            }),
        }
    }
}
