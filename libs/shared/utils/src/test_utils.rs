use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::watch;

use shared_config::AppConfig;
use shared_database::ClinicBackend;
use shared_models::session::{Role, Session};

pub struct TestConfig {
    pub api_base_url: String,
    pub api_token: Option<String>,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080".to_string(),
            api_token: Some("test-portal-token".to_string()),
        }
    }
}

impl TestConfig {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            api_base_url: self.api_base_url.clone(),
            api_token: self.api_token.clone(),
            request_timeout_secs: 5,
            ..AppConfig::default()
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestSession;

impl TestSession {
    pub fn doctor() -> Session {
        Session::new("12", Role::Doctor)
    }

    pub fn patient() -> Session {
        Session::new("6", Role::Patient)
    }

    pub fn admin() -> Session {
        Session::new("admin-1", Role::Admin)
    }
}

/// Raw records in the inconsistent shapes the portal backend produces.
pub struct MockClinicResponses;

impl MockClinicResponses {
    pub fn patient_record(id: &str, name: &str) -> Value {
        json!({
            "pId": id,
            "pName": name,
            "pAge": 34,
            "pGender": "Male",
            "bloodGroup": "B+",
            "pContact": "9876543210",
            "pEmail": format!("patient{}@example.com", id),
            "pAddress": "Mangaluru"
        })
    }

    pub fn patient_record_split_name(id: &str, first: &str, last: &str) -> Value {
        json!({
            "P_ID": id,
            "firstName": first,
            "lastName": last,
            "gender": "Female"
        })
    }

    pub fn doctor_record(id: &str, name: &str, specialization: &str) -> Value {
        json!({
            "dId": id,
            "dName": name,
            "specialization": specialization,
            "dContact": "0824-555-0101"
        })
    }

    pub fn appointment_record(id: u64, patient_id: &str, doctor_id: &str, date: &str, status: &str) -> Value {
        json!({
            "apId": id,
            "pId": patient_id,
            "dId": doctor_id,
            "appointmentDate": date,
            "appointmentTime": "09:00",
            "appointmentType": "Consultation",
            "status": status
        })
    }

    pub fn nested_appointment_record(id: u64, patient_id: &str, doctor_id: &str, date: &str, status: &str) -> Value {
        json!({
            "appointmentId": id,
            "patient": { "id": patient_id, "name": "Nested Patient" },
            "doctor": { "id": doctor_id, "name": "Nested Doctor" },
            "date": date,
            "time": "10:30:00",
            "type": "Follow-up",
            "status": status,
            "notes": "bring reports"
        })
    }

    pub fn envelope(items: Vec<Value>) -> Value {
        json!({ "data": items })
    }

    pub fn error_response(message: &str) -> Value {
        json!({
            "success": false,
            "message": message
        })
    }
}

enum Scripted {
    Json(Value),
    Fail(String),
}

/// In-memory backend with per-route call counters.
///
/// Routes are keyed by `"<METHOD> <path>"` with the path exactly as the core
/// requests it (query string included). Unscripted routes fail like a 404.
/// `hold()` parks every GET until `release()`, which lets tests observe
/// requests while they are still in flight.
pub struct ScriptedBackend {
    routes: Mutex<HashMap<String, Scripted>>,
    calls: Mutex<HashMap<String, usize>>,
    bodies: Mutex<Vec<(String, Option<Value>)>>,
    gate: watch::Sender<bool>,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            routes: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            bodies: Mutex::new(Vec::new()),
            gate,
        }
    }
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, method: &str, path: &str, body: Value) -> &Self {
        self.routes
            .lock()
            .expect("routes lock")
            .insert(route_key(method, path), Scripted::Json(body));
        self
    }

    pub fn fail(&self, method: &str, path: &str, message: &str) -> &Self {
        self.routes
            .lock()
            .expect("routes lock")
            .insert(route_key(method, path), Scripted::Fail(message.to_string()));
        self
    }

    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    pub fn calls(&self, method: &str, path: &str) -> usize {
        self.calls
            .lock()
            .expect("calls lock")
            .get(&route_key(method, path))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().expect("calls lock").values().sum()
    }

    /// Bodies sent with PUT, in order.
    pub fn sent_bodies(&self) -> Vec<(String, Option<Value>)> {
        self.bodies.lock().expect("bodies lock").clone()
    }

    async fn dispatch(&self, method: &str, path: &str, body: Option<Value>) -> Result<Value> {
        let key = route_key(method, path);
        *self.calls.lock().expect("calls lock").entry(key.clone()).or_insert(0) += 1;

        if method == "GET" {
            let mut open = self.gate.subscribe();
            // A closed sender means the backend is being dropped; just proceed.
            let _ = open.wait_for(|is_open| *is_open).await;
        } else {
            self.bodies.lock().expect("bodies lock").push((key.clone(), body));
        }

        match self.routes.lock().expect("routes lock").get(&key) {
            Some(Scripted::Json(value)) => Ok(value.clone()),
            Some(Scripted::Fail(message)) => Err(anyhow!("API error (500): {}", message)),
            None => Err(anyhow!("Resource not found: {}", key)),
        }
    }
}

fn route_key(method: &str, path: &str) -> String {
    format!("{} {}", method.to_ascii_uppercase(), path)
}

#[async_trait]
impl ClinicBackend for ScriptedBackend {
    async fn get(&self, path: &str) -> Result<Value> {
        self.dispatch("GET", path, None).await
    }

    async fn put(&self, path: &str, body: Option<Value>) -> Result<Value> {
        self.dispatch("PUT", path, body).await
    }
}
