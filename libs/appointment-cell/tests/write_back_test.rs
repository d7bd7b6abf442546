use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use mockall::{mock, Sequence};
use serde_json::{json, Value};

use appointment_cell::{normalize_appointment, AppointmentStatus, StatusWriteBack};
use reference_cell::EndpointCatalog;
use shared_database::ClinicBackend;
use shared_utils::test_utils::MockClinicResponses;

mock! {
    pub Backend {}

    #[async_trait]
    impl ClinicBackend for Backend {
        async fn get(&self, path: &str) -> anyhow::Result<Value>;
        async fn put(&self, path: &str, body: Option<Value>) -> anyhow::Result<Value>;
    }
}

fn write_back(backend: MockBackend) -> StatusWriteBack {
    StatusWriteBack::new(Arc::new(backend), EndpointCatalog::default())
}

#[tokio::test]
async fn targeted_update_is_tried_first_and_is_enough() {
    let mut backend = MockBackend::new();
    backend
        .expect_put()
        .withf(|path, body| path.ends_with("/appointments/101/status?status=CheckedIn") && body.is_none())
        .times(1)
        .returning(|_, _| Ok(json!({ "success": true })));
    backend.expect_get().never();

    let record = MockClinicResponses::appointment_record(101, "6", "12", "2025-07-01", "Scheduled");
    let appointment = normalize_appointment(&record).expect("identity");

    let server_status = write_back(backend)
        .write_status(&appointment, AppointmentStatus::CheckedIn)
        .await
        .expect("accepted");

    assert_eq!(server_status, None);
}

#[tokio::test]
async fn full_replace_carries_flattened_references_and_padded_time() {
    let mut seq = Sequence::new();
    let mut backend = MockBackend::new();

    backend
        .expect_put()
        .withf(|path, _| path.contains("/status?"))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Err(anyhow!("API error (405 Method Not Allowed): ")));

    backend
        .expect_put()
        .withf(|path, body| {
            let Some(body) = body else { return false };
            path.ends_with("/appointments/7")
                && body.get("patient").is_none()
                && body["patientId"] == "6"
                && body["doctorId"] == "12"
                && body["status"] == "Cancelled"
                && body["time"] == "10:30:00"
        })
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(json!({ "data": { "appointmentId": 7, "status": "CANCELLED" } })));

    let record = MockClinicResponses::nested_appointment_record(7, "6", "12", "2025-07-02", "Scheduled");
    let appointment = normalize_appointment(&record).expect("identity");

    let server_status = write_back(backend)
        .write_status(&appointment, AppointmentStatus::Cancelled)
        .await
        .expect("full replace accepted");

    assert_eq!(server_status, Some(AppointmentStatus::Cancelled));
}

#[tokio::test]
async fn both_failures_are_reported_together() {
    let mut backend = MockBackend::new();
    backend
        .expect_put()
        .times(2)
        .returning(|path, _| Err(anyhow!("API error (503 Service Unavailable): {}", path)));

    let record = MockClinicResponses::appointment_record(101, "6", "12", "2025-07-01", "Scheduled");
    let appointment = normalize_appointment(&record).expect("identity");

    let error = write_back(backend)
        .write_status(&appointment, AppointmentStatus::Completed)
        .await
        .expect_err("both paths fail");

    assert!(error.contains("/appointments/101/status?status=Completed"));
    assert!(error.contains("full replace failed"));
}
