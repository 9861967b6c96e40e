mod common;

use std::path::PathBuf;
use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD};
use common::{FakeTransport, client_with, texts, uninitialized_client};
use radiology_assistant::services::image::{ImageSource, UploadedImage};
use radiology_assistant::services::image_analysis::{ANALYSIS_ERROR_MESSAGE, ImageAnalysisService};
use radiology_assistant::services::metrics_manager::MetricsManager;
use radiology_assistant::services::model_client::{GenerateRequest, Modality, Part};

const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0, 0, 0, 13, 0xff];

fn inline_bytes(request: &GenerateRequest) -> (String, Vec<u8>) {
    request.contents[0]
        .parts
        .iter()
        .find_map(|p| match p {
            Part::InlineData(data) => Some((
                data.mime_type.clone(),
                STANDARD.decode(&data.data).expect("inline data is base64"),
            )),
            Part::Text(_) => None,
        })
        .expect("request carries inline data")
}

#[tokio::test]
async fn upload_is_analyzed() {
    let transport = FakeTransport::replying("Normal PA chest radiograph.");
    let metrics = MetricsManager::new();
    let service = ImageAnalysisService::new(client_with(transport.clone()).await, metrics.clone());

    let upload = UploadedImage::new(Some("chest.png".into()), "image/png", PNG_BYTES.to_vec()).unwrap();
    let snapshot = service.analyze(ImageSource::Upload(upload)).await;

    assert_eq!(snapshot.result.as_deref(), Some("Normal PA chest radiograph."));
    assert!(snapshot.error.is_none());
    assert!(!snapshot.pending);

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    let (model, request) = &requests[0];
    assert_eq!(model, "gemini-1.5-flash");
    assert!(request.generation_config.is_none());
    assert_eq!(inline_bytes(request), ("image/png".to_string(), PNG_BYTES.to_vec()));
    assert_eq!(metrics.get_metrics().await.analyses_completed, 1);
}

#[tokio::test]
async fn data_url_prefix_is_stripped_before_sending() {
    let transport = FakeTransport::replying("Findings described.");
    let service = ImageAnalysisService::new(client_with(transport.clone()).await, MetricsManager::new());

    let url = format!("data:image/png;base64,{}", STANDARD.encode(PNG_BYTES));
    service.analyze(ImageSource::DataUrl(url)).await;

    let (_, request) = &transport.requests()[0];
    let Part::InlineData(data) = &request.contents[0].parts[0] else {
        panic!("first part should be the image");
    };
    assert!(!data.data.starts_with("data:"));
    assert_eq!(STANDARD.decode(&data.data).unwrap(), PNG_BYTES);
}

#[tokio::test]
async fn modality_changes_the_instruction() {
    let transport = FakeTransport::replying("Described.");
    let service = ImageAnalysisService::new(client_with(transport.clone()).await, MetricsManager::new());
    let upload = || UploadedImage::new(None, "image/png", PNG_BYTES.to_vec()).unwrap();

    service.analyze(ImageSource::Upload(upload())).await;
    service.analyze_with(ImageSource::Upload(upload()), Some(Modality::Ct)).await;
    service.analyze_with(ImageSource::Upload(upload()), Some(Modality::Mri)).await;

    let prompts: Vec<String> = transport
        .requests()
        .iter()
        .map(|(_, request)| texts(request)[0].1.clone())
        .collect();
    assert_eq!(prompts[1], Modality::Ct.prompt());
    assert_eq!(prompts[2], Modality::Mri.prompt());
    assert_ne!(prompts[0], prompts[1]);
    assert_ne!(prompts[0], prompts[2]);
    assert_ne!(prompts[1], prompts[2]);
    assert!(prompts[0].contains("medical image"));
}

#[tokio::test]
async fn image_file_on_disk_is_read() {
    let transport = FakeTransport::replying("Knee MRI, no effusion.");
    let service = ImageAnalysisService::new(client_with(transport.clone()).await, MetricsManager::new());

    let path = std::env::temp_dir().join(format!("radiology-{}.png", uuid::Uuid::new_v4()));
    tokio::fs::write(&path, PNG_BYTES).await.unwrap();
    let snapshot = service.analyze(ImageSource::Path(path.clone())).await;
    tokio::fs::remove_file(&path).await.unwrap();

    assert_eq!(snapshot.result.as_deref(), Some("Knee MRI, no effusion."));
    assert_eq!(inline_bytes(&transport.requests()[0].1).1, PNG_BYTES);
}

#[tokio::test]
async fn unreadable_file_sets_error() {
    let transport = FakeTransport::replying("unused");
    let metrics = MetricsManager::new();
    let service = ImageAnalysisService::new(client_with(transport.clone()).await, metrics.clone());

    let snapshot = service
        .analyze(ImageSource::Path(PathBuf::from("/no/such/scan.png")))
        .await;

    assert!(snapshot.result.is_none());
    assert_eq!(snapshot.error.as_deref(), Some(ANALYSIS_ERROR_MESSAGE));
    assert!(!snapshot.pending);
    assert_eq!(transport.calls(), 0);
    assert_eq!(metrics.get_metrics().await.analyses_failed, 1);
}

#[tokio::test]
async fn non_image_data_url_sets_error() {
    let transport = FakeTransport::replying("unused");
    let service = ImageAnalysisService::new(client_with(transport.clone()).await, MetricsManager::new());

    let snapshot = service
        .analyze(ImageSource::DataUrl("data:text/plain;base64,aGVsbG8=".to_string()))
        .await;

    assert_eq!(snapshot.error.as_deref(), Some(ANALYSIS_ERROR_MESSAGE));
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn failure_replaces_previous_result() {
    let transport = FakeTransport::new(|i| match i {
        0 => (Duration::ZERO, Ok("Fracture of the distal radius.".to_string())),
        _ => (
            Duration::ZERO,
            Err(radiology_assistant::error::ModelError::RemoteCall("500".to_string())),
        ),
    });
    let service = ImageAnalysisService::new(client_with(transport).await, MetricsManager::new());
    let upload = UploadedImage::new(None, "image/jpeg", PNG_BYTES.to_vec()).unwrap();

    let first = service.analyze(ImageSource::Upload(upload.clone())).await;
    assert!(first.result.is_some());

    let second = service.analyze(ImageSource::Upload(upload)).await;
    assert!(second.result.is_none());
    assert_eq!(second.error.as_deref(), Some(ANALYSIS_ERROR_MESSAGE));
}

#[tokio::test]
async fn uninitialized_client_sets_error() {
    let service = ImageAnalysisService::new(uninitialized_client(), MetricsManager::new());
    let upload = UploadedImage::new(None, "image/png", PNG_BYTES.to_vec()).unwrap();

    let snapshot = service.analyze(ImageSource::Upload(upload)).await;
    assert!(snapshot.result.is_none());
    assert_eq!(snapshot.error.as_deref(), Some(ANALYSIS_ERROR_MESSAGE));
}

#[tokio::test]
async fn newer_request_supersedes_slow_one() {
    // The first call would resolve last and overwrite the newer result.
    let transport = FakeTransport::new(|i| match i {
        0 => (Duration::from_millis(300), Ok("stale".to_string())),
        _ => (Duration::from_millis(10), Ok("fresh".to_string())),
    });
    let service = ImageAnalysisService::new(client_with(transport.clone()).await, MetricsManager::new());
    let upload = UploadedImage::new(None, "image/png", PNG_BYTES.to_vec()).unwrap();

    let first = {
        let service = service.clone();
        let upload = upload.clone();
        tokio::spawn(async move { service.analyze(ImageSource::Upload(upload)).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(service.snapshot().await.pending);

    let second = service.analyze(ImageSource::Upload(upload)).await;
    assert_eq!(second.result.as_deref(), Some("fresh"));
    assert!(!second.pending);

    first.await.unwrap();
    tokio::time::sleep(Duration::from_millis(350)).await;
    let settled = service.snapshot().await;
    assert_eq!(settled.result.as_deref(), Some("fresh"));
    assert_eq!(transport.calls(), 2);
}
