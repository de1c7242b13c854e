use agrolens::{
    config::TreatmentConfig, create_app, treatment::TreatmentClient, CommonError, Diagnosis,
    Metrics, OpenApiDocument, SharedState,
};
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    extract::Query,
    http::{header, Method, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use image::{DynamicImage, ImageBuffer, ImageFormat, Luma, LumaA, Rgb, Rgba};
use ndarray::{Array, Ix4};
use plant_classifier::{
    config::{InputSpec, UnmatchedPolicy},
    Classifier, ClassifierError, LabelCatalog, MetadataTable, ModelService,
};
use serde_json::{json, Value};
use std::{
    collections::HashMap,
    io::Cursor,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use tokio::net::TcpListener;
use tower::util::ServiceExt;

const BOUNDARY: &str = "agrolens-test-boundary";

/// Always answers with the same scores.
struct FixedScores(Vec<f32>);

#[async_trait]
impl ModelService for FixedScores {
    async fn forward(&self, _input: Array<f32, Ix4>) -> Result<Vec<f32>, ClassifierError> {
        Ok(self.0.clone())
    }
}

// Sorted order: Apple___Black_rot, Apple___healthy, Tomato___Late_blight.
fn catalog() -> Arc<LabelCatalog> {
    Arc::new(
        LabelCatalog::new(["Tomato___Late_blight", "Apple___healthy", "Apple___Black_rot"])
            .unwrap(),
    )
}

fn metadata(catalog: &LabelCatalog) -> MetadataTable {
    let raw = r#"{
        "Apple___Black_rot": {
            "scientific_name": "Botryosphaeria obtusa",
            "commonName": "Black rot",
            "crop": "Apple",
            "description": "Fungal disease causing leaf spots and fruit rot."
        },
        "Apple___healthy": {
            "scientific_name": "Malus domestica",
            "commonName": "Healthy",
            "crop": "Apple",
            "description": "No disease detected."
        }
    }"#;
    MetadataTable::from_json(raw, catalog, UnmatchedPolicy::Warn).unwrap()
}

fn treatment_client(base_url: &str, token: Option<&str>) -> TreatmentClient {
    let config = TreatmentConfig {
        base_url: base_url.to_string(),
        token_env: "UNUSED_IN_TESTS".to_string(),
        timeout_secs: 5,
        accept_invalid_certs: false,
    };
    TreatmentClient::new(&config, token.map(str::to_string)).unwrap()
}

fn state_with(
    classifier: Classifier<FixedScores>,
    treatment: TreatmentClient,
    openapi: Option<OpenApiDocument>,
) -> SharedState<FixedScores> {
    let metadata = metadata(classifier.catalog());
    state_with_metadata(classifier, metadata, treatment, openapi)
}

fn state_with_metadata(
    classifier: Classifier<FixedScores>,
    metadata: MetadataTable,
    treatment: TreatmentClient,
    openapi: Option<OpenApiDocument>,
) -> SharedState<FixedScores> {
    SharedState {
        metadata: Arc::new(metadata),
        classifier: Arc::new(classifier),
        treatment: Arc::new(treatment),
        openapi: openapi.map(Arc::new),
        metrics: Arc::new(Metrics::new().unwrap()),
    }
}

fn first_class_classifier() -> Classifier<FixedScores> {
    Classifier::new(FixedScores(vec![1.0, 0.0, 0.0]), catalog(), InputSpec::default())
}

fn app_predicting(scores: Vec<f32>) -> Router {
    let classifier = Classifier::new(FixedScores(scores), catalog(), InputSpec::default());
    let state = state_with(classifier, treatment_client("http://127.0.0.1:9/", None), None);
    create_app(state, 10 * 1024 * 1024)
}

fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut data = Vec::new();
    image.write_to(&mut Cursor::new(&mut data), format).unwrap();
    data
}

fn leaf_png() -> Vec<u8> {
    let img = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(64, 48, Rgb([40, 160, 60]));
    encode(DynamicImage::ImageRgb8(img), ImageFormat::Png)
}

/// Noisy pixels so the encoded file stays large.
fn noisy_png(side: u32) -> Vec<u8> {
    let mut seed: u32 = 7;
    let img = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_fn(side, side, |_, _| {
        seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        let [_, a, b, c] = seed.to_le_bytes();
        Rgb([a, b, c])
    });
    encode(DynamicImage::ImageRgb8(img), ImageFormat::Png)
}

fn multipart_request(field: &str, filename: &str, data: &[u8]) -> Request<Body> {
    multipart_request_with_parts(&[(field, filename, data)])
}

fn multipart_request_with_parts(parts: &[(&str, &str, &[u8])]) -> Request<Body> {
    let mut body = Vec::new();
    for (field, filename, data) in parts {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\n\
                 Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri("/imageDiagnosis")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json<T: serde::de::DeserializeOwned>(response: Response) -> T {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn spawn_upstream(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}/search", addr)
}

#[tokio::test]
async fn test_root_reports_liveness() {
    let response = app_predicting(vec![0.2, 0.5, 0.3])
        .oneshot(get_request("/"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = body_json(response).await;
    assert_eq!(body["message"], "AgroLens API is up.");
}

#[tokio::test]
async fn test_diagnosis_returns_metadata_of_predicted_label() {
    let response = app_predicting(vec![0.85, 0.1, 0.05])
        .oneshot(multipart_request("file", "leaf.png", &leaf_png()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let diagnosis: Diagnosis = body_json(response).await;
    assert_eq!(diagnosis.scientific_name, "Botryosphaeria obtusa");
    assert_eq!(diagnosis.common_name, "Black rot");
    assert_eq!(diagnosis.crop, "Apple");
    assert!((diagnosis.confidence - 0.85).abs() < 1e-6);
}

#[tokio::test]
async fn test_diagnosis_uses_camel_case_fields() {
    let response = app_predicting(vec![0.1, 0.8, 0.1])
        .oneshot(multipart_request("file", "leaf.png", &leaf_png()))
        .await
        .unwrap();

    let body: Value = body_json(response).await;
    for key in ["scientificName", "crop", "commonName", "description", "confidence"] {
        assert!(body.get(key).is_some(), "missing {}", key);
    }
}

#[tokio::test]
async fn test_diagnosis_accepts_common_color_depths() {
    let images = [
        encode(
            DynamicImage::ImageLuma8(ImageBuffer::from_pixel(30, 30, Luma([90u8]))),
            ImageFormat::Png,
        ),
        encode(
            DynamicImage::ImageLumaA8(ImageBuffer::from_pixel(30, 30, LumaA([90u8, 255]))),
            ImageFormat::Png,
        ),
        encode(
            DynamicImage::ImageRgba8(ImageBuffer::from_pixel(30, 30, Rgba([1u8, 2, 3, 255]))),
            ImageFormat::Png,
        ),
        encode(
            DynamicImage::ImageRgb16(ImageBuffer::from_pixel(30, 30, Rgb([500u16, 9000, 30]))),
            ImageFormat::Png,
        ),
        encode(
            DynamicImage::ImageRgb8(ImageBuffer::from_pixel(30, 30, Rgb([10u8, 200, 30]))),
            ImageFormat::Jpeg,
        ),
    ];

    for image_data in images {
        let response = app_predicting(vec![0.3, 0.6, 0.1])
            .oneshot(multipart_request("file", "leaf", &image_data))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let diagnosis: Diagnosis = body_json(response).await;
        assert!((0.0..=1.0).contains(&diagnosis.confidence));
        assert_eq!(diagnosis.scientific_name, "Malus domestica");
    }
}

#[tokio::test]
async fn test_corrupt_image_is_a_server_error() {
    let response = app_predicting(vec![0.3, 0.6, 0.1])
        .oneshot(multipart_request("file", "leaf.png", b"\x89PNG\r\n\x1a\n garbage"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: CommonError = body_json(response).await;
    assert_eq!(body.code, 500);
    assert_eq!(body.details, "Internal server error.");
}

#[tokio::test]
async fn test_label_without_metadata_is_not_found() {
    let response = app_predicting(vec![0.1, 0.1, 0.8])
        .oneshot(multipart_request("file", "leaf.png", &leaf_png()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: CommonError = body_json(response).await;
    assert_eq!(body.code, 404);
}

#[tokio::test]
async fn test_blank_metadata_record_is_not_found() {
    let classifier = first_class_classifier();
    let raw = r#"{
        "Apple___Black_rot": {},
        "Apple___healthy": {"scientific_name": "Malus domestica", "crop": "Apple"}
    }"#;
    let metadata =
        MetadataTable::from_json(raw, classifier.catalog(), UnmatchedPolicy::Warn).unwrap();
    let treatment = treatment_client("http://127.0.0.1:9/", None);
    let app = create_app(
        state_with_metadata(classifier, metadata, treatment, None),
        1024 * 1024,
    );

    let response = app
        .oneshot(multipart_request("file", "leaf.png", &leaf_png()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: CommonError = body_json(response).await;
    assert_eq!(body.code, 404);
}

#[tokio::test]
async fn test_health_lists_labels_without_metadata() {
    let response = app_predicting(vec![1.0, 0.0, 0.0])
        .oneshot(get_request("/health"))
        .await
        .unwrap();

    let health: Value = body_json(response).await;
    assert_eq!(health["status"], "Available");
    assert_eq!(health["model_loaded"], true);
    assert_eq!(health["labels_without_metadata"], json!(["Tomato___Late_blight"]));
}

#[tokio::test]
async fn test_missing_model_is_a_server_error_on_every_request() {
    let classifier = Classifier::<FixedScores>::without_model(catalog(), InputSpec::default());
    let state = state_with(classifier, treatment_client("http://127.0.0.1:9/", None), None);
    let app = create_app(state, 1024 * 1024);

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(multipart_request("file", "leaf.png", &leaf_png()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    let health: Value = body_json(app.oneshot(get_request("/health")).await.unwrap()).await;
    assert_eq!(health["model_loaded"], false);
}

#[tokio::test]
async fn test_upload_under_another_field_name_is_accepted() {
    let response = app_predicting(vec![0.1, 0.8, 0.1])
        .oneshot(multipart_request("image", "leaf.png", &leaf_png()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_file_field_wins_over_earlier_file_parts() {
    let response = app_predicting(vec![0.1, 0.8, 0.1])
        .oneshot(multipart_request_with_parts(&[
            ("attachment", "notes.txt", b"not an image"),
            ("file", "leaf.png", &leaf_png()),
        ]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let diagnosis: Diagnosis = body_json(response).await;
    assert_eq!(diagnosis.scientific_name, "Malus domestica");
}

#[tokio::test]
async fn test_upload_over_the_size_limit_is_refused() {
    let image_data = noisy_png(64);
    let limit = 4 * 1024;
    assert!(image_data.len() > limit);

    let app = create_app(
        state_with(
            first_class_classifier(),
            treatment_client("http://127.0.0.1:9/", None),
            None,
        ),
        limit,
    );

    let response = app
        .clone()
        .oneshot(multipart_request("file", "leaf.png", &image_data))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body: CommonError = body_json(response).await;
    assert_eq!(body.code, 413);

    // The same image passes once it fits.
    let small = app
        .oneshot(multipart_request("file", "leaf.png", &leaf_png()))
        .await
        .unwrap();
    assert_eq!(small.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_request_without_upload_is_bad_request() {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/imageDiagnosis")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();

    let response = app_predicting(vec![0.1, 0.8, 0.1]).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: CommonError = body_json(response).await;
    assert_eq!(body.code, 400);
}

#[tokio::test]
async fn test_treatment_without_credential_never_calls_upstream() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let upstream = spawn_upstream(Router::new().route(
        "/search",
        get(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Json(json!([{"produto": "x"}]))
            }
        }),
    ))
    .await;

    let classifier = first_class_classifier();
    let app = create_app(state_with(classifier, treatment_client(&upstream, None), None), 1024);

    let response = app
        .oneshot(get_request("/treatment?diseaseName=Venturia%20inaequalis"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_treatment_relays_upstream_list() {
    let upstream = spawn_upstream(Router::new().route(
        "/search",
        get(|| async { Json(json!([{"nome_comum": "Produto A"}, {"nome_comum": "Produto B"}])) }),
    ))
    .await;

    let classifier = first_class_classifier();
    let app = create_app(
        state_with(classifier, treatment_client(&upstream, Some("token")), None),
        1024,
    );

    let response = app
        .oneshot(get_request("/treatment?diseaseName=Botryosphaeria%20obtusa"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = body_json(response).await;
    assert_eq!(body.as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn test_treatment_maps_upstream_statuses() {
    for (upstream_status, expected) in [
        (StatusCode::UNAUTHORIZED, StatusCode::UNAUTHORIZED),
        (StatusCode::FORBIDDEN, StatusCode::FORBIDDEN),
        (StatusCode::NOT_FOUND, StatusCode::NOT_FOUND),
        (StatusCode::SERVICE_UNAVAILABLE, StatusCode::INTERNAL_SERVER_ERROR),
        (StatusCode::BAD_REQUEST, StatusCode::INTERNAL_SERVER_ERROR),
    ] {
        let upstream = spawn_upstream(Router::new().route(
            "/search",
            get(move || async move { upstream_status.into_response() }),
        ))
        .await;

        let classifier = first_class_classifier();
        let app = create_app(
            state_with(classifier, treatment_client(&upstream, Some("token")), None),
            1024,
        );

        let response = app
            .oneshot(get_request("/treatment?diseaseName=pest"))
            .await
            .unwrap();

        assert_eq!(response.status(), expected, "upstream {}", upstream_status);
        let body: CommonError = body_json(response).await;
        assert_eq!(body.code, expected.as_u16());
    }
}

#[tokio::test]
async fn test_treatment_requires_disease_name() {
    for uri in ["/treatment", "/treatment?diseaseName=%20%20"] {
        let response = app_predicting(vec![1.0, 0.0, 0.0])
            .oneshot(get_request(uri))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
    }
}

#[tokio::test]
async fn test_treatment_forwards_disease_name_unchanged() {
    let upstream = spawn_upstream(Router::new().route(
        "/search",
        get(|Query(params): Query<HashMap<String, String>>| async move {
            Json(json!([{"q": params.get("q")}]))
        }),
    ))
    .await;

    let app = create_app(
        state_with(
            first_class_classifier(),
            treatment_client(&upstream, Some("token")),
            None,
        ),
        1024,
    );

    let response = app
        .oneshot(get_request("/treatment?diseaseName=%20Venturia%20inaequalis%20"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = body_json(response).await;
    assert_eq!(body[0]["q"], " Venturia inaequalis ");
}

#[tokio::test]
async fn test_openapi_document_is_served_when_loaded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("api_backend.yaml");
    std::fs::write(&path, "openapi: 3.0.0\ninfo:\n  title: AgroLens API\n").unwrap();
    let document = OpenApiDocument::load(&path).unwrap();

    let classifier = first_class_classifier();
    let treatment = treatment_client("http://127.0.0.1:9/", None);
    let state = state_with(classifier, treatment, Some(document));
    let response = create_app(state, 1024)
        .oneshot(get_request("/openapi.yaml"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/yaml"
    );
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(String::from_utf8_lossy(&bytes).contains("AgroLens API"));

    let missing = app_predicting(vec![1.0, 0.0, 0.0])
        .oneshot(get_request("/openapi.yaml"))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_metrics_are_exposed() {
    let app = app_predicting(vec![0.85, 0.1, 0.05]);
    let _ = app
        .clone()
        .oneshot(multipart_request("file", "leaf.png", &leaf_png()))
        .await
        .unwrap();

    let response = app.oneshot(get_request("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(String::from_utf8_lossy(&bytes).contains("diagnosis_duration_ms"));
}
