//! Integration tests exercising the client against a local mock server.

use std::time::Duration;

use chrono::{TimeZone, Timelike, Utc};
use httpmock::prelude::*;
use serde_json::{json, Value};

use shmdash::{
    format_timestamp, Annotation, Attribute, AttributeType, Client, ClientConfig, ClientError,
    Record, Severity, StatusCode, VirtualChannel,
};

const API_KEY: &str = "00000000-0000-0000-0000-000000000000";

fn test_client(server: &MockServer) -> Client {
    let config = ClientConfig::new(server.base_url(), API_KEY);
    Client::new(config).unwrap()
}

/// Wire form of the setup built by [`attributes`] and [`virtual_channels`].
fn setup_document() -> Value {
    json!({
        "attributes": {
            "AbsDateTime": {
                "descr": "Absolute time UTC",
                "type": "dateTime",
                "format": "YYYY-MM-DDThh:mm:ss.ssssssZ",
            },
            "Pressure": {
                "descr": "Atmospheric pressure",
                "unit": "hPa",
                "type": "float32",
                "format": "%.2f",
                "softLimits": [900.0, 1100.0],
            },
            "WindSpeed": {
                "descr": "Wind speed",
                "unit": "m/s",
                "type": "float32",
                "format": "%.2f",
                "softLimits": [0.0, null],
            },
        },
        "virtual_channels": {
            "0": {
                "attributes": ["AbsDateTime", "Pressure"],
            },
            "1": {
                "attributes": ["AbsDateTime", "Pressure", "WindSpeed"],
            },
        },
    })
}

fn attributes() -> Vec<Attribute> {
    vec![
        Attribute::new("AbsDateTime", AttributeType::DateTime)
            .with_description("Absolute time UTC")
            .with_format("YYYY-MM-DDThh:mm:ss.ssssssZ"),
        Attribute::new("Pressure", AttributeType::Float32)
            .with_description("Atmospheric pressure")
            .with_unit("hPa")
            .with_format("%.2f")
            .with_soft_limits(Some(900.0), Some(1100.0)),
        Attribute::new("WindSpeed", AttributeType::Float32)
            .with_description("Wind speed")
            .with_unit("m/s")
            .with_format("%.2f")
            .with_soft_limits(Some(0.0), None),
    ]
}

fn virtual_channels() -> Vec<VirtualChannel> {
    vec![
        VirtualChannel::new("0", vec!["AbsDateTime".into(), "Pressure".into()]),
        VirtualChannel::new(
            "1",
            vec!["AbsDateTime".into(), "Pressure".into(), "WindSpeed".into()],
        ),
    ]
}

fn records(count: usize) -> Vec<Record> {
    let start = Utc
        .with_ymd_and_hms(2024, 1, 1, 11, 11, 11)
        .unwrap()
        .with_nanosecond(111_111_000)
        .unwrap();
    (0..count)
        .map(|i| Record::new(start + chrono::Duration::seconds(i as i64), vec![11.11.into()]))
        .collect()
}

fn data_rows(records: &[Record]) -> Vec<Value> {
    records
        .iter()
        .map(|record| json!(["0", format_timestamp(&record.timestamp), 11.11]))
        .collect()
}

fn data_body(rows: &[Value]) -> Value {
    json!({
        "conflict": "IGNORE",
        "data": rows,
    })
}

#[tokio::test]
async fn test_requests_carry_api_key_header() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/upload/vjson/v1/setup")
            .header("UPLOAD-API-KEY", API_KEY)
            .header("Content-Type", "application/json");
        then.status(200).json_body(json!({}));
    });

    let client = test_client(&server);
    client.get_setup().await.unwrap();
    mock.assert();
}

#[tokio::test]
async fn test_get_setup() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/upload/vjson/v1/setup");
        then.status(200).json_body(setup_document());
    });

    let client = test_client(&server);
    let setup = client.get_setup().await.unwrap();
    mock.assert();

    let identifiers: Vec<&str> = setup
        .attributes
        .iter()
        .map(|a| a.identifier.as_str())
        .collect();
    assert_eq!(identifiers, ["AbsDateTime", "Pressure", "WindSpeed"]);

    let pressure = setup.attribute("Pressure").unwrap();
    assert_eq!(pressure.attribute_type, AttributeType::Float32);
    assert_eq!(pressure.soft_limits, Some((Some(900.0), Some(1100.0))));
    assert_eq!(
        setup.virtual_channel("1").unwrap().attributes,
        ["AbsDateTime", "Pressure", "WindSpeed"]
    );
}

#[tokio::test]
async fn test_get_setup_empty() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/upload/vjson/v1/setup");
        then.status(200).json_body(json!({}));
    });

    let client = test_client(&server);
    let setup = client.get_setup().await.unwrap();
    assert!(setup.is_empty());
}

#[tokio::test]
async fn test_get_setup_error_status() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/upload/vjson/v1/setup");
        then.status(400).json_body(json!({"message": "Invalid API key"}));
    });

    let client = test_client(&server);
    match client.get_setup().await.unwrap_err() {
        ClientError::Response { status, message, .. } => {
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(message.as_deref(), Some("Invalid API key"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_get_setup_malformed_json() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/upload/vjson/v1/setup");
        then.status(200).body("not json");
    });

    let client = test_client(&server);
    assert!(matches!(
        client.get_setup().await.unwrap_err(),
        ClientError::InvalidResponse(_)
    ));
}

#[tokio::test]
async fn test_setup_uploads_all_when_server_empty() {
    let server = MockServer::start();
    let get_mock = server.mock(|when, then| {
        when.method(GET).path("/upload/vjson/v1/setup");
        then.status(200).json_body(json!({}));
    });
    let post_mock = server.mock(|when, then| {
        when.method(POST)
            .path("/upload/vjson/v1/setup")
            .json_body(setup_document());
        then.status(200);
    });

    let client = test_client(&server);
    client
        .setup(&attributes(), &virtual_channels())
        .await
        .unwrap();
    get_mock.assert();
    post_mock.assert();
}

#[tokio::test]
async fn test_setup_skips_existing_definitions() {
    let server = MockServer::start();
    let get_mock = server.mock(|when, then| {
        when.method(GET).path("/upload/vjson/v1/setup");
        then.status(200).json_body(setup_document());
    });
    let post_mock = server.mock(|when, then| {
        when.method(POST);
        then.status(404);
    });

    let client = test_client(&server);
    client
        .setup(&attributes(), &virtual_channels())
        .await
        .unwrap();
    get_mock.assert();
    assert_eq!(post_mock.calls(), 0);
}

#[tokio::test]
async fn test_setup_adds_missing_definitions() {
    let mut existing = setup_document();
    existing["attributes"]
        .as_object_mut()
        .unwrap()
        .remove("WindSpeed");
    existing["virtual_channels"]
        .as_object_mut()
        .unwrap()
        .remove("1");

    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/upload/vjson/v1/setup");
        then.status(200).json_body(existing);
    });
    let attribute_mock = server.mock(|when, then| {
        when.method(POST)
            .path("/upload/vjson/v1/commands")
            .json_body(json!({
                "commands": [{
                    "cmdName": "addAttribute",
                    "attributeId": "WindSpeed",
                    "descr": "Wind speed",
                    "unit": "m/s",
                    "type": "float32",
                    "format": "%.2f",
                    "softLimits": [0.0, null],
                }],
            }));
        then.status(200);
    });
    let channel_mock = server.mock(|when, then| {
        when.method(POST)
            .path("/upload/vjson/v1/commands")
            .json_body(json!({
                "commands": [{
                    "cmdName": "addVirtualChannel",
                    "virtualChannelId": "1",
                    "attributes": ["AbsDateTime", "Pressure", "WindSpeed"],
                }],
            }));
        then.status(200);
    });

    let client = test_client(&server);
    client
        .setup(&attributes(), &virtual_channels())
        .await
        .unwrap();
    attribute_mock.assert();
    channel_mock.assert();
}

#[tokio::test]
async fn test_add_attribute() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/upload/vjson/v1/commands")
            .json_body(json!({
                "commands": [{
                    "cmdName": "addAttribute",
                    "attributeId": "Pressure",
                    "descr": "Atmospheric pressure",
                    "unit": "hPa",
                    "type": "float32",
                }],
            }));
        then.status(200);
    });

    let attribute = Attribute::new("Pressure", AttributeType::Float32)
        .with_description("Atmospheric pressure")
        .with_unit("hPa");
    let client = test_client(&server);
    client.add_attribute(&attribute).await.unwrap();
    mock.assert();
}

#[tokio::test]
async fn test_add_virtual_channel() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/upload/vjson/v1/commands")
            .json_body(json!({
                "commands": [{
                    "cmdName": "addVirtualChannel",
                    "virtualChannelId": "2",
                    "name": "Pressure",
                    "attributes": ["AbsDateTime", "Pressure"],
                }],
            }));
        then.status(200);
    });

    let virtual_channel =
        VirtualChannel::new("2", vec!["AbsDateTime".into(), "Pressure".into()])
            .with_name("Pressure");
    let client = test_client(&server);
    client.add_virtual_channel(&virtual_channel).await.unwrap();
    mock.assert();
}

#[tokio::test]
async fn test_add_virtual_channel_attributes() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/upload/vjson/v1/commands")
            .json_body(json!({
                "commands": [{
                    "cmdName": "addVirtualChannelAttributes",
                    "virtualChannelId": "0",
                    "attributes": ["WindSpeed"],
                }],
            }));
        then.status(200);
    });

    let client = test_client(&server);
    client
        .add_virtual_channel_attributes("0", &["WindSpeed".to_string()])
        .await
        .unwrap();
    mock.assert();
}

#[tokio::test]
async fn test_upload_data() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/upload/vjson/v1/data")
            .header("UPLOAD-API-KEY", API_KEY)
            .json_body(json!({
                "conflict": "IGNORE",
                "data": [["0", "2024-01-01T11:11:11.111111Z", 11.11]],
            }));
        then.status(200).json_body(json!({"0": {"success": 1}}));
    });

    let client = test_client(&server);
    client.upload_data("0", &records(1)).await.unwrap();
    mock.assert();
}

#[tokio::test]
async fn test_upload_data_partial_success_is_ok() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/upload/vjson/v1/data");
        then.status(200).json_body(json!({
            "0": {"success": 1},
            "1": {"error": "values do not match setup"},
        }));
    });

    let client = test_client(&server);
    client.upload_data("0", &records(2)).await.unwrap();
    mock.assert();
}

#[tokio::test]
async fn test_upload_data_halves_batch_on_payload_too_large() {
    let uploaded = records(4);
    let rows = data_rows(&uploaded);

    let server = MockServer::start();
    let rejected = server.mock(|when, then| {
        when.method(POST)
            .path("/upload/vjson/v1/data")
            .json_body(data_body(&rows));
        then.status(413);
    });
    let first_half = server.mock(|when, then| {
        when.method(POST)
            .path("/upload/vjson/v1/data")
            .json_body(data_body(&rows[..2]));
        then.status(200).json_body(json!({}));
    });
    let second_half = server.mock(|when, then| {
        when.method(POST)
            .path("/upload/vjson/v1/data")
            .json_body(data_body(&rows[2..]));
        then.status(200).json_body(json!({}));
    });

    let config = ClientConfig::new(server.base_url(), API_KEY).with_batch_size(4);
    let client = Client::new(config).unwrap();
    client.upload_data("0", &uploaded).await.unwrap();
    rejected.assert();
    first_half.assert();
    second_half.assert();
}

#[tokio::test]
async fn test_upload_data_fails_when_batch_exhausted() {
    let uploaded = records(2);
    let rows = data_rows(&uploaded);

    let server = MockServer::start();
    let full = server.mock(|when, then| {
        when.method(POST)
            .path("/upload/vjson/v1/data")
            .json_body(data_body(&rows));
        then.status(413);
    });
    let single = server.mock(|when, then| {
        when.method(POST)
            .path("/upload/vjson/v1/data")
            .json_body(data_body(&rows[..1]));
        then.status(413);
    });

    let config = ClientConfig::new(server.base_url(), API_KEY).with_batch_size(2);
    let client = Client::new(config).unwrap();
    match client.upload_data("0", &uploaded).await.unwrap_err() {
        ClientError::BatchExhausted {
            remaining,
            total,
            source,
        } => {
            assert_eq!(remaining, 2);
            assert_eq!(total, 2);
            assert!(source.is_payload_too_large());
        }
        other => panic!("unexpected error: {other}"),
    }
    full.assert();
    single.assert();
}

#[tokio::test]
async fn test_upload_annotation() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/upload/vjson/v1/annotation")
            .json_body(json!({
                "date": "2024-01-01T12:00:00.000100Z",
                "severity": "warning",
                "description": "Annotation",
                "sendEmail": true,
                "confirmationNeeded": true,
            }));
        then.status(200);
    });

    let timestamp = Utc
        .with_ymd_and_hms(2024, 1, 1, 12, 0, 0)
        .unwrap()
        .with_nanosecond(100_000)
        .unwrap();
    let annotation = Annotation::new(timestamp, Severity::Warning, "Annotation")
        .with_send_email(true)
        .with_confirmation_needed(true);
    let client = test_client(&server);
    client.upload_annotation(&annotation).await.unwrap();
    mock.assert();
}

#[tokio::test]
async fn test_delete_data() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(DELETE).path("/dev/timeseriesdata");
        then.status(200);
    });

    let client = test_client(&server);
    client.delete_data().await.unwrap();
    mock.assert();
}

#[tokio::test]
async fn test_delete_data_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(DELETE).path("/dev/timeseriesdata");
        then.status(403).body("forbidden");
    });

    let client = test_client(&server);
    match client.delete_data().await.unwrap_err() {
        ClientError::Response { status, message, .. } => {
            assert_eq!(status, StatusCode::FORBIDDEN);
            assert_eq!(message.as_deref(), Some("forbidden"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_recreate() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/dev/recreate");
        then.status(200);
    });

    let client = test_client(&server);
    client.recreate().await.unwrap();
    mock.assert();
}

#[tokio::test]
async fn test_timeout() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/upload/vjson/v1/setup");
        then.status(200)
            .json_body(json!({}))
            .delay(Duration::from_millis(500));
    });

    let config =
        ClientConfig::new(server.base_url(), API_KEY).with_timeout(Duration::from_millis(50));
    let client = Client::new(config).unwrap();
    assert!(matches!(
        client.get_setup().await.unwrap_err(),
        ClientError::Timeout(_)
    ));
}
