//! Weather station demo: define a setup and continuously upload random
//! weather readings to virtual channel `100`.
//!
//! Set the dashboard URL and API key in the environment and run:
//!
//! ```bash
//! export SHMDASH_URL=https://your-dashboard.example.org
//! export SHMDASH_API_KEY=00000000-0000-0000-0000-000000000000
//! cargo run --example weather_station
//! ```

use std::time::Duration;

use rand::RngExt;
use shmdash::{Attribute, AttributeType, Client, ClientConfig, Record, VirtualChannel};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let client = Client::new(ClientConfig::from_env()?)?;

    let attributes = vec![
        Attribute::new("AbsDateTime", AttributeType::DateTime)
            .with_description("Absolute time in ISO 8601, UTC")
            .with_format("YYYY-MM-DDThh:mm:ss.ssssssZ"),
        Attribute::new("Temperature", AttributeType::Float32)
            .with_description("Air temperature")
            .with_unit("°C")
            .with_format("%.2f"),
        Attribute::new("Pressure", AttributeType::Float32)
            .with_description("Atmospheric pressure")
            .with_unit("hPa")
            .with_format("%.0f")
            .with_soft_limits(Some(900.0), Some(1100.0)),
        Attribute::new("Humidity", AttributeType::Float32)
            .with_description("Relative humidity")
            .with_unit("%")
            .with_format("%.0f")
            .with_soft_limits(Some(0.0), Some(100.0)),
        Attribute::new("WindSpeed", AttributeType::Float32)
            .with_description("Wind speed")
            .with_unit("km/h")
            .with_format("%.1f")
            .with_soft_limits(Some(0.0), None),
        Attribute::new("WindDegree", AttributeType::Uint16)
            .with_description("Wind direction")
            .with_unit("°")
            .with_format("%d")
            .with_soft_limits(Some(0.0), Some(360.0)),
        Attribute::new("Rain1h", AttributeType::Float32)
            .with_description("Rain volume of the last hour")
            .with_unit("mm")
            .with_format("%.1f"),
        Attribute::new("WeatherDescription", AttributeType::String)
            .with_description("Weather condition")
            .with_format("%s"),
    ];
    let virtual_channels = vec![VirtualChannel::new(
        "100",
        vec![
            "AbsDateTime".into(),
            "Temperature".into(),
            "Pressure".into(),
            "Humidity".into(),
            "WindSpeed".into(),
            "WindDegree".into(),
            "Rain1h".into(),
            "WeatherDescription".into(),
        ],
    )
    .with_name("Weather")
    .with_properties(vec!["STREAM".into(), "PAR".into()])];

    client.setup(&attributes, &virtual_channels).await?;

    loop {
        client.upload_data("100", &[random_reading()]).await?;
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

fn random_reading() -> Record {
    let mut rng = rand::rng();
    let conditions = ["clear sky", "few clouds", "rain", "thunderstorm"];
    let condition = conditions[rng.random_range(0..conditions.len())];
    Record::new(
        chrono::Utc::now(),
        vec![
            rng.random_range(-10.0..35.0).into(),
            rng.random_range(980.0..1050.0).into(),
            rng.random_range(20.0..100.0).into(),
            rng.random_range(0.0..30.0).into(),
            rng.random_range(0..360_i64).into(),
            rng.random_range(0.0..5.0).into(),
            condition.into(),
        ],
    )
}
