use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

/// Identifiers accepted by the server: alphanumeric and `_`, at most 32 chars.
const IDENTIFIER_MAX_CHARS: usize = 32;

/// Value type of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttributeType {
    DateTime,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Int64,
    Float32,
    Float64,
    String,
}

/// Axis scale of the dashboard diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagramScale {
    Lin,
    Log,
}

/// Severity of an annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Attribute / channel definition.
///
/// On the wire, attributes are values of a map keyed by identifier:
///
/// ```json
/// {
///     "AbsDateTime": {
///         "descr": "Absolute time in ISO 8601, UTC zone",
///         "type": "dateTime",
///         "format": "YYYY-MM-DDThh:mm:ss.ssssssZ"
///     }
/// }
/// ```
///
/// Unset optional fields are omitted from the JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    /// Unique identifier (alphanumeric and `_`, max. 32 chars).
    #[serde(skip)]
    pub identifier: String,
    /// Channel description.
    #[serde(rename = "descr", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Measurement unit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Value type.
    #[serde(rename = "type")]
    pub attribute_type: AttributeType,
    /// Format string, e.g. `%s` for strings, `%d` for integers, `%.2f` for floats.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Soft min/max values for the diagram axes. `None` entries leave the
    /// bound open and are serialized as `null` inside the two-element array.
    #[serde(rename = "softLimits", skip_serializing_if = "Option::is_none")]
    pub soft_limits: Option<(Option<f64>, Option<f64>)>,
    /// Diagram scale.
    #[serde(rename = "diagramScale", skip_serializing_if = "Option::is_none")]
    pub diagram_scale: Option<DiagramScale>,
}

impl Attribute {
    /// Create an attribute with the required fields.
    pub fn new(identifier: impl Into<String>, attribute_type: AttributeType) -> Self {
        Self {
            identifier: identifier.into(),
            description: None,
            unit: None,
            attribute_type,
            format: None,
            soft_limits: None,
            diagram_scale: None,
        }
    }

    /// Set the channel description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the measurement unit.
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Set the format string.
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Set the soft min/max values.
    pub fn with_soft_limits(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.soft_limits = Some((min, max));
        self
    }

    /// Set the diagram scale.
    pub fn with_diagram_scale(mut self, diagram_scale: DiagramScale) -> Self {
        self.diagram_scale = Some(diagram_scale);
        self
    }
}

/// Virtual channel / channel group definition.
///
/// On the wire, virtual channels are values of a map keyed by identifier:
///
/// ```json
/// {
///     "1": {
///         "name": "Control Signal",
///         "descr": "Control signal voltage",
///         "attributes": ["AbsDateTime", "DSET", "VOLTAGE"],
///         "prop": ["STREAM", "PAR"]
///     }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualChannel {
    /// Unique identifier (alphanumeric and `_`, max. 32 chars).
    #[serde(skip)]
    pub identifier: String,
    /// Channel group name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Channel group description.
    #[serde(rename = "descr", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Identifiers of the member attributes, in upload order.
    ///
    /// The channels `AbsDateTime`, `DSET`, `X` and `Y` have specific meaning
    /// to the server, and statistics such as `min(id)`, `max(id)`, `avg(id)`
    /// can be applied.
    pub attributes: Vec<String>,
    /// Properties used for interpretation of the data (at least one item),
    /// e.g. `STREAM`, `STAT`, `HIT`, `PAR`.
    #[serde(rename = "prop", skip_serializing_if = "Option::is_none")]
    pub properties: Option<Vec<String>>,
}

impl VirtualChannel {
    /// Create a virtual channel over the given attributes.
    pub fn new(identifier: impl Into<String>, attributes: Vec<String>) -> Self {
        Self {
            identifier: identifier.into(),
            name: None,
            description: None,
            attributes,
            properties: None,
        }
    }

    /// Set the channel group name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the channel group description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the interpretation properties.
    pub fn with_properties(mut self, properties: Vec<String>) -> Self {
        self.properties = Some(properties);
        self
    }
}

/// Dashboard setup: the attributes and virtual channels known to the server.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Setup {
    /// Defined attributes.
    pub attributes: Vec<Attribute>,
    /// Defined virtual channels.
    pub virtual_channels: Vec<VirtualChannel>,
}

/// Wire document: `{"attributes": {id: {..}}, "virtual_channels": {id: {..}}}`.
#[derive(Serialize, Deserialize)]
struct SetupDocument {
    #[serde(default)]
    attributes: Map<String, Value>,
    #[serde(default)]
    virtual_channels: Map<String, Value>,
}

impl Setup {
    /// Create a setup from attribute and virtual channel lists.
    pub fn new(attributes: Vec<Attribute>, virtual_channels: Vec<VirtualChannel>) -> Self {
        Self {
            attributes,
            virtual_channels,
        }
    }

    /// Check if the setup contains neither attributes nor virtual channels.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.virtual_channels.is_empty()
    }

    /// Look up an attribute by identifier.
    pub fn attribute(&self, identifier: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.identifier == identifier)
    }

    /// Look up a virtual channel by identifier.
    pub fn virtual_channel(&self, identifier: &str) -> Option<&VirtualChannel> {
        self.virtual_channels
            .iter()
            .find(|vc| vc.identifier == identifier)
    }

    /// Parse a setup from the wire document. Missing maps are treated as
    /// empty.
    ///
    /// # Errors
    /// Returns an error if an entry does not match the expected shape.
    pub fn from_json(document: Value) -> Result<Self, serde_json::Error> {
        let document: SetupDocument = serde_json::from_value(document)?;

        let attributes = document
            .attributes
            .into_iter()
            .map(|(identifier, fields)| {
                let mut attribute: Attribute = serde_json::from_value(fields)?;
                attribute.identifier = identifier;
                Ok(attribute)
            })
            .collect::<Result<Vec<_>, serde_json::Error>>()?;

        let virtual_channels = document
            .virtual_channels
            .into_iter()
            .map(|(identifier, fields)| {
                let mut virtual_channel: VirtualChannel = serde_json::from_value(fields)?;
                virtual_channel.identifier = identifier;
                Ok(virtual_channel)
            })
            .collect::<Result<Vec<_>, serde_json::Error>>()?;

        Ok(Self {
            attributes,
            virtual_channels,
        })
    }

    /// Serialize the setup into the wire document. Both maps are always
    /// present, keyed by identifier.
    ///
    /// # Errors
    /// Returns an error if a definition cannot be serialized.
    pub fn to_json(&self) -> Result<Value, serde_json::Error> {
        let mut attributes = Map::new();
        for attribute in &self.attributes {
            attributes.insert(attribute.identifier.clone(), serde_json::to_value(attribute)?);
        }

        let mut virtual_channels = Map::new();
        for virtual_channel in &self.virtual_channels {
            virtual_channels.insert(
                virtual_channel.identifier.clone(),
                serde_json::to_value(virtual_channel)?,
            );
        }

        let mut document = Map::new();
        document.insert("attributes".to_string(), Value::Object(attributes));
        document.insert("virtual_channels".to_string(), Value::Object(virtual_channels));
        Ok(Value::Object(document))
    }
}

/// Scalar value of a data record.
///
/// Non-finite floats have no JSON representation and serialize as `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RecordValue {
    /// 64-bit signed integer.
    Integer(i64),
    /// 64-bit floating point.
    Float(f64),
    /// UTF-8 string.
    Text(String),
}

impl From<i64> for RecordValue {
    fn from(value: i64) -> Self {
        RecordValue::Integer(value)
    }
}

impl From<i32> for RecordValue {
    fn from(value: i32) -> Self {
        RecordValue::Integer(i64::from(value))
    }
}

impl From<u32> for RecordValue {
    fn from(value: u32) -> Self {
        RecordValue::Integer(i64::from(value))
    }
}

impl From<f64> for RecordValue {
    fn from(value: f64) -> Self {
        RecordValue::Float(value)
    }
}

impl From<f32> for RecordValue {
    fn from(value: f32) -> Self {
        RecordValue::Float(f64::from(value))
    }
}

impl From<String> for RecordValue {
    fn from(value: String) -> Self {
        RecordValue::Text(value)
    }
}

impl From<&str> for RecordValue {
    fn from(value: &str) -> Self {
        RecordValue::Text(value.to_string())
    }
}

/// One timestamped set of values for a virtual channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Absolute timestamp, unique per virtual channel.
    pub timestamp: DateTime<Utc>,
    /// Values in the order of the virtual channel attributes.
    pub values: Vec<RecordValue>,
}

impl Record {
    /// Create a record.
    pub fn new(timestamp: DateTime<Utc>, values: Vec<RecordValue>) -> Self {
        Self { timestamp, values }
    }
}

/// Annotation shown in the dashboard timeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Annotation {
    /// Absolute timestamp of the annotated event.
    #[serde(rename = "date", serialize_with = "serialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    /// Severity of the annotation.
    pub severity: Severity,
    /// Description, should be a precise, meaningful text.
    pub description: String,
    /// Trigger an email-send request on upload.
    #[serde(rename = "sendEmail")]
    pub send_email: bool,
    /// Allow a user to confirm the annotation.
    #[serde(rename = "confirmationNeeded")]
    pub confirmation_needed: bool,
}

impl Annotation {
    /// Create an annotation; email and confirmation flags default to off.
    pub fn new(
        timestamp: DateTime<Utc>,
        severity: Severity,
        description: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            severity,
            description: description.into(),
            send_email: false,
            confirmation_needed: false,
        }
    }

    /// Trigger an email-send request on upload.
    pub fn with_send_email(mut self, send_email: bool) -> Self {
        self.send_email = send_email;
        self
    }

    /// Allow a user to confirm the annotation.
    pub fn with_confirmation_needed(mut self, confirmation_needed: bool) -> Self {
        self.confirmation_needed = confirmation_needed;
        self
    }
}

/// Format a timestamp as ISO 8601 UTC with microsecond precision, e.g.
/// `2024-01-01T11:11:11.111111Z`.
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

fn serialize_timestamp<S>(timestamp: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_timestamp(timestamp))
}

/// Reduce an arbitrary string to a valid identifier: non-alphanumeric chars
/// except `_` are removed and the result is cropped to 32 chars.
pub fn sanitize_identifier(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .take(IDENTIFIER_MAX_CHARS)
        .collect()
}
