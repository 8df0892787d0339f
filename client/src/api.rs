use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use hololens_server::model::{Reading, Structure};
use hololens_server::validate::{validate_object, SchemaSource};
use reqwest::Url;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::errors::{ClientError, Result};

/// Verbs the client helper knows how to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl FromStr for HttpMethod {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            _ => Err(ClientError::UnsupportedTransportMethod(s.to_string())),
        }
    }
}

/// Validates `data` against `message_type` and wraps it as a reading.
///
/// This is the whole client-side gate: a reading that fails here is never
/// put on the wire.
pub fn prepare_reading<S>(
    schemas: &S,
    device_id: &str,
    message_type: &str,
    data: Map<String, Value>,
) -> Result<Reading>
where
    S: SchemaSource + ?Sized,
{
    validate_object(schemas, message_type, &data)?;
    Ok(Reading::new(device_id, data).with_message_type(message_type))
}

/// Thin JSON client for the server's HTTP surface.
#[derive(Debug, Clone)]
pub struct ServerClient {
    base_url: Url,
    http: reqwest::Client,
}

impl ServerClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let parsed = Url::parse(base_url)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if parsed.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(base_url.to_string()));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            base_url: parsed,
            http,
        })
    }

    /// Appends `segments` to the base URL, percent-encoding each one.
    fn url_for<'a, I>(&self, segments: I) -> Result<Url>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Sends `method` to `endpoint` and decodes the JSON reply.
    pub async fn request(&self, endpoint: &str, method: &str, body: Option<&Value>) -> Result<Value> {
        let method: HttpMethod = method.parse()?;
        let url = self.url_for(endpoint.split('/').filter(|s| !s.is_empty()))?;
        self.send(method, url, body).await
    }

    async fn send(&self, method: HttpMethod, url: Url, body: Option<&Value>) -> Result<Value> {
        debug!("{:?} {}", method, url);

        let builder = match method {
            HttpMethod::Get => self.http.get(url),
            HttpMethod::Post => self.http.post(url).json(body.unwrap_or(&Value::Null)),
        };
        let response = builder.send().await?;

        let status = response.status();
        let text = response.text().await?;
        // Timeouts and proxies may answer without a JSON body.
        let value = serde_json::from_str(&text).unwrap_or(Value::String(text));
        if !status.is_success() {
            let detail = value
                .get("detail")
                .and_then(Value::as_str)
                .or_else(|| value.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| value.to_string());
            return Err(ClientError::Server {
                status: status.as_u16(),
                detail,
            });
        }
        Ok(value)
    }

    pub async fn status(&self) -> Result<Value> {
        self.request("/", "GET", None).await
    }

    pub async fn message_types(&self) -> Result<BTreeMap<String, Structure>> {
        let value = self.request("/message-types", "GET", None).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn register(&self, name: &str, structure: &Value) -> Result<Value> {
        let body = json!({"name": name, "structure": structure});
        self.request("/message-types", "POST", Some(&body)).await
    }

    pub async fn fetch(&self, device_id: &str) -> Result<Value> {
        let url = self.url_for(["hololens", "data", device_id])?;
        self.send(HttpMethod::Get, url, None).await
    }

    pub async fn send_reading(&self, reading: &Reading) -> Result<Value> {
        let body = serde_json::to_value(reading)?;
        self.request("/hololens/data", "POST", Some(&body)).await
    }

    /// Fetches the registered types, validates, and only then submits.
    pub async fn send_validated(
        &self,
        device_id: &str,
        message_type: &str,
        data: Map<String, Value>,
    ) -> Result<Value> {
        let schemas = self.message_types().await?;
        let reading = prepare_reading(&schemas, device_id, message_type, data)?;
        self.send_reading(&reading).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{position_structure, sample_position, POSITION_TYPE};
    use hololens_server::Error;

    fn schemas() -> BTreeMap<String, Structure> {
        let mut schemas = BTreeMap::new();
        schemas.insert(
            POSITION_TYPE.to_string(),
            serde_json::from_value(position_structure()).unwrap(),
        );
        schemas
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!("get".parse::<HttpMethod>().unwrap(), HttpMethod::Get);
        assert_eq!("POST".parse::<HttpMethod>().unwrap(), HttpMethod::Post);
        assert!(matches!(
            "DELETE".parse::<HttpMethod>(),
            Err(ClientError::UnsupportedTransportMethod(ref m)) if m == "DELETE"
        ));
    }

    #[test]
    fn test_prepare_valid_reading() {
        let reading = prepare_reading(&schemas(), "HOLO1", POSITION_TYPE, sample_position()).unwrap();
        assert_eq!(reading.device_id, "HOLO1");
        assert_eq!(reading.message_type.as_deref(), Some(POSITION_TYPE));
        assert_eq!(reading.sensor_data.len(), 4);
    }

    #[test]
    fn test_prepare_rejects_invalid_reading() {
        let mut data = sample_position();
        data.insert("x".to_string(), json!("bad"));

        let err = prepare_reading(&schemas(), "HOLO1", POSITION_TYPE, data).unwrap_err();
        assert!(matches!(
            err,
            ClientError::Validation(Error::TypeMismatch { expected: "float", actual: "string", .. })
        ));
    }

    #[test]
    fn test_prepare_rejects_unregistered_type() {
        let err = prepare_reading(&schemas(), "HOLO1", "handData", sample_position()).unwrap_err();
        assert!(matches!(err, ClientError::Validation(Error::UnknownMessageType(_))));
    }

    #[tokio::test]
    async fn test_unsupported_method_fails_before_any_request() {
        // Nothing listens on port 9; reaching the network would yield an
        // Http error instead.
        let client = ServerClient::new("http://127.0.0.1:9").unwrap();
        let err = client.request("/", "PUT", None).await.unwrap_err();
        assert!(matches!(err, ClientError::UnsupportedTransportMethod(_)));
    }

    #[test]
    fn test_device_ids_are_path_encoded() {
        let client = ServerClient::new("http://127.0.0.1:8000").unwrap();
        let url = client.url_for(["hololens", "data", "rig/7?x#y"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:8000/hololens/data/rig%2F7%3Fx%23y"
        );

        let nested = ServerClient::new("http://127.0.0.1:8000/api/").unwrap();
        assert_eq!(
            nested.url_for("/message-types".split('/').filter(|s| !s.is_empty())).unwrap().as_str(),
            "http://127.0.0.1:8000/api/message-types"
        );
    }

    #[test]
    fn test_rejects_unusable_base_url() {
        assert!(matches!(
            ServerClient::new("not a url"),
            Err(ClientError::InvalidUrl(_))
        ));
        assert!(matches!(
            ServerClient::new("mailto:ops@example.com"),
            Err(ClientError::InvalidUrl(_))
        ));
    }
}
