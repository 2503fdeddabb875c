use std::time::Duration;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde_json::{Value, json};
use crate::errors::ActuatorError;

/// Seam towards the thermostat hardware. The controller pushes single
/// named attributes through it and the temperature provider reads the
/// built in sensor. Object safe so tests can record actuations.
pub trait ThermostatLink {
    /// Sets one named state attribute on the appliance
    fn set_property(&self, name: &str, value: &Value) -> Result<(), ActuatorError>;

    /// Reads the appliance's own temperature sensor
    fn read_temperature(&self) -> Result<f64, ActuatorError>;
}

/// Client towards the Sensibo cloud API controlling the heat pump
pub struct Sensibo {
    client: Client,
    api_url: String,
    api_key: String,
    uid: String,
}

impl Sensibo {
    /// Returns a Sensibo struct bound to one pod
    ///
    /// # Arguments
    ///
    /// * 'api_url' - base url of the Sensibo API
    /// * 'api_key' - API key from the Sensibo account
    /// * 'uid' - unique id of the pod to control
    pub fn new(api_url: &str, api_key: &str, uid: &str) -> Sensibo {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());

        Sensibo {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            uid: uid.to_string(),
        }
    }

    /// Maps an http status to a result, separating auth failures so the
    /// caller can degrade instead of hammering the API
    fn check_status(status: StatusCode) -> Result<(), ActuatorError> {
        match status {
            StatusCode::OK => Ok(()),
            StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => Err(ActuatorError::Unauthorized),
            s => Err(ActuatorError::Rejected(format!("http status {}", s))),
        }
    }
}

impl ThermostatLink for Sensibo {
    fn set_property(&self, name: &str, value: &Value) -> Result<(), ActuatorError> {
        let url = format!("{}/pods/{}/acStates/{}", self.api_url, self.uid, name);
        let body = json!({ "newValue": value });

        let res = self.client
            .patch(url)
            .query(&[("apiKey", self.api_key.as_str())])
            .json(&body)
            .send()?;

        Self::check_status(res.status())
    }

    fn read_temperature(&self) -> Result<f64, ActuatorError> {
        let url = format!("{}/pods/{}/measurements", self.api_url, self.uid);

        let res = self.client
            .get(url)
            .query(&[("apiKey", self.api_key.as_str())])
            .send()?;

        Self::check_status(res.status())?;

        let doc: Value = res.json()?;
        doc["result"][0]["temperature"]
            .as_f64()
            .ok_or_else(|| ActuatorError::Rejected("no temperature in measurement".to_string()))
    }
}
