use std::time::Duration;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use crate::errors::WeatherError;

/// Seam towards a plain numeric live temperature endpoint
pub trait OutdoorFeed {
    /// Reads one outdoor temperature in degrees celsius
    fn read(&self) -> Result<f64, WeatherError>;
}

/// Client towards an endpoint returning the current temperature as a
/// bare "x.y" text body, e.g. temperatur.nu
pub struct TemperatureNu {
    client: Client,
    url: String,
}

impl TemperatureNu {
    /// Returns a TemperatureNu struct for one measuring station url
    ///
    /// # Arguments
    ///
    /// * 'url' - complete url returning a plain number
    pub fn new(url: &str) -> TemperatureNu {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());

        TemperatureNu { client, url: url.to_string() }
    }
}

impl OutdoorFeed for TemperatureNu {
    fn read(&self) -> Result<f64, WeatherError> {
        let res = self.client.get(&self.url).send()?;

        if res.status() != StatusCode::OK {
            return Err(WeatherError::Unavailable(format!("http status {}", res.status())));
        }

        let text = res.text()?;
        text.trim()
            .parse::<f64>()
            .map_err(|_| WeatherError::Unavailable(format!("not a number: {:.20}", text)))
    }
}
