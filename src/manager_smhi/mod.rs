use std::time::Duration;
use chrono::{DateTime, Local};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use crate::errors::WeatherError;
use crate::models::smhi_forecast::FullForecast;

/// One forecasted hour. Wind is optional since SMHI does not always
/// report wind speed for every time slot.
#[derive(Clone, Debug, PartialEq)]
pub struct ForecastPoint {
    pub valid_time: DateTime<Local>,
    pub temp: f64,
    pub wind: Option<f64>,
}

/// Seam towards the structured forecast feed, object safe so tests can
/// replace the network client with a counting stub
pub trait ForecastFeed {
    /// Fetches all forecast points the feed currently offers
    fn fetch(&self) -> Result<Vec<ForecastPoint>, WeatherError>;
}

/// Client towards the SMHI point forecast API
pub struct Smhi {
    client: Client,
    lat: f64,
    long: f64,
}

impl Smhi {
    /// Returns a Smhi struct ready for fetching forecasts.
    ///
    /// The given lat/long values are truncated to 4 decimals since that is
    /// the max precision that SMHI allows in their forecast API.
    ///
    /// # Arguments
    ///
    /// * 'lat' - latitude for the point to get forecasts for
    /// * 'long' - longitude for the point to get forecasts for
    pub fn new(lat: f64, long: f64) -> Smhi {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());

        Smhi { client, lat, long }
    }
}

impl ForecastFeed for Smhi {
    /// Retrieves the current point forecast from SMHI.
    ///
    /// The raw forecast consists of several days worth of data and many weather
    /// parameters. The returned points only carry temperature ("t") and wind
    /// speed ("ws"), one point per time slot SMHI reports.
    fn fetch(&self) -> Result<Vec<ForecastPoint>, WeatherError> {
        let smhi_domain = "https://opendata-download-metfcst.smhi.se";
        let base_url = "/api/category/pmp3g/version/2/geotype/point";
        let url = format!("{}{}/lon/{:0.4}/lat/{:0.4}/data.json",
                          smhi_domain, base_url, self.long, self.lat);

        let res = self.client.get(url).send()?;
        if res.status() != StatusCode::OK {
            return Err(WeatherError::Unavailable(format!("http status {}", res.status())));
        }

        let full: FullForecast = serde_json::from_str(&res.text()?)?;

        let mut points: Vec<ForecastPoint> = Vec::with_capacity(full.time_series.len());
        for ts in full.time_series {
            let mut temp: Option<f64> = None;
            let mut wind: Option<f64> = None;

            for params in ts.parameters {
                if params.name.eq("t") {
                    temp = params.values.first().copied();
                } else if params.name.eq("ws") {
                    wind = params.values.first().copied();
                }
            }

            if let Some(temp) = temp {
                points.push(ForecastPoint { valid_time: ts.valid_time, temp, wind });
            }
        }

        if points.is_empty() {
            Err(WeatherError::Unavailable("no forecast points in response".to_string()))
        } else {
            Ok(points)
        }
    }
}
