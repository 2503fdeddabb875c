use std::time::Duration;
use chrono::NaiveDate;
use log::warn;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use crate::errors::PriceError;
use crate::models::nordpool_prices::DayAheadPrices;
use crate::prices::{DayPriceCurve, PricePoint};

/// Client towards the NordPool day ahead price API
pub struct NordPool {
    client: Client,
    area: String,
    currency: String,
}

impl NordPool {
    /// Returns a NordPool struct ready for fetching day ahead prices
    ///
    /// # Arguments
    ///
    /// * 'area' - the delivery area to fetch prices for, e.g. SE3
    /// * 'currency' - the currency prices shall be expressed in, e.g. SEK
    pub fn new(area: &str, currency: &str) -> NordPool {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());

        NordPool { client, area: area.to_string(), currency: currency.to_string() }
    }

    /// Retrieves day ahead prices from NordPool for one local day.
    ///
    /// The returned curve holds one price point per delivery hour in SEK/MWh.
    /// A response that cannot be parsed, or that holds a clearly broken number
    /// of hours, is treated as unavailable. DST transition days legitimately
    /// hold 23 or 25 hours and are let through with a warning.
    ///
    /// # Arguments
    ///
    /// * 'date' - the local date to retrieve prices for
    pub fn get_prices(&self, date: NaiveDate) -> Result<DayPriceCurve, PriceError> {
        let url = "https://dataportal-api.nordpoolgroup.com/api/DayAheadPrices";
        let date_str = format!("{}", date.format("%Y-%m-%d"));
        let query = vec![
            ("date", date_str.as_str()),
            ("market", "DayAhead"),
            ("deliveryArea", self.area.as_str()),
            ("currency", self.currency.as_str()),
        ];

        let res = self.client
            .get(url)
            .query(&query)
            .send()?;

        if res.status() != StatusCode::OK {
            return Err(PriceError::Unavailable(format!("http status {}", res.status())));
        }

        let prices: DayAheadPrices = serde_json::from_str(&res.text()?)?;

        self.prices_to_curve(date, prices)
    }

    /// Transforms the raw day ahead response to a DayPriceCurve
    ///
    /// # Arguments
    ///
    /// * 'date' - the local date the prices belong to
    /// * 'prices' - the raw response from NordPool
    fn prices_to_curve(&self, date: NaiveDate, prices: DayAheadPrices) -> Result<DayPriceCurve, PriceError> {
        let mut points: Vec<PricePoint> = Vec::with_capacity(24);

        for entry in prices.multi_area_entries {
            let value = entry.entry_per_area
                .get(&self.area)
                .copied()
                .ok_or_else(|| PriceError::Unavailable(format!("area {} missing in response", self.area)))?;

            points.push(PricePoint { start: entry.delivery_start, value });
        }

        points.sort_by_key(|p| p.start);

        if !(23..=25).contains(&points.len()) {
            return Err(PriceError::Unavailable(
                format!("{} delivery hours in response for {}", points.len(), date)));
        }
        if points.len() != 24 {
            warn!("DST transition day {}: {} delivery hours", date, points.len());
        }

        Ok(DayPriceCurve::new(date, points))
    }
}
