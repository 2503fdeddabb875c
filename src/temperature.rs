use chrono::{DateTime, Duration, Local, Timelike};
use log::warn;
use crate::manager_sensibo::ThermostatLink;
use crate::manager_smhi::{ForecastFeed, ForecastPoint};
use crate::manager_temperature::OutdoorFeed;

/// Cache slot for one measurement kind. The attempt timestamp is bumped
/// on every refresh attempt, successful or not, so a dead feed costs at
/// most one request per TTL expiry instead of one per read.
struct Cached<T> {
    value: Option<T>,
    last_attempt: Option<DateTime<Local>>,
}

impl<T> Cached<T> {
    fn new() -> Cached<T> {
        Cached { value: None, last_attempt: None }
    }

    fn is_due(&self, now: DateTime<Local>, ttl: Duration) -> bool {
        match self.last_attempt {
            None => true,
            Some(t) => now.signed_duration_since(t) >= ttl,
        }
    }
}

/// Single source of temperature truth for the control loop.
///
/// Owns the indoor sensor on the appliance, any number of live outdoor
/// feeds and the structured forecast feed, each behind its own TTL cache.
/// Reads never fail: a failed refresh logs, keeps the stale value and
/// answers with it (or None if there never was one), leaving the caller
/// to decide how to degrade.
pub struct TemperatureProvider {
    thermostat: Box<dyn ThermostatLink>,
    outdoor_feeds: Vec<Box<dyn OutdoorFeed>>,
    forecast_feed: Box<dyn ForecastFeed>,
    ttl: Duration,
    wind_exposure: f64,
    indoor: Cached<f64>,
    outdoor: Cached<f64>,
    forecast: Cached<Vec<ForecastPoint>>,
}

impl TemperatureProvider {
    /// Returns a TemperatureProvider over the given feeds
    ///
    /// # Arguments
    ///
    /// * 'thermostat' - transport to the appliance's own sensor
    /// * 'outdoor_feeds' - live outdoor feeds, averaged when more than one
    /// * 'forecast_feed' - structured forecast feed
    /// * 'ttl_minutes' - cache time to live in minutes
    /// * 'wind_exposure' - fraction of forecasted wind used for wind chill
    pub fn new(thermostat: Box<dyn ThermostatLink>,
               outdoor_feeds: Vec<Box<dyn OutdoorFeed>>,
               forecast_feed: Box<dyn ForecastFeed>,
               ttl_minutes: i64, wind_exposure: f64) -> TemperatureProvider {
        TemperatureProvider {
            thermostat,
            outdoor_feeds,
            forecast_feed,
            ttl: Duration::minutes(ttl_minutes),
            wind_exposure,
            indoor: Cached::new(),
            outdoor: Cached::new(),
            forecast: Cached::new(),
        }
    }

    /// Current indoor temperature from the appliance sensor.
    ///
    /// A fresh reading is smoothed 50/50 against the previous one since
    /// the sensor sits in the supply air stream and spikes on compressor
    /// starts.
    pub fn indoor(&mut self, now: DateTime<Local>) -> Option<f64> {
        if self.indoor.is_due(now, self.ttl) {
            self.indoor.last_attempt = Some(now);
            match self.thermostat.read_temperature() {
                Ok(fresh) => {
                    self.indoor.value = Some(match self.indoor.value {
                        Some(old) => (old + fresh) / 2.0,
                        None => fresh,
                    });
                }
                Err(e) => warn!("indoor temperature refresh failed: {}", e),
            }
        }

        self.indoor.value
    }

    /// Current outdoor temperature, the mean over all live feeds that
    /// answer. The refresh counts as failed only when every feed fails.
    pub fn outdoor(&mut self, now: DateTime<Local>) -> Option<f64> {
        if self.outdoor.is_due(now, self.ttl) {
            self.outdoor.last_attempt = Some(now);

            let mut readings: Vec<f64> = Vec::with_capacity(self.outdoor_feeds.len());
            for feed in &self.outdoor_feeds {
                match feed.read() {
                    Ok(t) => readings.push(t),
                    Err(e) => warn!("outdoor feed failed: {}", e),
                }
            }

            if !readings.is_empty() {
                self.outdoor.value = Some(readings.iter().sum::<f64>() / readings.len() as f64);
            }
        }

        self.outdoor.value
    }

    /// Forecasted outdoor temperature for the hour containing 'at',
    /// wind chill adjusted when the forecast carries wind speed.
    ///
    /// Falls back to the live outdoor temperature when no forecast point
    /// matches, so callers planning an hour ahead always get the best
    /// available estimate.
    ///
    /// # Arguments
    ///
    /// * 'now' - current local time, drives the cache TTL
    /// * 'at' - the future point in time to estimate for
    pub fn forecast(&mut self, now: DateTime<Local>, at: DateTime<Local>) -> Option<f64> {
        if self.forecast.is_due(now, self.ttl) {
            self.forecast.last_attempt = Some(now);
            match self.forecast_feed.fetch() {
                Ok(points) => self.forecast.value = Some(points),
                Err(e) => warn!("forecast refresh failed: {}", e),
            }
        }

        let hour = at.with_minute(0).and_then(|t| t.with_second(0)).unwrap_or(at);

        let matched = self.forecast.value.as_ref()
            .and_then(|points| points.iter().find(|p| p.valid_time == hour))
            .map(|p| (p.temp, p.wind));

        match matched {
            Some((temp, wind)) => {
                let chill = wind.map(|w| self.wind_exposure * w).unwrap_or(0.0);
                Some(temp - chill)
            }
            None => self.outdoor(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;
    use chrono::TimeZone;
    use serde_json::Value;
    use crate::errors::{ActuatorError, WeatherError};

    struct StubThermostat {
        calls: Rc<Cell<usize>>,
        readings: RefCell<Vec<Result<f64, ActuatorError>>>,
    }

    impl ThermostatLink for StubThermostat {
        fn set_property(&self, _name: &str, _value: &Value) -> Result<(), ActuatorError> {
            Ok(())
        }

        fn read_temperature(&self) -> Result<f64, ActuatorError> {
            self.calls.set(self.calls.get() + 1);
            self.readings.borrow_mut().remove(0)
        }
    }

    struct StubOutdoor {
        calls: Rc<Cell<usize>>,
        result: Result<f64, ()>,
    }

    impl OutdoorFeed for StubOutdoor {
        fn read(&self) -> Result<f64, WeatherError> {
            self.calls.set(self.calls.get() + 1);
            self.result.map_err(|_| WeatherError::Unavailable("down".to_string()))
        }
    }

    struct StubForecast {
        points: Vec<ForecastPoint>,
    }

    impl ForecastFeed for StubForecast {
        fn fetch(&self) -> Result<Vec<ForecastPoint>, WeatherError> {
            Ok(self.points.clone())
        }
    }

    fn at(hour: u32, min: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 1, 20, hour, min, 0).unwrap()
    }

    fn provider(thermostat: StubThermostat, outdoor: Vec<Box<dyn OutdoorFeed>>,
                forecast: Vec<ForecastPoint>) -> TemperatureProvider {
        TemperatureProvider::new(Box::new(thermostat), outdoor,
                                 Box::new(StubForecast { points: forecast }), 20, 0.4)
    }

    fn idle_thermostat() -> StubThermostat {
        let readings = (0..10).map(|_| Ok(20.0)).collect();
        StubThermostat { calls: Rc::new(Cell::new(0)), readings: RefCell::new(readings) }
    }

    #[test]
    fn indoor_is_smoothed_against_previous_reading() {
        let calls = Rc::new(Cell::new(0));
        let thermostat = StubThermostat {
            calls: calls.clone(),
            readings: RefCell::new(vec![Ok(20.0), Ok(24.0)]),
        };
        let mut provider = provider(thermostat, Vec::new(), Vec::new());

        assert_eq!(provider.indoor(at(10, 0)), Some(20.0));
        // Within TTL: cached, no new call
        assert_eq!(provider.indoor(at(10, 10)), Some(20.0));
        assert_eq!(calls.get(), 1);
        // Past TTL: fresh 24.0 smoothed against cached 20.0
        assert_eq!(provider.indoor(at(10, 25)), Some(22.0));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn failed_refresh_keeps_stale_value_and_spends_one_attempt_per_expiry() {
        let calls = Rc::new(Cell::new(0));
        let feed = StubOutdoor { calls: calls.clone(), result: Ok(5.0) };
        let dead_calls = Rc::new(Cell::new(0));

        let mut provider = provider(idle_thermostat(), vec![Box::new(feed)], Vec::new());
        assert_eq!(provider.outdoor(at(10, 0)), Some(5.0));

        // Replace with a failing feed by expiring the cache against it
        let dead = StubOutdoor { calls: dead_calls.clone(), result: Err(()) };
        provider.outdoor_feeds = vec![Box::new(dead)];

        // Past TTL: one failed attempt, stale value answered
        assert_eq!(provider.outdoor(at(10, 25)), Some(5.0));
        // Still inside the new window: no second attempt
        assert_eq!(provider.outdoor(at(10, 30)), Some(5.0));
        assert_eq!(provider.outdoor(at(10, 40)), Some(5.0));
        assert_eq!(dead_calls.get(), 1);

        // Next expiry: exactly one more attempt
        assert_eq!(provider.outdoor(at(11, 0)), Some(5.0));
        assert_eq!(dead_calls.get(), 2);
    }

    #[test]
    fn outdoor_is_mean_of_answering_feeds() {
        let a = StubOutdoor { calls: Rc::new(Cell::new(0)), result: Ok(4.0) };
        let b = StubOutdoor { calls: Rc::new(Cell::new(0)), result: Ok(6.0) };
        let dead = StubOutdoor { calls: Rc::new(Cell::new(0)), result: Err(()) };

        let mut provider = provider(idle_thermostat(),
                                    vec![Box::new(a), Box::new(dead), Box::new(b)], Vec::new());
        assert_eq!(provider.outdoor(at(10, 0)), Some(5.0));
    }

    #[test]
    fn forecast_matches_hour_and_applies_wind_chill() {
        let points = vec![
            ForecastPoint { valid_time: at(14, 0), temp: -2.0, wind: Some(5.0) },
            ForecastPoint { valid_time: at(15, 0), temp: -3.0, wind: None },
        ];
        let mut provider = provider(idle_thermostat(), Vec::new(), points);

        // -2.0 - 0.4 * 5.0
        assert_eq!(provider.forecast(at(10, 0), at(14, 30)), Some(-4.0));
        // No wind reported: temperature as is
        assert_eq!(provider.forecast(at(10, 0), at(15, 0)), Some(-3.0));
    }

    #[test]
    fn forecast_falls_back_to_live_outdoor() {
        let feed = StubOutdoor { calls: Rc::new(Cell::new(0)), result: Ok(1.5) };
        let mut provider = provider(idle_thermostat(), vec![Box::new(feed)], Vec::new());

        assert_eq!(provider.forecast(at(10, 0), at(18, 0)), Some(1.5));
    }

    #[test]
    fn no_value_before_first_successful_refresh() {
        let dead = StubOutdoor { calls: Rc::new(Cell::new(0)), result: Err(()) };
        let mut provider = provider(idle_thermostat(), vec![Box::new(dead)], Vec::new());

        assert_eq!(provider.outdoor(at(10, 0)), None);
    }
}
