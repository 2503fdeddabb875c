use std::fs;
use log::LevelFilter;
use serde::Deserialize;
use crate::errors::ConfigError;
use crate::heater::CalibrationPoint;

#[derive(Deserialize, Clone)]
pub struct General {
    pub log_path: String,
    pub log_level: LevelFilter,
    pub log_to_stdout: bool,
}

#[derive(Deserialize, Clone)]
pub struct Site {
    pub price_area: String,
    pub currency: String,
    pub lat: f64,
    pub long: f64,
    pub temperature_urls: Vec<String>,
    /// Fraction of forecasted wind that reaches the building, used for
    /// wind chill adjustment of forecast temperatures. 0.0 disables it.
    pub wind_exposure: f64,
}

/// Price thresholds, all in SEK/MWh excluding VAT
#[derive(Deserialize, Clone)]
pub struct PriceParameters {
    pub transfer_and_tax: f64,
    pub reasonable_ceiling: f64,
    pub reasonable_margin: f64,
    pub cheap_floor: f64,
    pub reduce_comfort_ceiling: f64,
    pub tomorrow_publish_hour: u32,
}

#[derive(Deserialize, Clone)]
pub struct HeaterParameters {
    pub calibration: Vec<CalibrationPoint>,
    pub loss_watts_per_degree: f64,
    pub storage_wh_per_degree: f64,
}

/// Comfort window hours for the two day kinds, all in local whole hours
#[derive(Deserialize, Clone)]
pub struct ComfortHours {
    pub workday_morning_start: u32,
    pub workday_morning_end: u32,
    pub workday_morning_end_minute: u32,
    pub workday_afternoon_start: u32,
    pub workday_last: u32,
    pub dayoff_morning_start: u32,
    pub dayoff_last: u32,
    pub dinner_hour: u32,
    pub earliest_afternoon_preheat: u32,
    pub latest_afternoon_preheat: u32,
}

#[derive(Deserialize, Clone)]
pub struct TempParameters {
    pub comfort: f64,
    pub idle_target: i64,
    pub comfort_target: i64,
    pub high_target: i64,
    pub dinner_target: i64,
    pub max_over: f64,
    pub hysteresis: f64,
    pub comfort_plus_delta: i64,
    pub cold_outdoor: f64,
    pub heatpump_limit: f64,
    pub extreme_cold: f64,
}

#[derive(Deserialize, Clone)]
pub struct ActuatorParameters {
    pub api_url: String,
    pub api_key: String,
    pub device_uid: String,
    pub command_delay_ms: u64,
}

#[derive(Deserialize, Clone)]
pub struct SafetyParameters {
    pub interval_days: u32,
    pub temperature: i64,
}

#[derive(Deserialize, Clone)]
pub struct CalendarParameters {
    /// ISO weekdays (1 = Monday .. 7 = Sunday) treated as at-home days
    pub at_home_weekdays: Vec<u32>,
    pub override_file: String,
}

#[derive(Deserialize, Clone)]
pub struct ProviderParameters {
    pub ttl_minutes: i64,
}

#[derive(Deserialize, Clone)]
pub struct Config {
    pub general: General,
    pub site: Site,
    pub price: PriceParameters,
    pub heater: HeaterParameters,
    pub hours: ComfortHours,
    pub temps: TempParameters,
    pub actuator: ActuatorParameters,
    pub safety: SafetyParameters,
    pub calendar: CalendarParameters,
    pub provider: ProviderParameters,
}

/// Loads the configuration file and returns a struct with all configuration items
///
/// # Arguments
///
/// * 'config_path' - path to the configuration file
pub fn load_config(config_path: &str) -> Result<Config, ConfigError> {
    let toml = fs::read_to_string(config_path)?;
    let config: Config = toml::from_str(&toml)?;

    validate(&config)?;

    Ok(config)
}

/// Validates configuration items that serde cannot check on its own
///
/// # Arguments
///
/// * 'config' - the configuration to validate
fn validate(config: &Config) -> Result<(), ConfigError> {
    let cal = &config.heater.calibration;
    if cal.len() < 2 {
        Err("heater calibration needs at least two points")?;
    }
    if !cal.windows(2).all(|w| w[0].outdoor < w[1].outdoor) {
        Err("heater calibration points must be strictly ascending in outdoor temperature")?;
    }
    if cal.iter().any(|p| p.watts <= 0.0 || p.cop <= 0.0) {
        Err("heater calibration watts and cop must be positive")?;
    }
    if config.heater.storage_wh_per_degree <= 0.0 {
        Err("storage_wh_per_degree must be positive")?;
    }

    let h = &config.hours;
    let ascending = h.workday_morning_start < h.workday_morning_end
        && h.workday_morning_end <= h.earliest_afternoon_preheat
        && h.earliest_afternoon_preheat <= h.latest_afternoon_preheat
        && h.latest_afternoon_preheat <= h.workday_afternoon_start
        && h.workday_afternoon_start < h.workday_last
        && h.dayoff_morning_start < h.dayoff_last;
    if !ascending || h.workday_last > 23 || h.dayoff_last > 23 {
        Err("comfort hours are not in ascending order within 0-23")?;
    }
    if h.dinner_hour <= h.workday_afternoon_start || h.dinner_hour >= h.workday_last {
        Err("dinner_hour must fall inside the workday afternoon comfort window")?;
    }

    if config.calendar.at_home_weekdays.iter().any(|&d| d < 1 || d > 7) {
        Err("at_home_weekdays must contain ISO weekdays 1-7")?;
    }
    if config.provider.ttl_minutes < 1 {
        Err("provider ttl_minutes must be at least 1")?;
    }
    if !(0.0..=1.0).contains(&config.site.wind_exposure) {
        Err("wind_exposure must be within 0.0-1.0")?;
    }

    Ok(())
}
