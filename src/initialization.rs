use std::time::Duration;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Root};
use log4rs::encode::pattern::PatternEncoder;
use crate::config::Config;
use crate::controller::Controller;
use crate::errors::InitError;
use crate::heater::ThermalPerformanceModel;
use crate::manager_nordpool::NordPool;
use crate::manager_sensibo::Sensibo;
use crate::manager_smhi::Smhi;
use crate::manager_temperature::{OutdoorFeed, TemperatureNu};
use crate::prices::PriceAnalyzer;
use crate::scheduler::{Presets, Scheduler};
use crate::temperature::TemperatureProvider;

const LOG_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S)} {l} {t} - {m}{n}";

/// Initializes and returns the NordPool client, the price analyzer and
/// the scheduler with all its feeds wired up
///
/// # Arguments
///
/// * 'config' - the loaded configuration
pub fn init(config: &Config) -> Result<(NordPool, PriceAnalyzer, Scheduler<Sensibo>), InitError> {
    let nordpool = NordPool::new(&config.site.price_area, &config.site.currency);
    let analyzer = PriceAnalyzer::new(config.price.clone());

    let actuator = Sensibo::new(&config.actuator.api_url, &config.actuator.api_key,
                                &config.actuator.device_uid);
    let sensor = Sensibo::new(&config.actuator.api_url, &config.actuator.api_key,
                              &config.actuator.device_uid);

    let outdoor_feeds: Vec<Box<dyn OutdoorFeed>> = config.site.temperature_urls.iter()
        .map(|url| Box::new(TemperatureNu::new(url)) as Box<dyn OutdoorFeed>)
        .collect();
    let smhi = Smhi::new(config.site.lat, config.site.long);

    let provider = TemperatureProvider::new(
        Box::new(sensor),
        outdoor_feeds,
        Box::new(smhi),
        config.provider.ttl_minutes,
        config.site.wind_exposure);

    let model = ThermalPerformanceModel::new(
        config.heater.calibration.clone(),
        config.heater.loss_watts_per_degree,
        config.heater.storage_wh_per_degree,
        config.temps.comfort);

    let presets = Presets::from_config(&config.temps)?;
    let controller = Controller::new(
        actuator, Duration::from_millis(config.actuator.command_delay_ms));

    let scheduler = Scheduler::new(
        config.temps.clone(), config.safety.clone(), presets, provider, model, controller);

    Ok((nordpool, analyzer, scheduler))
}

/// Sets up logging to file and optionally stdout
///
/// # Arguments
///
/// * 'config' - the loaded configuration
pub fn setup_logger(config: &Config) -> Result<(), InitError> {
    let file = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
        .build(&config.general.log_path)
        .map_err(|e| InitError::Setup(format!("log file appender: {}", e)))?;

    let mut builder = log4rs::Config::builder()
        .appender(Appender::builder().build("file", Box::new(file)));
    let mut root = Root::builder().appender("file");

    if config.general.log_to_stdout {
        let stdout = ConsoleAppender::builder()
            .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
            .build();
        builder = builder.appender(Appender::builder().build("stdout", Box::new(stdout)));
        root = root.appender("stdout");
    }

    let log_config = builder
        .build(root.build(config.general.log_level))
        .map_err(|e| InitError::Setup(format!("log configuration: {}", e)))?;

    log4rs::init_config(log_config)
        .map_err(|e| InitError::Setup(format!("log initialization: {}", e)))?;

    Ok(())
}
