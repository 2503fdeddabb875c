pub mod nordpool_prices;
pub mod smhi_forecast;
