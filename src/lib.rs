// Library for tests to access modules

pub mod channel;
pub mod config;
pub mod influx;
pub mod line_protocol;
pub mod models;
pub mod routes;
pub mod scrape;
pub mod table;
pub mod units;
pub mod version;
pub mod worker;
