//! Network-fed miners (weather, stock) and the cancellable fetch they
//! share. Fetches run out-of-band; results come back through a channel and
//! are integrated on the graph tick.

pub mod fetch;
pub mod stock;
pub mod weather;

pub use fetch::FetchTask;
pub use stock::{StockMiner, StockQuote};
pub use weather::{WeatherMiner, WeatherObservation};
