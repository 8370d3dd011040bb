pub mod rest;

pub use rest::PoloniexClient;
