pub mod company;
pub mod error;
pub mod expense;
pub mod rates;
pub mod rule;
pub mod service;
pub mod store;
pub mod user;
pub mod utils;
