//! Contract billing: materializes hourly billing table rows and monthly
//! invoice rows from product contracts.

pub mod billing;
pub mod calendar;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;
pub mod startup;
