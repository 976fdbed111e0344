//! Core value types shared by the retailer and consumers

pub mod consumption;
pub mod price;
pub mod profit;
