pub mod anomalies;
pub mod health;
pub mod trends;
