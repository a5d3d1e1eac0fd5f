pub mod credentials;
pub mod errors;
pub mod events;
pub mod measurements;
pub mod models;
pub mod receipts;
pub mod requests;
pub mod results;
