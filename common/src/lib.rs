mod db;
mod error;
mod helpers;
mod schema;

pub mod article;
pub mod credit;
pub mod listing;
pub mod refund;
pub mod workflow;

pub use db::*;
pub use error::*;
pub use helpers::*;
pub use schema::*;
