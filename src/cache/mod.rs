pub mod proxy;
pub mod store;
pub mod web;
