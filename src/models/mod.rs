pub mod actor;
pub mod catalog;
pub mod event;
pub mod order;
pub mod unit;
