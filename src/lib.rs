pub mod activities;
pub mod client;
pub mod dates;
pub mod display;
pub mod error;
pub mod form;
pub mod schedule;
pub mod settings;
pub mod web;
