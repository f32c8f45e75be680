//! Terminal commands and rendering helpers

pub mod dashboard;
pub mod prices;
pub mod setup;
pub mod ui;
pub mod watch;
