//! Server-rendered askama views.

pub mod format;
pub mod views;
