pub mod content;
pub mod error;
pub mod gate;
pub mod render;
pub mod repos;
pub mod revalidation;
pub mod session;
