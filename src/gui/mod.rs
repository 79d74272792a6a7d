pub mod controller;
pub mod frontend;
pub mod render;
