pub mod application;
pub mod rendering;
pub mod sequence;
pub mod settings;
