pub mod align;
pub mod logger;
