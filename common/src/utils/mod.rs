pub mod codec;
pub mod config;
pub mod identity;
pub mod normalize;
