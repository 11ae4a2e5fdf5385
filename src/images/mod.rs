pub mod codec;
pub mod kind;
mod resolver;

pub use resolver::ImageResolver;
