pub mod resize;

pub use resize::{ResizeMode, ResizeRequest, ResizeResult, ResizeStatus};
