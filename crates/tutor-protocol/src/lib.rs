pub mod frames;
pub mod http;
pub mod methods;
pub mod voice;

pub use frames::{ErrorShape, EventFrame, InboundFrame, ReqFrame, ResFrame};
