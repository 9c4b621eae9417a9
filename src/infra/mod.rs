pub mod candle;
pub mod layout;

pub use self::candle::{Backend, CandleRuntime};
pub use layout::ModelLayout;
