pub mod num;
pub mod timing;

pub use timing::TimingMode;
