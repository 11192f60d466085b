//! Motion preference and counter tweening.

pub mod preference;
pub mod tween;

pub use preference::MotionPreference;
pub use tween::Tween;
