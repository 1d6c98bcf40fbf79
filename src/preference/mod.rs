//! 偏好域 - 值对象与解析器

pub mod model;
pub mod resolver;

pub use model::{Preference, PreferenceDto, PreferenceLevel};
pub use resolver::PreferenceUpdate;
