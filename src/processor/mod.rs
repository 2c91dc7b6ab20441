pub mod name_classifier;
pub mod patterns;
pub mod stem_matcher;

pub use name_classifier::*;
