pub mod exif;
pub mod generate;
pub mod model;
pub mod progress;
pub mod refine;
pub mod relocate;
pub mod scanner;
