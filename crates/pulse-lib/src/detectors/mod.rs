pub mod ppg;

pub use ppg::{
    detector_from_config, AdaptiveThresholdDetector, ValleyDetector, WindowMinimumDetector,
};
