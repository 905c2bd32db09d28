pub mod features;
pub mod heart_rate;
pub mod hrv;
pub mod stats;

pub use features::{extract_features, FeatureArity, FEATURE_EPSILON};
pub use heart_rate::{estimate_heart_rate, HeartRateEstimate};
pub use hrv::{estimate_hrv, hrv_from_rr_ms, hrv_time, HRVTime, HrvEstimate};
