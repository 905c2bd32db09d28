pub mod clock;
pub mod config;
pub mod detectors;
pub mod io;
pub mod metrics;
pub mod observe;
pub mod pipeline;
pub mod quality;
pub mod record;
pub mod signal;

pub use config::*;
pub use detectors::*;
pub use metrics::*;
pub use pipeline::*;
pub use signal::*;
