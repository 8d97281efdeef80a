pub mod domain;
pub mod error;
pub mod ids;
pub mod time;

pub use domain::{LandedState, MissionOutcome, MissionState, SurveyArea, Waypoint};
pub use error::{ErrorCode, MissionError, MissionResult};
pub use ids::MissionId;
pub use survey_geo::GeoPoint;
pub use time::{EpochMillis, now_epoch_millis};
