pub mod caller;
pub mod coordinates;
pub mod driver;
pub mod event;
pub mod ride;

pub use caller::{CallerIdentity, Role};
pub use coordinates::Coordinates;
pub use driver::{DriverCandidate, DriverMatchStats, ScoreBreakdown};
pub use event::{EventEnvelope, RideEvent};
pub use ride::{GeoStamp, Ride, RideFilters, RidePage, RideRequest, RideStatus};
