//! Mission execution: the flight state machine, the polling primitive it is
//! driven by, and the supervisor that flies a planned route against a
//! [`survey_vehicle::VehicleHandle`].

pub mod mission;
pub mod poll;
pub mod report;
pub mod state;
pub mod supervisor;

pub use mission::Mission;
pub use poll::{CancelHandle, CancelToken, PollError, PollPolicy, cancellation, poll_until};
pub use report::{MissionProgress, MissionReport};
pub use state::{MissionEvent, MissionStateMachine, Transition, TransitionError};
pub use supervisor::{MissionSupervisor, ReturnAction, SupervisorConfig};
