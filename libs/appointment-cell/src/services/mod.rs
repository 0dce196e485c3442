pub mod audit;
pub mod authorization;
pub mod booking;
pub mod clock;
pub mod conflict;
pub mod consistency;
pub mod lifecycle;
pub mod pricing;
pub mod time_range;

pub use audit::AuditTrailRecorder;
pub use authorization::{AuthorizationPolicy, RoleBasedPolicy};
pub use booking::{AppointmentBookingService, RequestContext};
pub use clock::{Clock, ManualClock, SystemClock};
pub use conflict::ConflictDetectionService;
pub use consistency::SchedulingLocks;
pub use lifecycle::AppointmentLifecycleService;
pub use pricing::PricingService;
