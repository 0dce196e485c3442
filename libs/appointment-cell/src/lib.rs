pub mod models;
pub mod services;
pub mod store;

pub use models::*;

pub use services::{
    AppointmentBookingService, AppointmentLifecycleService, AuditTrailRecorder,
    ConflictDetectionService, PricingService, SchedulingLocks,
    AuthorizationPolicy, RoleBasedPolicy, Clock, SystemClock, ManualClock, RequestContext,
};

pub use store::{AppointmentStore, AuditLogStore, Directory};
