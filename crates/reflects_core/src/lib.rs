pub mod cascade;
pub mod domain;
pub mod ports;
pub mod rate_limit;

pub use cascade::{CascadePlan, CascadeStep, Obsolescence};
pub use domain::{
    AuthUser, Chapter, Feedback, FeedbackFilter, FeedbackStatus, FeedbackView, Lineage,
    Reflection, ReflectionAudit, ReflectionFilter, Role, StudentReflection, Subject, User,
    UserCredentials,
};
pub use ports::{CounterStore, DatabaseService, ObjectStore, PortError, PortResult};
pub use rate_limit::{RateLimitMode, RateLimitModeError, RateLimiter};
