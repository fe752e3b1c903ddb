//! Request handlers, grouped by domain.

pub mod ancillary;
pub mod billing;
pub mod clinical;
pub mod patients;
pub mod scheduling;
pub mod system;
pub mod wounds;
