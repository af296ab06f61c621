pub mod approval;
pub mod assignment;
pub mod attendance;
pub mod leave_permit;
pub mod manual_request;
pub mod role;
