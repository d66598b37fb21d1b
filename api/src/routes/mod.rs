pub mod audit_route;
pub mod derive_route;
pub mod job_status_route;
pub mod start_job_route;
pub mod stop_job_route;
