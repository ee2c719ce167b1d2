pub mod capture_backend;
pub mod supervisor_delegate;
