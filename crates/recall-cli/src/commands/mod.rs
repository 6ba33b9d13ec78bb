pub mod capture;
pub mod drain;
pub mod status;
