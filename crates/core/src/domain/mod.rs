pub mod approval;
pub mod booking;
pub mod employee;
pub mod request;
