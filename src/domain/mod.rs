pub mod event;
pub mod ports;
pub mod scaling;
pub mod work;
pub mod worker;
