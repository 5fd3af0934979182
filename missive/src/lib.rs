pub mod controller;
pub mod seed;
pub mod transport;
