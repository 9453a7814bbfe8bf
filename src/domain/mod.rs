pub mod entities;
pub mod gateways;
pub mod repositories;
pub mod time;
pub mod value_objects;
