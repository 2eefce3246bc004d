pub mod enums;
pub mod location;
pub mod parameters;
