pub mod budget;
pub mod property;
pub mod requirements;
pub mod session;
