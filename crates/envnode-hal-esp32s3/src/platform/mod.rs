pub mod clock;
pub mod display;
pub mod layout;
pub mod reset;
