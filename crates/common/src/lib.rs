// huddle-common: shared types and wire protocol for the Huddle workspace hub

pub mod protocol;
pub mod types;
