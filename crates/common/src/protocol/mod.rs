// Wire protocol for the huddle real-time hub.

pub mod ws;
