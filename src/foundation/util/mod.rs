pub mod duration;
pub mod encoding;
pub mod time;
