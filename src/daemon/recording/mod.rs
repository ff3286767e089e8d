pub mod afk;
pub mod recorder;
