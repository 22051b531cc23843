pub mod commands;
pub mod pathing;
