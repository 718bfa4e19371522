pub mod drain;
pub mod expand;
pub mod send;
pub mod split;
